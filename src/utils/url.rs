//! URL utilities for playlist sources

use url::Url;

use crate::errors::{AppError, AppResult};

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Parse a playlist source URL, accepting only http and https
    ///
    /// Surrounding whitespace is ignored.
    pub fn parse_source_url(url: &str) -> AppResult<Url> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("Playlist URL is required"));
        }

        let parsed = Url::parse(trimmed)
            .map_err(|e| AppError::validation(format!("Invalid playlist URL '{trimmed}': {e}")))?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(AppError::validation(format!(
                "Unsupported URL scheme '{scheme}' (expected http or https)"
            ))),
        }
    }

    /// Derive a display name for a playlist from its source URL
    ///
    /// Uses the host (without a leading `www.`); falls back to the URL
    /// itself when it has no host.
    ///
    /// ```rust
    /// use m3u_viewer::utils::url::UrlUtils;
    ///
    /// assert_eq!(UrlUtils::name_from_url("https://www.example.com/list.m3u"), "example.com");
    /// assert_eq!(UrlUtils::name_from_url("not a url"), "not a url");
    /// ```
    pub fn name_from_url(url: &str) -> String {
        let trimmed = url.trim();
        Url::parse(trimmed)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| trimmed.to_string())
    }

    /// Mask credentials before a URL is logged or stored as an error message
    ///
    /// IPTV providers commonly embed `username`/`password` query parameters
    /// or `user:pass@host` authority in playlist URLs.
    pub fn obfuscate_credentials(url: &str) -> String {
        const SENSITIVE_PARAMS: [&str; 6] = ["username", "password", "user", "pass", "pwd", "passwd"];

        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_string();
        };

        if !parsed.username().is_empty() || parsed.password().is_some() {
            let _ = parsed.set_username("****");
            let _ = parsed.set_password(Some("****"));
        }

        if parsed.query().is_some() {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(key, value)| {
                    let masked = SENSITIVE_PARAMS
                        .iter()
                        .any(|param| key.eq_ignore_ascii_case(param));
                    let value = if masked { "****".to_string() } else { value.into_owned() };
                    (key.into_owned(), value)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
        }

        parsed.to_string()
    }

    /// Resolve the playlist name: the user-supplied one unless blank
    pub fn resolve_playlist_name(name: Option<&str>, url: &str) -> String {
        match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => Self::name_from_url(url),
        }
    }
}
