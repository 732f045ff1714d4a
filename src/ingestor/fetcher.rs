//! HTTP playlist fetcher
//!
//! Downloads a playlist document, parses it with [`M3uParser`] and builds a
//! fresh [`Playlist`]. Nothing is persisted here; the caller decides what to
//! do with the result.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::PlaylistSource;
use super::m3u_parser::M3uParser;
use crate::config::FetchConfig;
use crate::errors::{AppError, AppResult};
use crate::models::Playlist;
use crate::utils::url::UrlUtils;

pub struct PlaylistFetcher {
    client: Client,
    parser: M3uParser,
    timeout: Duration,
}

impl PlaylistFetcher {
    pub fn new(config: &FetchConfig, parser: M3uParser) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            parser,
            timeout: config.timeout,
        })
    }

    /// Fetch the raw playlist text
    async fn fetch_text(&self, url: &str) -> AppResult<String> {
        let display_url = UrlUtils::obfuscate_credentials(url);
        debug!("Fetching playlist from {}", display_url);

        let response = self.client.get(url).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out after {}", humantime::format_duration(self.timeout))
            } else if e.is_connect() {
                format!("connection failed: {e}")
            } else {
                format!("request failed: {e}")
            };
            AppError::network(display_url.clone(), message)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::network(
                display_url,
                format!(
                    "HTTP status {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let bytes = response.bytes().await.map_err(|e| {
            AppError::network(display_url.clone(), format!("failed to read response body: {e}"))
        })?;
        debug!("Downloaded {} bytes from {}", bytes.len(), display_url);

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl PlaylistSource for PlaylistFetcher {
    async fn fetch(&self, url: &str, name: Option<&str>) -> AppResult<Playlist> {
        let parsed_url = UrlUtils::parse_source_url(url)?;
        let source_url = parsed_url.as_str().to_string();
        let display_url = UrlUtils::obfuscate_credentials(&source_url);

        let content = self.fetch_text(&source_url).await?;
        let parsed = self.parser.parse(&content)?;

        if !parsed.warnings.is_empty() {
            warn!(
                "Playlist {} parsed with {} warnings",
                display_url,
                parsed.warnings.len()
            );
            for warning in &parsed.warnings {
                debug!("line {}: {:?} - {}", warning.line, warning.kind, warning.message);
            }
        }

        let now = Utc::now();
        let playlist = Playlist {
            id: Uuid::new_v4().to_string(),
            name: UrlUtils::resolve_playlist_name(name, &source_url),
            source_url,
            channels: parsed.channels,
            created_at: now,
            last_fetched_at: Some(now),
            last_error: None,
            warnings: parsed.warnings.len(),
        };

        info!(
            "Fetched playlist '{}' from {}: {} channels",
            playlist.name,
            display_url,
            playlist.channel_count()
        );
        Ok(playlist)
    }
}
