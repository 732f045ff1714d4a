//! M3U/M3U8 playlist parser
//!
//! Turns the text of an extended M3U document into an ordered list of
//! [`Channel`] records. Parsing is tolerant: malformed attribute tokens,
//! entries without a stream URL and stray URLs are reported as
//! [`ParseWarning`]s and skipped. The only fatal error is a missing
//! `#EXTM3U` header.
//!
//! ```text
//! #EXTM3U
//! #EXTINF:-1 tvg-id="news.1" tvg-logo="http://x/logo.png" group-title="News",Channel A
//! http://x/a.m3u8
//! ```

use std::collections::HashMap;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::{Channel, DEFAULT_CATEGORY, ParseWarning, ParsedPlaylist, WarningKind};
use crate::utils::deterministic_id::generate_channel_id;

const HEADER: &str = "#EXTM3U";
const EXTINF: &str = "#EXTINF:";
const EXTGRP: &str = "#EXTGRP:";

/// Entry opened by an `#EXTINF` line, waiting for its stream URL
#[derive(Debug, Default)]
struct PendingEntry {
    line: usize,
    title: Option<String>,
    duration: Option<f64>,
    tvg_id: Option<String>,
    tvg_name: Option<String>,
    logo: Option<String>,
    group_title: Option<String>,
    extgrp: Option<String>,
}

#[derive(Debug, Clone)]
pub struct M3uParser {
    default_category: String,
}

impl Default for M3uParser {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORY)
    }
}

impl M3uParser {
    pub fn new(default_category: impl Into<String>) -> Self {
        Self {
            default_category: default_category.into(),
        }
    }

    /// Parse an M3U document.
    ///
    /// Fails only when the first non-empty line is not the `#EXTM3U` header;
    /// in that case no partial result is returned.
    pub fn parse(&self, content: &str) -> AppResult<ParsedPlaylist> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut lines = content.lines().enumerate();

        let header = lines
            .by_ref()
            .map(|(_, line)| line.trim())
            .find(|line| !line.is_empty());
        match header {
            Some(line) if starts_with_ignore_case(line, HEADER) => {}
            _ => return Err(AppError::parse("missing header")),
        }

        let mut result = ParsedPlaylist::default();
        let mut pending: Option<PendingEntry> = None;
        let mut occurrences: HashMap<(String, String), usize> = HashMap::new();

        for (index, raw) in lines {
            let line_no = index + 1;
            let line = raw.trim();

            if line.is_empty() {
                continue;
            }

            if starts_with_ignore_case(line, EXTINF) {
                if let Some(dropped) = pending.take() {
                    result.warnings.push(missing_url_warning(&dropped));
                }
                pending = Some(self.parse_extinf_line(line, line_no, &mut result.warnings));
            } else if starts_with_ignore_case(line, EXTGRP) {
                if let Some(entry) = pending.as_mut() {
                    let group = line[EXTGRP.len()..].trim();
                    if !group.is_empty() {
                        entry.extgrp = Some(group.to_string());
                    }
                }
            } else if line.starts_with("#EXT") {
                result.warnings.push(ParseWarning {
                    line: line_no,
                    kind: WarningKind::DirectiveIgnored,
                    message: format!("Ignoring directive '{}'", directive_name(line)),
                });
            } else if line.starts_with('#') {
                continue;
            } else if let Some(entry) = pending.take() {
                let channel = self.complete_channel(entry, line, &mut occurrences);
                result.channels.push(channel);
            } else {
                result.warnings.push(ParseWarning {
                    line: line_no,
                    kind: WarningKind::OrphanUrl,
                    message: format!("Stream URL without #EXTINF metadata: {line}"),
                });
            }
        }

        if let Some(dropped) = pending.take() {
            result.warnings.push(missing_url_warning(&dropped));
        }

        debug!(
            "Parsed {} channels with {} warnings",
            result.channels.len(),
            result.warnings.len()
        );
        Ok(result)
    }

    /// Parse an EXTINF line:
    /// `#EXTINF:-1 tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Channel Name`
    fn parse_extinf_line(
        &self,
        line: &str,
        line_no: usize,
        warnings: &mut Vec<ParseWarning>,
    ) -> PendingEntry {
        let content = &line[EXTINF.len()..];

        let (info, title) = match last_unquoted_comma(content) {
            Some(pos) => (&content[..pos], Some(content[pos + 1..].trim())),
            None => (content, None),
        };

        let info = info.trim_start();
        let (duration_token, attributes) = match info.find(char::is_whitespace) {
            Some(pos) => (&info[..pos], &info[pos..]),
            None => (info, ""),
        };

        let numeric = duration_token.parse::<f64>().ok();

        let mut entry = PendingEntry {
            line: line_no,
            title: title.filter(|t| !t.is_empty()).map(str::to_string),
            // NaN and infinities do not survive JSON persistence
            duration: numeric.filter(|d| d.is_finite()),
            ..PendingEntry::default()
        };

        // Not a duration: treat the token as the first attribute
        let attributes = if numeric.is_none() && !duration_token.is_empty() {
            info
        } else {
            attributes
        };

        for (key, value) in self.parse_attributes(attributes, line_no, warnings) {
            let value = Some(value).filter(|v| !v.is_empty());
            match key.as_str() {
                "tvg-id" => entry.tvg_id = value,
                "tvg-name" => entry.tvg_name = value,
                "tvg-logo" => entry.logo = value,
                "logo" => entry.logo = entry.logo.take().or(value),
                "group-title" => entry.group_title = value,
                _ => {}
            }
        }

        entry
    }

    /// Tolerant `key="value"` scanner.
    ///
    /// Keys are lowercased. Tokens without `=`, with an empty key or with an
    /// unterminated quote are skipped with a warning.
    fn parse_attributes(
        &self,
        input: &str,
        line_no: usize,
        warnings: &mut Vec<ParseWarning>,
    ) -> Vec<(String, String)> {
        let mut attrs = Vec::new();
        let mut chars = input.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
                key.push(c);
            }

            if chars.next_if_eq(&'=').is_none() {
                warnings.push(malformed_attribute(line_no, format!("token '{key}' has no value")));
                continue;
            }

            let value = if chars.next_if_eq(&'"').is_some() {
                let mut value = String::new();
                let mut closed = false;
                let mut escape_next = false;

                for c in chars.by_ref() {
                    if escape_next {
                        if c != '"' {
                            value.push('\\');
                        }
                        value.push(c);
                        escape_next = false;
                        continue;
                    }
                    match c {
                        '\\' => escape_next = true,
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => value.push(c),
                    }
                }

                if !closed {
                    warnings.push(malformed_attribute(
                        line_no,
                        format!("attribute '{key}' has an unterminated quote"),
                    ));
                    break;
                }
                value
            } else {
                let mut value = String::new();
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    value.push(c);
                }
                value
            };

            if key.is_empty() {
                warnings.push(malformed_attribute(
                    line_no,
                    format!("value '{value}' has no attribute name"),
                ));
                continue;
            }

            attrs.push((key.to_ascii_lowercase(), value));
        }

        attrs
    }

    fn complete_channel(
        &self,
        entry: PendingEntry,
        url: &str,
        occurrences: &mut HashMap<(String, String), usize>,
    ) -> Channel {
        let name = entry
            .title
            .clone()
            .or_else(|| entry.tvg_name.clone())
            .unwrap_or_else(|| url.to_string());

        let category = entry
            .group_title
            .clone()
            .or(entry.extgrp)
            .unwrap_or_else(|| self.default_category.clone());

        let seen = occurrences
            .entry((url.to_string(), name.clone()))
            .or_insert(0);
        let id = generate_channel_id(url, &name, *seen);
        *seen += 1;

        Channel {
            id,
            name,
            url: url.to_string(),
            logo: entry.logo,
            category,
            group_title: entry.group_title,
            tvg_id: entry.tvg_id,
            tvg_name: entry.tvg_name,
            duration: entry.duration,
        }
    }
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn last_unquoted_comma(content: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut last = None;
    for (pos, c) in content.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last = Some(pos),
            _ => {}
        }
    }
    last
}

fn directive_name(line: &str) -> &str {
    line.split([':', ' ']).next().unwrap_or(line)
}

fn missing_url_warning(entry: &PendingEntry) -> ParseWarning {
    ParseWarning {
        line: entry.line,
        kind: WarningKind::MissingUrl,
        message: format!(
            "Entry '{}' has no stream URL and was dropped",
            entry.title.as_deref().unwrap_or("<unnamed>")
        ),
    }
}

fn malformed_attribute(line: usize, message: String) -> ParseWarning {
    ParseWarning {
        line,
        kind: WarningKind::MalformedAttribute,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ParsedPlaylist {
        M3uParser::default().parse(content).unwrap()
    }

    #[test]
    fn test_single_entry() {
        let result =
            parse("#EXTM3U\n#EXTINF:-1 tvg-id=\"1\" group-title=\"News\",Channel A\nhttp://x/a.m3u8\n");

        assert_eq!(result.channels.len(), 1);
        let channel = &result.channels[0];
        assert_eq!(channel.name, "Channel A");
        assert_eq!(channel.category, "News");
        assert_eq!(channel.url, "http://x/a.m3u8");
        assert_eq!(channel.tvg_id.as_deref(), Some("1"));
        assert_eq!(channel.group_title.as_deref(), Some("News"));
        assert_eq!(channel.duration, Some(-1.0));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_entries_keep_source_order() {
        let content = "#EXTM3U\n\
            #EXTINF:-1,First\nhttp://x/1\n\
            #EXTINF:-1,Second\nhttp://x/2\n\
            #EXTINF:-1,Third\nhttp://x/3\n";
        let names: Vec<_> = parse(content).channels.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_missing_header_is_error() {
        let err = M3uParser::default()
            .parse("#EXTINF:-1,Channel A\nhttp://x/a.m3u8\n")
            .unwrap_err();
        assert!(matches!(err, AppError::Parse { .. }));
        assert!(err.to_string().contains("missing header"));

        assert!(M3uParser::default().parse("").is_err());
        assert!(M3uParser::default().parse("\n\n   \n").is_err());
    }

    #[test]
    fn test_header_with_bom_crlf_and_attributes() {
        let content = "\u{feff}\r\n#EXTM3U url-tvg=\"http://x/epg.xml\"\r\n#EXTINF:-1,A\r\nhttp://x/a\r\n";
        let result = parse(content);
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.channels[0].url, "http://x/a");
    }

    #[test]
    fn test_header_only_is_empty() {
        let result = parse("#EXTM3U\n");
        assert!(result.channels.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_trailing_entry_without_url_dropped() {
        let result = parse("#EXTM3U\n#EXTINF:-1,A\nhttp://x/a\n#EXTINF:-1,B\n");
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.channels[0].name, "A");
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::MissingUrl);
        assert_eq!(result.warnings[0].line, 4);
    }

    #[test]
    fn test_entry_followed_by_info_line_dropped() {
        let result = parse("#EXTM3U\n#EXTINF:-1,A\n#EXTINF:-1,B\nhttp://x/b\n");
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.channels[0].name, "B");
        assert_eq!(result.warnings[0].kind, WarningKind::MissingUrl);
    }

    #[test]
    fn test_intermediate_directives_do_not_end_entry() {
        let content = "#EXTM3U\n\
            #EXTINF:-1,A\n\
            #EXTVLCOPT:http-user-agent=VLC\n\
            # plain comment\n\
            http://x/a\n";
        let result = parse(content);
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::DirectiveIgnored);
    }

    #[test]
    fn test_default_category() {
        let result = parse("#EXTM3U\n#EXTINF:-1 tvg-id=\"x\",A\nhttp://x/a\n");
        assert_eq!(result.channels[0].category, DEFAULT_CATEGORY);

        let custom = M3uParser::new("Other")
            .parse("#EXTM3U\n#EXTINF:-1,A\nhttp://x/a\n")
            .unwrap();
        assert_eq!(custom.channels[0].category, "Other");
    }

    #[test]
    fn test_extgrp_used_when_no_group_title() {
        let result = parse("#EXTM3U\n#EXTINF:-1,A\n#EXTGRP:Sports\nhttp://x/a\n");
        assert_eq!(result.channels[0].category, "Sports");
        assert_eq!(result.channels[0].group_title, None);

        let result =
            parse("#EXTM3U\n#EXTINF:-1 group-title=\"News\",A\n#EXTGRP:Sports\nhttp://x/a\n");
        assert_eq!(result.channels[0].category, "News");
    }

    #[test]
    fn test_name_precedence() {
        let result = parse(
            "#EXTM3U\n\
             #EXTINF:-1 tvg-name=\"Tvg Name\",Title\nhttp://x/1\n\
             #EXTINF:-1 tvg-name=\"Tvg Name\",\nhttp://x/2\n\
             #EXTINF:-1 tvg-id=\"3\"\nhttp://x/3\n",
        );
        let names: Vec<_> = result.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Title", "Tvg Name", "http://x/3"]);
    }

    #[test]
    fn test_logo_attributes() {
        let result = parse(
            "#EXTM3U\n\
             #EXTINF:-1 tvg-logo=\"http://x/l1.png\",A\nhttp://x/1\n\
             #EXTINF:-1 logo=\"http://x/l2.png\",B\nhttp://x/2\n\
             #EXTINF:-1 logo=\"http://x/l3.png\" tvg-logo=\"http://x/l4.png\",C\nhttp://x/3\n",
        );
        let logos: Vec<_> = result.channels.iter().map(|c| c.logo.as_deref()).collect();
        assert_eq!(
            logos,
            vec![
                Some("http://x/l1.png"),
                Some("http://x/l2.png"),
                Some("http://x/l4.png")
            ]
        );
    }

    #[test]
    fn test_comma_inside_quoted_attribute() {
        let result = parse("#EXTM3U\n#EXTINF:-1 group-title=\"News, Weather\",Channel A\nhttp://x/a\n");
        assert_eq!(result.channels[0].category, "News, Weather");
        assert_eq!(result.channels[0].name, "Channel A");
    }

    #[test]
    fn test_malformed_attributes_are_skipped() {
        let result = parse(
            "#EXTM3U\n#EXTINF:-1 broken tvg-id=\"7\" =\"orphan\" group-title=\"Kids\",Channel\nhttp://x/a\n",
        );
        let channel = &result.channels[0];
        assert_eq!(channel.tvg_id.as_deref(), Some("7"));
        assert_eq!(channel.category, "Kids");

        let kinds: Vec<_> = result.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![WarningKind::MalformedAttribute, WarningKind::MalformedAttribute]
        );
    }

    #[test]
    fn test_unterminated_quote_keeps_entry() {
        let result = parse("#EXTM3U\n#EXTINF:-1 tvg-id=\"1\" group-title=\"News,Channel A\nhttp://x/a\n");
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.channels[0].tvg_id.as_deref(), Some("1"));
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::MalformedAttribute)
        );
    }

    #[test]
    fn test_unquoted_values_and_key_case() {
        let result = parse("#EXTM3U\n#EXTINF:-1 TVG-ID=abc Group-Title=Music,Radio\nhttp://x/r\n");
        assert_eq!(result.channels[0].tvg_id.as_deref(), Some("abc"));
        assert_eq!(result.channels[0].category, "Music");
    }

    #[test]
    fn test_missing_duration() {
        let result = parse("#EXTM3U\n#EXTINF:tvg-id=\"1\",A\nhttp://x/a\n");
        assert_eq!(result.channels[0].duration, None);
        assert_eq!(result.channels[0].tvg_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_non_finite_duration_dropped() {
        let result = parse(
            "#EXTM3U\n\
             #EXTINF:NaN,A\nhttp://x/a\n\
             #EXTINF:inf group-title=\"News\",B\nhttp://x/b\n\
             #EXTINF:120.5,C\nhttp://x/c\n",
        );
        let durations: Vec<_> = result.channels.iter().map(|c| c.duration).collect();
        assert_eq!(durations, vec![None, None, Some(120.5)]);
        assert_eq!(result.channels[1].category, "News");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_orphan_url_ignored() {
        let result = parse("#EXTM3U\nhttp://x/orphan\n#EXTINF:-1,A\nhttp://x/a\n");
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::OrphanUrl);
        assert_eq!(result.warnings[0].line, 2);
    }

    #[test]
    fn test_ids_are_stable_across_parses() {
        let content = "#EXTM3U\n#EXTINF:-1,A\nhttp://x/a\n#EXTINF:-1,B\nhttp://x/b\n";
        let first: Vec<_> = parse(content).channels.into_iter().map(|c| c.id).collect();
        let second: Vec<_> = parse(content).channels.into_iter().map(|c| c.id).collect();
        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);
    }

    #[test]
    fn test_duplicate_urls_preserved_with_unique_ids() {
        let content = "#EXTM3U\n\
            #EXTINF:-1,A\nhttp://x/a\n\
            #EXTINF:-1,A\nhttp://x/a\n\
            #EXTINF:-1,Other\nhttp://x/a\n";
        let result = parse(content);
        assert_eq!(result.channels.len(), 3);

        let mut ids: Vec<_> = result.channels.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
