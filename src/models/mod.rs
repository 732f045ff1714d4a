use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod update_config;

pub use update_config::{UpdateConfig, UpdateInterval};

/// Category assigned to channels without group metadata
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
    pub category: String,
    pub group_title: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    /// EXTINF duration in seconds, `-1` for live streams
    #[serde(default)]
    pub duration: Option<f64>,
}

/// A named collection of channels sourced from one URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub channels: Vec<Channel>,
    pub created_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Non-fatal parse warnings of the most recent successful parse
    #[serde(default)]
    pub warnings: usize,
}

impl Playlist {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Replace the content of this playlist with a freshly fetched one.
    ///
    /// Identity (`id`, `name`, `source_url`, `created_at`) is kept; every
    /// fetch-derived field is replaced together.
    pub fn apply_refresh(&mut self, fetched: Playlist) {
        self.channels = fetched.channels;
        self.last_fetched_at = fetched.last_fetched_at;
        self.warnings = fetched.warnings;
        self.last_error = None;
    }

    /// Record a failed refresh, keeping the previous channels available.
    pub fn apply_failure(&mut self, error: String) {
        self.last_error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// An attribute token on an info line could not be read
    MalformedAttribute,
    /// An info line was not followed by a stream URL
    MissingUrl,
    /// A stream URL appeared without a preceding info line
    OrphanUrl,
    /// An extended directive the parser does not interpret
    DirectiveIgnored,
}

/// Non-fatal problem found while parsing a playlist document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// 1-based line number in the source document
    pub line: usize,
    pub kind: WarningKind,
    pub message: String,
}

/// Result of parsing one playlist document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    pub warnings: Vec<ParseWarning>,
}

/// Outcome of refreshing a single playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated { channel_count: usize },
    Failed { error: String },
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Updated { .. })
    }
}

/// Progress event broadcast while playlists refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshProgress {
    pub playlist_id: String,
    pub state: RefreshState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    Fetching,
    Completed { channel_count: usize },
    Error { message: String },
}
