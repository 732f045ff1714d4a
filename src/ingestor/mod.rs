use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::Playlist;

pub mod fetcher;
pub mod m3u_parser;
pub mod scheduler;
pub mod state_manager;

pub use fetcher::PlaylistFetcher;
pub use m3u_parser::M3uParser;
pub use scheduler::{SchedulerState, UpdateScheduler};
pub use state_manager::{RefreshSlot, RefreshStateManager};

/// Anything that can produce a parsed playlist for a source URL.
///
/// [`PlaylistFetcher`] is the HTTP implementation; the store only depends on
/// this trait.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    /// Fetch and parse the playlist at `url`.
    ///
    /// The returned playlist has a fresh id, `last_fetched_at` set and no
    /// `last_error`. `name` falls back to the URL host when blank.
    async fn fetch(&self, url: &str, name: Option<&str>) -> AppResult<Playlist>;
}
