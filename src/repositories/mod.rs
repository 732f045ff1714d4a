//! Durable key/value storage for application state
//!
//! Each key holds one JSON document. The playlist store and the update
//! scheduler are the only writers of their keys; favorites and
//! recently-watched lists belong to UI collaborators and are stored
//! alongside under the reserved keys below.
//!
//! # Usage
//!
//! ```rust
//! use m3u_viewer::repositories::{MemoryStorage, StateStorage, load_document, save_document};
//!
//! # async fn example() -> m3u_viewer::errors::StorageResult<()> {
//! let storage = MemoryStorage::new();
//! save_document(&storage, "favorites", &vec!["a".to_string()]).await?;
//! let favorites: Option<Vec<String>> = load_document(&storage, "favorites").await?;
//! assert_eq!(favorites, Some(vec!["a".to_string()]));
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::{StorageError, StorageResult};

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

/// All playlists with their channels
pub const PLAYLISTS_KEY: &str = "playlists";
/// Update interval and last run bookkeeping
pub const UPDATE_CONFIG_KEY: &str = "update_config";
/// Set of favorite channel ids (owned by UI collaborators)
pub const FAVORITES_KEY: &str = "favorites";
/// Bounded, most-recent-first list of channel ids (owned by UI collaborators)
pub const RECENTLY_WATCHED_KEY: &str = "recently_watched";

#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Read the raw document stored under `key`, `None` if never written
    async fn read(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the document stored under `key`.
    ///
    /// Implementations must never leave a partially written document behind.
    async fn write(&self, key: &str, contents: String) -> StorageResult<()>;
}

/// Load and deserialize the document stored under `key`
pub async fn load_document<T: DeserializeOwned>(
    storage: &dyn StateStorage,
    key: &str,
) -> StorageResult<Option<T>> {
    match storage.read(key).await? {
        Some(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StorageError::serialization(key, e)),
        None => Ok(None),
    }
}

/// Serialize and store a document under `key`
pub async fn save_document<T: Serialize + ?Sized>(
    storage: &dyn StateStorage,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let contents =
        serde_json::to_string_pretty(value).map_err(|e| StorageError::serialization(key, e))?;
    storage.write(key, contents).await
}
