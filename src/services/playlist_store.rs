//! Playlist store
//!
//! Owns every [`Playlist`] known to the application. Mutations are
//! persisted through a [`StateStorage`] after each operation, refreshes go
//! through a [`PlaylistSource`] and are coalesced per playlist by the
//! [`RefreshStateManager`].
//!
//! A failed refresh never empties a playlist: the previous channels stay
//! available and only `last_error` is set.

use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::errors::{AppError, AppResult};
use crate::ingestor::{PlaylistSource, RefreshSlot, RefreshStateManager};
use crate::models::{Channel, Playlist, RefreshOutcome};
use crate::repositories::{PLAYLISTS_KEY, StateStorage, load_document, save_document};
use crate::utils::url::UrlUtils;

pub struct PlaylistStore {
    playlists: RwLock<Vec<Playlist>>,
    source: Arc<dyn PlaylistSource>,
    storage: Arc<dyn StateStorage>,
    state_manager: RefreshStateManager,
    max_concurrent_refreshes: usize,
    // Snapshot + write happen under this lock so persisted state never goes backwards
    persist_lock: Mutex<()>,
}

impl PlaylistStore {
    /// Create the store and load the last persisted playlists
    pub async fn load(
        source: Arc<dyn PlaylistSource>,
        storage: Arc<dyn StateStorage>,
        state_manager: RefreshStateManager,
        max_concurrent_refreshes: usize,
    ) -> AppResult<Self> {
        let playlists: Vec<Playlist> = load_document(storage.as_ref(), PLAYLISTS_KEY)
            .await?
            .unwrap_or_default();

        info!(
            "Loaded {} playlists ({} channels) from storage",
            playlists.len(),
            playlists.iter().map(Playlist::channel_count).sum::<usize>()
        );

        Ok(Self {
            playlists: RwLock::new(playlists),
            source,
            storage,
            state_manager,
            max_concurrent_refreshes: max_concurrent_refreshes.max(1),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn state_manager(&self) -> &RefreshStateManager {
        &self.state_manager
    }

    /// Add an already fetched playlist.
    ///
    /// The source URL is normalized first. Fails with
    /// [`AppError::Duplicate`] when a playlist with the same source URL is
    /// tracked. On any error, including a failed write, the store is left
    /// unchanged.
    pub async fn add_playlist(&self, mut playlist: Playlist) -> AppResult<Playlist> {
        playlist.source_url = UrlUtils::parse_source_url(&playlist.source_url)?.to_string();

        {
            let mut playlists = self.playlists.write().await;
            if playlists
                .iter()
                .any(|p| p.source_url == playlist.source_url)
            {
                return Err(AppError::duplicate(UrlUtils::obfuscate_credentials(
                    &playlist.source_url,
                )));
            }
            playlists.push(playlist.clone());
        }

        if let Err(e) = self.persist().await {
            self.playlists.write().await.retain(|p| p.id != playlist.id);
            error!("Failed to persist new playlist '{}': {}", playlist.name, e);
            return Err(e);
        }

        info!(
            "Added playlist '{}' ({}) with {} channels",
            playlist.name,
            playlist.id,
            playlist.channel_count()
        );
        Ok(playlist)
    }

    /// Fetch a playlist from `url` and add it.
    ///
    /// The duplicate check runs before the fetch so an already tracked
    /// source is rejected without network traffic.
    pub async fn import(&self, url: &str, name: Option<&str>) -> AppResult<Playlist> {
        let source_url = UrlUtils::parse_source_url(url)?.to_string();

        if self.contains_source(&source_url).await {
            return Err(AppError::duplicate(UrlUtils::obfuscate_credentials(
                &source_url,
            )));
        }

        let playlist = self.source.fetch(&source_url, name).await?;
        self.add_playlist(playlist).await
    }

    /// Remove a playlist. Returns whether it existed; an unknown id is not an error.
    ///
    /// A failed write puts the playlist back at its previous position.
    pub async fn remove_playlist(&self, id: &str) -> AppResult<bool> {
        let removed = {
            let mut playlists = self.playlists.write().await;
            playlists
                .iter()
                .position(|p| p.id == id)
                .map(|index| (index, playlists.remove(index)))
        };

        let Some((index, removed)) = removed else {
            debug!("Remove requested for unknown playlist {}", id);
            return Ok(false);
        };

        if let Err(e) = self.persist().await {
            let mut playlists = self.playlists.write().await;
            let index = index.min(playlists.len());
            playlists.insert(index, removed);
            error!("Failed to persist removal of playlist {}: {}", id, e);
            return Err(e);
        }

        self.state_manager.forget(id);
        info!("Removed playlist '{}' ({})", removed.name, removed.id);
        Ok(true)
    }

    /// Refresh every stored playlist.
    ///
    /// Returns `true` only if every playlist refreshed successfully. An
    /// empty store trivially succeeds.
    pub async fn refresh_all(&self) -> AppResult<bool> {
        let targets: Vec<(String, String)> = {
            let playlists = self.playlists.read().await;
            playlists
                .iter()
                .map(|p| (p.id.clone(), p.source_url.clone()))
                .collect()
        };

        if targets.is_empty() {
            debug!("No playlists to refresh");
            return Ok(true);
        }

        info!("Refreshing {} playlists", targets.len());

        let outcomes: Vec<RefreshOutcome> = futures::stream::iter(targets)
            .map(|(id, url)| async move { self.refresh_one(&id, &url).await })
            .buffer_unordered(self.max_concurrent_refreshes)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        self.persist().await?;

        if failed == 0 {
            info!("Refreshed {} playlists successfully", outcomes.len());
        } else {
            warn!(
                "Refresh finished with {} of {} playlists failing",
                failed,
                outcomes.len()
            );
        }
        Ok(failed == 0)
    }

    /// Refresh a single playlist and persist the result
    pub async fn refresh_playlist(&self, id: &str) -> AppResult<RefreshOutcome> {
        let source_url = {
            let playlists = self.playlists.read().await;
            playlists
                .iter()
                .find(|p| p.id == id)
                .map(|p| p.source_url.clone())
        }
        .ok_or_else(|| AppError::validation(format!("Unknown playlist: {id}")))?;

        let outcome = self.refresh_one(id, &source_url).await;
        self.persist().await?;
        Ok(outcome)
    }

    /// Fetch and commit one playlist, coalescing with an in-flight refresh
    async fn refresh_one(&self, id: &str, source_url: &str) -> RefreshOutcome {
        let guard = match self.state_manager.begin(id) {
            RefreshSlot::Leader(guard) => guard,
            RefreshSlot::Follower(waiter) => return waiter.wait().await,
        };

        let result = self.source.fetch(source_url, None).await;
        let outcome = self.commit(id, result).await;
        guard.complete(outcome.clone());
        outcome
    }

    /// Apply a fetch result to the stored playlist in one write section
    async fn commit(&self, id: &str, result: AppResult<Playlist>) -> RefreshOutcome {
        let mut playlists = self.playlists.write().await;
        let playlist = playlists.iter_mut().find(|p| p.id == id);

        match (playlist, result) {
            (Some(playlist), Ok(fetched)) => {
                playlist.apply_refresh(fetched);
                info!(
                    "Refreshed playlist '{}': {} channels",
                    playlist.name,
                    playlist.channel_count()
                );
                RefreshOutcome::Updated {
                    channel_count: playlist.channel_count(),
                }
            }
            (Some(playlist), Err(e)) => {
                error!("Refresh of playlist '{}' failed: {}", playlist.name, e);
                playlist.apply_failure(e.to_string());
                RefreshOutcome::Failed {
                    error: e.to_string(),
                }
            }
            (None, result) => {
                debug!("Playlist {} was removed during refresh, discarding result", id);
                match result {
                    Ok(fetched) => RefreshOutcome::Updated {
                        channel_count: fetched.channel_count(),
                    },
                    Err(e) => RefreshOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            }
        }
    }

    /// Persist the current playlist set
    pub async fn flush(&self) -> AppResult<()> {
        self.persist().await
    }

    async fn persist(&self) -> AppResult<()> {
        let _persist = self.persist_lock.lock().await;
        let snapshot = self.playlists.read().await.clone();
        save_document(self.storage.as_ref(), PLAYLISTS_KEY, &snapshot).await?;
        debug!("Persisted {} playlists", snapshot.len());
        Ok(())
    }

    async fn contains_source(&self, source_url: &str) -> bool {
        self.playlists
            .read()
            .await
            .iter()
            .any(|p| p.source_url == source_url)
    }

    pub async fn list_playlists(&self) -> Vec<Playlist> {
        self.playlists.read().await.clone()
    }

    pub async fn get_playlist(&self, id: &str) -> Option<Playlist> {
        self.playlists
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Channels of all playlists, in playlist order then source order
    pub async fn all_channels(&self) -> Vec<Channel> {
        self.playlists
            .read()
            .await
            .iter()
            .flat_map(|p| p.channels.iter().cloned())
            .collect()
    }

    /// Sorted, de-duplicated category names across all playlists
    pub async fn categories(&self) -> Vec<String> {
        let playlists = self.playlists.read().await;
        playlists
            .iter()
            .flat_map(|p| p.channels.iter().map(|c| c.category.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub async fn channels_in_category(&self, category: &str) -> Vec<Channel> {
        self.playlists
            .read()
            .await
            .iter()
            .flat_map(|p| p.channels.iter())
            .filter(|c| c.category == category)
            .cloned()
            .collect()
    }

    /// Case-insensitive substring search over channel names and categories.
    /// A blank query matches nothing.
    pub async fn search(&self, query: &str) -> Vec<Channel> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        self.playlists
            .read()
            .await
            .iter()
            .flat_map(|p| p.channels.iter())
            .filter(|c| {
                c.name.to_lowercase().contains(&query) || c.category.to_lowercase().contains(&query)
            })
            .cloned()
            .collect()
    }

    /// First channel with the given id across all playlists
    pub async fn find_channel(&self, channel_id: &str) -> Option<Channel> {
        self.playlists
            .read()
            .await
            .iter()
            .flat_map(|p| p.channels.iter())
            .find(|c| c.id == channel_id)
            .cloned()
    }
}
