//! Per-playlist refresh state
//!
//! Guarantees at most one in-flight fetch per playlist id. The first caller
//! to [`RefreshStateManager::begin`] becomes the leader and performs the
//! fetch; callers arriving while it runs get a follower handle that resolves
//! to the leader's outcome. Progress events are broadcast to subscribers.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::models::{RefreshOutcome, RefreshProgress, RefreshState};

pub type ProgressSender = broadcast::Sender<RefreshProgress>;
pub type ProgressReceiver = broadcast::Receiver<RefreshProgress>;

type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;

#[derive(Clone)]
pub struct RefreshStateManager {
    in_flight: Arc<Mutex<HashMap<String, OutcomeReceiver>>>,
    states: Arc<Mutex<HashMap<String, RefreshProgress>>>,
    progress_tx: ProgressSender,
}

/// Role of a caller asking to refresh a playlist
pub enum RefreshSlot {
    /// No refresh was running; the caller must fetch and call `complete`
    Leader(RefreshGuard),
    /// A refresh is already running; await its outcome
    Follower(RefreshWaiter),
}

/// Held by the leader while its fetch runs.
///
/// Dropping the guard without completing (e.g. the refresh future was
/// cancelled) releases the slot and wakes followers with a failure.
pub struct RefreshGuard {
    playlist_id: String,
    outcome_tx: watch::Sender<Option<RefreshOutcome>>,
    manager: RefreshStateManager,
    completed: bool,
}

pub struct RefreshWaiter {
    playlist_id: String,
    outcome_rx: OutcomeReceiver,
}

impl RefreshStateManager {
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            states: Arc::new(Mutex::new(HashMap::new())),
            progress_tx,
        }
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.progress_tx.subscribe()
    }

    /// Claim the refresh slot for a playlist
    pub fn begin(&self, playlist_id: &str) -> RefreshSlot {
        let mut in_flight = lock(&self.in_flight);

        if let Some(outcome_rx) = in_flight.get(playlist_id) {
            debug!("Refresh already in flight for playlist {}, coalescing", playlist_id);
            return RefreshSlot::Follower(RefreshWaiter {
                playlist_id: playlist_id.to_string(),
                outcome_rx: outcome_rx.clone(),
            });
        }

        let (outcome_tx, outcome_rx) = watch::channel(None);
        in_flight.insert(playlist_id.to_string(), outcome_rx);
        drop(in_flight);

        self.record(playlist_id, RefreshState::Fetching);

        RefreshSlot::Leader(RefreshGuard {
            playlist_id: playlist_id.to_string(),
            outcome_tx,
            manager: self.clone(),
            completed: false,
        })
    }

    pub fn is_in_flight(&self, playlist_id: &str) -> bool {
        lock(&self.in_flight).contains_key(playlist_id)
    }

    pub fn get_progress(&self, playlist_id: &str) -> Option<RefreshProgress> {
        lock(&self.states).get(playlist_id).cloned()
    }

    /// Drop the recorded state of a removed playlist
    pub fn forget(&self, playlist_id: &str) {
        lock(&self.states).remove(playlist_id);
    }

    fn record(&self, playlist_id: &str, state: RefreshState) {
        let progress = RefreshProgress {
            playlist_id: playlist_id.to_string(),
            state,
            updated_at: Utc::now(),
        };
        lock(&self.states).insert(playlist_id.to_string(), progress.clone());

        // No subscribers is fine
        let _ = self.progress_tx.send(progress);
    }

    fn release(&self, playlist_id: &str) {
        lock(&self.in_flight).remove(playlist_id);
    }
}

impl Default for RefreshStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshGuard {
    /// Publish the outcome to followers and release the slot
    pub fn complete(mut self, outcome: RefreshOutcome) {
        let state = match &outcome {
            RefreshOutcome::Updated { channel_count } => RefreshState::Completed {
                channel_count: *channel_count,
            },
            RefreshOutcome::Failed { error } => RefreshState::Error {
                message: error.clone(),
            },
        };
        self.manager.record(&self.playlist_id, state);
        self.outcome_tx.send_replace(Some(outcome));
        self.completed = true;
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if !self.completed {
            debug!("Refresh of playlist {} abandoned", self.playlist_id);
            self.manager.record(
                &self.playlist_id,
                RefreshState::Error {
                    message: "refresh cancelled".to_string(),
                },
            );
        }
        self.manager.release(&self.playlist_id);
    }
}

impl RefreshWaiter {
    /// Wait for the in-flight refresh to finish
    pub async fn wait(mut self) -> RefreshOutcome {
        match self.outcome_rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or_else(|| RefreshOutcome::Failed {
                error: "refresh cancelled".to_string(),
            }),
            Err(_) => {
                debug!(
                    "In-flight refresh of playlist {} ended without an outcome",
                    self.playlist_id
                );
                RefreshOutcome::Failed {
                    error: "refresh cancelled".to_string(),
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_begin_is_follower() {
        let manager = RefreshStateManager::new();

        let RefreshSlot::Leader(guard) = manager.begin("p1") else {
            panic!("first caller should lead");
        };
        let RefreshSlot::Follower(waiter) = manager.begin("p1") else {
            panic!("second caller should follow");
        };
        assert!(manager.is_in_flight("p1"));

        // Other playlists are independent
        assert!(matches!(manager.begin("p2"), RefreshSlot::Leader(_)));

        let wait = tokio::spawn(waiter.wait());
        guard.complete(RefreshOutcome::Updated { channel_count: 3 });

        assert_eq!(
            wait.await.unwrap(),
            RefreshOutcome::Updated { channel_count: 3 }
        );
        assert!(!manager.is_in_flight("p1"));
        assert!(matches!(manager.begin("p1"), RefreshSlot::Leader(_)));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_followers() {
        let manager = RefreshStateManager::new();

        let RefreshSlot::Leader(guard) = manager.begin("p1") else {
            panic!("first caller should lead");
        };
        let RefreshSlot::Follower(waiter) = manager.begin("p1") else {
            panic!("second caller should follow");
        };

        drop(guard);

        assert!(matches!(waiter.wait().await, RefreshOutcome::Failed { .. }));
        assert!(!manager.is_in_flight("p1"));
        assert!(matches!(
            manager.get_progress("p1").unwrap().state,
            RefreshState::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_progress_events_broadcast() {
        let manager = RefreshStateManager::new();
        let mut rx = manager.subscribe();

        let RefreshSlot::Leader(guard) = manager.begin("p1") else {
            panic!("first caller should lead");
        };
        guard.complete(RefreshOutcome::Failed {
            error: "boom".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap().state, RefreshState::Fetching);
        assert_eq!(
            rx.recv().await.unwrap().state,
            RefreshState::Error {
                message: "boom".to_string()
            }
        );

        manager.forget("p1");
        assert!(manager.get_progress("p1").is_none());
    }
}
