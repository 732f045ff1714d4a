//! Periodic playlist refresh
//!
//! The scheduler owns the persisted [`UpdateConfig`] and drives
//! [`PlaylistStore::refresh_all`] on the configured interval. Runs that were
//! missed while the process was down are not caught up: the first firing is
//! always one interval after startup, and every reschedule counts from now.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{AppResult, StorageError};
use crate::models::{UpdateConfig, UpdateInterval};
use crate::repositories::{StateStorage, UPDATE_CONFIG_KEY, load_document, save_document};
use crate::services::PlaylistStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    /// Manual mode, nothing scheduled
    Idle,
    Scheduled {
        interval_minutes: u32,
        next_run_at: DateTime<Utc>,
    },
    Running,
}

struct ScheduleInner {
    config: UpdateConfig,
    state: SchedulerState,
    deadline: Option<Instant>,
}

impl ScheduleInner {
    fn reschedule(&mut self) {
        match self.config.interval.period() {
            Some(period) => {
                let minutes = self.config.interval.minutes();
                self.deadline = Some(Instant::now() + period);
                self.state = SchedulerState::Scheduled {
                    interval_minutes: minutes,
                    next_run_at: Utc::now() + TimeDelta::minutes(i64::from(minutes)),
                };
            }
            None => {
                self.deadline = None;
                self.state = SchedulerState::Idle;
            }
        }
    }
}

pub struct UpdateScheduler {
    store: Arc<PlaylistStore>,
    storage: Arc<dyn StateStorage>,
    inner: Mutex<ScheduleInner>,
    wake: Notify,
    run_lock: tokio::sync::Mutex<()>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl UpdateScheduler {
    /// Restore the update configuration, or persist `default_interval` when
    /// none was stored, and schedule the first run one interval from now.
    pub async fn load(
        store: Arc<PlaylistStore>,
        storage: Arc<dyn StateStorage>,
        default_interval: UpdateInterval,
    ) -> AppResult<Self> {
        let stored = match load_document::<UpdateConfig>(storage.as_ref(), UPDATE_CONFIG_KEY).await
        {
            Ok(stored) => stored,
            Err(e @ StorageError::Serialization { .. }) => {
                warn!("Ignoring unreadable update configuration: {}", e);
                None
            }
            Err(e) => return Err(e.into()),
        };

        let config = match stored {
            Some(config) => config,
            None => {
                let config = UpdateConfig::new(default_interval);
                save_document(storage.as_ref(), UPDATE_CONFIG_KEY, &config).await?;
                config
            }
        };

        let mut inner = ScheduleInner {
            config,
            state: SchedulerState::Idle,
            deadline: None,
        };
        inner.reschedule();

        info!(
            "Update scheduler loaded: interval {} ({})",
            inner.config.interval,
            inner.config.interval.label()
        );

        Ok(Self {
            store,
            storage,
            inner: Mutex::new(inner),
            wake: Notify::new(),
            run_lock: tokio::sync::Mutex::new(()),
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Change the refresh interval.
    ///
    /// Fails with a configuration error for minutes outside the allowed set,
    /// leaving the current interval untouched. On success the new interval
    /// is persisted and the next run is rescheduled from now.
    pub async fn set_interval(&self, minutes: u32) -> AppResult<()> {
        let interval = UpdateInterval::try_from(minutes)?;

        {
            let mut inner = self.lock();
            inner.config.interval = interval;
            // A running refresh reschedules itself when it finishes
            if inner.state != SchedulerState::Running {
                inner.reschedule();
            }
        }

        self.persist().await?;
        self.wake.notify_one();
        info!("Update interval set to {}", interval);
        Ok(())
    }

    /// Refresh every playlist now.
    ///
    /// Returns whether all playlists refreshed. `last_run_at` is recorded
    /// and persisted whatever the outcome.
    pub async fn run_now(&self) -> bool {
        let _running = self.run_lock.lock().await;
        self.lock().state = SchedulerState::Running;

        let success = match self.store.refresh_all().await {
            Ok(success) => success,
            Err(e) => {
                error!("Playlist refresh failed: {}", e);
                false
            }
        };

        {
            let mut inner = self.lock();
            inner.config.last_run_at = Some(Utc::now());
            inner.config.last_run_success = Some(success);
            inner.reschedule();
        }

        if let Err(e) = self.persist().await {
            error!("Failed to persist update configuration: {}", e);
        }
        self.wake.notify_one();
        success
    }

    /// Timer loop. Fires `run_now` whenever the next run is due until the
    /// token is cancelled.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!("Starting update scheduler");

        loop {
            let deadline = self.lock().deadline;
            let due = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = self.wake.notified() => {
                    debug!("Schedule changed, recomputing next run");
                }
                _ = due => {
                    debug!("Scheduled refresh due");
                    tokio::select! {
                        success = self.run_now() => {
                            if !success {
                                warn!("Scheduled refresh finished with failures");
                            }
                        }
                        _ = cancellation_token.cancelled() => break,
                    }
                }
            }
        }

        info!("Update scheduler stopped");
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state.clone()
    }

    pub fn interval(&self) -> UpdateInterval {
        self.lock().config.interval
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.lock().config.last_run_at
    }

    pub fn last_run_success(&self) -> Option<bool> {
        self.lock().config.last_run_success
    }

    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        match self.lock().state {
            SchedulerState::Scheduled { next_run_at, .. } => Some(next_run_at),
            _ => None,
        }
    }

    async fn persist(&self) -> AppResult<()> {
        let _persist = self.persist_lock.lock().await;
        let config = self.lock().config.clone();
        save_document(self.storage.as_ref(), UPDATE_CONFIG_KEY, &config).await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ScheduleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
