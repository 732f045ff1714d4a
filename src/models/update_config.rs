use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::AppError;

/// Allowed refresh intervals. `Manual` disables the background timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum UpdateInterval {
    Manual,
    Minutes15,
    Minutes30,
    Hourly,
    Every6Hours,
    Daily,
}

impl UpdateInterval {
    pub const ALL: [UpdateInterval; 6] = [
        UpdateInterval::Manual,
        UpdateInterval::Minutes15,
        UpdateInterval::Minutes30,
        UpdateInterval::Hourly,
        UpdateInterval::Every6Hours,
        UpdateInterval::Daily,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            UpdateInterval::Manual => 0,
            UpdateInterval::Minutes15 => 15,
            UpdateInterval::Minutes30 => 30,
            UpdateInterval::Hourly => 60,
            UpdateInterval::Every6Hours => 360,
            UpdateInterval::Daily => 1440,
        }
    }

    /// Timer period, `None` when updates are manual only
    pub fn period(self) -> Option<Duration> {
        match self {
            UpdateInterval::Manual => None,
            other => Some(Duration::from_secs(u64::from(other.minutes()) * 60)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UpdateInterval::Manual => "Manual only",
            UpdateInterval::Minutes15 => "Every 15 minutes",
            UpdateInterval::Minutes30 => "Every 30 minutes",
            UpdateInterval::Hourly => "Every hour",
            UpdateInterval::Every6Hours => "Every 6 hours",
            UpdateInterval::Daily => "Every day",
        }
    }
}

impl TryFrom<u32> for UpdateInterval {
    type Error = AppError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        UpdateInterval::ALL
            .into_iter()
            .find(|interval| interval.minutes() == minutes)
            .ok_or_else(|| {
                let allowed: Vec<String> = UpdateInterval::ALL
                    .iter()
                    .map(|i| i.minutes().to_string())
                    .collect();
                AppError::config(format!(
                    "Invalid update interval {minutes} minutes (allowed: {})",
                    allowed.join(", ")
                ))
            })
    }
}

impl From<UpdateInterval> for u32 {
    fn from(interval: UpdateInterval) -> Self {
        interval.minutes()
    }
}

impl fmt::Display for UpdateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Process-wide refresh settings, persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub interval: UpdateInterval,
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_success: Option<bool>,
}

impl UpdateConfig {
    pub fn new(interval: UpdateInterval) -> Self {
        Self {
            interval,
            last_run_at: None,
            last_run_success: None,
        }
    }
}
