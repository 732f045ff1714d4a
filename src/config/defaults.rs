/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Storage defaults
pub const DEFAULT_DATA_DIR: &str = "./data";

// Fetch defaults
pub const DEFAULT_FETCH_TIMEOUT: &str = "30s";
pub const DEFAULT_CONNECT_TIMEOUT: &str = "10s";
pub const DEFAULT_MAX_CONCURRENT_REFRESHES: usize = 4;

// Parser defaults
pub const DEFAULT_CATEGORY: &str = crate::models::DEFAULT_CATEGORY;

// Schedule defaults
pub const DEFAULT_UPDATE_INTERVAL_MINUTES: u32 = 360;
