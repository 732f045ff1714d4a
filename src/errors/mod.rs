//! Centralized error handling for the playlist core
//!
//! Every fallible operation in the crate returns [`AppResult`]. The variants
//! of [`AppError`] map one-to-one onto the failures a caller has to tell
//! apart:
//!
//! - **Parse errors**: the playlist document is not an M3U document
//! - **Network errors**: timeouts, connection failures, non-2xx responses
//! - **Duplicate errors**: the playlist source is already tracked
//! - **Config errors**: invalid update interval or configuration values
//! - **Storage errors**: reading or writing persisted state failed
//!
//! # Usage
//!
//! ```rust
//! use m3u_viewer::errors::{AppError, AppResult};
//!
//! fn check_url(url: &str) -> AppResult<()> {
//!     if url.is_empty() {
//!         return Err(AppError::validation("playlist URL is required"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for storage Results
pub type StorageResult<T> = Result<T, StorageError>;
