//! Shared helpers: deterministic ids and URL handling

pub mod deterministic_id;
pub mod url;

pub use deterministic_id::{generate_channel_id, generate_deterministic_uuid};
pub use url::UrlUtils;
