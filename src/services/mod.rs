//! Application services built on top of the ingestor and repositories

pub mod playlist_store;

pub use playlist_store::PlaylistStore;
