//! File-backed storage: one `<key>.json` file per key in a data directory

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::StateStorage;
use crate::errors::{StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    data_dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl StateStorage for JsonFileStorage {
    async fn read(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path.display().to_string(), e)),
        }
    }

    async fn write(&self, key: &str, contents: String) -> StorageResult<()> {
        let data_dir = self.data_dir.clone();
        let path = self.path_for(key);

        tokio::task::spawn_blocking(move || write_atomically(&data_dir, &path, contents.as_bytes()))
            .await
            .map_err(|e| {
                StorageError::io(
                    self.path_for(key).display().to_string(),
                    std::io::Error::other(e),
                )
            })??;

        debug!("Persisted '{}' to {}", key, self.path_for(key).display());
        Ok(())
    }
}

/// Write to a temporary file in the same directory, then rename over the target
fn write_atomically(data_dir: &Path, path: &Path, contents: &[u8]) -> StorageResult<()> {
    let io_err = |e: std::io::Error| StorageError::io(path.display().to_string(), e);

    std::fs::create_dir_all(data_dir).map_err(io_err)?;
    let mut temp = tempfile::NamedTempFile::new_in(data_dir).map_err(io_err)?;
    temp.write_all(contents).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
