//! Atomic persistence of the latest scan result.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::{error::StoreError, types::ScanResult};

/// Single-slot on-disk store for the latest [`ScanResult`].
///
/// Writes go to a temporary sibling and are renamed over the target, so a
/// reader only ever sees a complete document.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the stored document. On error the previous one is intact.
    pub async fn write(&self, result: &ScanResult) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(result)?;
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| io_error(parent, source))?;

        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("results");
        let tmp = parent.join(format!(".{file_name}.tmp-{}", Uuid::new_v4().simple()));

        if let Err(err) = write_synced(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err);
        }

        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&self.path, source));
        }

        debug!(path = %self.path.display(), vms = result.len(), "scan result persisted");
        Ok(())
    }

    /// Loads the stored document, `Ok(None)` until the first successful
    /// write.
    pub async fn read(&self) -> Result<Option<ScanResult>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&self.path, source)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|source| io_error(path, source))?;
    file.write_all(bytes)
        .await
        .map_err(|source| io_error(path, source))?;
    file.flush().await.map_err(|source| io_error(path, source))?;
    file.sync_all()
        .await
        .map_err(|source| io_error(path, source))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::types::{Category, CategoryResult, VmRecord};

    fn sample(name: &str) -> ScanResult {
        let mut categories = BTreeMap::new();
        categories.insert(Category::Software, CategoryResult::Data(json!("<software/>")));
        ScanResult::new(vec![VmRecord::scanned(name, "[ds] vm.vmx", categories)])
    }

    #[tokio::test]
    async fn read_before_first_write_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = ResultStore::new(dir.path().join("results.json"));

        assert!(store.read().await.expect("read").is_none());
    }

    #[tokio::test]
    async fn latest_write_replaces_previous_result() {
        let dir = TempDir::new().expect("tempdir");
        let store = ResultStore::new(dir.path().join("nested/results.json"));

        store.write(&sample("first")).await.expect("first write");
        store.write(&sample("second")).await.expect("second write");

        let stored = store.read().await.expect("read").expect("present");
        assert_eq!(stored, sample("second"));
    }

    #[tokio::test]
    async fn write_leaves_no_temporary_files_behind() {
        let dir = TempDir::new().expect("tempdir");
        let store = ResultStore::new(dir.path().join("results.json"));
        store.write(&sample("only")).await.expect("write");

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .expect("list dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("results.json")]);
    }

    #[tokio::test]
    async fn corrupt_content_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("results.json");
        std::fs::write(&path, b"{ half a document").expect("seed");

        let store = ResultStore::new(path);
        assert!(matches!(store.read().await, Err(StoreError::Serialization(_))));
    }
}
