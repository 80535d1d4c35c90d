//! Local filesystem object store
//!
//! Keys map one-to-one onto paths below a root directory. Writes go to a
//! hidden temp file next to the target and are renamed into place, so readers
//! never observe a half-written object. Content hashes are SHA-256 hex
//! digests computed from the bytes on disk; `last_modified` is the file mtime.
//!
//! Conditional writes compare and write while holding a store-wide lock, which
//! makes them atomic with respect to every writer going through the same
//! store instance.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tenantsync_core::domain::{is_placeholder, ObjectKey};
use tenantsync_core::ports::{IObjectStore, ObjectHead, ObjectInfo, StoreError};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::content_hash;

/// Prefix of in-flight temp files; never listed
const TEMP_PREFIX: &str = ".tenantsync-tmp-";

/// Object store rooted at a local directory
#[derive(Debug)]
pub struct FilesystemObjectStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FilesystemObjectStore {
    /// Opens (and creates if needed) a store rooted at `root`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the root directory cannot be created.
    pub async fn new(root: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(root).await?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn not_found(err: std::io::Error, key: &str) -> StoreError {
        if err.kind() == ErrorKind::NotFound {
            StoreError::NotFound(key.to_string())
        } else {
            StoreError::Io(err)
        }
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        tokio::fs::read(self.path_for(key))
            .await
            .map_err(|e| Self::not_found(e, key))
    }

    async fn stat(&self, key: &str) -> Result<ObjectHead, StoreError> {
        let path = self.path_for(key);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Self::not_found(e, key))?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let data = self.read(key).await?;
        Ok(ObjectHead {
            content_hash: content_hash(&data),
            last_modified: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default(),
            size: metadata.len(),
        })
    }

    /// Writes `data` atomically; the caller holds the write lock
    async fn write_locked(&self, key: &str, data: &[u8]) -> Result<String, StoreError> {
        let path = self.path_for(key);
        if key.ends_with('/') {
            tokio::fs::create_dir_all(&path).await?;
            return Ok(content_hash(&[]));
        }

        let parent = path
            .parent()
            .ok_or_else(|| StoreError::Backend(format!("key has no parent directory: {key}")))?;
        tokio::fs::create_dir_all(parent).await?;

        let temp = parent.join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&temp, data).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(key = %key, size = data.len(), "Wrote object");
        Ok(content_hash(data))
    }

    /// Collects every file below `dir` as `(key, path)` pairs
    async fn walk(&self, dir: PathBuf) -> Result<Vec<(String, PathBuf)>, StoreError> {
        let mut files = Vec::new();
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let name = entry.file_name();
                    if name.to_string_lossy().starts_with(TEMP_PREFIX) {
                        continue;
                    }
                    let Ok(relative) = path.strip_prefix(&self.root) else {
                        continue;
                    };
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.push((key, path));
                }
            }
        }

        Ok(files)
    }
}

#[async_trait]
impl IObjectStore for FilesystemObjectStore {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        // Walk from the deepest directory the prefix fully names
        let dir = match prefix.rfind('/') {
            Some(idx) => self.path_for(&prefix[..idx]),
            None => self.root.clone(),
        };

        let mut objects = Vec::new();
        for (key, path) in self.walk(dir).await? {
            if !key.starts_with(prefix) || is_placeholder(&key) {
                continue;
            }
            let metadata = tokio::fs::metadata(&path).await?;
            let data = tokio::fs::read(&path).await?;
            objects.push(ObjectInfo {
                content_hash: content_hash(&data),
                size: metadata.len(),
                last_modified: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_default(),
                key,
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StoreError> {
        self.read(key.as_str()).await
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &ObjectKey, data: Vec<u8>) -> Result<String, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_locked(key.as_str(), &data).await
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_if_match(
        &self,
        key: &ObjectKey,
        data: Vec<u8>,
        expected_hash: &str,
    ) -> Result<String, StoreError> {
        let _guard = self.write_lock.lock().await;
        let actual = match self.stat(key.as_str()).await {
            Ok(head) => Some(head.content_hash),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if actual.as_deref() != Some(expected_hash) {
            return Err(StoreError::PreconditionFailed {
                key: key.to_string(),
                expected: expected_hash.to_string(),
                actual,
            });
        }
        self.write_locked(key.as_str(), &data).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &ObjectKey) -> Result<ObjectHead, StoreError> {
        self.stat(key.as_str()).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn copy(&self, source: &ObjectKey, dest: &ObjectKey) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let data = self.read(source.as_str()).await?;
        self.write_locked(dest.as_str(), &data).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
