//! In-memory object store

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tenantsync_core::domain::{is_placeholder, ObjectKey};
use tenantsync_core::ports::{IObjectStore, ObjectHead, ObjectInfo, StoreError};
use tokio::sync::RwLock;

use crate::content_hash;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    hash: String,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn new(data: Vec<u8>, last_modified: DateTime<Utc>) -> Self {
        Self {
            hash: content_hash(&data),
            data,
            last_modified,
        }
    }

    fn head(&self) -> ObjectHead {
        ObjectHead {
            content_hash: self.hash.clone(),
            last_modified: self.last_modified,
            size: self.data.len() as u64,
        }
    }
}

/// Object store kept in a `BTreeMap`, so listings come out sorted
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object with an explicit modification time
    pub async fn insert_at(&self, key: &ObjectKey, data: Vec<u8>, last_modified: DateTime<Utc>) {
        self.objects
            .write()
            .await
            .insert(key.as_str().to_string(), StoredObject::new(data, last_modified));
    }

    /// Every stored key, placeholders included
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl IObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| !is_placeholder(key))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified: obj.last_modified,
                content_hash: obj.hash.clone(),
            })
            .collect())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(key.as_str())
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &ObjectKey, data: Vec<u8>) -> Result<String, StoreError> {
        let object = StoredObject::new(data, Utc::now());
        let hash = object.hash.clone();
        self.objects
            .write()
            .await
            .insert(key.as_str().to_string(), object);
        Ok(hash)
    }

    async fn put_if_match(
        &self,
        key: &ObjectKey,
        data: Vec<u8>,
        expected_hash: &str,
    ) -> Result<String, StoreError> {
        let mut objects = self.objects.write().await;
        let actual = objects.get(key.as_str()).map(|obj| obj.hash.clone());
        if actual.as_deref() != Some(expected_hash) {
            return Err(StoreError::PreconditionFailed {
                key: key.to_string(),
                expected: expected_hash.to_string(),
                actual,
            });
        }

        let object = StoredObject::new(data, Utc::now());
        let hash = object.hash.clone();
        objects.insert(key.as_str().to_string(), object);
        Ok(hash)
    }

    async fn head(&self, key: &ObjectKey) -> Result<ObjectHead, StoreError> {
        self.objects
            .read()
            .await
            .get(key.as_str())
            .map(StoredObject::head)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn copy(&self, source: &ObjectKey, dest: &ObjectKey) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        let data = objects
            .get(source.as_str())
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?;
        objects.insert(dest.as_str().to_string(), StoredObject::new(data, Utc::now()));
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
