//! Object store decorator that counts transferred bytes

use std::sync::Arc;

use async_trait::async_trait;
use tenantsync_core::domain::ObjectKey;
use tenantsync_core::ports::{IObjectStore, ObjectHead, ObjectInfo, StoreError};

use crate::metrics::MetricsRegistry;

/// Wraps a store and records `store_bytes_total` for reads and writes
pub struct InstrumentedStore {
    inner: Arc<dyn IObjectStore>,
    metrics: Arc<MetricsRegistry>,
}

impl InstrumentedStore {
    pub fn new(inner: Arc<dyn IObjectStore>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl IObjectStore for InstrumentedStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        self.inner.list(prefix).await
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StoreError> {
        let data = self.inner.get(key).await?;
        self.metrics.record_store_bytes("download", data.len() as u64);
        Ok(data)
    }

    async fn put(&self, key: &ObjectKey, data: Vec<u8>) -> Result<String, StoreError> {
        let size = data.len() as u64;
        let hash = self.inner.put(key, data).await?;
        self.metrics.record_store_bytes("upload", size);
        Ok(hash)
    }

    async fn put_if_match(
        &self,
        key: &ObjectKey,
        data: Vec<u8>,
        expected_hash: &str,
    ) -> Result<String, StoreError> {
        let size = data.len() as u64;
        let hash = self.inner.put_if_match(key, data, expected_hash).await?;
        self.metrics.record_store_bytes("upload", size);
        Ok(hash)
    }

    async fn head(&self, key: &ObjectKey) -> Result<ObjectHead, StoreError> {
        self.inner.head(key).await
    }

    async fn copy(&self, source: &ObjectKey, dest: &ObjectKey) -> Result<(), StoreError> {
        self.inner.copy(source, dest).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
