//! Behaviour every object store backend must share
//!
//! The same checks run against the in-memory and the filesystem stores; the
//! S3 adapter is covered separately against a mock endpoint.

use std::sync::Arc;

use tenantsync_core::domain::ObjectKey;
use tenantsync_core::ports::{IObjectStore, StoreError};
use tenantsync_store::{FilesystemObjectStore, MemoryObjectStore};

fn key(k: &str) -> ObjectKey {
    ObjectKey::new(k).unwrap()
}

async fn backends() -> (tempfile::TempDir, Vec<Arc<dyn IObjectStore>>) {
    let dir = tempfile::tempdir().unwrap();
    let fs = FilesystemObjectStore::new(&dir.path().join("objects"))
        .await
        .unwrap();
    let stores: Vec<Arc<dyn IObjectStore>> = vec![Arc::new(MemoryObjectStore::new()), Arc::new(fs)];
    (dir, stores)
}

#[tokio::test]
async fn test_hash_reported_by_put_matches_list_and_head() {
    let (_dir, stores) = backends().await;
    for store in stores {
        let k = key("acme/suc_1/ventas.sqlite");
        let hash = store.put(&k, b"contents".to_vec()).await.unwrap();

        let listed = store.list("acme/suc_1/").await.unwrap();
        assert_eq!(listed.len(), 1, "{}", store.backend_name());
        assert_eq!(listed[0].content_hash, hash);
        assert_eq!(listed[0].size, 8);
        assert_eq!(store.head(&k).await.unwrap().content_hash, hash);
    }
}

#[tokio::test]
async fn test_listing_does_not_leak_into_sibling_prefixes() {
    let (_dir, stores) = backends().await;
    for store in stores {
        store.put(&key("acme/suc_1/a.sqlite"), b"a".to_vec()).await.unwrap();
        store.put(&key("acme/suc_10/b.sqlite"), b"b".to_vec()).await.unwrap();
        store.put(&key("acme2/c.sqlite"), b"c".to_vec()).await.unwrap();

        let keys: Vec<String> = store
            .list("acme/suc_1/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["acme/suc_1/a.sqlite"], "{}", store.backend_name());

        assert_eq!(store.list("acme/").await.unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_conditional_write_rejects_stale_hash_and_keeps_object() {
    let (_dir, stores) = backends().await;
    for store in stores {
        let k = key("acme/databases_generales/clientes.sqlite");
        let original = store.put(&k, b"v1".to_vec()).await.unwrap();
        let updated = store.put_if_match(&k, b"v2".to_vec(), &original).await.unwrap();

        let result = store.put_if_match(&k, b"v3".to_vec(), &original).await;
        assert!(
            matches!(result, Err(StoreError::PreconditionFailed { .. })),
            "{}",
            store.backend_name()
        );
        assert_eq!(store.get(&k).await.unwrap(), b"v2");
        assert_eq!(store.head(&k).await.unwrap().content_hash, updated);
    }
}

#[tokio::test]
async fn test_copy_duplicates_content() {
    let (_dir, stores) = backends().await;
    for store in stores {
        let src = key("_template/plantilla_sucursal/caja.sqlite");
        let dst = key("acme/suc_2/caja.sqlite");
        let hash = store.put(&src, b"template".to_vec()).await.unwrap();

        store.copy(&src, &dst).await.unwrap();

        assert_eq!(store.get(&dst).await.unwrap(), b"template");
        assert_eq!(store.head(&dst).await.unwrap().content_hash, hash);
        assert_eq!(store.get(&src).await.unwrap(), b"template");
    }
}

#[tokio::test]
async fn test_missing_key_is_not_found_everywhere() {
    let (_dir, stores) = backends().await;
    for store in stores {
        let k = key("acme/nothing.sqlite");
        assert!(store.get(&k).await.unwrap_err().is_not_found());
        assert!(store.head(&k).await.unwrap_err().is_not_found());
        assert!(store.list("acme/").await.unwrap().is_empty());
    }
}
