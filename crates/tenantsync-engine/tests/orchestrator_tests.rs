//! Integration tests for the sync orchestrator over the in-memory store

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::Connection;
use tenantsync_core::config::ConfigBuilder;
use tenantsync_core::domain::{
    FailureStage, LocalFileState, ObjectKey, PushBatch, SyncAction, SyncError, TenantContext,
};
use tenantsync_core::ports::IObjectStore;
use tenantsync_engine::{StaticBranchDirectory, SyncOrchestrator, SyncSettings};
use tenantsync_sqlite::{inspect_schema, StagedDatabase};
use tenantsync_store::MemoryObjectStore;

// ============================================================================
// Test helpers
// ============================================================================

const CLIENTES: &str = "
    CREATE TABLE clientes (id INTEGER PRIMARY KEY, nombre TEXT, last_modified INTEGER);
";

const EGRESOS_V1: &str = "
    CREATE TABLE egresos (id INTEGER PRIMARY KEY, monto REAL, last_modified INTEGER);
";

const EGRESOS_V2: &str = "
    CREATE TABLE egresos (id INTEGER PRIMARY KEY, monto REAL, last_modified INTEGER, motivo TEXT);
";

const TEMPLATE_CLIENTES: &str = "_template/databases_generales/clientes.sqlite";
const TEMPLATE_CAJA: &str = "_template/plantilla_sucursal/caja.sqlite";
const TENANT_CLIENTES: &str = "acme/databases_generales/clientes.sqlite";
const TENANT_CAJA: &str = "acme/suc_1/caja.sqlite";

/// Builds a SQLite file from a SQL script
async fn sqlite(script: &str) -> Vec<u8> {
    let staged = StagedDatabase::from_bytes(&[], None).unwrap();
    let mut conn = staged.connect().await.unwrap();
    sqlx::raw_sql(script).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();
    staged.read_bytes().await.unwrap()
}

/// Runs a single-row query against a database held as bytes
async fn egreso(bytes: &[u8], id: i64) -> Option<(f64, Option<i64>)> {
    let staged = StagedDatabase::from_bytes(bytes, None).unwrap();
    let mut conn = staged.connect_read_only().await.unwrap();
    let row = sqlx::query_as("SELECT monto, last_modified FROM egresos WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut conn)
        .await
        .unwrap();
    conn.close().await.unwrap();
    row
}

fn key(k: &str) -> ObjectKey {
    ObjectKey::new(k).unwrap()
}

fn ctx() -> TenantContext {
    TenantContext::parse("acme", "1").unwrap()
}

struct Harness {
    store: Arc<MemoryObjectStore>,
    orchestrator: Arc<SyncOrchestrator>,
}

fn harness_with(require_base_hash: bool) -> Harness {
    let config = ConfigBuilder::new()
        .tenant("acme", &["1"])
        .require_base_hash(require_base_hash)
        .build();
    let directory = StaticBranchDirectory::from_config(&config).unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        Arc::new(directory),
        SyncSettings::from(&config.sync),
    );
    Harness {
        store,
        orchestrator: Arc::new(orchestrator),
    }
}

fn harness() -> Harness {
    harness_with(false)
}

async fn seed_templates(store: &MemoryObjectStore) {
    store.put(&key(TEMPLATE_CLIENTES), sqlite(CLIENTES).await).await.unwrap();
    store.put(&key(TEMPLATE_CAJA), sqlite(EGRESOS_V1).await).await.unwrap();
    store
        .put(&key("_template/databases_generales/.keep"), Vec::new())
        .await
        .unwrap();
}

fn egresos_batch(records: Vec<serde_json::Value>, base_hash: Option<String>) -> PushBatch {
    PushBatch {
        db_relative_path: "suc_1/caja.sqlite".into(),
        table_name: "egresos".into(),
        primary_key_column: "id".into(),
        records,
        base_hash,
    }
}

// ============================================================================
// Initialize
// ============================================================================

#[tokio::test]
async fn test_first_initialize_clones_each_template_once() {
    let h = harness();
    seed_templates(&h.store).await;

    let first = h.orchestrator.initialize(&ctx(), &[]).await.unwrap();
    assert_eq!(first.copied_count(), 2);
    assert!(first.failures.is_empty());
    assert_eq!(first.files_to_pull, vec![TENANT_CLIENTES, TENANT_CAJA]);
    assert_eq!(
        first.plan.actions()[..4],
        [
            SyncAction::EnsureDir {
                key: "acme/databases_generales/".into()
            },
            SyncAction::EnsureDir {
                key: "acme/suc_1/".into()
            },
            SyncAction::CloneTemplate {
                source_key: TEMPLATE_CLIENTES.into(),
                dest_key: TENANT_CLIENTES.into()
            },
            SyncAction::CloneTemplate {
                source_key: TEMPLATE_CAJA.into(),
                dest_key: TENANT_CAJA.into()
            },
        ]
    );
    assert_eq!(
        h.store.get(&key(TENANT_CLIENTES)).await.unwrap(),
        h.store.get(&key(TEMPLATE_CLIENTES)).await.unwrap()
    );

    let keys_after_first = h.store.keys().await;
    let second = h.orchestrator.initialize(&ctx(), &[]).await.unwrap();
    assert_eq!(second.copied_count(), 0);
    assert_eq!(second.migrated_count(), 0);
    assert_eq!(second.files_to_pull, first.files_to_pull);
    assert_eq!(h.store.keys().await, keys_after_first);
}

#[tokio::test]
async fn test_initialize_never_overwrites_tenant_data() {
    let h = harness();
    seed_templates(&h.store).await;
    let tenant_bytes =
        sqlite(&format!("{EGRESOS_V1} INSERT INTO egresos VALUES (7, 99.5, 100);")).await;
    h.store.put(&key(TENANT_CAJA), tenant_bytes.clone()).await.unwrap();

    let report = h.orchestrator.initialize(&ctx(), &[]).await.unwrap();

    assert_eq!(report.copied_count(), 1);
    assert_eq!(report.migrated_count(), 0);
    assert_eq!(h.store.get(&key(TENANT_CAJA)).await.unwrap(), tenant_bytes);
}

#[tokio::test]
async fn test_initialize_migrates_an_older_tenant_file() {
    let h = harness();
    h.store.put(&key(TEMPLATE_CAJA), sqlite(EGRESOS_V2).await).await.unwrap();
    h.store
        .put(
            &key(TENANT_CAJA),
            sqlite(&format!("{EGRESOS_V1} INSERT INTO egresos VALUES (1, 10.0, 100);")).await,
        )
        .await
        .unwrap();

    let report = h.orchestrator.initialize(&ctx(), &[]).await.unwrap();

    assert!(report.plan.iter().any(|a| *a
        == SyncAction::MigrateSchema {
            key: TENANT_CAJA.into(),
            statements: vec!["ALTER TABLE egresos ADD COLUMN motivo TEXT".into()],
        }));

    let migrated = h.store.get(&key(TENANT_CAJA)).await.unwrap();
    let schema = inspect_schema(&migrated, None).await.unwrap();
    assert!(schema.table("egresos").unwrap().has_column("motivo"));
    assert_eq!(egreso(&migrated, 1).await, Some((10.0, Some(100))));

    let again = h.orchestrator.initialize(&ctx(), &[]).await.unwrap();
    assert_eq!(again.migrated_count(), 0);
}

#[tokio::test]
async fn test_failed_column_keeps_created_table_across_initialize_calls() {
    let h = harness();
    h.store
        .put(
            &key(TEMPLATE_CAJA),
            sqlite(
                "CREATE TABLE egresos (id INTEGER PRIMARY KEY, monto REAL, last_modified INTEGER,
                                       fecha TEXT DEFAULT CURRENT_TIMESTAMP);
                 CREATE TABLE cortes (id INTEGER PRIMARY KEY, total REAL);",
            )
            .await,
        )
        .await
        .unwrap();
    h.store
        .put(
            &key(TENANT_CAJA),
            sqlite(&format!("{EGRESOS_V1} INSERT INTO egresos VALUES (1, 10.0, 100);")).await,
        )
        .await
        .unwrap();

    let report = h.orchestrator.initialize(&ctx(), &[]).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, TENANT_CAJA);
    assert_eq!(report.failures[0].stage, FailureStage::Migrate);
    assert!(report.failures[0].reason.contains("ADD COLUMN fecha"));
    assert!(report.plan.iter().any(|a| *a
        == SyncAction::MigrateSchema {
            key: TENANT_CAJA.into(),
            statements: vec!["CREATE TABLE cortes (id INTEGER PRIMARY KEY, total REAL)".into()],
        }));

    let migrated = h.store.get(&key(TENANT_CAJA)).await.unwrap();
    assert!(inspect_schema(&migrated, None).await.unwrap().table("cortes").is_some());
    assert_eq!(egreso(&migrated, 1).await, Some((10.0, Some(100))));

    let again = h.orchestrator.initialize(&ctx(), &[]).await.unwrap();
    assert_eq!(again.migrated_count(), 0);
    assert_eq!(again.failures.len(), 1);
    assert_eq!(again.failures[0].reason, report.failures[0].reason);

    let after = h.store.get(&key(TENANT_CAJA)).await.unwrap();
    assert_eq!(after, migrated);
}

#[tokio::test]
async fn test_broken_tenant_file_is_reported_not_fatal() {
    let h = harness();
    seed_templates(&h.store).await;
    h.store
        .put(&key(TENANT_CLIENTES), b"definitely not sqlite".to_vec())
        .await
        .unwrap();

    let report = h.orchestrator.initialize(&ctx(), &[]).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, TENANT_CLIENTES);
    assert_eq!(report.failures[0].stage, FailureStage::Migrate);
    assert_eq!(report.copied_count(), 1);
    assert_eq!(report.files_to_pull, vec![TENANT_CLIENTES, TENANT_CAJA]);
}

#[tokio::test]
async fn test_unregistered_branch_is_not_found() {
    let h = harness();
    seed_templates(&h.store).await;

    let err = h
        .orchestrator
        .initialize(&TenantContext::parse("acme", "2").unwrap(), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NotFound(_)));
    assert!(h.store.list("acme/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_local_files_choose_between_pull_and_upload() {
    let h = harness();
    seed_templates(&h.store).await;
    h.orchestrator.initialize(&ctx(), &[]).await.unwrap();

    let caja_hash = h.store.head(&key(TENANT_CAJA)).await.unwrap().content_hash;
    let local = vec![
        LocalFileState {
            key: TENANT_CLIENTES.into(),
            last_modified: Utc::now() + Duration::hours(1),
            hash: None,
        },
        LocalFileState {
            key: TENANT_CAJA.into(),
            last_modified: Utc::now() - Duration::hours(1),
            hash: Some(caja_hash),
        },
    ];

    let report = h.orchestrator.initialize(&ctx(), &local).await.unwrap();
    let data_actions: Vec<&SyncAction> = report
        .plan
        .iter()
        .filter(|a| matches!(a, SyncAction::PullData { .. } | SyncAction::UploadDb { .. }))
        .collect();

    assert_eq!(
        data_actions,
        vec![&SyncAction::UploadDb {
            key: TENANT_CLIENTES.into()
        }]
    );
}

// ============================================================================
// Push / Pull
// ============================================================================

#[tokio::test]
async fn test_push_then_pull_round_trip() {
    let h = harness();
    seed_templates(&h.store).await;
    h.orchestrator.initialize(&ctx(), &[]).await.unwrap();

    let report = h
        .orchestrator
        .push(
            &ctx(),
            &egresos_batch(vec![json!({"id": 5, "monto": 42.5, "last_modified": 300})], None),
        )
        .await
        .unwrap();
    assert_eq!(report.db_key, TENANT_CAJA);
    assert_eq!(report.merged_records, 1);
    assert_eq!(report.stale_records, 0);

    let pulled = h.orchestrator.pull(&ctx(), TENANT_CAJA).await.unwrap();
    assert_eq!(pulled.content_hash, report.content_hash);
    assert_eq!(egreso(&pulled.bytes, 5).await, Some((42.5, Some(300))));
}

#[tokio::test]
async fn test_push_with_stale_base_hash_conflicts() {
    let h = harness();
    seed_templates(&h.store).await;
    h.orchestrator.initialize(&ctx(), &[]).await.unwrap();
    let before = h.store.get(&key(TENANT_CAJA)).await.unwrap();

    let err = h
        .orchestrator
        .push(
            &ctx(),
            &egresos_batch(
                vec![json!({"id": 5, "monto": 1.0, "last_modified": 300})],
                Some("not-the-current-hash".into()),
            ),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Conflict(_)));
    assert_eq!(h.store.get(&key(TENANT_CAJA)).await.unwrap(), before);
}

#[tokio::test]
async fn test_push_with_matching_base_hash_succeeds() {
    let h = harness();
    seed_templates(&h.store).await;
    h.orchestrator.initialize(&ctx(), &[]).await.unwrap();
    let pulled = h.orchestrator.pull(&ctx(), TENANT_CAJA).await.unwrap();

    let report = h
        .orchestrator
        .push(
            &ctx(),
            &egresos_batch(
                vec![json!({"id": 1, "monto": 3.0, "last_modified": 1})],
                Some(pulled.content_hash.clone()),
            ),
        )
        .await
        .unwrap();
    assert_ne!(report.content_hash, pulled.content_hash);
}

#[tokio::test]
async fn test_stale_only_push_leaves_file_untouched() {
    let h = harness();
    h.store
        .put(
            &key(TENANT_CAJA),
            sqlite(&format!("{EGRESOS_V1} INSERT INTO egresos VALUES (1, 10.0, 500);")).await,
        )
        .await
        .unwrap();
    let before = h.store.head(&key(TENANT_CAJA)).await.unwrap();

    let report = h
        .orchestrator
        .push(
            &ctx(),
            &egresos_batch(vec![json!({"id": 1, "monto": 99.0, "last_modified": 400})], None),
        )
        .await
        .unwrap();

    assert_eq!(report.merged_records, 0);
    assert_eq!(report.stale_records, 1);
    assert_eq!(report.content_hash, before.content_hash);
}

#[tokio::test]
async fn test_rejected_batch_is_a_merge_error() {
    let h = harness();
    seed_templates(&h.store).await;
    h.orchestrator.initialize(&ctx(), &[]).await.unwrap();
    let before = h.store.get(&key(TENANT_CAJA)).await.unwrap();

    let err = h
        .orchestrator
        .push(
            &ctx(),
            &egresos_batch(
                vec![json!({"id": 1, "monto; DROP TABLE egresos": 1, "last_modified": 9})],
                None,
            ),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Merge(_)));
    assert_eq!(h.store.get(&key(TENANT_CAJA)).await.unwrap(), before);
}

#[tokio::test]
async fn test_push_to_missing_or_foreign_paths() {
    let h = harness();

    let missing = h
        .orchestrator
        .push(&ctx(), &egresos_batch(vec![], None))
        .await
        .unwrap_err();
    assert!(matches!(missing, SyncError::NotFound(_)));

    let mut escape = egresos_batch(vec![], None);
    escape.db_relative_path = "../globex/suc_1/caja.sqlite".into();
    let err = h.orchestrator.push(&ctx(), &escape).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_required_base_hash_is_enforced() {
    let h = harness_with(true);
    seed_templates(&h.store).await;
    h.orchestrator.initialize(&ctx(), &[]).await.unwrap();

    let err = h
        .orchestrator
        .push(
            &ctx(),
            &egresos_batch(vec![json!({"id": 1, "monto": 1.0, "last_modified": 1})], None),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));

    let err = h
        .orchestrator
        .upload(&ctx(), TENANT_CAJA, sqlite(EGRESOS_V1).await, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));
}

#[tokio::test]
async fn test_concurrent_pushes_to_one_file_both_land() {
    let h = harness();
    seed_templates(&h.store).await;
    h.orchestrator.initialize(&ctx(), &[]).await.unwrap();

    let first = {
        let orchestrator = Arc::clone(&h.orchestrator);
        tokio::spawn(async move {
            orchestrator
                .push(
                    &ctx(),
                    &egresos_batch(vec![json!({"id": 10, "monto": 1.0, "last_modified": 1})], None),
                )
                .await
        })
    };
    let second = {
        let orchestrator = Arc::clone(&h.orchestrator);
        tokio::spawn(async move {
            orchestrator
                .push(
                    &ctx(),
                    &egresos_batch(vec![json!({"id": 11, "monto": 2.0, "last_modified": 1})], None),
                )
                .await
        })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let bytes = h.store.get(&key(TENANT_CAJA)).await.unwrap();
    assert_eq!(egreso(&bytes, 10).await, Some((1.0, Some(1))));
    assert_eq!(egreso(&bytes, 11).await, Some((2.0, Some(1))));
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn test_conditional_upload() {
    let h = harness();
    seed_templates(&h.store).await;
    h.orchestrator.initialize(&ctx(), &[]).await.unwrap();
    let current = h.store.head(&key(TENANT_CAJA)).await.unwrap().content_hash;

    let replacement =
        sqlite(&format!("{EGRESOS_V1} INSERT INTO egresos VALUES (3, 1.5, 10);")).await;
    let report = h
        .orchestrator
        .upload(&ctx(), TENANT_CAJA, replacement.clone(), Some(&current))
        .await
        .unwrap();
    assert_eq!(report.key, TENANT_CAJA);
    assert_eq!(h.store.get(&key(TENANT_CAJA)).await.unwrap(), replacement);

    let err = h
        .orchestrator
        .upload(&ctx(), TENANT_CAJA, sqlite(EGRESOS_V1).await, Some(&current))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));
    assert_eq!(h.store.get(&key(TENANT_CAJA)).await.unwrap(), replacement);

    let err = h
        .orchestrator
        .upload(&ctx(), "acme/suc_1/nueva.sqlite", sqlite(EGRESOS_V1).await, Some("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));
}

#[tokio::test]
async fn test_upload_outside_tenant_is_forbidden() {
    let h = harness();

    let err = h
        .orchestrator
        .upload(&ctx(), "globex/suc_1/caja.sqlite", sqlite(EGRESOS_V1).await, None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Forbidden(_)));
    assert!(h.store.keys().await.is_empty());
}
