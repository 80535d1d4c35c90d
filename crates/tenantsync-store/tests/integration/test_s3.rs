//! Integration tests for the S3 adapter against a wiremock S3 endpoint

use tenantsync_core::domain::ObjectKey;
use tenantsync_core::ports::{IObjectStore, StoreError};
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn key(k: &str) -> ObjectKey {
    ObjectKey::new(k).unwrap()
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_follows_continuation_tokens() {
    let (server, store) = common::setup_s3_mock(None).await;

    common::mount_list_paginated(
        &server,
        "acme/databases_generales/",
        &[common::contents_entry("acme/databases_generales/a.sqlite", "aaa", 4096)],
        &[
            common::contents_entry("acme/databases_generales/.keep", "empty", 0),
            common::contents_entry("acme/databases_generales/b.sqlite", "bbb", 8192),
        ],
    )
    .await;

    let objects = store.list("acme/databases_generales/").await.unwrap();

    let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["acme/databases_generales/a.sqlite", "acme/databases_generales/b.sqlite"]
    );
    assert_eq!(objects[0].content_hash, "aaa");
    assert_eq!(objects[1].size, 8192);
    assert_eq!(objects[0].last_modified.to_rfc3339(), "2024-05-01T10:00:00+00:00");
}

#[tokio::test]
async fn test_list_applies_and_strips_key_prefix() {
    let (server, store) = common::setup_s3_mock(Some("prod")).await;

    common::mount_list_single_page(
        &server,
        "prod/acme/suc_1/",
        &[
            common::contents_entry("prod/acme/suc_1/", "dir", 0),
            common::contents_entry("prod/acme/suc_1/caja.sqlite", "ccc", 10),
        ],
    )
    .await;

    let objects = store.list("acme/suc_1/").await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].key, "acme/suc_1/caja.sqlite");
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_get_returns_body() {
    let (server, store) = common::setup_s3_mock(None).await;

    Mock::given(method("GET"))
        .and(path(common::object_path("acme/suc_1/caja.sqlite")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"ccc\"")
                .set_body_bytes(b"SQLite format 3\0rest".to_vec()),
        )
        .mount(&server)
        .await;

    let data = store.get(&key("acme/suc_1/caja.sqlite")).await.unwrap();
    assert_eq!(data, b"SQLite format 3\0rest");
}

#[tokio::test]
async fn test_missing_object_maps_to_not_found() {
    let (server, store) = common::setup_s3_mock(None).await;

    Mock::given(method("HEAD"))
        .and(path(common::object_path("acme/missing.sqlite")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(common::object_path("acme/missing.sqlite")))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("content-type", "application/xml")
                .set_body_string(common::error_body("NoSuchKey", "The specified key does not exist.")),
        )
        .mount(&server)
        .await;

    let head = store.head(&key("acme/missing.sqlite")).await;
    assert!(matches!(head, Err(StoreError::NotFound(ref k)) if k == "acme/missing.sqlite"));

    let get = store.get(&key("acme/missing.sqlite")).await;
    assert!(matches!(get, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_head_strips_etag_quotes() {
    let (server, store) = common::setup_s3_mock(None).await;

    Mock::given(method("HEAD"))
        .and(path(common::object_path("acme/a.sqlite")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"0a1b2c\"")
                .insert_header("last-modified", "Wed, 01 May 2024 10:00:00 GMT"),
        )
        .mount(&server)
        .await;

    let head = store.head(&key("acme/a.sqlite")).await.unwrap();
    assert_eq!(head.content_hash, "0a1b2c");
    assert_eq!(head.last_modified.to_rfc3339(), "2024-05-01T10:00:00+00:00");
}

// ============================================================================
// Writes
// ============================================================================

#[tokio::test]
async fn test_put_returns_new_etag() {
    let (server, store) = common::setup_s3_mock(None).await;

    Mock::given(method("PUT"))
        .and(path(common::object_path("acme/a.sqlite")))
        .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"fresh\""))
        .expect(1)
        .mount(&server)
        .await;

    let hash = store.put(&key("acme/a.sqlite"), b"data".to_vec()).await.unwrap();
    assert_eq!(hash, "fresh");
}

#[tokio::test]
async fn test_put_if_match_sends_quoted_etag() {
    let (server, store) = common::setup_s3_mock(None).await;

    Mock::given(method("PUT"))
        .and(path(common::object_path("acme/a.sqlite")))
        .and(header("if-match", "\"old\""))
        .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"new\""))
        .expect(1)
        .mount(&server)
        .await;

    let hash = store
        .put_if_match(&key("acme/a.sqlite"), b"data".to_vec(), "old")
        .await
        .unwrap();
    assert_eq!(hash, "new");
}

#[tokio::test]
async fn test_put_if_match_maps_412_to_precondition_failed() {
    let (server, store) = common::setup_s3_mock(None).await;

    Mock::given(method("PUT"))
        .and(path(common::object_path("acme/a.sqlite")))
        .respond_with(
            ResponseTemplate::new(412)
                .insert_header("content-type", "application/xml")
                .set_body_string(common::error_body(
                    "PreconditionFailed",
                    "At least one of the pre-conditions you specified did not hold",
                )),
        )
        .mount(&server)
        .await;

    let result = store
        .put_if_match(&key("acme/a.sqlite"), b"data".to_vec(), "stale")
        .await;
    match result {
        Err(StoreError::PreconditionFailed { key, expected, .. }) => {
            assert_eq!(key, "acme/a.sqlite");
            assert_eq!(expected, "stale");
        }
        other => panic!("expected precondition failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_copy_uses_server_side_copy() {
    let (server, store) = common::setup_s3_mock(Some("prod")).await;

    Mock::given(method("PUT"))
        .and(path(common::object_path("prod/acme/databases_generales/a.sqlite")))
        .and(header_exists("x-amz-copy-source"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                     <CopyObjectResult><LastModified>2024-05-01T10:00:00.000Z</LastModified>\
                     <ETag>&quot;copied&quot;</ETag></CopyObjectResult>",
                ),
        )
        .expect(1)
        .mount(&server)
        .await;

    store
        .copy(
            &key("_template/databases_generales/a.sqlite"),
            &key("acme/databases_generales/a.sqlite"),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let source = requests[0]
        .headers
        .get("x-amz-copy-source")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(source.starts_with("tenants/prod%2F%5Ftemplate%2F"), "{source}");
}

#[tokio::test]
async fn test_listing_query_targets_bucket() {
    let (server, store) = common::setup_s3_mock(None).await;

    Mock::given(method("GET"))
        .and(path("/tenants"))
        .and(query_param("prefix", "nobody/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(common::list_body("nobody/", &[], None)),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert!(store.list("nobody/").await.unwrap().is_empty());
}
