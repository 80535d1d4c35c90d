//! Shared test helpers for S3 adapter integration tests
//!
//! Provides a wiremock server standing in for a path-style S3 endpoint and
//! helpers that mount the responses of the S3 operations the adapter uses.

use tenantsync_core::config::{StoreBackend, StoreConfig};
use tenantsync_store::S3ObjectStore;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BUCKET: &str = "tenants";

/// Starts a mock server and returns an S3 store pointing at it
pub async fn setup_s3_mock(prefix: Option<&str>) -> (MockServer, S3ObjectStore) {
    let server = MockServer::start().await;

    let config = StoreConfig {
        backend: StoreBackend::S3,
        bucket: Some(BUCKET.to_string()),
        endpoint: Some(server.uri()),
        region: "us-east-1".to_string(),
        access_key_id: Some("test-access-key".to_string()),
        secret_access_key: Some("test-secret-key".to_string()),
        force_path_style: true,
        prefix: prefix.map(str::to_string),
        ..StoreConfig::default()
    };
    let store = S3ObjectStore::from_config(&config)
        .await
        .expect("build S3 store");

    (server, store)
}

/// Path of an object under the mock bucket
pub fn object_path(key: &str) -> String {
    format!("/{BUCKET}/{key}")
}

/// One `<Contents>` entry of a ListObjectsV2 response
pub fn contents_entry(key: &str, etag: &str, size: u64) -> String {
    format!(
        "<Contents><Key>{key}</Key><LastModified>2024-05-01T10:00:00.000Z</LastModified>\
         <ETag>&quot;{etag}&quot;</ETag><Size>{size}</Size><StorageClass>STANDARD</StorageClass></Contents>"
    )
}

/// A ListObjectsV2 XML body
pub fn list_body(prefix: &str, entries: &[String], next_token: Option<&str>) -> String {
    let truncation = match next_token {
        Some(token) => format!(
            "<IsTruncated>true</IsTruncated><NextContinuationToken>{token}</NextContinuationToken>"
        ),
        None => "<IsTruncated>false</IsTruncated>".to_string(),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <Name>{BUCKET}</Name><Prefix>{prefix}</Prefix><KeyCount>{}</KeyCount>\
         <MaxKeys>1000</MaxKeys>{truncation}{}</ListBucketResult>",
        entries.len(),
        entries.concat()
    )
}

/// Mounts a single-page listing for `prefix`
pub async fn mount_list_single_page(server: &MockServer, prefix: &str, entries: &[String]) {
    Mock::given(method("GET"))
        .and(path(format!("/{BUCKET}")))
        .and(query_param("list-type", "2"))
        .and(query_param("prefix", prefix))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(list_body(prefix, entries, None)),
        )
        .mount(server)
        .await;
}

/// Mounts a two-page listing: the first request gets `page1` and a
/// continuation token, the follow-up with that token gets `page2`.
pub async fn mount_list_paginated(
    server: &MockServer,
    prefix: &str,
    page1: &[String],
    page2: &[String],
) {
    // Second page, matched only when the continuation token is present
    Mock::given(method("GET"))
        .and(path(format!("/{BUCKET}")))
        .and(query_param("list-type", "2"))
        .and(query_param("continuation-token", "page-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(list_body(prefix, page2, None)),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/{BUCKET}")))
        .and(query_param("list-type", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(list_body(prefix, page1, Some("page-2"))),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// An S3 XML error body
pub fn error_body(code: &str, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Error><Code>{code}</Code><Message>{message}</Message><RequestId>test</RequestId></Error>"
    )
}
