//! Integration tests for tenantsync-store
//!
//! Uses wiremock to simulate the S3 REST API for the S3 adapter, and runs a
//! shared behavioural contract against the filesystem and in-memory stores.

mod common;

mod test_contract;
mod test_s3;
