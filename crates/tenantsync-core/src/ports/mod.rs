//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync engine depends on; their implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IObjectStore`] - Blob storage for template and tenant databases
//! - [`IBranchDirectory`] - Lookup of the cloud directory owned by a branch

pub mod branch_directory;
pub mod object_store;

pub use branch_directory::{BranchLocation, IBranchDirectory};
pub use object_store::{IObjectStore, ObjectHead, ObjectInfo, StoreError};
