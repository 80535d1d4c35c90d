//! tenantsync Core - Domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `TenantId`, `BranchId`, `ObjectKey`, `NamespaceLayout`,
//!   `SyncPlan`, `PushBatch`, operation reports and the `SyncError` taxonomy
//! - **Port definitions** - Traits for adapters: `IObjectStore`, `IBranchDirectory`
//! - **Configuration** - YAML configuration with validation and env overrides
//!
//! # Architecture
//!
//! The domain module holds pure types and decisions with no I/O. Ports define
//! trait interfaces that adapter crates implement; the engine crate drives
//! them.

pub mod config;
pub mod domain;
pub mod ports;
