//! Partitioned table and blob storage for the OTA update store.
//!
//! This crate maps domain records onto a flat key-value backend where every
//! row is addressed by a partition key and a row key, with an associated blob
//! service for package history and package content.
//!
//! # Key Types
//!
//! - [`Address`] -- partition key + row key of a row
//! - [`Entity`] -- a stored row: address, properties, backend bookkeeping
//! - [`Pointer`] -- a stored redirect to another row's address
//! - [`StorageError`] / [`ErrorKind`] -- the failure taxonomy every caller sees
//! - [`BackendFault`] -- a native backend failure before classification
//!
//! # Backends
//!
//! All backends implement [`TableStore`] and [`BlobStore`]:
//!
//! - [`InMemoryTableStore`] / [`InMemoryBlobStore`] -- ordered in-memory
//!   backends with size limits and fault injection
//! - [`ResilientStore`] -- decorator adding per-call timeouts and capped
//!   exponential retries on transient faults
//!
//! # Design Rules
//!
//! 1. Exact-key `create` is the only compare-and-set primitive.
//! 2. Batches are atomic within one partition only.
//! 3. Native fault codes are classified exactly once, at the backend edge.
//! 4. Caller-supplied key components never contain the delimiter or the
//!    leaf marker.

pub mod entity;
pub mod error;
pub mod fault;
pub mod keys;
pub mod memory;
pub mod provision;
pub mod resilient;
pub mod traits;

pub use entity::{json_property, unwrap, unwrap_addressed, wrap, Addressed, Entity, Pointer};
pub use error::{ErrorKind, StorageError, StoreResult};
pub use fault::{classify, BackendFault, BackendResult};
pub use keys::Address;
pub use memory::{InMemoryBlobStore, InMemoryTableStore};
pub use provision::{bootstrap, check_health, HEALTH_SENTINEL};
pub use resilient::{ResilientStore, RetryPolicy};
pub use traits::{BatchOp, BlobStore, ContainerAccess, KeyFilter, RowRange, TableStore, UpdateMode};
