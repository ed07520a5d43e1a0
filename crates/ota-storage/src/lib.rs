//! Domain storage for the OTA update store.
//!
//! [`Storage`] is the persistence surface of the update service: accounts,
//! apps and their collaborators, deployments, package history, package
//! blobs, and access keys. [`TableStorage`] implements it on any
//! [`TableStore`](ota_store::TableStore) / [`BlobStore`](ota_store::BlobStore)
//! pair.
//!
//! # Layout
//!
//! - Accounts live under an `email` shortcut partition; the hierarchical
//!   account row points at it.
//! - Apps and their deployments share the app partition. Account membership
//!   is a pointer row in the account partition.
//! - Deployment keys and access-key hashes have their own shortcut
//!   partitions for direct lookup.
//! - Package history is a JSON blob per deployment in the private history
//!   container; the deployment row carries only the latest package.
//!
//! # Key Types
//!
//! - [`Storage`] -- the operation set
//! - [`TableStorage`] -- the table/blob implementation
//! - [`StorageConfig`] -- names, limits, timeouts and retry settings
//! - [`ReadinessGate`] -- blocks operations until setup has finished

pub mod config;
pub mod gate;
mod records;
pub mod table;
pub mod traits;

pub use config::{RetryConfig, StorageConfig};
pub use gate::{Readiness, ReadinessGate};
pub use table::TableStorage;
pub use traits::Storage;
