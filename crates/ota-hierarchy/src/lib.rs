//! Hierarchical addressing on top of a partitioned table.
//!
//! Apps own deployments and accounts own app memberships. Each parent and
//! its children share a partition, so a subtree can be listed with one range
//! query and deleted with one batch. Relations that cross partitions are
//! kept as pointer rows.
//!
//! # Key Types
//!
//! - [`HierarchyManager`] -- checked inserts, child fetches that resolve
//!   pointers concurrently, and subtree deletes
//! - [`PointerIndex`] -- adds, retracts and resolves pointer rows
//! - [`FetchOptions`] -- concurrency and pointer-hop limits

pub mod manager;
pub mod pointer;

pub use manager::{FetchOptions, HierarchyManager};
pub use pointer::PointerIndex;
