//! Foundation types for the OTA update store.
//!
//! This crate provides the domain records shared by every other crate in the
//! workspace. Records serialize with camelCase field names, matching the
//! property names persisted in the partitioned table backend.
//!
//! # Key Types
//!
//! - [`Account`] -- a registered user, unique by (case-insensitive) email
//! - [`App`] -- an application with its collaborator map
//! - [`Deployment`] -- a release channel of an app, addressed by a client key
//! - [`Package`] -- one published release in a deployment's history
//! - [`AccessKey`] -- an API credential owned by an account
//! - [`DeploymentInfo`] -- the app/deployment pair a deployment key resolves to

pub mod access_key;
pub mod account;
pub mod app;
pub mod deployment;
pub mod error;
pub mod id;
pub mod package;

pub use access_key::{is_expired, AccessKey};
pub use account::{Account, ProviderIds};
pub use app::{App, CollaboratorMap, CollaboratorProperties, Permission};
pub use deployment::{Deployment, DeploymentInfo};
pub use error::TypeError;
pub use id::{generate_id, hash_sha256, now_ms};
pub use package::{next_label, Package, PackageInfo};
