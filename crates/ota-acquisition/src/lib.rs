//! Update resolution for the OTA update store.
//!
//! Given a deployment's package history and what a client reports about
//! itself, decide which release (if any) the client should download.
//!
//! # Key Types
//!
//! - [`UpdateCheckRequest`] / [`UpdateCheckResponse`] -- the update-check
//!   wire shapes
//! - [`UpdateCheckCacheResponse`] -- both answers while a release is rolling
//!   out, with per-client selection
//! - [`VersionRange`] -- node-style version ranges used in `appVersion`
//!
//! # Resolution Rules
//!
//! 1. Disabled releases are never offered.
//! 2. A release is only offered to binaries its `appVersion` range covers.
//! 3. A skipped mandatory release makes the offered update mandatory.
//! 4. A client inside a rollout is chosen by a stable hash of its id and
//!    the release label.

pub mod error;
pub mod resolver;
pub mod rollout;
pub mod service;
pub mod version;

pub use error::{AcquisitionError, AcquisitionResult};
pub use resolver::{
    check_for_update, get_update_package, get_update_package_info, parse_history, ResolvedUpdate,
    UpdateCheckCacheResponse, UpdateCheckRequest, UpdateCheckResponse,
};
pub use rollout::{is_selected_for_rollout, is_unfinished_rollout};
pub use service::update_check_for_key;
pub use version::{greater_than_range, parse_version, satisfies, VersionRange};
