use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Location and size of a downloadable package (full or diff).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub size: u64,
    pub url: String,
}

/// One published release in a deployment's package history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Binary version expression this release targets (version or range).
    pub app_version: String,
    #[serde(default)]
    pub blob_url: String,
    #[serde(default)]
    pub description: String,
    /// Diff packages keyed by the package hash a client already has installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_package_map: Option<BTreeMap<String, PackageInfo>>,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default)]
    pub is_mandatory: bool,
    /// Assigned on commit: `v1`, `v2`, ...
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_blob_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_label: Option<String>,
    pub package_hash: String,
    #[serde(default)]
    pub released_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_method: Option<String>,
    /// Staged rollout percentage; `None` once the rollout is complete.
    #[serde(default)]
    pub rollout: Option<u8>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub upload_time: i64,
}

impl Package {
    pub fn new(
        app_version: impl Into<String>,
        package_hash: impl Into<String>,
        blob_url: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            app_version: app_version.into(),
            package_hash: package_hash.into(),
            blob_url: blob_url.into(),
            size,
            upload_time: crate::now_ms(),
            ..Default::default()
        }
    }

    /// Numeric part of the label, if it has the `v<n>` form.
    pub fn label_number(&self) -> Option<u64> {
        self.label.strip_prefix('v')?.parse().ok()
    }
}

/// The label the next committed package receives.
///
/// Derived from the tail of the history, so numbering keeps increasing after
/// old entries are trimmed. An empty history starts over at `v1`.
pub fn next_label(history: &[Package]) -> Result<String, TypeError> {
    match history.last() {
        None => Ok("v1".into()),
        Some(last) => last
            .label_number()
            .and_then(|n| n.checked_add(1))
            .map(|n| format!("v{n}"))
            .ok_or_else(|| TypeError::InvalidLabel(last.label.clone())),
    }
}
