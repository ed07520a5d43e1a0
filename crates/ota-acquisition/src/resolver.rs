use ota_types::Package;
use serde::{Deserialize, Serialize};

use crate::error::AcquisitionResult;
use crate::rollout::{is_selected_for_rollout, is_unfinished_rollout};
use crate::version::{greater_than_range, satisfies};

/// What a client reports when it checks for an update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckRequest {
    /// Version of the installed app binary.
    pub app_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_hash: Option<String>,
    /// Label of the running release. Sent by newer clients only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Companion apps accept releases for any binary version.
    #[serde(default)]
    pub is_companion: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_unique_id: Option<String>,
}

impl UpdateCheckRequest {
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            ..Default::default()
        }
    }

    pub fn with_package_hash(mut self, package_hash: impl Into<String>) -> Self {
        self.package_hash = Some(package_hash.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_unique_id = Some(client_id.into());
        self
    }

    pub fn companion(mut self) -> Self {
        self.is_companion = true;
        self
    }

    fn current_hash(&self) -> Option<&str> {
        self.package_hash.as_deref().filter(|hash| !hash.is_empty())
    }

    fn current_label(&self) -> Option<&str> {
        self.label.as_deref().filter(|label| !label.is_empty())
    }

    fn client_id(&self) -> Option<&str> {
        self.client_unique_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// The answer to an update check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckResponse {
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub description: String,
    pub is_available: bool,
    pub is_mandatory: bool,
    /// The request's version when an update is offered; otherwise the range
    /// of the newest enabled release when the binary is out of range.
    pub app_version: String,
    pub package_hash: String,
    pub label: String,
    pub package_size: u64,
    /// The client should update its binary from the app store.
    pub update_app_version: bool,
    /// No release applies; run the bundle shipped in the binary.
    pub should_run_binary_version: bool,
}

/// Result of one resolution pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedUpdate {
    pub response: UpdateCheckResponse,
    /// Rollout of the offered package, if one is offered.
    pub rollout: Option<u8>,
}

/// Both answers for a deployment whose newest release is still rolling out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckCacheResponse {
    /// Answer for clients outside the rollout.
    pub original_package: UpdateCheckResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_package: Option<UpdateCheckResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout: Option<u8>,
}

impl UpdateCheckCacheResponse {
    /// The answer for one client. Clients without an id never get the
    /// rollout package.
    pub fn select(&self, client_id: Option<&str>) -> &UpdateCheckResponse {
        let (Some(rollout_package), Some(rollout), Some(client_id)) =
            (&self.rollout_package, self.rollout, client_id.filter(|id| !id.is_empty()))
        else {
            return &self.original_package;
        };
        let release_tag = if rollout_package.label.is_empty() {
            &rollout_package.package_hash
        } else {
            &rollout_package.label
        };
        if is_selected_for_rollout(client_id, rollout, release_tag) {
            rollout_package
        } else {
            &self.original_package
        }
    }
}

/// Pick the package a client should receive from a deployment's history
/// (oldest first).
///
/// The scan runs newest to oldest and stops at the client's current
/// release. A mandatory release between the newest applicable one and the
/// client's current release makes the offered update mandatory.
pub fn get_update_package(
    history: &[Package],
    request: &UpdateCheckRequest,
    ignore_rollout_packages: bool,
) -> ResolvedUpdate {
    let mut response = UpdateCheckResponse::default();
    if history.is_empty() {
        response.should_run_binary_version = true;
        return ResolvedUpdate {
            response,
            rollout: None,
        };
    }

    let label = request.current_label();
    let hash = request.current_hash();
    let mut found_current = false;
    let mut latest_enabled: Option<&Package> = None;
    let mut latest_satisfying: Option<&Package> = None;
    let mut escalate = false;

    for package in history.iter().rev() {
        // Labels win over hashes: a release can be published twice with one hash.
        found_current = found_current
            || match (label, hash) {
                (None, None) => true,
                (Some(label), _) => package.label == label,
                (None, Some(hash)) => package.package_hash == hash,
            };

        if package.is_disabled || (ignore_rollout_packages && is_unfinished_rollout(package.rollout)) {
            continue;
        }
        latest_enabled.get_or_insert(package);

        if !request.is_companion && !satisfies(&request.app_version, &package.app_version) {
            continue;
        }
        latest_satisfying.get_or_insert(package);

        if found_current {
            break;
        }
        if package.is_mandatory {
            escalate = true;
            break;
        }
    }

    response.should_run_binary_version = latest_satisfying.is_none();
    let Some(latest_enabled) = latest_enabled else {
        return ResolvedUpdate {
            response,
            rollout: None,
        };
    };

    let candidate = match latest_satisfying {
        Some(package) if hash != Some(package.package_hash.as_str()) => package,
        _ => {
            if greater_than_range(&request.app_version, &latest_enabled.app_version) {
                response.app_version = latest_enabled.app_version.clone();
            } else if !satisfies(&request.app_version, &latest_enabled.app_version) {
                response.update_app_version = true;
                response.app_version = latest_enabled.app_version.clone();
            }
            return ResolvedUpdate {
                response,
                rollout: None,
            };
        }
    };

    let diff = hash.and_then(|hash| candidate.diff_package_map.as_ref()?.get(hash));
    match diff {
        Some(info) => {
            response.download_url = info.url.clone();
            response.package_size = info.size;
        }
        None => {
            response.download_url = candidate.blob_url.clone();
            response.package_size = candidate.size;
        }
    }
    response.description = candidate.description.clone();
    response.is_mandatory = escalate || candidate.is_mandatory;
    response.is_available = true;
    response.label = candidate.label.clone();
    response.package_hash = candidate.package_hash.clone();
    // Older clients only accept a plain version here, never a range.
    response.app_version = request.app_version.clone();

    ResolvedUpdate {
        response,
        rollout: candidate.rollout,
    }
}

/// Resolve honouring rollouts and, when the result is still rolling out,
/// again without it so both answers are available.
pub fn get_update_package_info(
    history: &[Package],
    request: &UpdateCheckRequest,
) -> UpdateCheckCacheResponse {
    let update = get_update_package(history, request, false);
    if !is_unfinished_rollout(update.rollout) {
        return UpdateCheckCacheResponse {
            original_package: update.response,
            rollout_package: None,
            rollout: None,
        };
    }
    let original = get_update_package(history, request, true);
    UpdateCheckCacheResponse {
        original_package: original.response,
        rollout_package: Some(update.response),
        rollout: update.rollout,
    }
}

/// Full update check for one client: resolve, then apply the rollout gate.
pub fn check_for_update(history: &[Package], request: &UpdateCheckRequest) -> UpdateCheckResponse {
    let info = get_update_package_info(history, request);
    let response = info.select(request.client_id()).clone();
    tracing::debug!(
        app_version = %request.app_version,
        available = response.is_available,
        label = %response.label,
        rollout = ?info.rollout,
        "update check resolved"
    );
    response
}

/// Decode a package history blob.
pub fn parse_history(json: &str) -> AcquisitionResult<Vec<Package>> {
    Ok(serde_json::from_str(json)?)
}
