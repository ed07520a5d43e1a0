use ota_storage::Storage;
use ota_store::StoreResult;

use crate::resolver::{get_update_package_info, UpdateCheckCacheResponse, UpdateCheckRequest};

/// Resolve an update check for the deployment behind `deployment_key`.
///
/// The result holds both answers when a rollout is in progress; apply
/// [`UpdateCheckCacheResponse::select`] per client.
pub async fn update_check_for_key<S: Storage + ?Sized>(
    storage: &S,
    deployment_key: &str,
    request: &UpdateCheckRequest,
) -> StoreResult<UpdateCheckCacheResponse> {
    let history = storage
        .get_package_history_from_deployment_key(deployment_key)
        .await?;
    tracing::debug!(deployment_key, releases = history.len(), "resolving update check");
    Ok(get_update_package_info(&history, request))
}
