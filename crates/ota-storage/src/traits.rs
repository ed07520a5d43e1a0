use async_trait::async_trait;
use ota_store::StoreResult;
use ota_types::{
    AccessKey, Account, App, CollaboratorMap, Deployment, DeploymentInfo, Package, ProviderIds,
};

/// Persistence operations of the update service.
///
/// Every method waits for the storage to finish setup and fails with
/// `ConnectionFailed` if setup failed. Apps and deployments are addressed by
/// the id of the account acting on them; authorization is the caller's job.
#[async_trait]
pub trait Storage: Send + Sync {
    // --- lifecycle ---

    async fn check_health(&self) -> StoreResult<()>;

    /// Run setup again, e.g. after credentials changed.
    async fn reinitialize(&self) -> StoreResult<()>;

    // --- accounts ---

    /// Store a new account and return its generated id.
    ///
    /// Fails with `AlreadyExists` if the email is taken, ignoring case.
    async fn add_account(&self, account: Account) -> StoreResult<String>;

    async fn get_account(&self, account_id: &str) -> StoreResult<Account>;

    async fn get_account_by_email(&self, email: &str) -> StoreResult<Account>;

    /// Merge identity-provider ids; providers left as `None` are kept.
    async fn update_account(&self, email: &str, providers: ProviderIds) -> StoreResult<()>;

    /// Owner of a plain-text access key. `Expired` once past its expiry.
    async fn get_account_id_from_access_key(&self, access_key: &str) -> StoreResult<String>;

    // --- apps ---

    /// Store a new app owned by `account_id` and return it with its id.
    async fn add_app(&self, account_id: &str, app: App) -> StoreResult<App>;

    async fn get_apps(&self, account_id: &str) -> StoreResult<Vec<App>>;

    async fn get_app(&self, account_id: &str, app_id: &str) -> StoreResult<App>;

    /// Rename an app. Collaborators are not touched.
    async fn update_app(&self, account_id: &str, app: App) -> StoreResult<()>;

    async fn remove_app(&self, account_id: &str, app_id: &str) -> StoreResult<()>;

    /// Make the account registered under `email` the owner.
    async fn transfer_app(&self, account_id: &str, app_id: &str, email: &str) -> StoreResult<()>;

    // --- collaborators ---

    async fn add_collaborator(&self, account_id: &str, app_id: &str, email: &str)
        -> StoreResult<()>;

    async fn get_collaborators(&self, account_id: &str, app_id: &str)
        -> StoreResult<CollaboratorMap>;

    async fn remove_collaborator(
        &self,
        account_id: &str,
        app_id: &str,
        email: &str,
    ) -> StoreResult<()>;

    // --- deployments ---

    /// Store a new deployment and return its generated id.
    async fn add_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment: Deployment,
    ) -> StoreResult<String>;

    async fn get_deployment_info(&self, deployment_key: &str) -> StoreResult<DeploymentInfo>;

    async fn get_package_history_from_deployment_key(
        &self,
        deployment_key: &str,
    ) -> StoreResult<Vec<Package>>;

    async fn get_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StoreResult<Deployment>;

    async fn get_deployments(&self, account_id: &str, app_id: &str)
        -> StoreResult<Vec<Deployment>>;

    async fn remove_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StoreResult<()>;

    /// Update name and key. The latest package is not touched.
    async fn update_deployment(
        &self,
        account_id: &str,
        app_id: &str,
        deployment: Deployment,
    ) -> StoreResult<()>;

    // --- packages ---

    /// Append a package to the history and return it with its label.
    async fn commit_package(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
        package: Package,
    ) -> StoreResult<Package>;

    async fn clear_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StoreResult<()>;

    async fn get_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StoreResult<Vec<Package>>;

    /// Overwrite the history. An empty history is rejected.
    async fn update_package_history(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
        history: Vec<Package>,
    ) -> StoreResult<()>;

    // --- blobs ---

    async fn add_blob(&self, blob_id: &str, content: Vec<u8>) -> StoreResult<String>;

    async fn get_blob_url(&self, blob_id: &str) -> StoreResult<String>;

    async fn remove_blob(&self, blob_id: &str) -> StoreResult<()>;

    // --- access keys ---

    /// Store a new access key and return its generated id. Only the hash of
    /// the key's name is persisted.
    async fn add_access_key(&self, account_id: &str, access_key: AccessKey)
        -> StoreResult<String>;

    async fn get_access_key(&self, account_id: &str, access_key_id: &str)
        -> StoreResult<AccessKey>;

    async fn get_access_keys(&self, account_id: &str) -> StoreResult<Vec<AccessKey>>;

    async fn remove_access_key(&self, account_id: &str, access_key_id: &str) -> StoreResult<()>;

    /// Replace a stored access key. `access_key.name` must be the stored
    /// (hashed) name.
    async fn update_access_key(&self, account_id: &str, access_key: AccessKey) -> StoreResult<()>;
}
