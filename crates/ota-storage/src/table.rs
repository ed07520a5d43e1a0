use async_trait::async_trait;
use futures::future::try_join_all;
use ota_hierarchy::{HierarchyManager, PointerIndex};
use ota_store::{
    keys, provision, unwrap, wrap, Address, BlobStore, ContainerAccess, ErrorKind,
    ResilientStore, StorageError, StoreResult, TableStore, UpdateMode,
};
use ota_types::{
    generate_id, hash_sha256, is_expired, next_label, now_ms, AccessKey, Account, App, CollaboratorMap,
    CollaboratorProperties, Deployment, DeploymentInfo, Package, Permission, ProviderIds,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::StorageConfig;
use crate::gate::{Readiness, ReadinessGate};
use crate::records::{
    AccessKeyShortcut, AccountRecord, AppNameUpdate, AppRecord, CollaboratorsUpdate,
    DeploymentFieldsUpdate, DeploymentRecord, LatestPackageUpdate,
};
use crate::traits::Storage;

/// [`Storage`] on a partitioned table plus a blob service.
///
/// Every backend call goes through a [`ResilientStore`] built from the
/// configured retry policy and operation timeout.
pub struct TableStorage<T, B> {
    table: ResilientStore<T>,
    blobs: ResilientStore<B>,
    config: StorageConfig,
    gate: ReadinessGate,
    cancel: CancellationToken,
}

impl<T: TableStore, B: BlobStore> TableStorage<T, B> {
    /// Wrap the backends without running setup; operations wait until
    /// [`initialize`](Self::initialize) completes.
    pub fn new(table: T, blobs: B, config: StorageConfig) -> Self {
        let policy = config.retry_policy();
        let timeout = config.operation_timeout();
        Self {
            table: ResilientStore::new(table, policy, timeout),
            blobs: ResilientStore::new(blobs, policy, timeout),
            config,
            gate: ReadinessGate::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Validate the config, wrap the backends and run setup.
    pub async fn connect(table: T, blobs: B, config: StorageConfig) -> StoreResult<Self> {
        config.validate()?;
        let storage = Self::new(table, blobs, config);
        storage.initialize().await?;
        Ok(storage)
    }

    /// Provision the backends and open the readiness gate.
    pub async fn initialize(&self) -> StoreResult<()> {
        let containers = self.containers();
        match provision::bootstrap(&self.table, &self.blobs, &containers).await {
            Ok(()) => {
                self.gate.mark_ready();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "storage setup failed");
                self.gate.mark_failed(err.to_string());
                Err(err)
            }
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn readiness(&self) -> Readiness {
        self.gate.state()
    }

    pub fn table(&self) -> &T {
        self.table.inner()
    }

    pub fn blobs(&self) -> &B {
        self.blobs.inner()
    }

    /// Cancel in-flight collection fetches. Later fetches fail immediately.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn containers(&self) -> [(&str, ContainerAccess); 2] {
        [
            (self.config.package_container.as_str(), ContainerAccess::PublicRead),
            (self.config.history_container.as_str(), ContainerAccess::Private),
        ]
    }

    async fn ready(&self) -> StoreResult<()> {
        self.gate.wait(self.config.operation_timeout()).await
    }

    fn hierarchy(&self) -> HierarchyManager<'_, ResilientStore<T>> {
        HierarchyManager::new(&self.table, self.config.fetch_options())
    }

    fn pointers(&self) -> PointerIndex<'_, ResilientStore<T>> {
        PointerIndex::new(&self.table)
    }

    async fn get_record<R: DeserializeOwned>(&self, address: &Address) -> StoreResult<R> {
        let entity = self.table.get(address).await?;
        unwrap(entity)
    }

    async fn merge<P: Serialize + Sync>(&self, address: Address, payload: &P) -> StoreResult<()> {
        let entity = wrap(payload, address)?;
        self.table.update(entity, UpdateMode::Merge).await?;
        Ok(())
    }

    // --- package history blobs ---

    async fn read_history(&self, deployment_id: &str) -> StoreResult<Vec<Package>> {
        keys::validate_id(deployment_id)?;
        let bytes = self
            .blobs
            .get(&self.config.history_container, deployment_id)
            .await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::other(format!(
                "package history of deployment {deployment_id} is corrupt: {e}"
            ))
        })
    }

    async fn write_history(&self, deployment_id: &str, history: &[Package]) -> StoreResult<()> {
        let content = serde_json::to_vec(history)
            .map_err(|e| StorageError::invalid(format!("cannot encode package history: {e}")))?;
        self.blobs
            .put(&self.config.history_container, deployment_id, content)
            .await?;
        Ok(())
    }

    async fn delete_history(&self, deployment_id: &str) -> StoreResult<()> {
        match self
            .blobs
            .delete(&self.config.history_container, deployment_id)
            .await
            .map_err(StorageError::from)
        {
            Err(err) if err.is(ErrorKind::NotFound) => {
                tracing::debug!(deployment_id, "package history already absent");
                Ok(())
            }
            other => other,
        }
    }

    // --- lookups shared by several operations ---

    async fn load_account(&self, account_id: &str) -> StoreResult<Account> {
        let entity = self.pointers().follow(&keys::account_address(account_id)?).await?;
        Ok(unwrap::<AccountRecord>(entity)?.into())
    }

    async fn load_account_by_email(&self, email: &str) -> StoreResult<Account> {
        let record: AccountRecord = self
            .get_record(&keys::email_shortcut_address(email)?)
            .await
            .map_err(|e| {
                e.with_message_if(
                    ErrorKind::NotFound,
                    "The specified e-mail address doesn't represent a registered user",
                )
            })?;
        Ok(record.into())
    }

    async fn load_app(&self, account_id: &str, app_id: &str) -> StoreResult<App> {
        let record: AppRecord = self.get_record(&keys::app_address(app_id)?).await?;
        let mut app = App::from(record);
        app.mark_current_account(account_id);
        Ok(app)
    }

    async fn load_apps(&self, account_id: &str) -> StoreResult<Vec<App>> {
        let rows = self
            .hierarchy()
            .fetch_children(
                &keys::account_address(account_id)?,
                &keys::account_children_search_key(account_id)?,
                &self.cancel,
            )
            .await?;
        rows.into_iter()
            .map(|row| {
                let mut app = App::from(unwrap::<AppRecord>(row)?);
                app.mark_current_account(account_id);
                Ok(app)
            })
            .collect()
    }

    async fn load_deployments(&self, app_id: &str) -> StoreResult<Vec<Deployment>> {
        let rows = self
            .hierarchy()
            .fetch_children(
                &keys::app_address(app_id)?,
                &keys::app_children_search_key(app_id)?,
                &self.cancel,
            )
            .await?;
        rows.into_iter()
            .map(|row| Ok(unwrap::<DeploymentRecord>(row)?.into()))
            .collect()
    }

    async fn save_collaborators(&self, app_id: &str, collaborators: &CollaboratorMap) -> StoreResult<()> {
        self.merge(keys::app_address(app_id)?, &CollaboratorsUpdate { collaborators })
            .await
    }

    /// Undo a half-created deployment. Failures are logged, not returned.
    async fn discard_deployment(&self, address: &Address, deployment_id: &str) {
        if let Err(err) = self.table.delete(address).await {
            tracing::warn!(deployment_id, error = %err, "could not remove deployment row");
        }
        if let Err(err) = self.delete_history(deployment_id).await {
            tracing::warn!(deployment_id, error = %err, "could not remove package history");
        }
    }
}

#[async_trait]
impl<T: TableStore, B: BlobStore> Storage for TableStorage<T, B> {
    async fn check_health(&self) -> StoreResult<()> {
        self.ready().await?;
        provision::check_health(
            &self.table,
            &self.blobs,
            &[
                self.config.package_container.as_str(),
                self.config.history_container.as_str(),
            ],
        )
        .await
    }

    async fn reinitialize(&self) -> StoreResult<()> {
        tracing::info!("re-initializing storage");
        self.gate.reset();
        self.initialize().await
    }

    // --- accounts ---

    async fn add_account(&self, account: Account) -> StoreResult<String> {
        self.ready().await?;
        let mut record = AccountRecord::from(account);
        record.id = generate_id();
        let shortcut = keys::email_shortcut_address(&record.email)?;
        let hierarchical = keys::account_address(&record.id)?;

        self.table
            .create(wrap(&record, shortcut.clone())?)
            .await
            .map_err(|fault| {
                StorageError::from(fault).with_message_if(
                    ErrorKind::AlreadyExists,
                    format!("An account with e-mail '{}' already exists", record.email),
                )
            })?;
        self.pointers().add(hierarchical, &shortcut).await?;
        tracing::info!(account_id = %record.id, "account added");
        Ok(record.id)
    }

    async fn get_account(&self, account_id: &str) -> StoreResult<Account> {
        self.ready().await?;
        self.load_account(account_id).await
    }

    async fn get_account_by_email(&self, email: &str) -> StoreResult<Account> {
        self.ready().await?;
        self.load_account_by_email(email).await
    }

    async fn update_account(&self, email: &str, providers: ProviderIds) -> StoreResult<()> {
        self.ready().await?;
        self.merge(keys::email_shortcut_address(email)?, &providers)
            .await
    }

    async fn get_account_id_from_access_key(&self, access_key: &str) -> StoreResult<String> {
        self.ready().await?;
        let shortcut: AccessKeyShortcut = self
            .get_record(&keys::access_key_shortcut_address(access_key)?)
            .await?;
        if is_expired(shortcut.expires, now_ms()) {
            return Err(StorageError::expired("The access key has expired."));
        }
        Ok(shortcut.account_id)
    }

    // --- apps ---

    async fn add_app(&self, account_id: &str, app: App) -> StoreResult<App> {
        self.ready().await?;
        let account = self.load_account(account_id).await?;
        let mut app = app;
        app.id = generate_id();
        app.collaborators = CollaboratorMap::from([(
            account.email,
            CollaboratorProperties::new(account_id, Permission::Owner),
        )]);

        let address = keys::app_address(&app.id)?;
        self.table
            .create(wrap(&AppRecord::from(app.clone()), address.clone())?)
            .await?;
        self.pointers()
            .add(keys::account_app_address(account_id, &app.id)?, &address)
            .await?;
        tracing::info!(account_id, app_id = %app.id, "app added");
        Ok(app)
    }

    async fn get_apps(&self, account_id: &str) -> StoreResult<Vec<App>> {
        self.ready().await?;
        self.load_apps(account_id).await
    }

    async fn get_app(&self, account_id: &str, app_id: &str) -> StoreResult<App> {
        self.ready().await?;
        self.load_app(account_id, app_id).await
    }

    async fn update_app(&self, _account_id: &str, app: App) -> StoreResult<()> {
        self.ready().await?;
        if app.id.is_empty() {
            return Err(StorageError::invalid("No app id"));
        }
        self.merge(keys::app_address(&app.id)?, &AppNameUpdate { name: &app.name })
            .await
    }

    async fn remove_app(&self, account_id: &str, app_id: &str) -> StoreResult<()> {
        self.ready().await?;
        let app = self.load_app(account_id, app_id).await?;
        let deployments = self.load_deployments(app_id).await?;
        let pointers = self.pointers();

        let mut references = Vec::new();
        for props in app.collaborators.values() {
            references.push(keys::account_app_address(&props.account_id, app_id)?);
        }
        for deployment in &deployments {
            references.push(keys::deployment_key_shortcut_address(&deployment.key)?);
        }
        try_join_all(references.iter().map(|at| pointers.retract(at))).await?;

        self.hierarchy()
            .delete_subtree(
                &keys::app_address(app_id)?,
                &keys::app_hierarchy_key(false, app_id, None)?,
            )
            .await?;
        for deployment in &deployments {
            self.delete_history(&deployment.id).await?;
        }
        tracing::info!(account_id, app_id, deployments = deployments.len(), "app removed");
        Ok(())
    }

    async fn transfer_app(&self, account_id: &str, app_id: &str, email: &str) -> StoreResult<()> {
        self.ready().await?;
        let (mut app, target) = futures::try_join!(
            self.load_app(account_id, app_id),
            self.load_account_by_email(email)
        )?;
        // The stored casing is the collaborator map key.
        let email = target.email;

        if app.email_for_account(account_id).is_none() {
            return Err(StorageError::not_found(
                "The requesting account is not a collaborator for this app.",
            ));
        }
        let owner = app
            .owner_email()
            .map(str::to_owned)
            .ok_or_else(|| StorageError::other(format!("app {app_id} has no owner")))?;
        if owner == email {
            return Err(StorageError::already_exists(
                "The given account already owns the app.",
            ));
        }

        let target_apps = self.load_apps(&target.id).await?;
        let duplicate = target_apps.iter().any(|other| {
            other.name == app.name
                && other
                    .email_for_account(&target.id)
                    .is_some_and(|e| other.is_owner(e))
        });
        if duplicate {
            return Err(StorageError::already_exists(format!(
                "Cannot transfer ownership. An app with name \"{}\" already exists for the given collaborator.",
                app.name
            )));
        }

        let was_collaborator = app.is_collaborator(&email);
        app.set_permission(&owner, Permission::Collaborator);
        if was_collaborator {
            app.set_permission(&email, Permission::Owner);
        } else {
            app.collaborators.insert(
                email.clone(),
                CollaboratorProperties::new(target.id.clone(), Permission::Owner),
            );
        }
        self.save_collaborators(app_id, &app.collaborators).await?;

        if !was_collaborator {
            self.pointers()
                .add(
                    keys::account_app_address(&target.id, app_id)?,
                    &keys::app_address(app_id)?,
                )
                .await?;
        }
        tracing::info!(app_id, new_owner = %target.id, "app transferred");
        Ok(())
    }

    // --- collaborators ---

    async fn add_collaborator(&self, account_id: &str, app_id: &str, email: &str) -> StoreResult<()> {
        self.ready().await?;
        let (mut app, account) = futures::try_join!(
            self.load_app(account_id, app_id),
            self.load_account_by_email(email)
        )?;
        if app.collaborators.contains_key(&account.email) {
            return Err(StorageError::already_exists(
                "The given account is already a collaborator for this app.",
            ));
        }
        app.collaborators.insert(
            account.email.clone(),
            CollaboratorProperties::new(account.id.clone(), Permission::Collaborator),
        );
        self.save_collaborators(app_id, &app.collaborators).await?;
        self.pointers()
            .add(
                keys::account_app_address(&account.id, app_id)?,
                &keys::app_address(app_id)?,
            )
            .await?;
        tracing::debug!(app_id, collaborator = %account.id, "collaborator added");
        Ok(())
    }

    async fn get_collaborators(&self, account_id: &str, app_id: &str) -> StoreResult<CollaboratorMap> {
        self.ready().await?;
        Ok(self.load_app(account_id, app_id).await?.collaborators)
    }

    async fn remove_collaborator(
        &self,
        account_id: &str,
        app_id: &str,
        email: &str,
    ) -> StoreResult<()> {
        self.ready().await?;
        let mut app = self.load_app(account_id, app_id).await?;
        let wanted = email.to_lowercase();
        let key = app
            .collaborators
            .keys()
            .find(|stored| stored.to_lowercase() == wanted)
            .cloned()
            .ok_or_else(|| {
                StorageError::not_found("The given email is not a collaborator for this app.")
            })?;
        if app.is_owner(&key) {
            return Err(StorageError::already_exists(
                "Cannot remove the owner of the app from collaborator list.",
            ));
        }
        let Some(removed) = app.collaborators.remove(&key) else {
            return Err(StorageError::not_found(
                "The given email is not a collaborator for this app.",
            ));
        };
        self.save_collaborators(app_id, &app.collaborators).await?;
        self.pointers()
            .retract(&keys::account_app_address(&removed.account_id, app_id)?)
            .await?;
        tracing::debug!(app_id, collaborator = %removed.account_id, "collaborator removed");
        Ok(())
    }

    // --- deployments ---

    async fn add_deployment(
        &self,
        _account_id: &str,
        app_id: &str,
        deployment: Deployment,
    ) -> StoreResult<String> {
        self.ready().await?;
        let shortcut = keys::deployment_key_shortcut_address(&deployment.key)?;
        let mut record = DeploymentRecord::from(deployment);
        record.id = generate_id();
        record.package = None;
        let address = keys::deployment_address(app_id, &record.id)?;

        self.hierarchy()
            .insert_checked(&keys::app_address(app_id)?, wrap(&record, address.clone())?)
            .await?;
        self.write_history(&record.id, &[]).await?;

        let info = DeploymentInfo {
            app_id: app_id.to_string(),
            deployment_id: record.id.clone(),
        };
        match self.pointers().add_with(shortcut, &address, &info).await {
            Ok(()) => {
                tracing::info!(app_id, deployment_id = %record.id, "deployment added");
                Ok(record.id)
            }
            Err(err) if err.is(ErrorKind::AlreadyExists) => {
                self.discard_deployment(&address, &record.id).await;
                Err(StorageError::already_exists(format!(
                    "A deployment with key '{}' already exists",
                    record.key
                )))
            }
            Err(err) => Err(err),
        }
    }

    async fn get_deployment_info(&self, deployment_key: &str) -> StoreResult<DeploymentInfo> {
        self.ready().await?;
        self.pointers()
            .payload(&keys::deployment_key_shortcut_address(deployment_key)?)
            .await
    }

    async fn get_package_history_from_deployment_key(
        &self,
        deployment_key: &str,
    ) -> StoreResult<Vec<Package>> {
        self.ready().await?;
        let info: DeploymentInfo = self
            .pointers()
            .payload(&keys::deployment_key_shortcut_address(deployment_key)?)
            .await?;
        self.read_history(&info.deployment_id).await
    }

    async fn get_deployment(
        &self,
        _account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StoreResult<Deployment> {
        self.ready().await?;
        let record: DeploymentRecord = self
            .get_record(&keys::deployment_address(app_id, deployment_id)?)
            .await?;
        Ok(record.into())
    }

    async fn get_deployments(&self, _account_id: &str, app_id: &str) -> StoreResult<Vec<Deployment>> {
        self.ready().await?;
        self.load_deployments(app_id).await
    }

    async fn remove_deployment(
        &self,
        _account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StoreResult<()> {
        self.ready().await?;
        let address = keys::deployment_address(app_id, deployment_id)?;
        let record: DeploymentRecord = self.get_record(&address).await?;

        self.pointers()
            .retract(&keys::deployment_key_shortcut_address(&record.key)?)
            .await?;
        self.hierarchy()
            .delete_subtree(
                &address,
                &keys::app_hierarchy_key(false, app_id, Some(deployment_id))?,
            )
            .await?;
        self.delete_history(deployment_id).await?;
        tracing::info!(app_id, deployment_id, "deployment removed");
        Ok(())
    }

    async fn update_deployment(
        &self,
        _account_id: &str,
        app_id: &str,
        deployment: Deployment,
    ) -> StoreResult<()> {
        self.ready().await?;
        if deployment.id.is_empty() {
            return Err(StorageError::invalid("No deployment id"));
        }
        let address = keys::deployment_address(app_id, &deployment.id)?;
        let current: DeploymentRecord = self.get_record(&address).await?;
        let fields = DeploymentFieldsUpdate {
            name: &deployment.name,
            key: &deployment.key,
        };
        if current.key == deployment.key {
            return self.merge(address, &fields).await;
        }

        // New shortcut first, old one last, so the deployment stays reachable.
        let info = DeploymentInfo {
            app_id: app_id.to_string(),
            deployment_id: deployment.id.clone(),
        };
        self.pointers()
            .add_with(
                keys::deployment_key_shortcut_address(&deployment.key)?,
                &address,
                &info,
            )
            .await?;
        self.merge(address, &fields).await?;
        self.pointers()
            .retract(&keys::deployment_key_shortcut_address(&current.key)?)
            .await?;
        Ok(())
    }

    // --- packages ---

    async fn commit_package(
        &self,
        account_id: &str,
        app_id: &str,
        deployment_id: &str,
        package: Package,
    ) -> StoreResult<Package> {
        self.ready().await?;
        let address = keys::deployment_address(app_id, deployment_id)?;
        let mut history = self.read_history(deployment_id).await?;
        let mut package = package;
        package.label = next_label(&history).map_err(|e| StorageError::invalid(e.to_string()))?;
        package.released_by = Some(self.load_account(account_id).await?.email);

        if let Some(last) = history.last_mut() {
            last.rollout = None;
        }
        history.push(package.clone());
        let cap = self.config.max_package_history;
        if history.len() > cap {
            history.drain(..history.len() - cap);
        }

        self.merge(address, &LatestPackageUpdate { package: &package })
            .await?;
        self.write_history(deployment_id, &history).await?;
        tracing::info!(deployment_id, label = %package.label, "package committed");
        Ok(package)
    }

    async fn clear_package_history(
        &self,
        _account_id: &str,
        app_id: &str,
        deployment_id: &str,
    ) -> StoreResult<()> {
        self.ready().await?;
        let address = keys::deployment_address(app_id, deployment_id)?;
        let mut record: DeploymentRecord = self.get_record(&address).await?;
        record.package = None;
        self.table
            .update(wrap(&record, address)?, UpdateMode::Replace)
            .await?;
        self.write_history(deployment_id, &[]).await
    }

    async fn get_package_history(
        &self,
        _account_id: &str,
        _app_id: &str,
        deployment_id: &str,
    ) -> StoreResult<Vec<Package>> {
        self.ready().await?;
        self.read_history(deployment_id).await
    }

    async fn update_package_history(
        &self,
        _account_id: &str,
        app_id: &str,
        deployment_id: &str,
        history: Vec<Package>,
    ) -> StoreResult<()> {
        let Some(latest) = history.last() else {
            return Err(StorageError::invalid(
                "Cannot clear package history from an update operation",
            ));
        };
        self.ready().await?;
        self.merge(
            keys::deployment_address(app_id, deployment_id)?,
            &LatestPackageUpdate { package: latest },
        )
        .await?;
        self.write_history(deployment_id, &history).await
    }

    // --- blobs ---

    async fn add_blob(&self, blob_id: &str, content: Vec<u8>) -> StoreResult<String> {
        self.ready().await?;
        keys::validate_id(blob_id)?;
        self.blobs
            .put(&self.config.package_container, blob_id, content)
            .await?;
        Ok(blob_id.to_string())
    }

    async fn get_blob_url(&self, blob_id: &str) -> StoreResult<String> {
        self.ready().await?;
        Ok(self.blobs.url(&self.config.package_container, blob_id))
    }

    async fn remove_blob(&self, blob_id: &str) -> StoreResult<()> {
        self.ready().await?;
        self.blobs
            .delete(&self.config.package_container, blob_id)
            .await?;
        Ok(())
    }

    // --- access keys ---

    async fn add_access_key(&self, account_id: &str, access_key: AccessKey) -> StoreResult<String> {
        self.ready().await?;
        let mut access_key = access_key;
        access_key.id = generate_id();
        let shortcut = keys::access_key_shortcut_address(&access_key.name)?;
        let address = keys::access_key_address(account_id, &access_key.id)?;

        let pointer = AccessKeyShortcut {
            account_id: account_id.to_string(),
            expires: access_key.expires,
        };
        access_key.name = hash_sha256(&access_key.name);
        let record = wrap(&access_key, address)?;
        self.table.create(wrap(&pointer, shortcut.clone())?).await?;

        if let Err(err) = self.table.create(record).await {
            if let Err(cleanup) = self.pointers().retract(&shortcut).await {
                tracing::warn!(account_id, error = %cleanup, "could not remove access key shortcut");
            }
            return Err(err.into());
        }
        tracing::info!(account_id, access_key_id = %access_key.id, "access key added");
        Ok(access_key.id)
    }

    async fn get_access_key(&self, account_id: &str, access_key_id: &str) -> StoreResult<AccessKey> {
        self.ready().await?;
        self.get_record(&keys::access_key_address(account_id, access_key_id)?)
            .await
    }

    async fn get_access_keys(&self, account_id: &str) -> StoreResult<Vec<AccessKey>> {
        self.ready().await?;
        let rows = self
            .hierarchy()
            .fetch_children(
                &keys::account_address(account_id)?,
                &keys::access_key_row_key(account_id, None)?,
                &self.cancel,
            )
            .await?;
        rows.into_iter().map(unwrap).collect()
    }

    async fn remove_access_key(&self, account_id: &str, access_key_id: &str) -> StoreResult<()> {
        self.ready().await?;
        let address = keys::access_key_address(account_id, access_key_id)?;
        let stored: AccessKey = self.get_record(&address).await?;
        self.pointers()
            .retract(&keys::access_key_shortcut_address_for_hash(&stored.name)?)
            .await?;
        self.table.delete(&address).await?;
        tracing::info!(account_id, access_key_id, "access key removed");
        Ok(())
    }

    async fn update_access_key(&self, account_id: &str, access_key: AccessKey) -> StoreResult<()> {
        self.ready().await?;
        if access_key.id.is_empty() {
            return Err(StorageError::invalid("No access key id"));
        }
        let address = keys::access_key_address(account_id, &access_key.id)?;
        let shortcut = keys::access_key_shortcut_address_for_hash(&access_key.name)?;
        self.table
            .update(wrap(&access_key, address)?, UpdateMode::Replace)
            .await?;
        let pointer = AccessKeyShortcut {
            account_id: account_id.to_string(),
            expires: access_key.expires,
        };
        self.table
            .update(wrap(&pointer, shortcut)?, UpdateMode::Replace)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_store::{InMemoryBlobStore, InMemoryTableStore};
    use std::sync::Arc;

    type MemStorage = TableStorage<Arc<InMemoryTableStore>, Arc<InMemoryBlobStore>>;

    struct Fixture {
        storage: MemStorage,
        table: Arc<InMemoryTableStore>,
        blobs: Arc<InMemoryBlobStore>,
    }

    fn test_config() -> StorageConfig {
        let mut config = StorageConfig {
            operation_timeout_ms: 2_000,
            ..Default::default()
        };
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 2;
        config
    }

    async fn fixture_with(config: StorageConfig) -> Fixture {
        let table = Arc::new(InMemoryTableStore::new(config.table_name.clone()));
        let blobs = Arc::new(InMemoryBlobStore::default());
        let storage = TableStorage::connect(Arc::clone(&table), Arc::clone(&blobs), config)
            .await
            .unwrap();
        Fixture {
            storage,
            table,
            blobs,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(test_config()).await
    }

    async fn account(storage: &MemStorage, email: &str) -> String {
        storage
            .add_account(Account::new(email, email.split('@').next().unwrap_or("user")))
            .await
            .unwrap()
    }

    async fn app(storage: &MemStorage, account_id: &str, name: &str) -> App {
        storage.add_app(account_id, App::new(name)).await.unwrap()
    }

    async fn deployment(storage: &MemStorage, account_id: &str, app_id: &str, name: &str, key: &str) -> String {
        storage
            .add_deployment(account_id, app_id, Deployment::new(name, key))
            .await
            .unwrap()
    }

    fn release(app_version: &str, hash: &str) -> Package {
        Package::new(app_version, hash, format!("memory://blobs/storagev2/{hash}"), 100)
    }

    fn owners(app: &App) -> usize {
        app.collaborators
            .values()
            .filter(|c| c.permission == Permission::Owner)
            .count()
    }

    // --- accounts ---

    #[tokio::test]
    async fn duplicate_email_is_rejected_ignoring_case() {
        let f = fixture().await;
        account(&f.storage, "Alice@Example.com").await;
        let err = f
            .storage
            .add_account(Account::new("alice@example.COM", "Alice"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn accounts_are_found_by_id_and_email() {
        let f = fixture().await;
        let id = account(&f.storage, "Bob@Example.com").await;

        let by_id = f.storage.get_account(&id).await.unwrap();
        assert_eq!(by_id.id, id);
        assert_eq!(by_id.email, "Bob@Example.com");

        let by_email = f.storage.get_account_by_email("bob@example.com").await.unwrap();
        assert_eq!(by_email, by_id);

        let err = f
            .storage
            .get_account_by_email("nobody@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.message(),
            "The specified e-mail address doesn't represent a registered user"
        );
    }

    #[tokio::test]
    async fn update_account_merges_provider_ids() {
        let f = fixture().await;
        account(&f.storage, "c@example.com").await;
        f.storage
            .update_account(
                "c@example.com",
                ProviderIds {
                    git_hub_id: Some("gh".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        f.storage
            .update_account(
                "c@example.com",
                ProviderIds {
                    microsoft_id: Some("ms".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = f.storage.get_account_by_email("c@example.com").await.unwrap();
        assert_eq!(stored.providers.git_hub_id.as_deref(), Some("gh"));
        assert_eq!(stored.providers.microsoft_id.as_deref(), Some("ms"));

        let err = f
            .storage
            .update_account("ghost@example.com", ProviderIds::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn reserved_characters_in_emails_are_invalid() {
        let f = fixture().await;
        let err = f
            .storage
            .add_account(Account::new("a b@example.com", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    // --- access keys ---

    #[tokio::test]
    async fn access_keys_resolve_to_their_account() {
        let f = fixture().await;
        let owner = account(&f.storage, "k@example.com").await;
        let key_id = f
            .storage
            .add_access_key(&owner, AccessKey::new("secret-token", "CI", now_ms() + 60_000))
            .await
            .unwrap();

        assert_eq!(
            f.storage
                .get_account_id_from_access_key("secret-token")
                .await
                .unwrap(),
            owner
        );
        let stored = f.storage.get_access_key(&owner, &key_id).await.unwrap();
        assert_eq!(stored.name, hash_sha256("secret-token"));
        assert_eq!(stored.friendly_name, "CI");

        let listed = f.storage.get_access_keys(&owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, key_id);
    }

    #[tokio::test]
    async fn expired_access_keys_are_rejected() {
        let f = fixture().await;
        let owner = account(&f.storage, "e@example.com").await;
        f.storage
            .add_access_key(&owner, AccessKey::new("old-token", "old", now_ms() - 1))
            .await
            .unwrap();
        let err = f
            .storage
            .get_account_id_from_access_key("old-token")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
    }

    #[tokio::test]
    async fn access_key_expiring_now_is_rejected() {
        let f = fixture().await;
        let owner = account(&f.storage, "now@example.com").await;
        f.storage
            .add_access_key(&owner, AccessKey::new("now-token", "now", now_ms()))
            .await
            .unwrap();
        let err = f
            .storage
            .get_account_id_from_access_key("now-token")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
    }

    #[tokio::test]
    async fn failed_access_key_record_leaves_no_shortcut() {
        let f = fixture().await;
        let owner = account(&f.storage, "big@example.com").await;
        let oversized = "x".repeat(70 * 1024);
        let err = f
            .storage
            .add_access_key(&owner, AccessKey::new("big-token", oversized, now_ms() + 60_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooLarge);

        let err = f
            .storage
            .get_account_id_from_access_key("big-token")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.storage.get_access_keys(&owner).await.unwrap().is_empty());

        f.storage
            .add_access_key(&owner, AccessKey::new("big-token", "ok", now_ms() + 60_000))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn access_key_update_and_removal() {
        let f = fixture().await;
        let owner = account(&f.storage, "u@example.com").await;
        let key_id = f
            .storage
            .add_access_key(&owner, AccessKey::new("tok", "t", now_ms() - 1))
            .await
            .unwrap();

        let mut stored = f.storage.get_access_key(&owner, &key_id).await.unwrap();
        stored.expires = now_ms() + 60_000;
        stored.friendly_name = "renewed".into();
        f.storage.update_access_key(&owner, stored).await.unwrap();
        assert_eq!(
            f.storage.get_account_id_from_access_key("tok").await.unwrap(),
            owner
        );
        assert_eq!(
            f.storage
                .get_access_key(&owner, &key_id)
                .await
                .unwrap()
                .friendly_name,
            "renewed"
        );

        f.storage.remove_access_key(&owner, &key_id).await.unwrap();
        let err = f
            .storage
            .get_account_id_from_access_key("tok")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.storage.get_access_keys(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn access_keys_of_unknown_account_are_not_found() {
        let f = fixture().await;
        let err = f.storage.get_access_keys("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn duplicate_access_key_names_are_rejected() {
        let f = fixture().await;
        let owner = account(&f.storage, "d@example.com").await;
        let key = AccessKey::new("same", "a", now_ms() + 1_000);
        f.storage.add_access_key(&owner, key.clone()).await.unwrap();
        let err = f.storage.add_access_key(&owner, key).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    // --- apps and collaborators ---

    #[tokio::test]
    async fn new_app_has_its_creator_as_sole_owner() {
        let f = fixture().await;
        let owner = account(&f.storage, "Owner@Example.com").await;
        let created = app(&f.storage, &owner, "demo").await;

        assert_eq!(owners(&created), 1);
        assert!(created.is_owner("Owner@Example.com"));

        let apps = f.storage.get_apps(&owner).await.unwrap();
        assert_eq!(apps.len(), 1);
        assert!(apps[0].collaborators["Owner@Example.com"].is_current_account);
    }

    #[tokio::test]
    async fn account_without_apps_lists_nothing() {
        let f = fixture().await;
        let owner = account(&f.storage, "empty@example.com").await;
        assert!(f.storage.get_apps(&owner).await.unwrap().is_empty());
        let err = f.storage.get_apps("unknown").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn update_app_renames_without_touching_collaborators() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let mut created = app(&f.storage, &owner, "before").await;
        created.name = "after".into();
        created.collaborators.clear();
        f.storage.update_app(&owner, created.clone()).await.unwrap();

        let stored = f.storage.get_app(&owner, &created.id).await.unwrap();
        assert_eq!(stored.name, "after");
        assert_eq!(owners(&stored), 1);
    }

    #[tokio::test]
    async fn collaborators_can_be_added_and_removed() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let dev = account(&f.storage, "Dev@Example.com").await;
        let created = app(&f.storage, &owner, "demo").await;

        f.storage
            .add_collaborator(&owner, &created.id, "dev@example.com")
            .await
            .unwrap();
        let err = f
            .storage
            .add_collaborator(&owner, &created.id, "DEV@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let collaborators = f.storage.get_collaborators(&dev, &created.id).await.unwrap();
        assert_eq!(collaborators["Dev@Example.com"].permission, Permission::Collaborator);
        assert!(collaborators["Dev@Example.com"].is_current_account);
        assert_eq!(f.storage.get_apps(&dev).await.unwrap().len(), 1);

        f.storage
            .remove_collaborator(&owner, &created.id, "Dev@Example.com")
            .await
            .unwrap();
        assert!(f.storage.get_apps(&dev).await.unwrap().is_empty());
        assert!(!f
            .table
            .contains(&keys::account_app_address(&dev, &created.id).unwrap()));
    }

    #[tokio::test]
    async fn owner_cannot_be_removed() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;

        let err = f
            .storage
            .remove_collaborator(&owner, &created.id, "o@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = f
            .storage
            .remove_collaborator(&owner, &created.id, "stranger@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn transfer_to_new_account_swaps_ownership() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let target = account(&f.storage, "t@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;

        f.storage
            .transfer_app(&owner, &created.id, "T@example.com")
            .await
            .unwrap();

        let stored = f.storage.get_app(&owner, &created.id).await.unwrap();
        assert_eq!(owners(&stored), 1);
        assert!(stored.is_owner("t@example.com"));
        assert!(stored.is_collaborator("o@example.com"));
        assert_eq!(f.storage.get_apps(&target).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transfer_to_existing_collaborator_reuses_pointer() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let dev = account(&f.storage, "d@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        f.storage
            .add_collaborator(&owner, &created.id, "d@example.com")
            .await
            .unwrap();

        f.storage
            .transfer_app(&owner, &created.id, "d@example.com")
            .await
            .unwrap();
        let stored = f.storage.get_app(&dev, &created.id).await.unwrap();
        assert_eq!(owners(&stored), 1);
        assert!(stored.is_owner("d@example.com"));
        assert_eq!(f.storage.get_apps(&dev).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transfer_conflicts_are_rejected() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let target = account(&f.storage, "t@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        app(&f.storage, &target, "demo").await;

        let err = f
            .storage
            .transfer_app(&owner, &created.id, "o@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = f
            .storage
            .transfer_app(&owner, &created.id, "t@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(err.message().contains("demo"));
    }

    // --- deployments ---

    #[tokio::test]
    async fn deployments_are_reachable_by_key() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let staging = deployment(&f.storage, &owner, &created.id, "Staging", "key-staging").await;
        deployment(&f.storage, &owner, &created.id, "Production", "key-prod").await;

        let info = f.storage.get_deployment_info("key-staging").await.unwrap();
        assert_eq!(info.app_id, created.id);
        assert_eq!(info.deployment_id, staging);

        let deployments = f.storage.get_deployments(&owner, &created.id).await.unwrap();
        assert_eq!(deployments.len(), 2);
        assert!(deployments.iter().all(|d| d.package.is_none()));

        let history = f
            .storage
            .get_package_history_from_deployment_key("key-staging")
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn deployment_requires_existing_app() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let err = f
            .storage
            .add_deployment(&owner, "noapp", Deployment::new("Staging", "k"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(f.blobs.blob_count("packagehistoryv1"), 1);
    }

    #[tokio::test]
    async fn duplicate_deployment_key_leaves_nothing_behind() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        deployment(&f.storage, &owner, &created.id, "Staging", "shared").await;
        let rows_before = f.table.len();
        let blobs_before = f.blobs.blob_count("packagehistoryv1");

        let err = f
            .storage
            .add_deployment(&owner, &created.id, Deployment::new("Other", "shared"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(f.table.len(), rows_before);
        assert_eq!(f.blobs.blob_count("packagehistoryv1"), blobs_before);
        assert_eq!(
            f.storage.get_deployments(&owner, &created.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn changing_a_deployment_key_moves_its_shortcut() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let id = deployment(&f.storage, &owner, &created.id, "Staging", "old-key").await;

        let mut current = f.storage.get_deployment(&owner, &created.id, &id).await.unwrap();
        current.key = "new-key".into();
        current.name = "Beta".into();
        f.storage
            .update_deployment(&owner, &created.id, current)
            .await
            .unwrap();

        let err = f.storage.get_deployment_info("old-key").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            f.storage.get_deployment_info("new-key").await.unwrap().deployment_id,
            id
        );
        let stored = f.storage.get_deployment(&owner, &created.id, &id).await.unwrap();
        assert_eq!(stored.name, "Beta");
    }

    #[tokio::test]
    async fn update_deployment_keeps_latest_package() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let id = deployment(&f.storage, &owner, &created.id, "Staging", "k").await;
        f.storage
            .commit_package(&owner, &created.id, &id, release("1.0.0", "h1"))
            .await
            .unwrap();

        let mut current = f.storage.get_deployment(&owner, &created.id, &id).await.unwrap();
        current.name = "Renamed".into();
        current.package = None;
        f.storage
            .update_deployment(&owner, &created.id, current)
            .await
            .unwrap();

        let stored = f.storage.get_deployment(&owner, &created.id, &id).await.unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.package.map(|p| p.label), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn removing_a_deployment_removes_key_and_history() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let id = deployment(&f.storage, &owner, &created.id, "Staging", "gone-key").await;

        f.storage
            .remove_deployment(&owner, &created.id, &id)
            .await
            .unwrap();
        assert_eq!(
            f.storage
                .get_deployment_info("gone-key")
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert!(!f.blobs.contains("packagehistoryv1", &id));
        assert!(f
            .storage
            .get_deployments(&owner, &created.id)
            .await
            .unwrap()
            .is_empty());
    }

    // --- packages ---

    #[tokio::test]
    async fn commits_receive_increasing_labels_and_committer() {
        let f = fixture().await;
        let owner = account(&f.storage, "rel@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let id = deployment(&f.storage, &owner, &created.id, "Staging", "k").await;

        for (i, hash) in ["h1", "h2", "h3"].iter().enumerate() {
            let committed = f
                .storage
                .commit_package(&owner, &created.id, &id, release("1.0.0", hash))
                .await
                .unwrap();
            assert_eq!(committed.label, format!("v{}", i + 1));
            assert_eq!(committed.released_by.as_deref(), Some("rel@example.com"));
        }

        let latest = f
            .storage
            .get_deployment(&owner, &created.id, &id)
            .await
            .unwrap()
            .package
            .unwrap();
        assert_eq!(latest.label, "v3");
        assert_eq!(latest.package_hash, "h3");
    }

    #[tokio::test]
    async fn history_is_trimmed_to_the_newest_entries() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let id = deployment(&f.storage, &owner, &created.id, "Staging", "k").await;

        for i in 1..=55 {
            f.storage
                .commit_package(&owner, &created.id, &id, release("1.0.0", &format!("h{i}")))
                .await
                .unwrap();
        }
        let history = f
            .storage
            .get_package_history(&owner, &created.id, &id)
            .await
            .unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(history[0].label, "v6");
        assert_eq!(history[49].label, "v55");
    }

    #[tokio::test]
    async fn only_the_newest_package_keeps_its_rollout() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let id = deployment(&f.storage, &owner, &created.id, "Staging", "k").await;

        for hash in ["h1", "h2", "h3"] {
            let mut pkg = release("1.0.0", hash);
            pkg.rollout = Some(25);
            f.storage
                .commit_package(&owner, &created.id, &id, pkg)
                .await
                .unwrap();
        }
        let history = f
            .storage
            .get_package_history(&owner, &created.id, &id)
            .await
            .unwrap();
        let rollouts: Vec<_> = history.iter().map(|p| p.rollout).collect();
        assert_eq!(rollouts, [None, None, Some(25)]);
    }

    #[tokio::test]
    async fn clearing_history_restarts_labels() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let id = deployment(&f.storage, &owner, &created.id, "Staging", "k").await;
        for hash in ["h1", "h2"] {
            f.storage
                .commit_package(&owner, &created.id, &id, release("1.0.0", hash))
                .await
                .unwrap();
        }

        f.storage
            .clear_package_history(&owner, &created.id, &id)
            .await
            .unwrap();
        let stored = f.storage.get_deployment(&owner, &created.id, &id).await.unwrap();
        assert!(stored.package.is_none());
        assert_eq!(stored.key, "k");
        assert!(f
            .storage
            .get_package_history(&owner, &created.id, &id)
            .await
            .unwrap()
            .is_empty());

        let next = f
            .storage
            .commit_package(&owner, &created.id, &id, release("1.0.0", "h3"))
            .await
            .unwrap();
        assert_eq!(next.label, "v1");
    }

    #[tokio::test]
    async fn update_package_history_rewrites_history_and_latest() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let id = deployment(&f.storage, &owner, &created.id, "Staging", "k").await;
        f.storage
            .commit_package(&owner, &created.id, &id, release("1.0.0", "h1"))
            .await
            .unwrap();

        let mut history = f
            .storage
            .get_package_history(&owner, &created.id, &id)
            .await
            .unwrap();
        history[0].is_disabled = true;
        f.storage
            .update_package_history(&owner, &created.id, &id, history)
            .await
            .unwrap();
        let latest = f
            .storage
            .get_deployment(&owner, &created.id, &id)
            .await
            .unwrap()
            .package
            .unwrap();
        assert!(latest.is_disabled);

        let err = f
            .storage
            .update_package_history(&owner, &created.id, &id, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(
            err.message(),
            "Cannot clear package history from an update operation"
        );
    }

    // --- app removal ---

    #[tokio::test]
    async fn remove_app_leaves_no_residual_rows() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        let dev = account(&f.storage, "d@example.com").await;
        let created = app(&f.storage, &owner, "demo").await;
        let kept = app(&f.storage, &owner, "kept").await;
        f.storage
            .add_collaborator(&owner, &created.id, "d@example.com")
            .await
            .unwrap();
        let staging = deployment(&f.storage, &owner, &created.id, "Staging", "ks").await;
        let prod = deployment(&f.storage, &owner, &created.id, "Production", "kp").await;
        f.storage
            .commit_package(&owner, &created.id, &prod, release("1.0.0", "h1"))
            .await
            .unwrap();

        f.storage.remove_app(&owner, &created.id).await.unwrap();

        let app_partition = keys::app_partition_key(&created.id).unwrap();
        for address in f.table.addresses() {
            assert_ne!(address.partition_key, app_partition);
            assert!(!address.partition_key.starts_with("deploymentKey "));
            assert!(!address.row_key.ends_with(&format!("appId* {}", created.id)));
        }
        for id in [&staging, &prod] {
            assert!(!f.blobs.contains("packagehistoryv1", id));
        }
        assert!(f.storage.get_apps(&dev).await.unwrap().is_empty());
        let remaining = f.storage.get_apps(&owner).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept.id);

        let err = f.storage.get_app(&owner, &created.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // --- blobs ---

    #[tokio::test]
    async fn package_blobs_are_public() {
        let f = fixture().await;
        f.storage.add_blob("pkg1", b"zip".to_vec()).await.unwrap();
        assert_eq!(
            f.storage.get_blob_url("pkg1").await.unwrap(),
            "memory://blobs/storagev2/pkg1"
        );
        assert!(f.blobs.contains("storagev2", "pkg1"));
        f.storage.remove_blob("pkg1").await.unwrap();
        assert_eq!(
            f.storage.remove_blob("pkg1").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    // --- lifecycle ---

    #[tokio::test]
    async fn health_check_detects_missing_sentinel() {
        let f = fixture().await;
        f.storage.check_health().await.unwrap();

        BlobStore::delete(f.blobs.as_ref(), "packagehistoryv1", "health")
            .await
            .unwrap();
        let err = f.storage.check_health().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);

        f.storage.reinitialize().await.unwrap();
        f.storage.check_health().await.unwrap();
    }

    #[tokio::test]
    async fn transient_faults_are_invisible_to_callers() {
        let f = fixture().await;
        let id = account(&f.storage, "r@example.com").await;
        f.table.fail_next(2, "ECONNRESET");
        assert_eq!(f.storage.get_account(&id).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn operations_wait_for_setup() {
        let mut config = test_config();
        config.operation_timeout_ms = 20;
        let storage = TableStorage::new(
            InMemoryTableStore::new("storagev2"),
            InMemoryBlobStore::default(),
            config,
        );
        let err = storage.get_account("c1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
        assert_eq!(storage.readiness(), Readiness::Uninitialized);

        storage.initialize().await.unwrap();
        assert_eq!(storage.readiness(), Readiness::Ready);
        let err = storage.get_account("c1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failed_setup_fails_operations_until_reinitialized() {
        let table = InMemoryTableStore::new("storagev2");
        table.fail_next(1, "AuthenticationFailed");
        let storage = TableStorage::new(table, InMemoryBlobStore::default(), test_config());

        assert!(storage.initialize().await.is_err());
        assert!(matches!(storage.readiness(), Readiness::Failed(_)));
        let err = storage
            .add_account(Account::new("x@example.com", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);

        storage.reinitialize().await.unwrap();
        storage
            .add_account(Account::new("x@example.com", "x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_cancels_collection_fetches() {
        let f = fixture().await;
        let owner = account(&f.storage, "o@example.com").await;
        f.storage.shutdown();
        let err = f.storage.get_apps(&owner).await.unwrap_err();
        assert_eq!(err.message(), "operation cancelled");
    }
}
