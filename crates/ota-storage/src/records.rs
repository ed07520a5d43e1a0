//! Flat row shapes persisted in the table.
//!
//! Nested values (collaborator maps, provider lists, the latest package) are
//! stored as JSON string properties.

use ota_store::json_property;
use ota_types::{Account, App, CollaboratorMap, Deployment, Package, ProviderIds};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountRecord {
    #[serde(default)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default, with = "json_property")]
    pub linked_providers: Vec<String>,
    #[serde(flatten)]
    pub providers: ProviderIds,
}

impl From<Account> for AccountRecord {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            created_time: account.created_time,
            linked_providers: account.linked_providers,
            providers: account.providers,
        }
    }
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            name: record.name,
            created_time: record.created_time,
            linked_providers: record.linked_providers,
            providers: record.providers,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AppRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default, with = "json_property")]
    pub collaborators: CollaboratorMap,
}

impl From<App> for AppRecord {
    fn from(app: App) -> Self {
        Self {
            id: app.id,
            name: app.name,
            created_time: app.created_time,
            collaborators: app.collaborators,
        }
    }
}

impl From<AppRecord> for App {
    fn from(record: AppRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            created_time: record.created_time,
            collaborators: record.collaborators,
        }
    }
}

/// Merge payload touching only the app name.
#[derive(Serialize)]
pub(crate) struct AppNameUpdate<'a> {
    pub name: &'a str,
}

/// Merge payload touching only the collaborator map.
#[derive(Serialize)]
pub(crate) struct CollaboratorsUpdate<'a> {
    #[serde(with = "json_property")]
    pub collaborators: &'a CollaboratorMap,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeploymentRecord {
    pub id: String,
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default, with = "json_property::option")]
    pub package: Option<Package>,
}

impl From<Deployment> for DeploymentRecord {
    fn from(deployment: Deployment) -> Self {
        Self {
            id: deployment.id,
            name: deployment.name,
            key: deployment.key,
            created_time: deployment.created_time,
            package: deployment.package,
        }
    }
}

impl From<DeploymentRecord> for Deployment {
    fn from(record: DeploymentRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            key: record.key,
            created_time: record.created_time,
            package: record.package,
        }
    }
}

/// Merge payload for a deployment's own fields; leaves the package alone.
#[derive(Serialize)]
pub(crate) struct DeploymentFieldsUpdate<'a> {
    pub name: &'a str,
    pub key: &'a str,
}

/// Merge payload replacing the latest package summary.
#[derive(Serialize)]
pub(crate) struct LatestPackageUpdate<'a> {
    #[serde(with = "json_property")]
    pub package: &'a Package,
}

/// Shortcut row keyed by an access-key name hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccessKeyShortcut {
    pub account_id: String,
    pub expires: i64,
}
