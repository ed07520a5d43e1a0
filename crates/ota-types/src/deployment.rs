use serde::{Deserialize, Serialize};

use crate::package::Package;

/// A release channel of an app (e.g. "Staging", "Production").
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Client-facing lookup token, unique across the service.
    pub key: String,
    #[serde(default)]
    pub created_time: i64,
    /// Most recently committed package, if any.
    #[serde(default)]
    pub package: Option<Package>,
}

impl Deployment {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            created_time: crate::now_ms(),
            ..Default::default()
        }
    }
}

/// What a deployment key resolves to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub app_id: String,
    pub deployment_id: String,
}
