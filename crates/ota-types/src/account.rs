use serde::{Deserialize, Serialize};

/// Identity-provider ids linked to an account.
///
/// Absent ids are omitted on serialization so a merge update only touches
/// the providers that are actually set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_ad_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_hub_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microsoft_id: Option<String>,
}

/// A registered user of the service.
///
/// The email keeps the casing it was registered with; uniqueness is enforced
/// case-insensitively by the storage layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub linked_providers: Vec<String>,
    #[serde(flatten)]
    pub providers: ProviderIds,
}

impl Account {
    /// A new, not yet stored account.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            created_time: crate::now_ms(),
            ..Default::default()
        }
    }
}
