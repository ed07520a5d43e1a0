use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Access level of a collaborator on an app.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Owner,
    Collaborator,
}

/// Per-collaborator properties, keyed by email in [`CollaboratorMap`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorProperties {
    pub account_id: String,
    pub permission: Permission,
    /// Derived for the requesting account on read; never persisted.
    #[serde(skip)]
    pub is_current_account: bool,
}

impl CollaboratorProperties {
    pub fn new(account_id: impl Into<String>, permission: Permission) -> Self {
        Self {
            account_id: account_id.into(),
            permission,
            is_current_account: false,
        }
    }
}

/// Collaborators of an app, keyed by the email stored on their account.
pub type CollaboratorMap = BTreeMap<String, CollaboratorProperties>;

/// An application registered with the service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub collaborators: CollaboratorMap,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_time: crate::now_ms(),
            ..Default::default()
        }
    }

    /// Email under which `account_id` collaborates on this app.
    pub fn email_for_account(&self, account_id: &str) -> Option<&str> {
        self.collaborators
            .iter()
            .find(|(_, props)| props.account_id == account_id)
            .map(|(email, _)| email.as_str())
    }

    /// Email of the single owner.
    pub fn owner_email(&self) -> Option<&str> {
        self.collaborators
            .iter()
            .find(|(_, props)| props.permission == Permission::Owner)
            .map(|(email, _)| email.as_str())
    }

    pub fn is_owner(&self, email: &str) -> bool {
        self.permission_of(email) == Some(Permission::Owner)
    }

    /// `true` only for non-owner collaborators.
    pub fn is_collaborator(&self, email: &str) -> bool {
        self.permission_of(email) == Some(Permission::Collaborator)
    }

    pub fn permission_of(&self, email: &str) -> Option<Permission> {
        self.collaborators.get(email).map(|props| props.permission)
    }

    /// Set the permission of an existing collaborator. Unknown emails are
    /// ignored.
    pub fn set_permission(&mut self, email: &str, permission: Permission) {
        if let Some(props) = self.collaborators.get_mut(email) {
            props.permission = permission;
        }
    }

    /// Flag the collaborator entry belonging to `account_id`.
    pub fn mark_current_account(&mut self, account_id: &str) {
        for props in self.collaborators.values_mut() {
            props.is_current_account = props.account_id == account_id;
        }
    }
}
