//! Partition and row key encoding.
//!
//! Keys are built from `field DELIMITER value` pairs in hierarchy order
//! (account → app, app → deployment). The row key of the entity itself has
//! the [`LEAF_MARKER`] inserted right before the delimiter preceding its
//! value, so the two rows
//!
//! ```text
//! appId* a1                      (the app)
//! appId a1 deploymentId* d1      (a deployment of the app)
//! ```
//!
//! never collide, and all direct children of `a1` sort strictly between
//! `appId a1 deploymentId* ` and the same string followed by [`RANGE_END`].
//!
//! Shortcut addresses (email, deployment key, access-key hash) live in a
//! dedicated partition each, with an empty row key.
//!
//! Any caller-supplied value containing [`DELIMITER`] or [`LEAF_MARKER`] is
//! rejected with [`ErrorKind::Invalid`](crate::ErrorKind::Invalid).

use std::fmt;

use crate::error::{StorageError, StoreResult};

pub const DELIMITER: char = ' ';
pub const LEAF_MARKER: char = '*';
/// Sorts after every character used in generated keys.
pub const RANGE_END: char = '~';

const ACCOUNT_FIELD: &str = "accountId";
const APP_FIELD: &str = "appId";
const DEPLOYMENT_FIELD: &str = "deploymentId";
const EMAIL_FIELD: &str = "email";
const DEPLOYMENT_KEY_FIELD: &str = "deploymentKey";
const ACCESS_KEY_FIELD: &str = "accessKey";

/// Location of a row: partition key plus row key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub partition_key: String,
    pub row_key: String,
}

impl Address {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {:?})", self.partition_key, self.row_key)
    }
}

/// Reject values that could alter key structure.
pub fn validate_component(value: &str) -> StoreResult<()> {
    if value.contains(DELIMITER) || value.contains(LEAF_MARKER) {
        return Err(StorageError::invalid(format!(
            "the parameter '{value}' contained invalid characters"
        )));
    }
    Ok(())
}

/// Validate an entity identifier: non-empty and free of reserved characters.
pub fn validate_id(value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StorageError::invalid("identifier must not be empty"));
    }
    validate_component(value)
}

fn delimit(field: &str, value: &str) -> String {
    format!("{field}{DELIMITER}{value}")
}

/// Insert the leaf marker before the last delimiter:
/// `appId a1 deploymentId d1` → `appId a1 deploymentId* d1`.
fn mark_leaf(key: &str) -> String {
    match key.rfind(DELIMITER) {
        Some(idx) => format!("{}{LEAF_MARKER}{}", &key[..idx], &key[idx..]),
        None => key.to_string(),
    }
}

fn hierarchical_key(mark: bool, segments: &[(&str, &str)]) -> String {
    let key = segments
        .iter()
        .map(|(field, value)| delimit(field, value))
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string());
    if mark {
        mark_leaf(&key)
    } else {
        key
    }
}

pub fn account_partition_key(account_id: &str) -> StoreResult<String> {
    validate_id(account_id)?;
    Ok(delimit(ACCOUNT_FIELD, account_id))
}

pub fn app_partition_key(app_id: &str) -> StoreResult<String> {
    validate_id(app_id)?;
    Ok(delimit(APP_FIELD, app_id))
}

/// Row key under the app hierarchy. `deployment_id` selects the deployment
/// level; `mark` adds the leaf marker to the deepest segment.
pub fn app_hierarchy_key(
    mark: bool,
    app_id: &str,
    deployment_id: Option<&str>,
) -> StoreResult<String> {
    validate_id(app_id)?;
    let mut segments = vec![(APP_FIELD, app_id)];
    if let Some(deployment_id) = deployment_id {
        validate_component(deployment_id)?;
        segments.push((DEPLOYMENT_FIELD, deployment_id));
    }
    Ok(hierarchical_key(mark, &segments))
}

/// Row key under the account hierarchy. `app_id` selects the app level.
pub fn account_hierarchy_key(
    mark: bool,
    account_id: &str,
    app_id: Option<&str>,
) -> StoreResult<String> {
    validate_id(account_id)?;
    let mut segments = vec![(ACCOUNT_FIELD, account_id)];
    if let Some(app_id) = app_id {
        validate_component(app_id)?;
        segments.push((APP_FIELD, app_id));
    }
    Ok(hierarchical_key(mark, &segments))
}

/// Hierarchical address of an account (holds a pointer to its email row).
pub fn account_address(account_id: &str) -> StoreResult<Address> {
    Ok(Address::new(
        account_partition_key(account_id)?,
        account_hierarchy_key(true, account_id, None)?,
    ))
}

/// Where an account's membership pointer to an app lives.
pub fn account_app_address(account_id: &str, app_id: &str) -> StoreResult<Address> {
    validate_id(app_id)?;
    Ok(Address::new(
        account_partition_key(account_id)?,
        account_hierarchy_key(true, account_id, Some(app_id))?,
    ))
}

pub fn app_address(app_id: &str) -> StoreResult<Address> {
    Ok(Address::new(
        app_partition_key(app_id)?,
        app_hierarchy_key(true, app_id, None)?,
    ))
}

pub fn deployment_address(app_id: &str, deployment_id: &str) -> StoreResult<Address> {
    validate_id(deployment_id)?;
    Ok(Address::new(
        app_partition_key(app_id)?,
        app_hierarchy_key(true, app_id, Some(deployment_id))?,
    ))
}

/// Search key whose range covers the direct app children of an account.
pub fn account_children_search_key(account_id: &str) -> StoreResult<String> {
    account_hierarchy_key(true, account_id, Some(""))
}

/// Search key whose range covers the deployments of an app.
pub fn app_children_search_key(app_id: &str) -> StoreResult<String> {
    app_hierarchy_key(true, app_id, Some(""))
}

/// Row key of an access key in its account's partition. Without an id this
/// is the search key covering all of the account's access keys.
pub fn access_key_row_key(account_id: &str, access_key_id: Option<&str>) -> StoreResult<String> {
    validate_id(account_id)?;
    let mut key = format!("{ACCOUNT_FIELD}_{account_id}_accessKeyId{LEAF_MARKER}_");
    if let Some(id) = access_key_id {
        validate_id(id)?;
        key.push_str(id);
    }
    Ok(key)
}

pub fn access_key_address(account_id: &str, access_key_id: &str) -> StoreResult<Address> {
    Ok(Address::new(
        account_partition_key(account_id)?,
        access_key_row_key(account_id, Some(access_key_id))?,
    ))
}

/// Shortcut address holding the account record for an email.
///
/// The email is lower-cased here only; records keep their original casing.
pub fn email_shortcut_address(email: &str) -> StoreResult<Address> {
    validate_id(email)?;
    Ok(Address::new(
        delimit(EMAIL_FIELD, &email.to_lowercase()),
        String::new(),
    ))
}

pub fn deployment_key_shortcut_address(deployment_key: &str) -> StoreResult<Address> {
    validate_id(deployment_key)?;
    Ok(Address::new(
        delimit(DEPLOYMENT_KEY_FIELD, deployment_key),
        String::new(),
    ))
}

/// Shortcut address for a plain-text access-key name (hashed here).
pub fn access_key_shortcut_address(access_key_name: &str) -> StoreResult<Address> {
    validate_id(access_key_name)?;
    access_key_shortcut_address_for_hash(&ota_types::hash_sha256(access_key_name))
}

/// Shortcut address for an already hashed access-key name.
pub fn access_key_shortcut_address_for_hash(name_hash: &str) -> StoreResult<Address> {
    validate_id(name_hash)?;
    Ok(Address::new(
        delimit(ACCESS_KEY_FIELD, name_hash),
        String::new(),
    ))
}

pub fn is_deployment_row(row_key: &str) -> bool {
    row_key.contains(&format!("{DEPLOYMENT_FIELD}{LEAF_MARKER}"))
}

/// Exclusive upper bound of the range starting at `key`.
pub fn range_end(key: &str) -> String {
    format!("{key}{RANGE_END}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn app_and_deployment_keys() {
        assert_eq!(app_partition_key("a1").unwrap(), "appId a1");
        assert_eq!(app_address("a1").unwrap().row_key, "appId* a1");
        assert_eq!(
            deployment_address("a1", "d1").unwrap().row_key,
            "appId a1 deploymentId* d1"
        );
        assert_eq!(
            app_hierarchy_key(false, "a1", Some("d1")).unwrap(),
            "appId a1 deploymentId d1"
        );
    }

    #[test]
    fn account_keys() {
        let addr = account_address("c1").unwrap();
        assert_eq!(addr.partition_key, "accountId c1");
        assert_eq!(addr.row_key, "accountId* c1");
        assert_eq!(
            account_app_address("c1", "a1").unwrap().row_key,
            "accountId c1 appId* a1"
        );
    }

    #[test]
    fn children_search_keys_end_with_marked_empty_leaf() {
        assert_eq!(app_children_search_key("a1").unwrap(), "appId a1 deploymentId* ");
        assert_eq!(account_children_search_key("c1").unwrap(), "accountId c1 appId* ");
    }

    #[test]
    fn children_range_contains_children_only() {
        let lo = app_children_search_key("a1").unwrap();
        let hi = range_end(&lo);
        let child = deployment_address("a1", "d1").unwrap().row_key;
        let own = app_address("a1").unwrap().row_key;
        let other = deployment_address("a10", "d1").unwrap().row_key;

        assert!(child > lo && child < hi);
        assert!(!(own > lo && own < hi));
        assert!(!(other > lo && other < hi));
    }

    #[test]
    fn shortcut_addresses() {
        let email = email_shortcut_address("Alice@Example.com").unwrap();
        assert_eq!(email.partition_key, "email alice@example.com");
        assert_eq!(email.row_key, "");

        let key = deployment_key_shortcut_address("dk-1").unwrap();
        assert_eq!(key.partition_key, "deploymentKey dk-1");

        let ak = access_key_shortcut_address("secret").unwrap();
        assert_eq!(
            ak.partition_key,
            format!("accessKey {}", ota_types::hash_sha256("secret"))
        );
    }

    #[test]
    fn access_key_rows() {
        assert_eq!(
            access_key_row_key("c1", None).unwrap(),
            "accountId_c1_accessKeyId*_"
        );
        assert_eq!(
            access_key_row_key("c1", Some("k1")).unwrap(),
            "accountId_c1_accessKeyId*_k1"
        );
    }

    #[test]
    fn deployment_rows_are_recognized() {
        assert!(is_deployment_row("appId a1 deploymentId* d1"));
        assert!(!is_deployment_row("appId* a1"));
    }

    #[test]
    fn reserved_characters_are_rejected() {
        let err = app_partition_key("a b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(deployment_address("a1", "d*").is_err());
        assert!(email_shortcut_address("x y@z").is_err());
        assert!(access_key_shortcut_address("na*me").is_err());
    }

    #[test]
    fn empty_ids_are_rejected() {
        assert_eq!(app_address("").unwrap_err().kind(), ErrorKind::Invalid);
        assert!(account_address("").is_err());
    }

    proptest! {
        #[test]
        fn values_with_reserved_chars_never_encode(
            prefix in "[a-z0-9]{0,8}",
            reserved in prop::sample::select(vec![' ', '*']),
            suffix in "[a-z0-9]{0,8}",
        ) {
            let value = format!("{prefix}{reserved}{suffix}");
            prop_assert!(app_partition_key(&value).is_err());
            prop_assert!(account_app_address("c1", &value).is_err());
            prop_assert!(deployment_key_shortcut_address(&value).is_err());
        }

        #[test]
        fn clean_values_produce_distinct_leaf_and_path_keys(id in "[a-zA-Z0-9_-]{1,12}") {
            let leaf = app_hierarchy_key(true, &id, None).unwrap();
            let path = app_hierarchy_key(false, &id, None).unwrap();
            prop_assert_ne!(leaf, path);
        }
    }
}
