use serde::{Deserialize, Serialize};

/// An API credential owned by an account.
///
/// `name` is the secret token. Callers hand it over in plain text; storage
/// replaces it with its SHA-256 digest before anything is written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_time: i64,
    /// Expiry in epoch milliseconds.
    pub expires: i64,
    #[serde(default)]
    pub is_session: bool,
}

impl AccessKey {
    pub fn new(name: impl Into<String>, friendly_name: impl Into<String>, expires: i64) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.into(),
            created_time: crate::now_ms(),
            expires,
            ..Default::default()
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        is_expired(self.expires, now_ms)
    }
}

/// A key stops working at its expiry instant, not after it.
pub fn is_expired(expires: i64, now_ms: i64) -> bool {
    now_ms >= expires
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundary_is_inclusive() {
        let key = AccessKey::new("secret", "ci", 1_000);
        assert!(!key.is_expired_at(999));
        assert!(key.is_expired_at(1_000));
        assert!(key.is_expired_at(1_001));
        assert!(is_expired(0, 0));
    }
}
