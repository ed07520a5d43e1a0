//! Entity codec: domain records ↔ addressed property bags.
//!
//! Backends store flat rows of scalar properties. Records are serialized with
//! serde into a JSON object whose top-level fields become properties; fields
//! that hold nested structures are stored as JSON strings through the
//! [`json_property`] helper. Null properties are never written, so a merge
//! update leaves absent fields untouched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StorageError, StoreResult};
use crate::keys::Address;

const PARTITION_KEY_POINTER: &str = "partitionKeyPointer";
const ROW_KEY_POINTER: &str = "rowKeyPointer";

/// A stored row: address, properties, and backend bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub partition_key: String,
    pub row_key: String,
    pub properties: Map<String, Value>,
    /// Opaque version tag assigned by the backend.
    pub etag: Option<String>,
    /// Last write time (epoch ms) assigned by the backend.
    pub timestamp: Option<i64>,
}

impl Entity {
    pub fn new(address: Address, properties: Map<String, Value>) -> Self {
        Self {
            partition_key: address.partition_key,
            row_key: address.row_key,
            properties,
            etag: None,
            timestamp: None,
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.partition_key.clone(), self.row_key.clone())
    }

    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    /// The referenced address if this row is a pointer.
    ///
    /// A row is a pointer when it carries a non-empty partition key
    /// pointer. The row key pointer may be empty, as it is for shortcuts.
    pub fn pointer(&self) -> Option<Address> {
        let partition_key = self.property_str(PARTITION_KEY_POINTER)?;
        let row_key = self.property_str(ROW_KEY_POINTER)?;
        if partition_key.is_empty() {
            return None;
        }
        Some(Address::new(partition_key, row_key))
    }
}

/// Stored reference to another row's address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pointer {
    pub partition_key_pointer: String,
    pub row_key_pointer: String,
}

impl Pointer {
    pub fn to(target: &Address) -> Self {
        Self {
            partition_key_pointer: target.partition_key.clone(),
            row_key_pointer: target.row_key.clone(),
        }
    }

    pub fn target(&self) -> Address {
        Address::new(
            self.partition_key_pointer.clone(),
            self.row_key_pointer.clone(),
        )
    }
}

/// A decoded record together with the address it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct Addressed<T> {
    pub address: Address,
    pub value: T,
}

/// Serialize `value` into an entity stored at `address`.
pub fn wrap<T: Serialize>(value: &T, address: Address) -> StoreResult<Entity> {
    let properties = match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(StorageError::invalid(format!(
                "entity must serialize to an object, got {}",
                value_kind(&other)
            )))
        }
        Err(e) => return Err(StorageError::invalid(format!("cannot encode entity: {e}"))),
    };
    let properties = properties
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .collect();
    Ok(Entity::new(address, properties))
}

/// Decode the plain record, dropping address and bookkeeping.
pub fn unwrap<T: DeserializeOwned>(entity: Entity) -> StoreResult<T> {
    let address = entity.address();
    serde_json::from_value(Value::Object(entity.properties))
        .map_err(|e| StorageError::other(format!("cannot decode entity at {address}: {e}")))
}

/// Decode a record and keep its address.
pub fn unwrap_addressed<T: DeserializeOwned>(entity: Entity) -> StoreResult<Addressed<T>> {
    let address = entity.address();
    let value = unwrap(entity)?;
    Ok(Addressed { address, value })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serde adapter storing a nested value as a JSON string property.
///
/// ```ignore
/// #[serde(with = "ota_store::entity::json_property")]
/// collaborators: CollaboratorMap,
/// ```
pub mod json_property {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        let text = serde_json::to_string(value).map_err(S::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, T: DeserializeOwned, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<T, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }

    /// Optional variant; `None` is written as null and therefore omitted.
    pub mod option {
        use serde::de::{DeserializeOwned, Error as _};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<T: Serialize, S: Serializer>(
            value: &Option<T>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(inner) => super::serialize(inner, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, T: DeserializeOwned, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<T>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) => serde_json::from_str(&text).map(Some).map_err(D::Error::custom),
                None => Ok(None),
            }
        }
    }
}
