//! Shape validation for generic objects
//!
//! Every typed object is a validated view over a generic canonical value.
//! A value either matches a shape exactly (all fields present, no extras) or
//! it is not that object at all.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A typed object that can be read back from a generic value
pub trait Shape: Serialize + DeserializeOwned {
    /// Human-readable shape name used in errors
    const NAME: &'static str;

    /// Validate and convert a generic value
    fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Boolean predicate over a generic value
    fn is_shape(value: &Value) -> bool {
        Self::from_value(value).is_some()
    }
}

/// Serde helper: an `Option` field that must be present, possibly as `null`
///
/// A plain `Option` field deserializes to `None` when the key is missing.
pub(crate) mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer)
    }
}

/// Serde helper: byte strings as lowercase hex
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
