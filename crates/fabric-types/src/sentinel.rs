//! Wire-level `"NA"` sentinel handling.
//!
//! Unset string slots are represented internally as `Option<String>` /
//! `None`; the `"NA"` string only exists at the serialization boundary, per
//! the re-architecture note carried over from the source system.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const NA: &str = "NA";

/// An optional string that serializes as the literal `"NA"` when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NaString(pub Option<String>);

impl NaString {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn some(value: impl Into<String>) -> Self {
        Self(Some(value.into()))
    }

    pub fn is_na(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn eq_str(&self, other: &str) -> bool {
        match &self.0 {
            Some(s) => s == other,
            None => other == NA,
        }
    }
}

impl From<Option<String>> for NaString {
    fn from(value: Option<String>) -> Self {
        Self(value)
    }
}

impl Serialize for NaString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.0 {
            Some(s) => serializer.serialize_str(s),
            None => serializer.serialize_str(NA),
        }
    }
}

impl<'de> Deserialize<'de> for NaString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == NA {
            Ok(NaString(None))
        } else {
            Ok(NaString(Some(raw)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_na() {
        let unset = NaString::none();
        let json = serde_json::to_string(&unset).unwrap();
        assert_eq!(json, "\"NA\"");
        let back: NaString = serde_json::from_str(&json).unwrap();
        assert!(back.is_na());
    }

    #[test]
    fn round_trips_a_value() {
        let set = NaString::some("owner");
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "\"owner\"");
        let back: NaString = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_deref(), Some("owner"));
    }
}
