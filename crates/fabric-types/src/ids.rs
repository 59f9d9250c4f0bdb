//! Strongly-typed identifiers for fabric entities.
//!
//! Task, lease, plan, and step ids are lexicographically-sortable ULIDs with
//! a human-legible prefix, matching the id scheme the fabric has always used
//! on the wire. Receipt ids are bare ULIDs (no prefix).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! prefixed_ulid_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn generate() -> Self {
                Self(format!("{}{}", $prefix, Ulid::new()))
            }

            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

prefixed_ulid_id!(ReceiptId, "");
prefixed_ulid_id!(TaskId, "T-");
prefixed_ulid_id!(LeaseId, "lease-");
prefixed_ulid_id!(PlanId, "plan-");
prefixed_ulid_id!(StepId, "step-");

/// Server-assigned tenant identifier. Opaque outside the resolver (§4.6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_prefixed_and_unique() {
        let a = TaskId::generate();
        let b = TaskId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("T-"));
    }

    #[test]
    fn receipt_ids_carry_no_prefix() {
        let id = ReceiptId::generate();
        assert_eq!(id.as_str().len(), 26);
    }

    #[test]
    fn lease_and_plan_ids_use_their_own_prefix() {
        assert!(LeaseId::generate().as_str().starts_with("lease-"));
        assert!(PlanId::generate().as_str().starts_with("plan-"));
        assert!(StepId::generate().as_str().starts_with("step-"));
    }
}
