//! String-backed identifiers for agents, entities, and resources.
//!
//! Agent ids accept any string (roles like "chef" are valid ids); entity and
//! resource ids are server-assigned with a short prefix when not provided.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one agent in the world.
///
/// Accepts any string rather than enforcing a UUID shape, so human-readable
/// role names can double as ids.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[repr(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        AgentId(id.into())
    }

    pub fn generate() -> Self {
        AgentId(format!("agent_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        AgentId(s)
    }
}

macro_rules! prefixed_id {
    ($type_name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug,
            PartialEq,
            Eq,
            Hash,
            Clone,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            JsonSchema,
        )]
        #[repr(transparent)]
        pub struct $type_name(pub String);

        impl $type_name {
            pub fn new(id: impl Into<String>) -> Self {
                $type_name(id.into())
            }

            /// Server-assigned id with the type's prefix.
            pub fn generate() -> Self {
                $type_name(format!("{}_{}", $prefix, Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $type_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $type_name {
            fn from(s: &str) -> Self {
                $type_name(s.to_string())
            }
        }

        impl From<String> for $type_name {
            fn from(s: String) -> Self {
                $type_name(s)
            }
        }
    };
}

prefixed_id!(EntityId, "ent", "Identifies one entity in the shared world.");
prefixed_id!(
    ResourceId,
    "res",
    "Identifies one payload in the ResourceManager."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_prefix_and_are_unique() {
        let a = EntityId::generate();
        let b = EntityId::generate();
        assert!(a.as_str().starts_with("ent_"));
        assert_ne!(a, b);

        let r = ResourceId::generate();
        assert!(r.as_str().starts_with("res_"));
    }

    #[test]
    fn agent_id_accepts_role_names() {
        let id = AgentId::new("chef");
        assert_eq!(id.as_str(), "chef");
        assert_eq!(id.to_string(), "chef");
    }
}
