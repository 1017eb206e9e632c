//! World entities and merge-patch updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{AgentId, EntityId};

/// A piece of shared world state with optional ownership.
///
/// `data` is an arbitrary structured payload carrying its own `"type"` tag,
/// so entity categories live in the payload rather than in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Entity category, mirrored as the `"type"` tag inside `data`.
    pub kind: String,
    pub data: Value,
    pub location: Option<String>,
    /// Either absent or exactly one agent id.
    pub owned_by: Option<AgentId>,
    pub created_by: Option<AgentId>,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Convenience reader for `data.name`.
    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    /// The category tag inside `data`, falling back to the registry kind.
    pub fn data_kind(&self) -> &str {
        self.data
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(&self.kind)
    }
}

/// Draft for registering a new entity. The id is server-assigned when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<AgentId>,
}

impl EntityDraft {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: Value::Object(Default::default()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn owned_by(mut self, owner: impl Into<AgentId>) -> Self {
        self.owned_by = Some(owner.into());
        self
    }
}

/// Merge-patch for [`Entity`]: fields left `None` are untouched, `data` is
/// merged key-by-key at the top level of the payload object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// `Some(None)` clears ownership, `Some(Some(id))` sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<Option<AgentId>>,
}

impl EntityPatch {
    pub fn set_owner(owner: impl Into<AgentId>) -> Self {
        Self {
            owned_by: Some(Some(owner.into())),
            ..Default::default()
        }
    }

    pub fn clear_owner() -> Self {
        Self {
            owned_by: Some(None),
            ..Default::default()
        }
    }

    pub fn merge_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, entity: &mut Entity) {
        if let Some(patch) = self.data {
            merge_json(&mut entity.data, patch);
        }
        if let Some(location) = self.location {
            entity.location = Some(location);
        }
        if let Some(owner) = self.owned_by {
            entity.owned_by = owner;
        }
    }
}

/// Shallow object merge; non-object patches replace the target outright.
fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                target_map.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}
