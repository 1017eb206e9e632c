//! Tiered per-agent memory.
//!
//! Three tiers with different lifetimes:
//! - permanent: never expires
//! - temporary: expires after a configured number of conversation turns
//! - reference: id + description only, the payload lives in the
//!   [`ResourceManager`](crate::resource::ResourceManager)
//!
//! The rendered form is injected into the decision step as plain text.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ResourceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanentEntry {
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporaryEntry {
    pub content: String,
    /// Number of turns this entry stays visible.
    pub expire_after_turns: u32,
    /// Turn counter value when the entry was added.
    pub added_at_turn: u32,
}

impl TemporaryEntry {
    pub fn is_expired(&self, current_turn: u32) -> bool {
        current_turn.saturating_sub(self.added_at_turn) >= self.expire_after_turns
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Memory fold directive returned by tool executors.
///
/// The execution step applies this to the owning context's memory tiers
/// before recording the action result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDirective {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permanent: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temporary: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_expire_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<(ResourceId, String)>,
}

impl MemoryDirective {
    pub fn is_empty(&self) -> bool {
        self.permanent.is_empty() && self.temporary.is_empty() && self.reference.is_none()
    }

    pub fn permanent(content: impl Into<String>) -> Self {
        Self {
            permanent: vec![content.into()],
            ..Default::default()
        }
    }

    pub fn temporary(content: impl Into<String>, expire_after_turns: u32) -> Self {
        Self {
            temporary: vec![content.into()],
            temporary_expire_turns: Some(expire_after_turns),
            ..Default::default()
        }
    }
}

pub const DEFAULT_TEMPORARY_EXPIRE_TURNS: u32 = 2;

/// The three memory tiers for one agent.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AgentMemory {
    permanent: Vec<PermanentEntry>,
    temporary: Vec<TemporaryEntry>,
    // BTreeMap keeps the rendered order stable across runs.
    references: BTreeMap<ResourceId, ReferenceEntry>,
}

impl AgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_permanent(&mut self, content: impl Into<String>) {
        self.permanent.push(PermanentEntry {
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn add_temporary(&mut self, content: impl Into<String>, expire_after_turns: u32, current_turn: u32) {
        self.temporary.push(TemporaryEntry {
            content: content.into(),
            expire_after_turns: expire_after_turns.max(1),
            added_at_turn: current_turn,
        });
    }

    pub fn add_reference(&mut self, id: ResourceId, description: impl Into<String>) {
        self.references.insert(
            id,
            ReferenceEntry {
                description: description.into(),
                timestamp: Utc::now(),
            },
        );
    }

    pub fn remove_reference(&mut self, id: &ResourceId) {
        self.references.remove(id);
    }

    /// Apply a tool-returned directive.
    pub fn apply(&mut self, directive: MemoryDirective, current_turn: u32) {
        for content in directive.permanent {
            self.add_permanent(content);
        }
        let expire = directive
            .temporary_expire_turns
            .unwrap_or(DEFAULT_TEMPORARY_EXPIRE_TURNS);
        for content in directive.temporary {
            self.add_temporary(content, expire, current_turn);
        }
        if let Some((id, description)) = directive.reference {
            self.add_reference(id, description);
        }
    }

    /// Drop temporary entries that have outlived their turn budget.
    pub fn prune_expired(&mut self, current_turn: u32) {
        self.temporary.retain(|e| !e.is_expired(current_turn));
    }

    pub fn clear_temporary(&mut self) {
        self.temporary.clear();
    }

    pub fn permanent_entries(&self) -> &[PermanentEntry] {
        &self.permanent
    }

    pub fn temporary_entries(&self) -> &[TemporaryEntry] {
        &self.temporary
    }

    pub fn reference_entries(&self) -> impl Iterator<Item = (&ResourceId, &ReferenceEntry)> {
        self.references.iter()
    }

    /// Render the injected memory block: permanent first, then unexpired
    /// temporary entries, then reference descriptors (never the payloads).
    /// Returns `None` when every tier is empty.
    pub fn render(&self, current_turn: u32) -> Option<String> {
        let mut sections = Vec::new();

        if !self.permanent.is_empty() {
            let mut lines = vec!["## Permanent memory:".to_string()];
            for (i, entry) in self.permanent.iter().enumerate() {
                lines.push(format!(
                    "{}. {} ({})",
                    i + 1,
                    entry.content,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S")
                ));
            }
            sections.push(lines.join("\n"));
        }

        let live: Vec<_> = self
            .temporary
            .iter()
            .filter(|e| !e.is_expired(current_turn))
            .collect();
        if !live.is_empty() {
            let mut lines = vec!["## Temporary memory:".to_string()];
            for (i, entry) in live.iter().enumerate() {
                lines.push(format!("{}. {}", i + 1, entry.content));
            }
            sections.push(lines.join("\n"));
        }

        if !self.references.is_empty() {
            let mut lines = vec!["## Available reference memory:".to_string()];
            for (id, entry) in &self.references {
                lines.push(format!(
                    "- {}: {} ({})",
                    id,
                    entry.description,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S")
                ));
            }
            sections.push(lines.join("\n"));
        }

        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn temporary_entries_expire_by_turn_count() {
        let mut memory = AgentMemory::new();
        memory.add_temporary("short lived", 2, 0);
        memory.add_temporary("longer lived", 5, 0);

        assert_eq!(memory.temporary_entries().len(), 2);
        memory.prune_expired(1);
        assert_eq!(memory.temporary_entries().len(), 2);

        memory.prune_expired(2);
        let remaining: Vec<_> = memory
            .temporary_entries()
            .iter()
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(remaining, vec!["longer lived"]);
    }

    #[test]
    fn render_includes_only_live_tiers() {
        let mut memory = AgentMemory::new();
        assert!(memory.render(0).is_none());

        memory.add_permanent("created the garden shed");
        memory.add_temporary("saw a new apple", 2, 0);
        memory.add_reference(ResourceId::new("res_abc"), "harvest ledger");

        let rendered = memory.render(0).unwrap();
        assert!(rendered.contains("## Permanent memory:"));
        assert!(rendered.contains("created the garden shed"));
        assert!(rendered.contains("saw a new apple"));
        assert!(rendered.contains("res_abc: harvest ledger"));

        // The temporary section disappears once expired; references do not
        // hold payloads, only descriptors.
        let rendered_later = memory.render(10).unwrap();
        assert!(!rendered_later.contains("saw a new apple"));
        assert!(rendered_later.contains("res_abc"));
    }

    #[test]
    fn directive_fold_applies_all_tiers() {
        let mut memory = AgentMemory::new();
        memory.apply(
            MemoryDirective {
                permanent: vec!["p".into()],
                temporary: vec!["t".into()],
                temporary_expire_turns: Some(4),
                reference: Some((ResourceId::new("res_1"), "ref".into())),
            },
            3,
        );
        assert_eq!(memory.permanent_entries().len(), 1);
        assert_eq!(memory.temporary_entries()[0].expire_after_turns, 4);
        assert_eq!(memory.temporary_entries()[0].added_at_turn, 3);
        assert_eq!(memory.reference_entries().count(), 1);
    }
}
