//! The shared coordination substrate: entity registry, per-agent mailboxes,
//! the typed event bus, and the periodic maintenance tick.
//!
//! `SharedWorld` knows nothing about agent internals. Every mutating
//! operation on a single entity or mailbox is serialized by the per-key
//! entry guard of the backing map; aggregate views (`all_entities`,
//! `snapshot`) are eventually consistent and take no global lock.

mod entity;
pub mod events;
pub mod spawn;
pub mod tick;

pub use entity::{Entity, EntityDraft, EntityPatch};
pub use events::{EventBus, SubscriptionId, WorldEvent, WorldEventKind};
pub use tick::{start_maintenance, MaintenanceHandle, TickTrigger};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::id::{AgentId, EntityId};

/// One inbound mailbox message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMessage {
    pub content: String,
    pub from: AgentId,
    /// Message category, e.g. `agent_message`, `broadcast_message`,
    /// `borrow_notification`.
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

impl WorldMessage {
    pub fn new(from: impl Into<AgentId>, kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            from: from.into(),
            kind: kind.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent_message(from: impl Into<AgentId>, content: impl Into<String>) -> Self {
        Self::new(from, "agent_message", content)
    }

    pub fn broadcast_message(from: impl Into<AgentId>, content: impl Into<String>) -> Self {
        Self::new(from, "broadcast_message", content)
    }

    pub fn system(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(AgentId::new("system"), kind, content)
    }
}

/// Point-in-time world statistics for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct WorldSnapshot {
    pub agent_count: usize,
    pub entity_count: usize,
    pub owned_entities: usize,
    pub entities_by_kind: BTreeMap<String, usize>,
    pub entities_by_location: BTreeMap<String, usize>,
    pub taken_at: DateTime<Utc>,
}

/// The single shared mutable world all agents coordinate through.
#[derive(Debug, Default)]
pub struct SharedWorld {
    entities: DashMap<EntityId, Entity>,
    mailboxes: DashMap<AgentId, Vec<WorldMessage>>,
    events: EventBus,
    running: AtomicBool,
    maintenance: parking_lot::Mutex<Option<MaintenanceHandle>>,
}

impl SharedWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            ..Default::default()
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------
    // Agents and mailboxes
    // ------------------------------------------------------------------

    /// Add a mailbox for an agent. Re-registering keeps the existing queue.
    pub fn register_agent(&self, agent_id: &AgentId) {
        self.mailboxes.entry(agent_id.clone()).or_default();
        tracing::info!(agent_id = %agent_id, "agent joined the world");
    }

    /// Remove an agent's mailbox, dropping any undelivered messages.
    pub fn unregister_agent(&self, agent_id: &AgentId) {
        self.mailboxes.remove(agent_id);
        tracing::info!(agent_id = %agent_id, "agent left the world");
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.mailboxes.iter().map(|e| e.key().clone()).collect()
    }

    /// Append a message to one mailbox and announce it on the bus.
    pub fn send_message(&self, to: &AgentId, message: WorldMessage) -> Result<(), WorldError> {
        match self.mailboxes.get_mut(to) {
            Some(mut queue) => {
                queue.push(message.clone());
                drop(queue);
                self.events.emit(&WorldEvent::MessageReceived {
                    to: to.clone(),
                    message,
                });
                Ok(())
            }
            None => Err(WorldError::UnknownAgent(to.to_string())),
        }
    }

    /// Append a message to every mailbox except the excluded sender's.
    pub fn broadcast(&self, message: WorldMessage, exclude: Option<&AgentId>) {
        for mut entry in self.mailboxes.iter_mut() {
            if Some(entry.key()) == exclude {
                continue;
            }
            entry.value_mut().push(message.clone());
        }
    }

    /// Drain and return an agent's mailbox atomically (read-and-clear under
    /// the mailbox entry guard).
    pub fn drain_messages(&self, agent_id: &AgentId) -> Vec<WorldMessage> {
        self.mailboxes
            .get_mut(agent_id)
            .map(|mut queue| std::mem::take(queue.value_mut()))
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Register an entity, assigning an id when the draft carries none.
    pub fn register_entity(&self, draft: EntityDraft, created_by: Option<&AgentId>) -> Entity {
        let mut data = draft.data;
        // The payload carries its own category tag; backfill it from the
        // registry kind so filtered views stay coherent.
        if let serde_json::Value::Object(map) = &mut data {
            map.entry("type")
                .or_insert_with(|| serde_json::Value::String(draft.kind.clone()));
        }
        let entity = Entity {
            id: draft.id.unwrap_or_else(EntityId::generate),
            kind: draft.kind,
            data,
            location: draft.location,
            owned_by: draft.owned_by,
            created_by: created_by.cloned(),
            created_at: Utc::now(),
        };
        self.entities.insert(entity.id.clone(), entity.clone());
        self.events.emit(&WorldEvent::EntityCreated {
            entity: entity.clone(),
        });
        entity
    }

    pub fn get_entity(&self, id: &EntityId) -> Option<Entity> {
        self.entities.get(id).map(|e| e.clone())
    }

    /// Merge-patch one entity under its entry guard.
    pub fn update_entity(&self, id: &EntityId, patch: EntityPatch) -> Result<Entity, WorldError> {
        let (previous, current) = {
            let mut entry = self
                .entities
                .get_mut(id)
                .ok_or_else(|| WorldError::EntityNotFound(id.to_string()))?;
            let previous = entry.clone();
            patch.apply(entry.value_mut());
            (previous, entry.clone())
        };
        self.events.emit(&WorldEvent::EntityUpdated {
            previous,
            current: current.clone(),
        });
        Ok(current)
    }

    /// Physically delete an entity (explicit consumption only).
    pub fn remove_entity(&self, id: &EntityId) -> Result<Entity, WorldError> {
        let (_, entity) = self
            .entities
            .remove(id)
            .ok_or_else(|| WorldError::EntityNotFound(id.to_string()))?;
        self.events.emit(&WorldEvent::EntityRemoved {
            entity: entity.clone(),
        });
        Ok(entity)
    }

    /// Eventually-consistent list of every entity.
    pub fn all_entities(&self) -> Vec<Entity> {
        self.entities.iter().map(|e| e.clone()).collect()
    }

    pub fn entities_by_location(&self, location: &str) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|e| e.location.as_deref() == Some(location))
            .map(|e| e.clone())
            .collect()
    }

    pub fn entities_by_kind(&self, kind: &str) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|e| e.data_kind() == kind)
            .map(|e| e.clone())
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ------------------------------------------------------------------
    // Snapshot and lifecycle
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> WorldSnapshot {
        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_location: BTreeMap<String, usize> = BTreeMap::new();
        let mut owned = 0usize;
        let mut total = 0usize;
        for entity in self.entities.iter() {
            total += 1;
            if entity.owned_by.is_some() {
                owned += 1;
            }
            *by_kind.entry(entity.data_kind().to_string()).or_default() += 1;
            let location = entity.location.clone().unwrap_or_else(|| "unknown".into());
            *by_location.entry(location).or_default() += 1;
        }
        WorldSnapshot {
            agent_count: self.mailboxes.len(),
            entity_count: total,
            owned_entities: owned,
            entities_by_kind: by_kind,
            entities_by_location: by_location,
            taken_at: Utc::now(),
        }
    }

    /// Stop the maintenance tick and announce shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.maintenance.lock().take() {
            handle.stop();
        }
        self.events.emit(&WorldEvent::WorldShutdown);
        tracing::info!("shared world shut down");
    }

    pub(crate) fn store_maintenance(&self, handle: MaintenanceHandle) {
        let mut slot = self.maintenance.lock();
        if let Some(previous) = slot.replace(handle) {
            previous.stop();
        }
    }
}
