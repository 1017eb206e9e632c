//! Time-boxed borrow leases on owned entities.
//!
//! At most one active lease per entity. Expiry is evaluated lazily against
//! the clock whenever a lease is consulted, so access control stays correct
//! even if the maintenance sweep never runs.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;
use crate::id::{AgentId, EntityId};
use crate::world::{Entity, SharedWorld, WorldMessage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub borrowed_by: AgentId,
    pub borrowed_from: AgentId,
    pub borrowed_until: DateTime<Utc>,
}

impl BorrowRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.borrowed_until
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.borrowed_until - now).num_seconds().max(0)
    }
}

/// All active leases, keyed by entity.
#[derive(Debug, Default)]
pub struct BorrowLedger {
    leases: DashMap<EntityId, BorrowRecord>,
}

impl BorrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active, non-expired lease on an entity, if any.
    pub fn active_lease(&self, entity_id: &EntityId) -> Option<BorrowRecord> {
        let now = Utc::now();
        let record = self.leases.get(entity_id)?.clone();
        if record.is_expired(now) {
            drop(self.leases.remove_if(entity_id, |_, r| r.is_expired(now)));
            None
        } else {
            Some(record)
        }
    }

    /// Whether `agent` may use `entity` right now: unowned entities are free
    /// for all, owners keep access unless the entity is out on loan, and a
    /// live lease grants access to the borrower alone.
    pub fn can_use(&self, entity: &Entity, agent: &AgentId) -> bool {
        let owner = match &entity.owned_by {
            Some(owner) => owner,
            None => return true,
        };
        match self.active_lease(&entity.id) {
            Some(lease) => lease.borrowed_by == *agent,
            None => owner == agent,
        }
    }

    /// Lend an owned entity to another agent for `duration`.
    ///
    /// Only the owner may lend, and only while no other lease is live. The
    /// borrower is notified through their mailbox when they have one.
    pub fn lend(
        &self,
        world: &SharedWorld,
        entity: &Entity,
        caller: &AgentId,
        to: &AgentId,
        duration: Duration,
    ) -> Result<BorrowRecord, WorldError> {
        match &entity.owned_by {
            Some(owner) if owner == caller => {}
            Some(owner) => {
                return Err(WorldError::OwnershipConflict {
                    entity_id: entity.id.to_string(),
                    owner: owner.to_string(),
                })
            }
            None => {
                return Err(WorldError::OwnershipConflict {
                    entity_id: entity.id.to_string(),
                    owner: "nobody".to_string(),
                })
            }
        }

        let record = BorrowRecord {
            borrowed_by: to.clone(),
            borrowed_from: caller.clone(),
            borrowed_until: Utc::now() + duration,
        };

        // Insert-if-absent under the entry guard so two concurrent lends
        // cannot both succeed.
        let now = Utc::now();
        let mut conflict = None;
        let entry = self.leases.entry(entity.id.clone());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(record.clone());
                } else {
                    conflict = Some(occupied.get().borrowed_by.clone());
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
            }
        }
        if let Some(borrower) = conflict {
            return Err(WorldError::BorrowConflict {
                entity_id: entity.id.to_string(),
                borrower: borrower.to_string(),
            });
        }

        let name = entity.name().unwrap_or(entity.id.as_str());
        let _ = world.send_message(
            to,
            WorldMessage::new(
                caller.clone(),
                "borrow_notification",
                format!(
                    "{caller} lent you '{name}' for {} seconds",
                    duration.num_seconds()
                ),
            ),
        );
        tracing::info!(
            entity_id = %entity.id,
            from = %caller,
            to = %to,
            until = %record.borrowed_until,
            "entity lent"
        );
        Ok(record)
    }

    /// Return a borrowed entity early. Only the current borrower may return.
    pub fn return_entity(
        &self,
        world: &SharedWorld,
        entity: &Entity,
        caller: &AgentId,
    ) -> Result<(), WorldError> {
        let lease = self
            .active_lease(&entity.id)
            .ok_or_else(|| WorldError::NotBorrowed(entity.id.to_string()))?;
        if lease.borrowed_by != *caller {
            return Err(WorldError::NotBorrower(entity.id.to_string()));
        }
        self.leases.remove(&entity.id);

        let name = entity.name().unwrap_or(entity.id.as_str());
        let _ = world.send_message(
            &lease.borrowed_from,
            WorldMessage::new(
                caller.clone(),
                "borrow_notification",
                format!("{caller} returned '{name}'"),
            ),
        );
        tracing::info!(entity_id = %entity.id, by = %caller, "entity returned");
        Ok(())
    }

    /// Drop a lease without ceremony, e.g. when the entity is consumed.
    pub fn clear(&self, entity_id: &EntityId) {
        self.leases.remove(entity_id);
    }

    /// Remove every expired lease. Advisory cleanup for the maintenance
    /// tick; [`active_lease`](Self::active_lease) already ignores expired
    /// records.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.leases.len();
        self.leases.retain(|_, record| !record.is_expired(now));
        before - self.leases.len()
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owned(id: &str, owner: &str) -> Entity {
        Entity {
            id: EntityId::new(id),
            kind: "tool".to_string(),
            data: json!({"type": "tool", "name": id}),
            location: Some("kitchen".to_string()),
            owned_by: Some(AgentId::new(owner)),
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn world_with(agents: &[&str]) -> std::sync::Arc<SharedWorld> {
        let world = SharedWorld::new();
        for agent in agents {
            world.register_agent(&AgentId::new(*agent));
        }
        world
    }

    #[test]
    fn lease_grants_borrower_and_blocks_owner() {
        let world = world_with(&["chef", "gardener"]);
        let ledger = BorrowLedger::new();
        let knife = owned("knife_1", "chef");
        let chef = AgentId::new("chef");
        let gardener = AgentId::new("gardener");

        assert!(ledger.can_use(&knife, &chef));
        assert!(!ledger.can_use(&knife, &gardener));

        ledger
            .lend(&world, &knife, &chef, &gardener, Duration::seconds(60))
            .unwrap();
        assert!(ledger.can_use(&knife, &gardener));
        assert!(!ledger.can_use(&knife, &chef), "owner blocked while lent");

        // The borrower got a mailbox notification.
        let inbox = world.drain_messages(&gardener);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, "borrow_notification");
    }

    #[test]
    fn only_owner_may_lend_and_double_lend_is_rejected() {
        let world = world_with(&["chef", "gardener", "keeper"]);
        let ledger = BorrowLedger::new();
        let knife = owned("knife_1", "chef");
        let chef = AgentId::new("chef");
        let gardener = AgentId::new("gardener");
        let keeper = AgentId::new("keeper");

        assert!(matches!(
            ledger.lend(&world, &knife, &gardener, &keeper, Duration::seconds(60)),
            Err(WorldError::OwnershipConflict { .. })
        ));

        ledger
            .lend(&world, &knife, &chef, &gardener, Duration::seconds(60))
            .unwrap();
        assert!(matches!(
            ledger.lend(&world, &knife, &chef, &keeper, Duration::seconds(60)),
            Err(WorldError::BorrowConflict { .. })
        ));
    }

    #[test]
    fn expired_lease_restores_owner_access_lazily() {
        let world = world_with(&["chef", "gardener"]);
        let ledger = BorrowLedger::new();
        let knife = owned("knife_1", "chef");
        let chef = AgentId::new("chef");
        let gardener = AgentId::new("gardener");

        // A lease that is already past its deadline.
        ledger
            .lend(&world, &knife, &chef, &gardener, Duration::seconds(-1))
            .unwrap();
        assert!(!ledger.can_use(&knife, &gardener));
        assert!(ledger.can_use(&knife, &chef));
        assert!(ledger.active_lease(&knife.id).is_none());
    }

    #[test]
    fn return_is_borrower_only_and_notifies_owner() {
        let world = world_with(&["chef", "gardener", "keeper"]);
        let ledger = BorrowLedger::new();
        let knife = owned("knife_1", "chef");
        let chef = AgentId::new("chef");
        let gardener = AgentId::new("gardener");
        let keeper = AgentId::new("keeper");

        ledger
            .lend(&world, &knife, &chef, &gardener, Duration::seconds(60))
            .unwrap();
        world.drain_messages(&gardener);

        assert!(matches!(
            ledger.return_entity(&world, &knife, &keeper),
            Err(WorldError::NotBorrower(_))
        ));
        ledger.return_entity(&world, &knife, &gardener).unwrap();
        assert!(ledger.can_use(&knife, &chef));

        let inbox = world.drain_messages(&chef);
        assert_eq!(inbox.len(), 1);
        assert!(inbox[0].content.contains("returned"));

        assert!(matches!(
            ledger.return_entity(&world, &knife, &gardener),
            Err(WorldError::NotBorrowed(_))
        ));
    }

    #[test]
    fn sweep_removes_only_expired_leases() {
        let world = world_with(&["chef", "gardener"]);
        let ledger = BorrowLedger::new();
        let chef = AgentId::new("chef");
        let gardener = AgentId::new("gardener");

        ledger
            .lend(&world, &owned("a", "chef"), &chef, &gardener, Duration::seconds(-5))
            .unwrap();
        ledger
            .lend(&world, &owned("b", "chef"), &chef, &gardener, Duration::seconds(300))
            .unwrap();

        assert_eq!(ledger.sweep_expired(Utc::now()), 1);
        assert_eq!(ledger.len(), 1);
    }
}
