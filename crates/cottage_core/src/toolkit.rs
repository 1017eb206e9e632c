//! The `world` tool namespace: everything an agent can do to the shared
//! world, with ownership, borrow, and quota policy enforced at the call
//! site.
//!
//! Failures come back as [`WorldError`] values; the execution step renders
//! them into action results, so a denied claim or an exhausted quota is
//! something the agent can react to rather than a crash.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde_json::{json, Value};

use crate::context::RequestContext;
use crate::error::WorldError;
use crate::id::{AgentId, EntityId};
use crate::policy::{BorrowLedger, QuotaTracker};
use crate::runtime::executor::{require_str, ExecutorOutput, ExecutorResult, ToolExecutor};
use crate::tool::ToolSpec;
use crate::world::{Entity, EntityDraft, EntityPatch, SharedWorld};

pub const WORLD_NAMESPACE: &str = "world";

const DEFAULT_LEND_SECONDS: i64 = 300;
const MAX_WAIT_SECONDS: u64 = 30;
const MOVE_DISCOVERY_LIMIT: usize = 3;

/// Shared-world operations offered to every agent.
pub struct WorldToolkit {
    world: Arc<SharedWorld>,
    quotas: Arc<QuotaTracker>,
    borrows: Arc<BorrowLedger>,
    locations: Vec<String>,
    /// Where each agent currently stands; `move_to` keeps it current.
    positions: DashMap<AgentId, String>,
}

impl std::fmt::Debug for WorldToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldToolkit")
            .field("locations", &self.locations)
            .finish()
    }
}

impl WorldToolkit {
    pub fn new(
        world: Arc<SharedWorld>,
        quotas: Arc<QuotaTracker>,
        borrows: Arc<BorrowLedger>,
        locations: Vec<String>,
    ) -> Self {
        Self {
            world,
            quotas,
            borrows,
            locations,
            positions: DashMap::new(),
        }
    }

    pub fn borrows(&self) -> &Arc<BorrowLedger> {
        &self.borrows
    }

    fn position_of(&self, agent: &AgentId) -> Option<String> {
        self.positions.get(agent).map(|p| p.clone())
    }

    fn fetch(&self, id: &EntityId) -> Result<Entity, WorldError> {
        self.world
            .get_entity(id)
            .ok_or_else(|| WorldError::EntityNotFound(id.to_string()))
    }

    /// Deny unless the agent may use the entity right now.
    fn ensure_usable(&self, entity: &Entity, agent: &AgentId) -> Result<(), WorldError> {
        if self.borrows.can_use(entity, agent) {
            Ok(())
        } else {
            Err(WorldError::OwnershipConflict {
                entity_id: entity.id.to_string(),
                owner: entity
                    .owned_by
                    .as_ref()
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "nobody".to_string()),
            })
        }
    }

    fn describe(&self, entity: &Entity, agent: &AgentId) -> Value {
        let lease = self.borrows.active_lease(&entity.id);
        json!({
            "id": entity.id,
            "type": entity.data_kind(),
            "name": entity.name(),
            "location": entity.location,
            "owned_by": entity.owned_by,
            "usable": self.borrows.can_use(entity, agent),
            "borrowed_by": lease.as_ref().map(|l| l.borrowed_by.clone()),
            "borrow_remaining_seconds": lease.map(|l| l.remaining_seconds(Utc::now())),
        })
    }

    fn create_entity(&self, params: &Value, agent: &AgentId) -> ExecutorResult {
        let kind = require_str(params, "type")?;
        let name = require_str(params, "name")?;
        let location = params
            .get("location")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.position_of(agent))
            .ok_or_else(|| WorldError::MissingParameter("location".to_string()))?;
        self.validate_location(&location)?;

        // Check-and-record in one step; a failed attempt never burns a slot.
        let info = self.quotas.try_record(agent, kind)?;

        let mut data = params.get("data").cloned().unwrap_or_else(|| json!({}));
        if let Value::Object(map) = &mut data {
            map.insert("name".to_string(), json!(name));
            map.insert("type".to_string(), json!(kind));
        }
        let entity = self.world.register_entity(
            EntityDraft::new(kind)
                .with_data(data)
                .at(location)
                .owned_by(agent.clone()),
            Some(agent),
        );
        Ok(ExecutorOutput::text(format!(
            "Created '{}' ({}) at {} (quota {}: {}/{})",
            name,
            entity.id,
            entity.location.as_deref().unwrap_or("unknown"),
            info.category,
            info.used,
            info.max,
        )))
    }

    fn explore(&self, params: &Value, agent: &AgentId) -> ExecutorResult {
        let location = params
            .get("location")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.position_of(agent));
        let kind = params.get("type").and_then(Value::as_str);
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize);
        let shuffle = params
            .get("shuffle")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut found: Vec<Entity> = match &location {
            Some(location) => self.world.entities_by_location(location),
            None => self.world.all_entities(),
        };
        if let Some(kind) = kind {
            found.retain(|e| e.data_kind() == kind);
        }
        if shuffle {
            found.shuffle(&mut rand::thread_rng());
        }
        if let Some(limit) = limit {
            found.truncate(limit);
        }

        let described: Vec<Value> = found.iter().map(|e| self.describe(e, agent)).collect();
        Ok(ExecutorOutput::Plain(json!({
            "location": location,
            "count": described.len(),
            "entities": described,
        })))
    }

    fn claim(&self, params: &Value, agent: &AgentId) -> ExecutorResult {
        let id = EntityId::new(require_str(params, "entity_id")?);
        let entity = self.fetch(&id)?;

        match &entity.owned_by {
            Some(owner) if owner == agent => {
                return Ok(ExecutorOutput::text(format!(
                    "You already own '{}'",
                    entity.name().unwrap_or(id.as_str())
                )))
            }
            Some(owner) => {
                return Err(WorldError::OwnershipConflict {
                    entity_id: id.to_string(),
                    owner: owner.to_string(),
                })
            }
            None => {}
        }
        if let Some(lease) = self.borrows.active_lease(&id) {
            if lease.borrowed_by != *agent {
                return Err(WorldError::BorrowConflict {
                    entity_id: id.to_string(),
                    borrower: lease.borrowed_by.to_string(),
                });
            }
        }

        let claimed = self.world.update_entity(&id, EntityPatch::set_owner(agent.clone()))?;
        Ok(ExecutorOutput::text(format!(
            "Claimed '{}' ({})",
            claimed.name().unwrap_or(id.as_str()),
            id
        )))
    }

    fn consume(&self, params: &Value, agent: &AgentId) -> ExecutorResult {
        let id = EntityId::new(require_str(params, "entity_id")?);
        let entity = self.fetch(&id)?;
        if entity.data_kind() != "food" {
            return Err(WorldError::WrongKind {
                entity_id: id.to_string(),
                expected: "food".to_string(),
            });
        }
        self.ensure_usable(&entity, agent)?;

        let removed = self.world.remove_entity(&id)?;
        self.borrows.clear(&id);
        let hunger = removed
            .data
            .get("hungerValue")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(ExecutorOutput::text(format!(
            "Ate '{}', restoring {} hunger",
            removed.name().unwrap_or(id.as_str()),
            hunger
        )))
    }

    fn lend(&self, params: &Value, agent: &AgentId) -> ExecutorResult {
        let id = EntityId::new(require_str(params, "entity_id")?);
        let to = AgentId::new(require_str(params, "to")?);
        let seconds = params
            .get("duration_seconds")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_LEND_SECONDS)
            .max(1);
        let entity = self.fetch(&id)?;
        let record = self.borrows.lend(
            &self.world,
            &entity,
            agent,
            &to,
            ChronoDuration::seconds(seconds),
        )?;
        Ok(ExecutorOutput::text(format!(
            "Lent '{}' to {} until {}",
            entity.name().unwrap_or(id.as_str()),
            to,
            record.borrowed_until.format("%H:%M:%S")
        )))
    }

    fn return_entity(&self, params: &Value, agent: &AgentId) -> ExecutorResult {
        let id = EntityId::new(require_str(params, "entity_id")?);
        let entity = self.fetch(&id)?;
        self.borrows.return_entity(&self.world, &entity, agent)?;
        Ok(ExecutorOutput::text(format!(
            "Returned '{}' to its owner",
            entity.name().unwrap_or(id.as_str())
        )))
    }

    fn check_quota(&self, params: &Value, agent: &AgentId) -> ExecutorResult {
        match params.get("category").and_then(Value::as_str) {
            Some(category) => {
                let info = self.quotas.check(agent, category);
                Ok(ExecutorOutput::text(format!(
                    "Quota '{}': {}/{} used, {} remaining",
                    info.category,
                    info.used,
                    info.max,
                    info.remaining()
                )))
            }
            None => {
                let infos = self.quotas.check_all(agent);
                if infos.is_empty() {
                    return Ok(ExecutorOutput::text("No creation limits configured"));
                }
                let lines: Vec<String> = infos
                    .iter()
                    .map(|i| format!("- {}: {}/{} used", i.category, i.used, i.max))
                    .collect();
                Ok(ExecutorOutput::text(lines.join("\n")))
            }
        }
    }

    fn move_to(&self, params: &Value, agent: &AgentId) -> ExecutorResult {
        let location = require_str(params, "location")?;
        self.validate_location(location)?;
        self.positions.insert(agent.clone(), location.to_string());

        let mut nearby = self.world.entities_by_location(location);
        nearby.truncate(MOVE_DISCOVERY_LIMIT);
        let names: Vec<&str> = nearby
            .iter()
            .map(|e| e.name().unwrap_or(e.id.as_str()))
            .collect();
        let sight = if names.is_empty() {
            "nothing of note".to_string()
        } else {
            names.join(", ")
        };
        Ok(ExecutorOutput::text(format!(
            "Moved to {location}. You see: {sight}"
        )))
    }

    fn validate_location(&self, location: &str) -> Result<(), WorldError> {
        if self.locations.iter().any(|l| l == location) {
            Ok(())
        } else {
            Err(WorldError::InvalidLocation {
                location: location.to_string(),
                valid: self.locations.join(", "),
            })
        }
    }

    /// Specs for every operation in this namespace.
    pub fn catalog() -> Vec<ToolSpec> {
        fn object(properties: Value, required: &[&str]) -> Value {
            json!({"type": "object", "properties": properties, "required": required})
        }

        vec![
            ToolSpec::new(
                "world:create_entity",
                "Create a new owned entity, subject to your creation quota",
                object(
                    json!({
                        "type": {"type": "string", "description": "Entity category, e.g. food, tool, plant"},
                        "name": {"type": "string"},
                        "location": {"type": "string"},
                        "data": {"type": "object"},
                    }),
                    &["type", "name"],
                ),
            ),
            ToolSpec::new(
                "world:get_entity",
                "Inspect one entity, including ownership and borrow state",
                object(json!({"entity_id": {"type": "string"}}), &["entity_id"]),
            ),
            ToolSpec::new(
                "world:explore",
                "List entities, optionally filtered by location and type",
                object(
                    json!({
                        "location": {"type": "string"},
                        "type": {"type": "string"},
                        "limit": {"type": "integer"},
                        "shuffle": {"type": "boolean"},
                    }),
                    &[],
                ),
            ),
            ToolSpec::new(
                "world:claim",
                "Take ownership of an unowned entity",
                object(json!({"entity_id": {"type": "string"}}), &["entity_id"]),
            ),
            ToolSpec::new(
                "world:consume",
                "Eat a food entity you can use; the entity is removed",
                object(json!({"entity_id": {"type": "string"}}), &["entity_id"]),
            ),
            ToolSpec::new(
                "world:lend",
                "Lend an entity you own to another agent for a while",
                object(
                    json!({
                        "entity_id": {"type": "string"},
                        "to": {"type": "string"},
                        "duration_seconds": {"type": "integer"},
                    }),
                    &["entity_id", "to"],
                ),
            ),
            ToolSpec::new(
                "world:return_entity",
                "Return an entity you borrowed",
                object(json!({"entity_id": {"type": "string"}}), &["entity_id"]),
            ),
            ToolSpec::new(
                "world:check_quota",
                "Check your creation quota, for one category or all",
                object(json!({"category": {"type": "string"}}), &[]),
            ),
            ToolSpec::new(
                "world:send_message",
                "Send a direct message to another agent",
                object(
                    json!({"to": {"type": "string"}, "content": {"type": "string"}}),
                    &["to", "content"],
                ),
            ),
            ToolSpec::new(
                "world:broadcast",
                "Send a message to every other agent",
                object(json!({"content": {"type": "string"}}), &["content"]),
            ),
            ToolSpec::new(
                "world:move_to",
                "Move to a location and look around",
                object(json!({"location": {"type": "string"}}), &["location"]),
            ),
            ToolSpec::new(
                "world:wait",
                "Do nothing for a few seconds",
                object(json!({"seconds": {"type": "integer"}}), &[]),
            ),
        ]
    }
}

#[async_trait]
impl ToolExecutor for WorldToolkit {
    async fn execute(&self, tool: &str, params: &Value, ctx: &mut RequestContext) -> ExecutorResult {
        let agent = ctx.agent_id().clone();
        match tool {
            "create_entity" => self.create_entity(params, &agent),
            "get_entity" => {
                let id = EntityId::new(require_str(params, "entity_id")?);
                let entity = self.fetch(&id)?;
                Ok(ExecutorOutput::Plain(self.describe(&entity, &agent)))
            }
            "explore" => self.explore(params, &agent),
            "claim" => self.claim(params, &agent),
            "consume" => self.consume(params, &agent),
            "lend" => self.lend(params, &agent),
            "return_entity" => self.return_entity(params, &agent),
            "check_quota" => self.check_quota(params, &agent),
            "send_message" => {
                let to = AgentId::new(require_str(params, "to")?);
                let content = require_str(params, "content")?;
                ctx.send_message(&to, content)?;
                Ok(ExecutorOutput::text(format!("Message sent to {to}")))
            }
            "broadcast" => {
                let content = require_str(params, "content")?;
                ctx.broadcast(content);
                Ok(ExecutorOutput::text("Broadcast sent"))
            }
            "move_to" => self.move_to(params, &agent),
            "wait" => {
                let seconds = params
                    .get("seconds")
                    .and_then(Value::as_u64)
                    .unwrap_or(1)
                    .min(MAX_WAIT_SECONDS);
                tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
                Ok(ExecutorOutput::text(format!("Waited {seconds} seconds")))
            }
            other => Err(WorldError::UnknownTool(format!("{WORLD_NAMESPACE}:{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceManager;
    use crate::tool::ToolCatalog;

    struct Fixture {
        world: Arc<SharedWorld>,
        toolkit: WorldToolkit,
    }

    impl Fixture {
        fn new() -> Self {
            let world = SharedWorld::new();
            let quotas = Arc::new(QuotaTracker::new());
            let toolkit = WorldToolkit::new(
                world.clone(),
                quotas,
                Arc::new(BorrowLedger::new()),
                vec!["kitchen".to_string(), "garden".to_string(), "bedroom".to_string()],
            );
            Self { world, toolkit }
        }

        fn ctx(&self, agent: &str) -> RequestContext {
            self.world.register_agent(&AgentId::new(agent));
            RequestContext::new(
                AgentId::new(agent),
                self.world.clone(),
                Arc::new(ResourceManager::new()),
                Arc::new(ToolCatalog::new()),
            )
        }

        async fn call(&self, ctx: &mut RequestContext, tool: &str, params: Value) -> ExecutorResult {
            self.toolkit.execute(tool, &params, ctx).await
        }
    }

    fn text_of(output: ExecutorOutput) -> String {
        match output {
            ExecutorOutput::Structured { response, .. } => response,
            ExecutorOutput::Plain(value) => value.to_string(),
        }
    }

    fn seed_apple(world: &SharedWorld) -> Entity {
        world.register_entity(
            EntityDraft::new("food")
                .with_data(json!({"type": "food", "name": "apple", "hungerValue": 20}))
                .at("kitchen"),
            None,
        )
    }

    #[tokio::test]
    async fn kitchen_scenario_claim_then_consume() {
        let fx = Fixture::new();
        let mut chef = fx.ctx("chef");
        let mut gardener = fx.ctx("gardener");
        let apple = seed_apple(&fx.world);
        fx.world.register_entity(
            EntityDraft::new("food")
                .with_data(json!({"type": "food", "name": "green apple", "hungerValue": 15}))
                .at("kitchen"),
            None,
        );

        // Explore finds both apples and marks them usable by anyone.
        let explored = fx
            .call(&mut chef, "explore", json!({"location": "kitchen"}))
            .await
            .unwrap();
        let ExecutorOutput::Plain(listing) = explored else {
            panic!("explore returns a payload")
        };
        assert_eq!(listing["count"], 2);
        let entities = listing["entities"].as_array().unwrap();
        assert!(entities.iter().all(|e| e["usable"] == true));

        // Chef claims it; the gardener can no longer consume it.
        fx.call(&mut chef, "claim", json!({"entity_id": apple.id}))
            .await
            .unwrap();
        let denied = fx
            .call(&mut gardener, "consume", json!({"entity_id": apple.id}))
            .await
            .unwrap_err();
        assert!(matches!(denied, WorldError::OwnershipConflict { .. }));

        // The owner eats it; the entity is gone and the hunger value reported.
        let eaten = text_of(
            fx.call(&mut chef, "consume", json!({"entity_id": apple.id}))
                .await
                .unwrap(),
        );
        assert!(eaten.contains("20 hunger"));
        assert!(fx.world.get_entity(&apple.id).is_none());
    }

    #[tokio::test]
    async fn claim_conflicts_and_idempotence() {
        let fx = Fixture::new();
        let mut chef = fx.ctx("chef");
        let mut gardener = fx.ctx("gardener");
        let apple = seed_apple(&fx.world);

        fx.call(&mut chef, "claim", json!({"entity_id": apple.id}))
            .await
            .unwrap();
        // Claiming again is a friendly no-op.
        let again = text_of(
            fx.call(&mut chef, "claim", json!({"entity_id": apple.id}))
                .await
                .unwrap(),
        );
        assert!(again.contains("already own"));

        let denied = fx
            .call(&mut gardener, "claim", json!({"entity_id": apple.id}))
            .await
            .unwrap_err();
        assert!(matches!(denied, WorldError::OwnershipConflict { .. }));
    }

    #[tokio::test]
    async fn creation_quota_allows_two_then_rejects() {
        let fx = Fixture::new();
        let chef_id = AgentId::new("chef");
        fx.toolkit
            .quotas
            .set_limits(&chef_id, [("tool".to_string(), 2)].into_iter().collect());
        let mut chef = fx.ctx("chef");

        for name in ["knife", "pan"] {
            fx.call(
                &mut chef,
                "create_entity",
                json!({"type": "tool", "name": name, "location": "kitchen"}),
            )
            .await
            .unwrap();
        }
        let denied = fx
            .call(
                &mut chef,
                "create_entity",
                json!({"type": "tool", "name": "whisk", "location": "kitchen"}),
            )
            .await
            .unwrap_err();
        assert_eq!(
            denied,
            WorldError::QuotaExceeded {
                category: "tool".to_string(),
                used: 2,
                max: 2,
            }
        );
        assert_eq!(fx.world.entities_by_kind("tool").len(), 2);

        // The check_quota surface agrees.
        let report = text_of(
            fx.call(&mut chef, "check_quota", json!({"category": "tool"}))
                .await
                .unwrap(),
        );
        assert!(report.contains("2/2"));
    }

    #[tokio::test]
    async fn consume_rejects_non_food() {
        let fx = Fixture::new();
        let mut chef = fx.ctx("chef");
        let bed = fx.world.register_entity(
            EntityDraft::new("furniture")
                .with_data(json!({"type": "furniture", "name": "bed"}))
                .at("bedroom"),
            None,
        );

        let err = fx
            .call(&mut chef, "consume", json!({"entity_id": bed.id}))
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::WrongKind { .. }));
    }

    #[tokio::test]
    async fn lend_and_return_through_the_toolkit() {
        let fx = Fixture::new();
        let mut chef = fx.ctx("chef");
        let mut gardener = fx.ctx("gardener");
        let knife = fx.world.register_entity(
            EntityDraft::new("tool")
                .with_data(json!({"type": "tool", "name": "knife"}))
                .at("kitchen")
                .owned_by("chef"),
            None,
        );

        fx.call(
            &mut chef,
            "lend",
            json!({"entity_id": knife.id, "to": "gardener", "duration_seconds": 120}),
        )
        .await
        .unwrap();

        let view = fx
            .call(&mut gardener, "get_entity", json!({"entity_id": knife.id}))
            .await
            .unwrap();
        let ExecutorOutput::Plain(view) = view else { panic!() };
        assert_eq!(view["usable"], true);
        assert_eq!(view["borrowed_by"], "gardener");

        fx.call(&mut gardener, "return_entity", json!({"entity_id": knife.id}))
            .await
            .unwrap();
        assert!(fx.toolkit.borrows.active_lease(&knife.id).is_none());
    }

    #[tokio::test]
    async fn move_to_validates_and_reports_discoveries() {
        let fx = Fixture::new();
        let mut chef = fx.ctx("chef");
        seed_apple(&fx.world);

        let err = fx
            .call(&mut chef, "move_to", json!({"location": "attic"}))
            .await
            .unwrap_err();
        assert!(matches!(err, WorldError::InvalidLocation { .. }));

        let arrived = text_of(
            fx.call(&mut chef, "move_to", json!({"location": "kitchen"}))
                .await
                .unwrap(),
        );
        assert!(arrived.contains("apple"));

        // Exploring without an explicit location uses the current position.
        let explored = fx.call(&mut chef, "explore", json!({})).await.unwrap();
        let ExecutorOutput::Plain(listing) = explored else { panic!() };
        assert_eq!(listing["location"], "kitchen");
    }

    #[tokio::test]
    async fn messaging_reaches_mailboxes() {
        let fx = Fixture::new();
        let mut chef = fx.ctx("chef");
        fx.ctx("gardener");
        fx.ctx("keeper");

        fx.call(
            &mut chef,
            "send_message",
            json!({"to": "gardener", "content": "need carrots"}),
        )
        .await
        .unwrap();
        fx.call(&mut chef, "broadcast", json!({"content": "soup tonight"}))
            .await
            .unwrap();

        let gardener_inbox = fx.world.drain_messages(&AgentId::new("gardener"));
        assert_eq!(gardener_inbox.len(), 2);
        let keeper_inbox = fx.world.drain_messages(&AgentId::new("keeper"));
        assert_eq!(keeper_inbox.len(), 1);
        assert!(fx.world.drain_messages(&AgentId::new("chef")).is_empty());
    }

    #[test]
    fn catalog_covers_every_operation() {
        let specs = WorldToolkit::catalog();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        for tool in [
            "world:create_entity",
            "world:explore",
            "world:claim",
            "world:consume",
            "world:lend",
            "world:return_entity",
            "world:check_quota",
            "world:send_message",
            "world:broadcast",
            "world:move_to",
            "world:wait",
        ] {
            assert!(names.contains(&tool), "missing {tool}");
        }
    }
}
