//! Per-agent execution state.
//!
//! One `RequestContext` is owned by exactly one runtime and mutated only
//! from that runtime's task, so its fields need no interior locking. Shared
//! collaborators (world, resource manager) are reached through `Arc`s.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WorldError};
use crate::id::{AgentId, EntityId, ResourceId};
use crate::memory::AgentMemory;
use crate::resource::ResourceManager;
use crate::tool::{ToolCatalog, ToolSpec};
use crate::world::{Entity, EntityDraft, SharedWorld, WorldMessage};

/// Lifecycle of one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Pending,
    Analyzing,
    Executing,
    Completed,
    Failed,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    System,
    Agent,
    World,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub role: HistoryRole,
    pub content: String,
}

/// One planned tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub operation: String,
    #[serde(default)]
    pub parameters: Value,
}

impl Action {
    pub fn new(operation: impl Into<String>, parameters: Value) -> Self {
        Self {
            operation: operation.into(),
            parameters,
        }
    }
}

/// The recorded outcome of one executed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub operation: String,
    pub parameters: Value,
    pub result: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything one agent run accumulates: conversation history, the current
/// plan, memory tiers, the resource ledger, and the report surface.
pub struct RequestContext {
    agent_id: AgentId,
    status: AgentStatus,
    terminate_requested: bool,

    history: Vec<HistoryEntry>,
    plan: Vec<Action>,
    execution_history: Vec<ExecutionRecord>,
    pub memory: AgentMemory,

    world: Arc<SharedWorld>,
    resources: Arc<ResourceManager>,
    /// Local reference counts, mirroring what this context holds globally.
    resource_refs: HashMap<ResourceId, u32>,

    tools: Arc<ToolCatalog>,
    tool_details: HashMap<String, ToolSpec>,

    pub steps: Vec<String>,
    pub final_response: Option<String>,
    pub error: Option<String>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("agent_id", &self.agent_id)
            .field("status", &self.status)
            .field("history_len", &self.history.len())
            .field("plan_len", &self.plan.len())
            .finish()
    }
}

impl RequestContext {
    pub fn new(
        agent_id: AgentId,
        world: Arc<SharedWorld>,
        resources: Arc<ResourceManager>,
        tools: Arc<ToolCatalog>,
    ) -> Self {
        Self {
            agent_id,
            status: AgentStatus::Pending,
            terminate_requested: false,
            history: Vec::new(),
            plan: Vec::new(),
            execution_history: Vec::new(),
            memory: AgentMemory::new(),
            world,
            resources,
            resource_refs: HashMap::new(),
            tools,
            tool_details: HashMap::new(),
            steps: Vec::new(),
            final_response: None,
            error: None,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
    }

    /// Request cooperative termination; checked at the top of each cycle.
    pub fn terminate(&mut self) {
        self.terminate_requested = true;
        self.status = AgentStatus::Terminated;
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate_requested
    }

    pub fn is_finished(&self) -> bool {
        self.terminate_requested
            || matches!(self.status, AgentStatus::Completed | AgentStatus::Failed)
    }

    /// Record a fatal error and mark the run failed.
    pub fn set_error(&mut self, details: impl Into<String>) {
        self.error = Some(details.into());
        self.status = AgentStatus::Failed;
    }

    // ------------------------------------------------------------------
    // History and plan
    // ------------------------------------------------------------------

    pub fn push_history(&mut self, role: HistoryRole, content: impl Into<String>) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            role,
            content: content.into(),
        });
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn recent_history(&self, limit: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    /// Conversation turn counter; memory expiry is measured in these.
    pub fn current_turn(&self) -> u32 {
        (self.history.len() / 2) as u32
    }

    pub fn set_plan(&mut self, plan: Vec<Action>) {
        self.plan = plan;
    }

    pub fn take_plan(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.plan)
    }

    pub fn record_execution(&mut self, operation: &str, parameters: Value, result: impl Into<String>) {
        let result = result.into();
        self.push_history(HistoryRole::World, format!("[{operation}] {result}"));
        self.execution_history.push(ExecutionRecord {
            operation: operation.to_string(),
            parameters,
            result,
            timestamp: Utc::now(),
        });
    }

    pub fn execution_history(&self) -> &[ExecutionRecord] {
        &self.execution_history
    }

    // ------------------------------------------------------------------
    // Resource ledger
    // ------------------------------------------------------------------

    /// Park a payload in the shared store, holding one reference from this
    /// context and a descriptor in reference memory.
    pub fn register_resource(
        &mut self,
        payload: Value,
        description: impl Into<String>,
    ) -> Result<ResourceId> {
        let description = description.into();
        let id = self.resources.register(payload, description.clone())?;
        self.resources.add_reference(&id);
        *self.resource_refs.entry(id.clone()).or_insert(0) += 1;
        self.memory.add_reference(id.clone(), description);
        Ok(id)
    }

    /// Fetch a payload, taking an additional reference on success.
    pub fn get_resource(&mut self, id: &ResourceId) -> Option<Value> {
        let payload = self.resources.get(id)?;
        self.resources.add_reference(id);
        *self.resource_refs.entry(id.clone()).or_insert(0) += 1;
        Some(payload)
    }

    /// Drop one locally-held reference.
    pub fn release_resource(&mut self, id: &ResourceId) {
        let Some(count) = self.resource_refs.get_mut(id) else {
            return;
        };
        *count -= 1;
        let exhausted = *count == 0;
        if exhausted {
            self.resource_refs.remove(id);
            self.memory.remove_reference(id);
        }
        self.resources.release(id);
    }

    pub fn resource_references(&self) -> impl Iterator<Item = (&ResourceId, u32)> {
        self.resource_refs.iter().map(|(id, count)| (id, *count))
    }

    /// Teardown: release every reference this context still holds.
    pub fn release_all_resources(&mut self) {
        let held: Vec<(ResourceId, u32)> = self
            .resource_refs
            .drain()
            .collect();
        for (id, count) in held {
            for _ in 0..count {
                self.resources.release(&id);
            }
            self.memory.remove_reference(&id);
        }
    }

    // ------------------------------------------------------------------
    // World facade (scoped to this agent)
    // ------------------------------------------------------------------

    pub fn world(&self) -> &Arc<SharedWorld> {
        &self.world
    }

    pub fn send_message(&self, to: &AgentId, content: impl Into<String>) -> std::result::Result<(), WorldError> {
        self.world
            .send_message(to, WorldMessage::agent_message(self.agent_id.clone(), content))
    }

    pub fn broadcast(&self, content: impl Into<String>) {
        self.world.broadcast(
            WorldMessage::broadcast_message(self.agent_id.clone(), content),
            Some(&self.agent_id),
        );
    }

    pub fn register_entity(&self, draft: EntityDraft) -> Entity {
        self.world.register_entity(draft, Some(&self.agent_id))
    }

    pub fn get_entity(&self, id: &EntityId) -> Option<Entity> {
        self.world.get_entity(id)
    }

    // ------------------------------------------------------------------
    // Tools
    // ------------------------------------------------------------------

    pub fn tools(&self) -> &ToolCatalog {
        &self.tools
    }

    /// Catalog lookup with a per-context cache, so repeated detail requests
    /// for the same tool stay cheap.
    pub fn tool_detail(&mut self, name: &str) -> Option<ToolSpec> {
        if let Some(spec) = self.tool_details.get(name) {
            return Some(spec.clone());
        }
        let spec = self.tools.get(name)?.clone();
        self.tool_details.insert(name.to_string(), spec.clone());
        Some(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> RequestContext {
        RequestContext::new(
            AgentId::new("chef"),
            SharedWorld::new(),
            Arc::new(ResourceManager::new()),
            Arc::new(ToolCatalog::new()),
        )
    }

    #[test]
    fn terminate_and_error_both_finish_the_context() {
        let mut ctx = context();
        assert!(!ctx.is_finished());

        ctx.set_error("decision step exploded");
        assert_eq!(ctx.status(), AgentStatus::Failed);
        assert!(ctx.is_finished());

        let mut ctx = context();
        ctx.terminate();
        assert_eq!(ctx.status(), AgentStatus::Terminated);
        assert!(ctx.is_finished());
    }

    #[test]
    fn turn_counter_advances_per_exchange() {
        let mut ctx = context();
        assert_eq!(ctx.current_turn(), 0);
        ctx.push_history(HistoryRole::World, "a message arrived");
        ctx.push_history(HistoryRole::Agent, "a reply");
        assert_eq!(ctx.current_turn(), 1);
    }

    #[test]
    fn recent_history_clamps_to_available_entries() {
        let mut ctx = context();
        ctx.push_history(HistoryRole::World, "one");
        ctx.push_history(HistoryRole::World, "two");
        assert_eq!(ctx.recent_history(10).len(), 2);
        assert_eq!(ctx.recent_history(1)[0].content, "two");
    }

    #[test]
    fn resource_ledger_tracks_local_and_global_counts() {
        let mut ctx = context();
        let id = ctx.register_resource(json!({"rows": 40}), "query result").unwrap();
        assert!(ctx.memory.reference_entries().any(|(r, _)| r == &id));

        // A second fetch takes a second local reference.
        assert!(ctx.get_resource(&id).is_some());
        assert_eq!(ctx.resource_references().find(|(r, _)| *r == &id).unwrap().1, 2);

        ctx.release_resource(&id);
        assert!(ctx.memory.reference_entries().any(|(r, _)| r == &id));
        ctx.release_resource(&id);
        assert!(!ctx.memory.reference_entries().any(|(r, _)| r == &id));
        assert!(ctx.get_resource(&id).is_none(), "global entry deleted at zero");
    }

    #[test]
    fn release_all_resources_empties_the_store() {
        let mut ctx = context();
        let a = ctx.register_resource(json!(1), "a").unwrap();
        ctx.register_resource(json!(2), "b").unwrap();
        ctx.get_resource(&a);

        ctx.release_all_resources();
        assert_eq!(ctx.resource_references().count(), 0);
        assert!(ctx.get_resource(&a).is_none());
    }

    #[test]
    fn execution_records_mirror_into_history() {
        let mut ctx = context();
        ctx.record_execution("world:explore", json!({"location": "kitchen"}), "found 2 entities");
        assert_eq!(ctx.execution_history().len(), 1);
        assert!(ctx.history()[0].content.contains("[world:explore]"));
    }
}
