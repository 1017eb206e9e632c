//! Tool executors and the namespace registry.
//!
//! An operation name is `namespace:tool`; a bare name routes to the
//! registry's explicit `"default"` entry. Executor failures are data, not
//! run failures: [`run_plan`] renders every [`WorldError`] into the action
//! result text and keeps going.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::TerminationHandle;
use crate::context::{AgentStatus, RequestContext};
use crate::error::WorldError;
use crate::memory::{MemoryDirective, DEFAULT_TEMPORARY_EXPIRE_TURNS};

/// What an executed tool hands back.
#[derive(Debug, Clone)]
pub enum ExecutorOutput {
    /// Raw result payload, rendered to text for history.
    Plain(Value),
    /// Response text plus memory updates to fold into the context.
    Structured {
        response: String,
        memory: MemoryDirective,
    },
}

impl ExecutorOutput {
    pub fn text(response: impl Into<String>) -> Self {
        Self::Structured {
            response: response.into(),
            memory: MemoryDirective::default(),
        }
    }
}

pub type ExecutorResult = std::result::Result<ExecutorOutput, WorldError>;

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one tool. `tool` is the bare name, namespace already stripped.
    async fn execute(&self, tool: &str, params: &Value, ctx: &mut RequestContext) -> ExecutorResult;
}

pub const DEFAULT_NAMESPACE: &str = "default";

/// Routes `namespace:tool` operation names to executors.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("namespaces", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, namespace: impl Into<String>, executor: Arc<dyn ToolExecutor>) {
        self.executors.insert(namespace.into(), executor);
    }

    pub fn register_default(&mut self, executor: Arc<dyn ToolExecutor>) {
        self.register(DEFAULT_NAMESPACE, executor);
    }

    /// Split an operation into its executor and bare tool name.
    ///
    /// Unknown namespaces fall back to the default executor with the full
    /// operation name intact, so the default can reject it by name.
    pub fn resolve<'a>(&self, operation: &'a str) -> Option<(Arc<dyn ToolExecutor>, &'a str)> {
        if let Some((namespace, tool)) = operation.split_once(':') {
            if let Some(executor) = self.executors.get(namespace) {
                return Some((executor.clone(), tool));
            }
        }
        self.executors
            .get(DEFAULT_NAMESPACE)
            .map(|executor| (executor.clone(), operation))
    }
}

/// Core-provided execution step: run the context's current plan to the end.
///
/// Every action result, success or failure, is appended to history and the
/// execution record. The termination flag is re-checked between actions so
/// a kill request lands before the next suspension point instead of after
/// the whole plan. Afterwards expired temporary memory is pruned and the
/// context goes back to Analyzing for the next decision.
pub async fn run_plan(
    registry: &ExecutorRegistry,
    ctx: &mut RequestContext,
    termination: &TerminationHandle,
) {
    ctx.set_status(AgentStatus::Executing);
    let plan = ctx.take_plan();
    for action in plan {
        if termination.is_terminated() {
            ctx.terminate();
            break;
        }
        let result_text = match registry.resolve(&action.operation) {
            Some((executor, tool)) => {
                match executor.execute(tool, &action.parameters, ctx).await {
                    Ok(ExecutorOutput::Plain(value)) => render_value(&value),
                    Ok(ExecutorOutput::Structured { response, memory }) => {
                        if !memory.is_empty() {
                            let turn = ctx.current_turn();
                            ctx.memory.apply(memory, turn);
                        }
                        response
                    }
                    Err(err) => {
                        tracing::debug!(
                            agent_id = %ctx.agent_id(),
                            operation = %action.operation,
                            error = %err,
                            "action failed"
                        );
                        format!("Error: {err}")
                    }
                }
            }
            None => format!("Error: {}", WorldError::UnknownTool(action.operation.clone())),
        };
        ctx.record_execution(&action.operation, action.parameters.clone(), result_text);
    }

    let turn = ctx.current_turn();
    ctx.memory.prune_expired(turn);
    if !ctx.is_finished() {
        ctx.set_status(AgentStatus::Analyzing);
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Built-in default executor covering catalog introspection and manual
/// memory management.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetaToolExecutor;

impl MetaToolExecutor {
    /// Specs for the built-in meta tools.
    pub fn catalog() -> Vec<crate::tool::ToolSpec> {
        use crate::tool::ToolSpec;

        fn with_content(extra: Value) -> Value {
            let mut properties = json!({"content": {"type": "string"}});
            if let (Value::Object(map), Value::Object(extra)) = (&mut properties, extra) {
                map.extend(extra);
            }
            json!({"type": "object", "properties": properties, "required": ["content"]})
        }

        vec![
            ToolSpec::meta(
                "list_tools",
                "List every available tool",
                json!({"type": "object", "properties": {}}),
            ),
            ToolSpec::meta(
                "search_tools",
                "Search tools by keyword",
                json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
            ),
            ToolSpec::meta(
                "get_tool_detail",
                "Full description and parameter schema for one tool",
                json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]}),
            ),
            ToolSpec::meta(
                "add_permanent_memory",
                "Remember something forever",
                with_content(json!({})),
            ),
            ToolSpec::meta(
                "add_temporary_memory",
                "Remember something for a few turns",
                with_content(json!({"expire_after_turns": {"type": "integer"}})),
            ),
            ToolSpec::meta(
                "get_resource",
                "Load a stored resource payload by id; the context takes a reference to it",
                json!({"type": "object", "properties": {"resource_id": {"type": "string"}}, "required": ["resource_id"]}),
            ),
            ToolSpec::meta(
                "list_memories",
                "Show everything currently remembered",
                json!({"type": "object", "properties": {}}),
            ),
            ToolSpec::meta(
                "clear_temporary_memories",
                "Forget all temporary memories",
                json!({"type": "object", "properties": {}}),
            ),
        ]
    }
}

#[async_trait]
impl ToolExecutor for MetaToolExecutor {
    async fn execute(&self, tool: &str, params: &Value, ctx: &mut RequestContext) -> ExecutorResult {
        match tool {
            "list_tools" => Ok(ExecutorOutput::text(format!(
                "Available tools:\n{}",
                ctx.tools().render_listing()
            ))),
            "search_tools" => {
                let query = require_str(params, "query")?;
                let hits = ctx.tools().search(query);
                if hits.is_empty() {
                    Ok(ExecutorOutput::text(format!("No tools match '{query}'")))
                } else {
                    let listing = hits
                        .iter()
                        .map(|spec| format!("- {}: {}", spec.name, spec.description))
                        .collect::<Vec<_>>()
                        .join("\n");
                    Ok(ExecutorOutput::text(listing))
                }
            }
            "get_tool_detail" => {
                let name = require_str(params, "name")?.to_string();
                let spec = ctx
                    .tool_detail(&name)
                    .ok_or(WorldError::UnknownTool(name))?;
                Ok(ExecutorOutput::Plain(json!({
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": spec.parameters,
                })))
            }
            "add_permanent_memory" => {
                let content = require_str(params, "content")?;
                ctx.memory.add_permanent(content);
                Ok(ExecutorOutput::text("Saved to permanent memory"))
            }
            "add_temporary_memory" => {
                let content = require_str(params, "content")?;
                let expire = params
                    .get("expire_after_turns")
                    .and_then(Value::as_u64)
                    .map(|n| n as u32)
                    .unwrap_or(DEFAULT_TEMPORARY_EXPIRE_TURNS);
                let turn = ctx.current_turn();
                ctx.memory.add_temporary(content, expire, turn);
                Ok(ExecutorOutput::text(format!(
                    "Saved to temporary memory for {expire} turns"
                )))
            }
            "get_resource" => {
                let id = require_str(params, "resource_id")?;
                let resource_id = crate::id::ResourceId::new(id);
                let payload = ctx
                    .get_resource(&resource_id)
                    .ok_or_else(|| WorldError::ResourceNotFound(id.to_string()))?;
                Ok(ExecutorOutput::Plain(payload))
            }
            "list_memories" => {
                let turn = ctx.current_turn();
                Ok(ExecutorOutput::text(
                    ctx.memory
                        .render(turn)
                        .unwrap_or_else(|| "No memories stored".to_string()),
                ))
            }
            "clear_temporary_memories" => {
                ctx.memory.clear_temporary();
                Ok(ExecutorOutput::text("Temporary memory cleared"))
            }
            other => Err(WorldError::UnknownTool(other.to_string())),
        }
    }
}

pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> std::result::Result<&'a str, WorldError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| WorldError::MissingParameter(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Action;
    use crate::id::AgentId;
    use crate::resource::ResourceManager;
    use crate::tool::{ToolCatalog, ToolSpec};
    use crate::world::SharedWorld;

    fn context() -> RequestContext {
        let mut catalog = ToolCatalog::new();
        catalog.register(ToolSpec::meta(
            "list_tools",
            "List every available tool",
            json!({"type": "object"}),
        ));
        RequestContext::new(
            AgentId::new("chef"),
            SharedWorld::new(),
            Arc::new(ResourceManager::new()),
            Arc::new(catalog),
        )
    }

    fn meta_registry() -> ExecutorRegistry {
        let mut registry = ExecutorRegistry::new();
        registry.register_default(Arc::new(MetaToolExecutor));
        registry
    }

    #[tokio::test]
    async fn bare_names_route_to_the_default_executor() {
        let registry = meta_registry();
        let mut ctx = context();
        ctx.set_plan(vec![Action::new("list_tools", json!({}))]);
        run_plan(&registry, &mut ctx, &TerminationHandle::default()).await;

        assert_eq!(ctx.execution_history().len(), 1);
        assert!(ctx.execution_history()[0].result.contains("list_tools"));
        assert_eq!(ctx.status(), AgentStatus::Analyzing);
    }

    #[tokio::test]
    async fn unknown_namespace_falls_back_to_default_and_fails_by_name() {
        let registry = meta_registry();
        let mut ctx = context();
        ctx.set_plan(vec![
            Action::new("nowhere:do_thing", json!({})),
            Action::new("list_tools", json!({})),
        ]);
        run_plan(&registry, &mut ctx, &TerminationHandle::default()).await;

        // The failure is recorded as text and the plan keeps going.
        assert_eq!(ctx.execution_history().len(), 2);
        assert!(ctx.execution_history()[0].result.starts_with("Error:"));
        assert!(!ctx.execution_history()[1].result.starts_with("Error:"));
    }

    #[tokio::test]
    async fn memory_meta_tools_round_trip() {
        let registry = meta_registry();
        let mut ctx = context();
        ctx.set_plan(vec![
            Action::new("add_permanent_memory", json!({"content": "the shed is built"})),
            Action::new("add_temporary_memory", json!({"content": "saw an apple", "expire_after_turns": 9})),
            Action::new("list_memories", json!({})),
        ]);
        run_plan(&registry, &mut ctx, &TerminationHandle::default()).await;

        let listing = &ctx.execution_history()[2].result;
        assert!(listing.contains("the shed is built"));
        assert!(listing.contains("saw an apple"));

        ctx.set_plan(vec![Action::new("clear_temporary_memories", json!({}))]);
        run_plan(&registry, &mut ctx, &TerminationHandle::default()).await;
        assert!(ctx.memory.temporary_entries().is_empty());
        assert_eq!(ctx.memory.permanent_entries().len(), 1);
    }

    #[tokio::test]
    async fn missing_parameter_is_reported_not_fatal() {
        let registry = meta_registry();
        let mut ctx = context();
        ctx.set_plan(vec![Action::new("search_tools", json!({}))]);
        run_plan(&registry, &mut ctx, &TerminationHandle::default()).await;
        assert!(ctx.execution_history()[0].result.contains("Missing parameter: query"));
    }

    #[tokio::test]
    async fn get_resource_loads_payloads_and_reports_missing_ids() {
        let registry = meta_registry();
        let mut ctx = context();
        let id = ctx
            .register_resource(json!({"rows": [1, 2]}), "harvest table")
            .unwrap();

        ctx.set_plan(vec![
            Action::new("get_resource", json!({"resource_id": id})),
            Action::new("get_resource", json!({"resource_id": "res_missing"})),
        ]);
        run_plan(&registry, &mut ctx, &TerminationHandle::default()).await;

        assert!(ctx.execution_history()[0].result.contains("rows"));
        assert!(ctx.execution_history()[1]
            .result
            .contains("Resource not found: res_missing"));
    }

    #[tokio::test]
    async fn structured_output_folds_memory() {
        struct Remembering;
        #[async_trait]
        impl ToolExecutor for Remembering {
            async fn execute(&self, _: &str, _: &Value, _: &mut RequestContext) -> ExecutorResult {
                Ok(ExecutorOutput::Structured {
                    response: "done".to_string(),
                    memory: MemoryDirective::permanent("learned something"),
                })
            }
        }

        let mut registry = ExecutorRegistry::new();
        registry.register("mind", Arc::new(Remembering));
        let mut ctx = context();
        ctx.set_plan(vec![Action::new("mind:reflect", json!({}))]);
        run_plan(&registry, &mut ctx, &TerminationHandle::default()).await;

        assert_eq!(ctx.memory.permanent_entries().len(), 1);
        assert_eq!(ctx.execution_history()[0].result, "done");
    }
}
