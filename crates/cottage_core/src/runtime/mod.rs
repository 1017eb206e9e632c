//! The agent runtime: drives one [`RequestContext`] through the
//! decide/execute/report loop until it reaches a terminal state.

pub mod executor;
pub mod steps;

pub use executor::{
    run_plan, ExecutorOutput, ExecutorRegistry, ExecutorResult, MetaToolExecutor, ToolExecutor,
};
pub use steps::{Decision, DecisionStep, DecisionView, DefaultReport, ReportStep};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RuntimeConfig;
use crate::context::{AgentStatus, HistoryRole, RequestContext};
use crate::error::{CoreError, Result};
use crate::id::AgentId;
use crate::resource::ResourceManager;
use crate::tool::ToolCatalog;
use crate::world::SharedWorld;

/// Final result of one agent run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: AgentStatus,
    pub response: Option<String>,
    pub cycles: u32,
}

/// Cooperative kill switch for a running agent, checked between cycles.
#[derive(Debug, Clone, Default)]
pub struct TerminationHandle {
    flag: Arc<AtomicBool>,
}

impl TerminationHandle {
    pub fn terminate(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

type CleanupHook = Box<dyn FnOnce() -> std::result::Result<(), String> + Send>;

/// Owns one context and the steps that drive it.
pub struct AgentRuntime {
    ctx: RequestContext,
    decision: Arc<dyn DecisionStep>,
    report: Arc<dyn ReportStep>,
    registry: ExecutorRegistry,
    config: RuntimeConfig,
    world: Arc<SharedWorld>,
    resources: Arc<ResourceManager>,
    /// A shared manager outlives this runtime; an owned one is shut down on
    /// exit.
    resources_shared: bool,
    termination: TerminationHandle,
    cleanup_hooks: Vec<CleanupHook>,
    exited: bool,
    cycles_run: u32,
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("agent_id", self.ctx.agent_id())
            .field("status", &self.ctx.status())
            .field("cycles_run", &self.cycles_run)
            .finish()
    }
}

impl AgentRuntime {
    pub fn builder() -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::default()
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.ctx
    }

    pub fn termination_handle(&self) -> TerminationHandle {
        self.termination.clone()
    }

    /// Run to completion. Fatal failures (decision step, cycle ceiling,
    /// wall-clock timeout) mark the context `Failed`, still run the report
    /// step once, clean up, and surface as `Err`; the context remains
    /// inspectable afterwards.
    pub async fn start(&mut self) -> Result<RunOutcome> {
        let agent_id = self.ctx.agent_id().clone();
        tracing::info!(agent_id = %agent_id, "agent run starting");

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let run = tokio::time::timeout(timeout, Self::run_cycles(
            &mut self.ctx,
            &mut self.cycles_run,
            &self.decision,
            &self.report,
            &self.registry,
            &self.config,
            &self.termination,
        ))
        .await;

        let fatal = match run {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => Some(CoreError::Timeout {
                agent_id: agent_id.to_string(),
                timeout_ms: self.config.timeout_ms,
            }),
        };

        if let Some(err) = fatal {
            self.ctx.set_error(err.to_string());
            // The trace must still end with a report, even for a run the
            // clock killed.
            if let Err(report_err) = self.report.report(&mut self.ctx).await {
                tracing::warn!(agent_id = %agent_id, error = %report_err, "report step failed during failure handling");
            }
            self.exit();
            tracing::warn!(agent_id = %agent_id, error = %err, cycles = self.cycles_run, "agent run failed");
            return Err(err);
        }

        self.exit();
        let outcome = RunOutcome {
            status: self.ctx.status(),
            response: self.ctx.final_response.clone(),
            cycles: self.cycles_run,
        };
        tracing::info!(
            agent_id = %agent_id,
            status = ?outcome.status,
            cycles = outcome.cycles,
            "agent run finished"
        );
        Ok(outcome)
    }

    async fn run_cycles(
        ctx: &mut RequestContext,
        cycles_run: &mut u32,
        decision: &Arc<dyn DecisionStep>,
        report: &Arc<dyn ReportStep>,
        registry: &ExecutorRegistry,
        config: &RuntimeConfig,
        termination: &TerminationHandle,
    ) -> Result<()> {
        loop {
            if termination.is_terminated() {
                ctx.terminate();
            }
            if ctx.is_finished() {
                return Ok(());
            }
            if *cycles_run > config.max_cycles {
                return Err(CoreError::RecursionLimitExceeded {
                    agent_id: ctx.agent_id().to_string(),
                    max_cycles: config.max_cycles,
                });
            }
            *cycles_run += 1;

            Self::drain_mailbox(ctx);
            // Re-check before the decision await; a kill request during the
            // drain should not buy another decision.
            if termination.is_terminated() {
                ctx.terminate();
                continue;
            }

            if ctx.status() == AgentStatus::Pending {
                ctx.set_status(AgentStatus::Analyzing);
            }

            let view = DecisionView {
                agent_id: ctx.agent_id().as_str(),
                system_directive: &config.system_directive,
                history: ctx.recent_history(config.history_limit),
                memory: ctx.memory.render(ctx.current_turn()),
                tools: ctx.tools(),
                cycle: *cycles_run,
            };
            let decided = decision.decide(view).await.map_err(|err| match err {
                err @ CoreError::DecisionFailed { .. } => err,
                other => CoreError::decision_failed(ctx.agent_id().as_str(), other.to_string()),
            })?;

            match decided {
                Decision::Respond(text) => {
                    ctx.push_history(HistoryRole::Agent, text.clone());
                    ctx.final_response = Some(text);
                    ctx.set_status(AgentStatus::Completed);
                }
                Decision::Plan(actions) => {
                    let summary = actions
                        .iter()
                        .map(|a| a.operation.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    ctx.push_history(HistoryRole::Agent, format!("Executing plan: {summary}"));
                    ctx.set_plan(actions);
                    run_plan(registry, ctx, termination).await;
                }
            }

            report.report(ctx).await?;
        }
    }

    /// Pull queued messages into history; direct agent messages also land
    /// in short-lived temporary memory so the next decisions still see them
    /// after the history window slides.
    fn drain_mailbox(ctx: &mut RequestContext) {
        let agent_id = ctx.agent_id().clone();
        let messages = ctx.world().drain_messages(&agent_id);
        let turn = ctx.current_turn();
        for message in messages {
            let line = format!("[{}] {}: {}", message.kind, message.from, message.content);
            if message.kind == "agent_message" {
                ctx.memory
                    .add_temporary(line.clone(), crate::memory::DEFAULT_TEMPORARY_EXPIRE_TURNS, turn);
            }
            ctx.push_history(HistoryRole::World, line);
        }
    }

    /// Register a teardown hook, run once on exit. A failing hook is logged
    /// and never blocks the remaining hooks.
    pub fn on_cleanup<F>(&mut self, hook: F)
    where
        F: FnOnce() -> std::result::Result<(), String> + Send + 'static,
    {
        self.cleanup_hooks.push(Box::new(hook));
    }

    /// Request termination and release everything this runtime holds.
    /// Idempotent; a context that already reached a terminal status keeps
    /// it.
    pub fn exit(&mut self) {
        self.termination.terminate();
        if !self.ctx.is_finished() {
            self.ctx.terminate();
        }
        if self.exited {
            return;
        }
        self.exited = true;

        self.ctx.release_all_resources();
        if !self.resources_shared {
            self.resources.shutdown();
        }
        for hook in self.cleanup_hooks.drain(..) {
            if let Err(details) = hook() {
                tracing::warn!(agent_id = %self.ctx.agent_id(), details, "cleanup hook failed");
            }
        }
        self.world.unregister_agent(&self.ctx.agent_id().clone());
        tracing::debug!(agent_id = %self.ctx.agent_id(), "agent runtime exited");
    }

    /// Terminate the context and clean up immediately.
    pub fn force_exit(&mut self) {
        self.termination.terminate();
        self.ctx.terminate();
        self.exit();
    }
}

/// Builder for [`AgentRuntime`]; `agent_id`, `world`, and `decision` are
/// required.
#[derive(Default)]
pub struct AgentRuntimeBuilder {
    agent_id: Option<AgentId>,
    world: Option<Arc<SharedWorld>>,
    decision: Option<Arc<dyn DecisionStep>>,
    report: Option<Arc<dyn ReportStep>>,
    registry: Option<ExecutorRegistry>,
    catalog: Option<Arc<ToolCatalog>>,
    resources: Option<Arc<ResourceManager>>,
    config: Option<RuntimeConfig>,
}

impl AgentRuntimeBuilder {
    pub fn agent_id(mut self, id: impl Into<AgentId>) -> Self {
        self.agent_id = Some(id.into());
        self
    }

    pub fn world(mut self, world: Arc<SharedWorld>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn decision(mut self, step: Arc<dyn DecisionStep>) -> Self {
        self.decision = Some(step);
        self
    }

    pub fn report(mut self, step: Arc<dyn ReportStep>) -> Self {
        self.report = Some(step);
        self
    }

    pub fn registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn catalog(mut self, catalog: Arc<ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use a shared resource manager; the runtime then leaves shutdown to
    /// the owner.
    pub fn resources(mut self, resources: Arc<ResourceManager>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<AgentRuntime> {
        let agent_id = self
            .agent_id
            .ok_or_else(|| CoreError::configuration("AgentRuntime", "agent_id is required"))?;
        let world = self
            .world
            .ok_or_else(|| CoreError::configuration("AgentRuntime", "world is required"))?;
        let decision = self
            .decision
            .ok_or_else(|| CoreError::configuration("AgentRuntime", "decision step is required"))?;
        let config = self.config.unwrap_or_default();
        if config.max_cycles == 0 {
            return Err(CoreError::configuration("AgentRuntime", "max_cycles must be at least 1"));
        }

        let resources_shared = self.resources.is_some();
        let resources = self
            .resources
            .unwrap_or_else(|| Arc::new(ResourceManager::new()));
        let catalog = self.catalog.unwrap_or_else(|| Arc::new(ToolCatalog::new()));
        let registry = self.registry.unwrap_or_else(|| {
            let mut registry = ExecutorRegistry::new();
            registry.register_default(Arc::new(MetaToolExecutor));
            registry
        });

        world.register_agent(&agent_id);
        let ctx = RequestContext::new(agent_id, Arc::clone(&world), Arc::clone(&resources), catalog);

        Ok(AgentRuntime {
            ctx,
            decision,
            report: self.report.unwrap_or_else(|| Arc::new(DefaultReport)),
            registry,
            config,
            world,
            resources,
            resources_shared,
            termination: TerminationHandle::default(),
            cleanup_hooks: Vec::new(),
            exited: false,
            cycles_run: 0,
        })
    }
}
