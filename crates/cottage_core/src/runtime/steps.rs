//! Pluggable run steps.
//!
//! The decision step is the intelligence boundary: the core never assumes
//! what sits behind it (a model, a script, a human). The execution step is
//! core-provided ([`run_plan`](crate::runtime::run_plan)); the report step
//! shapes the outward-facing trace and final response.

use async_trait::async_trait;

use crate::context::{Action, AgentStatus, HistoryEntry, RequestContext};
use crate::error::Result;
use crate::tool::ToolCatalog;

/// What the decision step resolved to for this cycle.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Terminal: the run completes with this response.
    Respond(String),
    /// Execute these actions, then come back for another decision.
    Plan(Vec<Action>),
}

/// Read-only view handed to the decision step.
pub struct DecisionView<'a> {
    pub agent_id: &'a str,
    pub system_directive: &'a str,
    pub history: &'a [HistoryEntry],
    /// Rendered memory block, absent when every tier is empty.
    pub memory: Option<String>,
    pub tools: &'a ToolCatalog,
    pub cycle: u32,
}

#[async_trait]
pub trait DecisionStep: Send + Sync {
    /// Decide the next move. An `Err` here is fatal to the whole run.
    async fn decide(&self, view: DecisionView<'_>) -> Result<Decision>;
}

#[async_trait]
pub trait ReportStep: Send + Sync {
    /// Shape the outward trace after a cycle. Must leave `final_response`
    /// populated once the context is Completed or Failed.
    async fn report(&self, ctx: &mut RequestContext) -> Result<()>;
}

/// Default report: one trace step per cycle, final response from the last
/// agent utterance or the recorded error.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultReport;

#[async_trait]
impl ReportStep for DefaultReport {
    async fn report(&self, ctx: &mut RequestContext) -> Result<()> {
        let status = ctx.status();
        ctx.steps.push(format!(
            "cycle finished: status {:?}, {} actions executed",
            status,
            ctx.execution_history().len()
        ));

        if ctx.final_response.is_some() {
            return Ok(());
        }
        match status {
            AgentStatus::Failed => {
                let details = ctx.error.clone().unwrap_or_else(|| "unknown error".to_string());
                ctx.final_response = Some(format!("Run failed: {details}"));
            }
            AgentStatus::Completed | AgentStatus::Terminated => {
                let last_agent_line = ctx
                    .history()
                    .iter()
                    .rev()
                    .find(|e| matches!(e.role, crate::context::HistoryRole::Agent))
                    .map(|e| e.content.clone());
                ctx.final_response =
                    Some(last_agent_line.unwrap_or_else(|| "Run finished without a response".to_string()));
            }
            _ => {}
        }
        Ok(())
    }
}
