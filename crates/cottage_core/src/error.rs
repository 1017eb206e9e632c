use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run-fatal errors.
///
/// Only construction failures, decision-step failures, and the top-level
/// recursion/timeout guards produce these. Everything that goes wrong inside
/// an individual action is a [`WorldError`] and surfaces as result text in
/// the execution history instead.
#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error("Configuration error for {component}: {details}")]
    #[diagnostic(
        code(cottage_core::configuration_error),
        help("Check the builder/config for {component} and provide all required fields")
    )]
    ConfigurationError { component: String, details: String },

    #[error("Agent {agent_id} exceeded the cycle ceiling of {max_cycles}")]
    #[diagnostic(
        code(cottage_core::recursion_limit),
        help("Raise max_cycles or fix the decision step so it reaches a terminal response")
    )]
    RecursionLimitExceeded { agent_id: String, max_cycles: u32 },

    #[error("Agent {agent_id} timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(cottage_core::run_timeout),
        help("The whole run races against a wall-clock deadline; raise timeout_ms if legitimate")
    )]
    Timeout { agent_id: String, timeout_ms: u64 },

    #[error("Decision step failed for agent {agent_id}: {cause}")]
    #[diagnostic(
        code(cottage_core::decision_failed),
        help("Decision failures are fatal to the run and mark the context FAILED")
    )]
    DecisionFailed { agent_id: String, cause: String },

    #[error("ResourceManager is shutting down, cannot register new resources")]
    #[diagnostic(
        code(cottage_core::resource_manager_shutdown),
        help("register() is rejected once shutdown() has begun")
    )]
    ResourceManagerShutdown,

    #[error("Invalid {data_type}: {details}")]
    #[diagnostic(code(cottage_core::invalid_format))]
    InvalidFormat { data_type: String, details: String },

    #[error("TOML parse error: {0}")]
    #[diagnostic(code(cottage_core::toml_parse))]
    TomlParse(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn configuration(component: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigurationError {
            component: component.into(),
            details: details.into(),
        }
    }

    pub fn decision_failed(agent_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::DecisionFailed {
            agent_id: agent_id.into(),
            cause: cause.into(),
        }
    }
}

/// Recoverable, action-local errors.
///
/// These are captured by the execution step and fed back into conversation
/// history as data so the decision step can react to them. They never fail
/// the run.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WorldError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Cannot use entity {entity_id}: owned by {owner}")]
    OwnershipConflict { entity_id: String, owner: String },

    #[error("Creation quota for '{category}' exhausted ({used}/{max})")]
    QuotaExceeded {
        category: String,
        used: u32,
        max: u32,
    },

    #[error("Entity {entity_id} is already lent to {borrower}")]
    BorrowConflict {
        entity_id: String,
        borrower: String,
    },

    #[error("Entity {0} has no active borrow")]
    NotBorrowed(String),

    #[error("Only the current borrower may return entity {0}")]
    NotBorrower(String),

    #[error("Entity {entity_id} is not a {expected}")]
    WrongKind { entity_id: String, expected: String },

    #[error("Invalid location: {location}. Valid locations: {valid}")]
    InvalidLocation { location: String, valid: String },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Report;

    #[test]
    fn recursion_limit_renders_agent_and_ceiling() {
        let err = CoreError::RecursionLimitExceeded {
            agent_id: "chef".to_string(),
            max_cycles: 5,
        };
        let report = Report::new(err);
        let output = format!("{:?}", report);
        assert!(output.contains("chef"));
        assert!(output.contains("5"));
    }

    #[test]
    fn world_error_is_plain_data() {
        let err = WorldError::QuotaExceeded {
            category: "food".to_string(),
            used: 3,
            max: 3,
        };
        let text = err.to_string();
        assert!(text.contains("food"));
        assert!(text.contains("3/3"));
    }
}
