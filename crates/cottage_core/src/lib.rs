//! Cottage core: a multi-agent shared-world runtime.
//!
//! Agents are state machines driven by a pluggable decision step; they
//! coordinate through a [`SharedWorld`](world::SharedWorld) of owned
//! entities, mailboxes, and events, park large payloads in a
//! reference-counted [`ResourceManager`](resource::ResourceManager), and
//! act through tool executors with ownership, borrow-lease, and quota
//! policy enforced at the call site.

pub mod config;
pub mod context;
pub mod error;
pub mod id;
pub mod memory;
pub mod policy;
pub mod resource;
pub mod runtime;
pub mod tool;
pub mod toolkit;
pub mod world;

pub use config::{CottageConfig, QuotaConfig, RuntimeConfig, WorldConfig};
pub use context::{Action, AgentStatus, HistoryRole, RequestContext};
pub use error::{CoreError, Result, WorldError};
pub use id::{AgentId, EntityId, ResourceId};
pub use memory::{AgentMemory, MemoryDirective};
pub use policy::{BorrowLedger, QuotaTracker};
pub use resource::ResourceManager;
pub use runtime::{
    AgentRuntime, Decision, DecisionStep, DecisionView, DefaultReport, ExecutorOutput,
    ExecutorRegistry, MetaToolExecutor, ReportStep, RunOutcome, TerminationHandle, ToolExecutor,
};
pub use tool::{ToolCatalog, ToolSpec};
pub use toolkit::WorldToolkit;
pub use world::{
    Entity, EntityDraft, EntityPatch, SharedWorld, WorldEvent, WorldEventKind, WorldMessage,
};
