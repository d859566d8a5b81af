//! Conveyor core: the workflow engine
//!
//! Orchestrates multi-stage software-change pipelines (ticket intake →
//! analysis → planning → implementation → review → pull request) as
//! resumable agent graphs:
//!
//! - [`work_item`] - the business aggregate, its lifecycle state machine
//!   and append-only event log
//! - [`context`] - the serializable per-run state bag and blackboard
//! - [`agent`] - the unit-of-work contract and step outcomes
//! - [`middleware`] - tenant isolation, audit, budget and retry stages
//!   composed around every agent invocation
//! - [`graph`] - the checkpointed executor with suspend/resume
//!
//! Checkpoint persistence lives in the `conveyor-checkpoint` crate; this
//! crate consumes it through the [`CheckpointStore`] trait.
//!
//! # Example
//!
//! ```no_run
//! use conveyor_core::{
//!     AgentGraph, BoundedAuditQueue, CancelToken, EngineConfig, InMemoryBudgetService,
//!     InMemoryWorkItemStore, InputEvent, MemoryAuditSink, MiddlewareChain,
//!     StaticTenantResolver,
//! };
//! use conveyor_checkpoint::InMemoryCheckpointStore;
//! use std::sync::Arc;
//!
//! # async fn demo() -> conveyor_core::Result<()> {
//! let config = EngineConfig::default();
//! let resolver = Arc::new(StaticTenantResolver::new());
//! let audit = BoundedAuditQueue::start(Arc::new(MemoryAuditSink::new()), 64);
//! let chain = MiddlewareChain::standard(
//!     resolver.clone(),
//!     Arc::new(InMemoryBudgetService::new()),
//!     audit,
//!     &config,
//! );
//!
//! let graph = AgentGraph::new(
//!     "planning-graph",
//!     chain,
//!     Arc::new(InMemoryCheckpointStore::new()),
//!     Arc::new(InMemoryWorkItemStore::new()),
//! );
//!
//! let event = InputEvent::new("tenant-a", "wi-1", "ticket-received");
//! let outcome = graph.execute(event, &CancelToken::never()).await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod audit;
pub mod budget;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod middleware;
pub mod retry;
pub mod tenant;
pub mod work_item;

pub use agent::{Agent, AgentResult, AgentStatus, CancelHandle, CancelToken};
pub use audit::{AuditSink, BoundedAuditQueue, ExecutionRecord, MemoryAuditSink};
pub use budget::{BudgetService, InMemoryBudgetService, TokenBudget, UsageRecord};
pub use config::EngineConfig;
pub use context::{Blackboard, ExecutionContext, InputEvent, RunPhase, StagePayload};
pub use error::{EngineError, Result};
pub use graph::{AgentGraph, ExecutionResult, GraphStatus};
pub use middleware::{
    AgentMiddleware, AuditMiddleware, BudgetGate, MiddlewareChain, Next, RetryMiddleware,
    TenantGate,
};
pub use retry::{classify_error, ErrorClass, RetryConfig};
pub use tenant::{StaticTenantResolver, TenantResolver};
pub use work_item::{
    is_valid_transition, InMemoryWorkItemStore, WorkItem, WorkItemArtifacts, WorkItemState,
    WorkItemStore, WorkflowEvent, WorkflowEventKind,
};
