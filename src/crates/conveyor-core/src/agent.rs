//! Agent contract and step outcomes
//!
//! An [`Agent`] is a single unit of work in a graph: given the execution
//! context, produce an [`AgentResult`] or fail. Agents are stateless
//! between invocations except via the context; all cross-cutting mechanics
//! (tenant isolation, budget, retry, audit, checkpointing) live in the
//! middleware chain and the graph, never in the agent itself.
//!
//! An agent signals what should happen next through its result:
//!
//! - `Completed` - record the output, apply any requested state
//!   transition, advance to the next agent.
//! - `Pending` - the step needs external input (human approval, answers);
//!   the graph checkpoints and suspends. Suspension is a normal outcome,
//!   not an error.
//! - `Failed` - terminal for the run once the retry middleware gives up;
//!   `retryable` marks transient failures eligible for backoff retries.
//! - `Cancelled` - a cooperative cancellation was observed; distinct from
//!   failure.

use crate::context::{ExecutionContext, StagePayload};
use crate::error::Result;
use crate::work_item::{WorkItemState, WorkflowEventKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Outcome of one agent invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// The agent finished its work
    Completed,
    /// The agent failed; see `retryable` for transient classification
    Failed,
    /// The agent is waiting on external input; suspend the run
    Pending,
    /// Cancellation was observed at a step boundary
    Cancelled,
}

/// Value describing the outcome of an agent invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    /// Outcome class
    pub status: AgentStatus,
    /// Domain output to record on the blackboard
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StagePayload>,
    /// Error text for failed results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether a failure is transient and may be retried in place
    #[serde(default)]
    pub retryable: bool,
    /// Actual token consumption reported by the agent, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    /// State transition the agent requests on the work item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_state: Option<WorkItemState>,
    /// Domain event to append (plan-created, pr-created, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<WorkflowEventKind>,
}

impl AgentResult {
    fn base(status: AgentStatus) -> Self {
        Self {
            status,
            output: None,
            error: None,
            retryable: false,
            tokens_used: None,
            next_state: None,
            event: None,
        }
    }

    /// Successful completion
    pub fn completed() -> Self {
        Self::base(AgentStatus::Completed)
    }

    /// Terminal (non-retryable) failure
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(AgentStatus::Failed)
        }
    }

    /// Transient failure eligible for retry
    pub fn transient(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            retryable: true,
            ..Self::base(AgentStatus::Failed)
        }
    }

    /// Awaiting external input; the graph will suspend
    pub fn pending(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::base(AgentStatus::Pending)
        }
    }

    /// Cooperative cancellation observed
    pub fn cancelled() -> Self {
        Self::base(AgentStatus::Cancelled)
    }

    /// Attach a stage output
    pub fn with_output(mut self, output: StagePayload) -> Self {
        self.output = Some(output);
        self
    }

    /// Report actual token consumption
    pub fn with_tokens_used(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    /// Request a work-item state transition
    pub fn with_next_state(mut self, state: WorkItemState) -> Self {
        self.next_state = Some(state);
        self
    }

    /// Append a domain event alongside the transition
    pub fn with_event(mut self, event: WorkflowEventKind) -> Self {
        self.event = Some(event);
        self
    }

    /// Whether the run should keep walking the sequence after this result
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Completed
    }
}

/// A single unit of work in a graph
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent name; keys the blackboard and checkpoints
    fn name(&self) -> &str;

    /// Estimated token cost of one invocation, used by the budget gate.
    /// `None` falls back to the engine's configured default.
    fn estimated_tokens(&self) -> Option<u64> {
        None
    }

    /// Execute the agent's domain logic against the context.
    ///
    /// Errors returned here are converted into failed [`AgentResult`]s by
    /// the chain; they never escape to the graph caller as a bare fault.
    async fn run(&self, ctx: &mut ExecutionContext) -> Result<AgentResult>;
}

/// Cooperative cancellation signal observed at step boundaries.
///
/// Cancellation does not roll back partially-applied state; the last
/// successfully written checkpoint remains authoritative.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

/// Handle used by the host to fire a [`CancelToken`]
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelToken {
    /// Create a token and the handle that can fire it
    pub fn new() -> (CancelHandle, CancelToken) {
        let (sender, receiver) = watch::channel(false);
        (CancelHandle { sender }, CancelToken { receiver })
    }

    /// A token that can never fire (for hosts without cancellation)
    pub fn never() -> CancelToken {
        let (_sender, receiver) = watch::channel(false);
        // The sender is dropped; the watched value stays false forever.
        CancelToken { receiver }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}

impl CancelHandle {
    /// Request cancellation; observed at the next step boundary
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_set_expected_fields() {
        let ok = AgentResult::completed().with_tokens_used(120);
        assert!(ok.is_success());
        assert_eq!(ok.tokens_used, Some(120));

        let transient = AgentResult::transient("rate limit (429)");
        assert_eq!(transient.status, AgentStatus::Failed);
        assert!(transient.retryable);

        let terminal = AgentResult::failed("bad credentials");
        assert!(!terminal.retryable);

        let pending = AgentResult::pending("awaiting plan approval");
        assert_eq!(pending.status, AgentStatus::Pending);
        assert!(!pending.is_success());
    }

    #[test]
    fn result_round_trips_through_json() {
        let result = AgentResult::completed()
            .with_output(StagePayload::Opaque { data: json!(7) })
            .with_next_state(WorkItemState::Planning)
            .with_event(WorkflowEventKind::PlanCreated);
        let text = serde_json::to_string(&result).unwrap();
        let back: AgentResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn cancel_token_fires_once_requested() {
        let (handle, token) = CancelToken::new();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn never_token_stays_quiet() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }
}
