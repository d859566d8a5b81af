//! Execution context and blackboard
//!
//! The [`ExecutionContext`] is the mutable, serializable bag of per-run
//! data passed through every middleware stage and agent: identifiers, the
//! current position in the agent sequence, the run phase, and the
//! [`Blackboard`] of accumulated stage outputs. It is transient and
//! in-memory only - a checkpoint stores its serialized snapshot, and
//! [`ExecutionContext::restore`] rebuilds an observationally equivalent
//! context from that payload (the round-trip property the engine's resume
//! semantics depend on).
//!
//! Stage outputs are a tagged union ([`StagePayload`]) rather than
//! stringly-typed lookups; agent-specific metadata that has no well-known
//! variant goes through the `Opaque` extension slot or the blackboard's
//! `extra` map.

use crate::error::Result;
use conveyor_checkpoint::{BlackboardSerializer, JsonSerializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Codec used for checkpoint blackboard payloads
const CODEC: JsonSerializer = JsonSerializer;

/// Well-known stage outputs exchanged between loosely-coupled agents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    /// Output of the analysis stage
    Analysis {
        /// Summary of the examined ticket
        summary: String,
        /// Questions that need human answers before planning
        questions: Vec<String>,
    },
    /// Human answers collected for open questions
    Answers {
        /// Answer texts, in question order
        answers: Vec<String>,
    },
    /// Output of the planning stage
    Plan {
        /// Markdown plan text
        plan: String,
    },
    /// Output of the implementation stage
    Implementation {
        /// Branch the change was applied to
        branch: String,
        /// Short description of the change
        summary: String,
    },
    /// Output of the review stage
    Review {
        /// Whether the change passed review
        approved: bool,
        /// Reviewer notes
        notes: String,
    },
    /// Pull request created on the hosting platform
    PullRequest {
        /// Platform reference (URL or id)
        reference: String,
    },
    /// Extension slot for agent-specific payloads
    Opaque {
        /// Arbitrary JSON payload
        data: serde_json::Value,
    },
}

/// Serializable state bag carried through a run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Blackboard {
    /// Stage outputs keyed by agent name
    pub outputs: BTreeMap<String, StagePayload>,
    /// Free-form values (resume event payloads, host annotations)
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Blackboard {
    /// Record an agent's output
    pub fn record(&mut self, agent_name: impl Into<String>, payload: StagePayload) {
        self.outputs.insert(agent_name.into(), payload);
    }

    /// Look up a recorded output by agent name
    pub fn output(&self, agent_name: &str) -> Option<&StagePayload> {
        self.outputs.get(agent_name)
    }

    /// Set a free-form value
    pub fn set_extra(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extra.insert(key.into(), value);
    }
}

/// Phase of the run recorded in the context (and thus in checkpoints)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Walking the agent sequence
    Running,
    /// Stopped at a human-in-the-loop point; a resume event will continue it
    Suspended,
    /// Terminal success
    Completed,
    /// Terminal failure
    Failed,
}

/// Event handed to `execute`/`resume` by the host worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEvent {
    /// Tenant the event is scoped to
    pub tenant_id: String,
    /// Work item the event targets
    pub work_item_id: String,
    /// Event kind (e.g. "ticket-received", "answers-submitted",
    /// "plan-approved")
    pub kind: String,
    /// Event payload merged into the blackboard extras
    #[serde(default)]
    pub payload: BTreeMap<String, serde_json::Value>,
}

impl InputEvent {
    /// Create an event with an empty payload
    pub fn new(
        tenant_id: impl Into<String>,
        work_item_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            work_item_id: work_item_id.into(),
            kind: kind.into(),
            payload: BTreeMap::new(),
        }
    }

    /// Attach a payload value
    pub fn with_payload(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// Mutable per-run state passed through every step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionContext {
    /// Tenant the run is scoped to
    pub tenant_id: String,
    /// Work item being processed
    pub work_item_id: String,
    /// Graph being executed
    pub graph_id: String,
    /// Index of the next agent to run
    pub position: usize,
    /// Current run phase
    pub phase: RunPhase,
    /// Retries consumed so far in this run
    pub retry_count: u32,
    /// Accumulated stage outputs
    pub blackboard: Blackboard,
    /// Kind of the event that started (or resumed) the run
    pub triggered_by: String,
}

impl ExecutionContext {
    /// Build a fresh context from an input event
    pub fn from_event(graph_id: impl Into<String>, event: &InputEvent) -> Self {
        let mut blackboard = Blackboard::default();
        for (key, value) in &event.payload {
            blackboard.set_extra(key.clone(), value.clone());
        }
        Self {
            tenant_id: event.tenant_id.clone(),
            work_item_id: event.work_item_id.clone(),
            graph_id: graph_id.into(),
            position: 0,
            phase: RunPhase::Running,
            retry_count: 0,
            blackboard,
            triggered_by: event.kind.clone(),
        }
    }

    /// Serialize this context into a checkpoint blackboard payload
    pub fn snapshot(&self) -> Result<String> {
        Ok(CODEC.dumps(self)?)
    }

    /// Reconstruct a context from a checkpoint blackboard payload.
    ///
    /// A corrupt payload degrades to an empty blackboard at position 0
    /// rather than propagating a parse error into the graph; the
    /// degradation is logged.
    pub fn restore(
        tenant_id: &str,
        work_item_id: &str,
        graph_id: &str,
        payload: &str,
    ) -> Self {
        match CODEC.loads::<ExecutionContext>(payload) {
            Ok(ctx) => ctx,
            Err(error) => {
                warn!(
                    work_item = work_item_id,
                    graph = graph_id,
                    %error,
                    "Checkpoint blackboard could not be decoded, restoring empty context"
                );
                Self {
                    tenant_id: tenant_id.to_string(),
                    work_item_id: work_item_id.to_string(),
                    graph_id: graph_id.to_string(),
                    position: 0,
                    phase: RunPhase::Running,
                    retry_count: 0,
                    blackboard: Blackboard::default(),
                    triggered_by: "restore".to_string(),
                }
            }
        }
    }

    /// Merge a resume event's payload into the blackboard extras
    pub fn absorb_event(&mut self, event: &InputEvent) {
        for (key, value) in &event.payload {
            self.blackboard.set_extra(key.clone(), value.clone());
        }
        self.triggered_by = event.kind.clone();
    }
}
