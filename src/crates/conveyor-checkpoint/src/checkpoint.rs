//! Core checkpoint data structures
//!
//! A [`Checkpoint`] is a named snapshot of one in-flight graph run: the
//! four-part key (tenant, work item, graph, checkpoint id), an opaque
//! serialized blackboard, a lifecycle [`CheckpointStatus`], and timestamps.
//! Checkpoints enable a suspended or crashed run to resume from its last
//! known good position, and the retained history doubles as a
//! debugging/replay trail.
//!
//! # Lifecycle
//!
//! ```text
//! save() ──▶ Active ──┬─▶ Resumed    (superseded by a newer checkpoint,
//!                     │               or loaded by Graph::resume)
//!                     ├─▶ Completed  (run finished successfully)
//!                     ├─▶ Failed     (run terminated with a failure)
//!                     └─▶ Expired    (retention sweep)
//! ```
//!
//! Exactly one `Active` checkpoint may exist per (work item, graph) at a
//! time; the store enforces this by marking the previous active checkpoint
//! `Resumed` whenever a new one is appended. Sequence numbers are strictly
//! increasing per key, so "latest" is always well defined.
//!
//! The blackboard payload is opaque to this crate: the store never decodes
//! it, and the engine owns its schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Checkpoint ID type
pub type CheckpointId = String;

/// Lifecycle status of a stored checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    /// The single live checkpoint a resume would start from
    Active,
    /// Superseded by a newer checkpoint or consumed by a resume;
    /// kept as history
    Resumed,
    /// The run this checkpoint belongs to finished successfully
    Completed,
    /// The run this checkpoint belongs to terminated with a failure
    Failed,
    /// Aged out by the retention sweep
    Expired,
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointStatus::Active => write!(f, "active"),
            CheckpointStatus::Resumed => write!(f, "resumed"),
            CheckpointStatus::Completed => write!(f, "completed"),
            CheckpointStatus::Failed => write!(f, "failed"),
            CheckpointStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Lookup key for checkpoint queries: one graph run per work item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    /// Work item the run belongs to
    pub work_item_id: String,
    /// Graph (pipeline phase) being executed
    pub graph_id: String,
}

impl CheckpointKey {
    /// Create a new checkpoint key
    pub fn new(work_item_id: impl Into<String>, graph_id: impl Into<String>) -> Self {
        Self {
            work_item_id: work_item_id.into(),
            graph_id: graph_id.into(),
        }
    }
}

/// A durable snapshot of in-flight execution state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint ID
    pub checkpoint_id: CheckpointId,

    /// Tenant that owns the run
    pub tenant_id: String,

    /// Work item the run belongs to
    pub work_item_id: String,

    /// Graph being executed
    pub graph_id: String,

    /// Agent that produced this snapshot, when saved at an agent boundary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,

    /// Serialized blackboard; opaque to the store
    pub blackboard: String,

    /// Lifecycle status
    pub status: CheckpointStatus,

    /// Strictly increasing logical order per (work item, graph)
    pub sequence: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last status-change timestamp
    pub updated_at: DateTime<Utc>,

    /// Set when the checkpoint was consumed by a resume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Create a new active checkpoint with a generated ID
    pub fn new(
        tenant_id: impl Into<String>,
        work_item_id: impl Into<String>,
        graph_id: impl Into<String>,
        blackboard: impl Into<String>,
        sequence: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            checkpoint_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            work_item_id: work_item_id.into(),
            graph_id: graph_id.into(),
            agent_name: None,
            blackboard: blackboard.into(),
            status: CheckpointStatus::Active,
            sequence,
            created_at: now,
            updated_at: now,
            resumed_at: None,
        }
    }

    /// Set the agent name recorded on this checkpoint
    pub fn with_agent_name(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    /// The key this checkpoint is stored under
    pub fn key(&self) -> CheckpointKey {
        CheckpointKey::new(self.work_item_id.clone(), self.graph_id.clone())
    }

    /// Whether this checkpoint is the live resume point
    pub fn is_active(&self) -> bool {
        self.status == CheckpointStatus::Active
    }

    /// Apply a status change, stamping `updated_at` and `resumed_at`
    pub fn mark(&mut self, status: CheckpointStatus) {
        self.status = status;
        self.updated_at = Utc::now();
        if status == CheckpointStatus::Resumed && self.resumed_at.is_none() {
            self.resumed_at = Some(self.updated_at);
        }
    }
}
