//! Work-item lifecycle: states, transition table, aggregate and events
//!
//! A [`WorkItem`] is the unit of business work flowing through the pipeline
//! (ticket intake → analysis → planning → implementation → review → pull
//! request). Its lifecycle state may only change through
//! [`transition`](WorkItem::transition), which consults the static
//! transition table - the single source of truth for legal lifecycle shape
//! - and records a [`WorkflowEvent`] for every change. An unlisted
//! transition fails with the offending pair; it never silently no-ops.
//!
//! ```text
//! Received → Analyzing → AwaitingAnswers → AnswersReceived → Planning
//!     → AwaitingPlanApproval → PlanApproved → Implementing → InReview
//!     → PrCreated → Completed
//! ```
//!
//! Analysis may skip the question round-trip (Analyzing → Planning), review
//! may bounce work back (InReview → Implementing), and every non-terminal
//! state may fail. `Completed` and `Failed` have no successors.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle states a work item may occupy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkItemState {
    /// Ticket accepted at intake
    Received,
    /// Analysis agent is examining the ticket
    Analyzing,
    /// Analysis raised questions; waiting on a human
    AwaitingAnswers,
    /// Human answers arrived
    AnswersReceived,
    /// Planning agent is producing a change plan
    Planning,
    /// Plan written; waiting on human approval
    AwaitingPlanApproval,
    /// Plan approved by a human
    PlanApproved,
    /// Implementation agent is applying the change
    Implementing,
    /// Review agent is checking the change
    InReview,
    /// Pull request opened on the hosting platform
    PrCreated,
    /// Terminal: pipeline finished successfully
    Completed,
    /// Terminal: pipeline failed
    Failed,
}

impl WorkItemState {
    /// Permitted successor states; terminal states return an empty slice
    pub fn successors(self) -> &'static [WorkItemState] {
        use WorkItemState::*;
        match self {
            Received => &[Analyzing, Failed],
            Analyzing => &[AwaitingAnswers, Planning, Failed],
            AwaitingAnswers => &[AnswersReceived, Failed],
            AnswersReceived => &[Planning, Failed],
            Planning => &[AwaitingPlanApproval, Failed],
            AwaitingPlanApproval => &[PlanApproved, Failed],
            PlanApproved => &[Implementing, Failed],
            Implementing => &[InReview, Failed],
            InReview => &[PrCreated, Implementing, Failed],
            PrCreated => &[Completed, Failed],
            Completed => &[],
            Failed => &[],
        }
    }

    /// Whether this state has no successors
    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// All declared states, for table-closure checks
    pub fn all() -> &'static [WorkItemState] {
        use WorkItemState::*;
        &[
            Received,
            Analyzing,
            AwaitingAnswers,
            AnswersReceived,
            Planning,
            AwaitingPlanApproval,
            PlanApproved,
            Implementing,
            InReview,
            PrCreated,
            Completed,
            Failed,
        ]
    }
}

impl std::fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkItemState::Received => "Received",
            WorkItemState::Analyzing => "Analyzing",
            WorkItemState::AwaitingAnswers => "AwaitingAnswers",
            WorkItemState::AnswersReceived => "AnswersReceived",
            WorkItemState::Planning => "Planning",
            WorkItemState::AwaitingPlanApproval => "AwaitingPlanApproval",
            WorkItemState::PlanApproved => "PlanApproved",
            WorkItemState::Implementing => "Implementing",
            WorkItemState::InReview => "InReview",
            WorkItemState::PrCreated => "PrCreated",
            WorkItemState::Completed => "Completed",
            WorkItemState::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Check a (from, to) pair against the transition table
pub fn is_valid_transition(from: WorkItemState, to: WorkItemState) -> bool {
    from.successors().contains(&to)
}

/// Kind of a recorded workflow event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkflowEventKind {
    /// A validated state transition was applied
    StateChanged {
        /// State before the transition
        from: WorkItemState,
        /// State after the transition
        to: WorkItemState,
    },
    /// Analysis raised a question for a human
    QuestionAdded,
    /// A human answered a question
    AnswerAdded,
    /// Planning produced a change plan
    PlanCreated,
    /// A pull request was opened
    PrCreated,
    /// The run suspended awaiting external input
    RunSuspended,
    /// The run terminated with a failure
    RunFailed,
}

/// Immutable append-only audit record tied to a work item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Unique event ID
    pub event_id: String,
    /// Work item the event belongs to
    pub work_item_id: String,
    /// What happened
    pub kind: WorkflowEventKind,
    /// Human-readable detail (transition reason, question text, ...)
    pub detail: String,
    /// When it happened
    pub occurred_at: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Create a new event
    pub fn new(
        work_item_id: impl Into<String>,
        kind: WorkflowEventKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            work_item_id: work_item_id.into(),
            kind,
            detail: detail.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Artifacts accumulated while the work item moves through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkItemArtifacts {
    /// Plan text produced by the planning phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Branch name created by the implementation phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Pull-request reference created at the end of the pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<String>,
}

/// Aggregate root for one unit of business work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique work item ID
    pub work_item_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Ticket title or summary
    pub title: String,
    /// Current lifecycle state
    pub state: WorkItemState,
    /// Accumulated artifacts
    pub artifacts: WorkItemArtifacts,
    /// Retries consumed by the current run
    pub retry_count: u32,
    /// Error text from the most recent failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a work item at intake
    pub fn new(tenant_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            work_item_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            title: title.into(),
            state: WorkItemState::Received,
            artifacts: WorkItemArtifacts::default(),
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a validated state transition, returning the recorded event.
    ///
    /// Fails with [`EngineError::InvalidTransition`] for any pair the table
    /// does not permit. All callers - the graph included - go through this
    /// method; nothing mutates `state` directly.
    pub fn transition(
        &mut self,
        to: WorkItemState,
        reason: impl Into<String>,
    ) -> Result<WorkflowEvent> {
        let from = self.state;
        if !is_valid_transition(from, to) {
            return Err(EngineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.updated_at = Utc::now();
        Ok(WorkflowEvent::new(
            self.work_item_id.clone(),
            WorkflowEventKind::StateChanged { from, to },
            reason,
        ))
    }
}

/// Persistence boundary for work items and their event log
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Load a work item by id
    async fn load(&self, work_item_id: &str) -> Result<WorkItem>;

    /// Whole-aggregate replace
    async fn update(&self, work_item: &WorkItem) -> Result<()>;

    /// Append an immutable event
    async fn append_event(&self, event: WorkflowEvent) -> Result<()>;

    /// Events for a work item in append order
    async fn events(&self, work_item_id: &str) -> Result<Vec<WorkflowEvent>>;
}

/// In-memory work item store for tests and single-process hosts
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkItemStore {
    items: Arc<RwLock<HashMap<String, WorkItem>>>,
    events: Arc<RwLock<Vec<WorkflowEvent>>>,
}

impl InMemoryWorkItemStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a work item (intake)
    pub async fn insert(&self, work_item: WorkItem) {
        self.items
            .write()
            .await
            .insert(work_item.work_item_id.clone(), work_item);
    }
}

#[async_trait]
impl WorkItemStore for InMemoryWorkItemStore {
    async fn load(&self, work_item_id: &str) -> Result<WorkItem> {
        self.items
            .read()
            .await
            .get(work_item_id)
            .cloned()
            .ok_or_else(|| EngineError::WorkItemNotFound(work_item_id.to_string()))
    }

    async fn update(&self, work_item: &WorkItem) -> Result<()> {
        let mut items = self.items.write().await;
        if !items.contains_key(&work_item.work_item_id) {
            return Err(EngineError::WorkItemNotFound(
                work_item.work_item_id.clone(),
            ));
        }
        items.insert(work_item.work_item_id.clone(), work_item.clone());
        Ok(())
    }

    async fn append_event(&self, event: WorkflowEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn events(&self, work_item_id: &str) -> Result<Vec<WorkflowEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.work_item_id == work_item_id)
            .cloned()
            .collect())
    }
}
