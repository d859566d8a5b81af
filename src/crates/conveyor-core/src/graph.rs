//! Graph executor
//!
//! An [`AgentGraph`] walks an ordered sequence of agents for one work item,
//! wrapping every invocation in the middleware chain and saving a
//! checkpoint after each completed step. Execution is resumable: a
//! suspended or interrupted run restarts from its single active checkpoint
//! with an observationally equivalent context, and steps whose output is
//! already on the blackboard are replayed from it rather than re-invoked.
//!
//! Terminal runs leave no dangling active checkpoint: completion and
//! failure both save a final snapshot and mark it with the terminal status.
//! Typed engine faults (budget exhaustion, invalid transitions) are
//! different - they stop the run but leave the active checkpoint in place
//! so the host can resume once the obstacle clears.

use crate::agent::{Agent, AgentResult, AgentStatus, CancelToken};
use crate::context::{ExecutionContext, InputEvent, RunPhase, StagePayload};
use crate::error::{EngineError, Result};
use crate::middleware::MiddlewareChain;
use crate::work_item::{WorkItemState, WorkItemStore, WorkflowEvent, WorkflowEventKind};
use chrono::{DateTime, Duration, Utc};
use conveyor_checkpoint::{Checkpoint, CheckpointId, CheckpointStatus, CheckpointStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one `execute`/`resume` call
#[derive(Debug)]
pub enum ExecutionResult {
    /// Every agent in the sequence finished
    Completed {
        /// Final context
        context: ExecutionContext,
    },
    /// The run stopped at a human-in-the-loop point
    Suspended {
        /// Checkpoint a later resume will start from
        checkpoint_id: CheckpointId,
        /// Context at suspension
        context: ExecutionContext,
    },
    /// An agent failed terminally
    Failed {
        /// Error text from the final attempt
        error: String,
        /// Context at failure
        context: ExecutionContext,
    },
    /// Cooperative cancellation was observed at a step boundary
    Cancelled {
        /// Checkpoint a later resume will start from
        checkpoint_id: CheckpointId,
        /// Context at cancellation
        context: ExecutionContext,
    },
}

/// Point-in-time view of a run derived from its latest checkpoint
#[derive(Debug, Clone)]
pub struct GraphStatus {
    /// Run phase recorded in the checkpointed context
    pub phase: RunPhase,
    /// Index of the next agent to run
    pub position: usize,
    /// Agent that produced the latest checkpoint, if saved at a boundary
    pub agent_name: Option<String>,
    /// Retries consumed by the run so far
    pub retry_count: u32,
    /// Lifecycle status of the latest checkpoint
    pub checkpoint_status: CheckpointStatus,
    /// Sequence number of the latest checkpoint
    pub sequence: u64,
    /// Last time the checkpoint changed
    pub updated_at: DateTime<Utc>,
}

/// Ordered agent sequence with checkpointed, middleware-wrapped execution
pub struct AgentGraph {
    graph_id: String,
    agents: Vec<Arc<dyn Agent>>,
    chain: MiddlewareChain,
    checkpoints: Arc<dyn CheckpointStore>,
    work_items: Arc<dyn WorkItemStore>,
    retention: Duration,
}

impl AgentGraph {
    /// Create an empty graph; add agents with [`with_agent`](Self::with_agent)
    pub fn new(
        graph_id: impl Into<String>,
        chain: MiddlewareChain,
        checkpoints: Arc<dyn CheckpointStore>,
        work_items: Arc<dyn WorkItemStore>,
    ) -> Self {
        Self {
            graph_id: graph_id.into(),
            agents: Vec::new(),
            chain,
            checkpoints,
            work_items,
            retention: Duration::hours(24 * 7),
        }
    }

    /// Append an agent to the sequence
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Override the checkpoint retention window
    pub fn with_retention_hours(mut self, hours: i64) -> Self {
        self.retention = Duration::hours(hours);
        self
    }

    /// Graph identifier used in checkpoint keys
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// Start a fresh run for the event's work item
    pub async fn execute(
        &self,
        event: InputEvent,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult> {
        info!(
            graph = %self.graph_id,
            work_item = %event.work_item_id,
            trigger = %event.kind,
            "Starting graph run"
        );
        let ctx = ExecutionContext::from_event(&self.graph_id, &event);
        self.run_loop(ctx, cancel).await
    }

    /// Continue a suspended run from its active checkpoint.
    ///
    /// Fails with [`EngineError::MissingCheckpoint`] when no active
    /// checkpoint exists - never silently treated as a fresh run.
    pub async fn resume(
        &self,
        event: InputEvent,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult> {
        let checkpoint = self
            .checkpoints
            .load_active(&event.work_item_id, &self.graph_id)
            .await?
            .ok_or_else(|| EngineError::MissingCheckpoint {
                work_item: event.work_item_id.clone(),
                graph: self.graph_id.clone(),
            })?;

        if checkpoint.tenant_id != event.tenant_id {
            return Err(EngineError::tenant_violation(
                event.tenant_id.clone(),
                checkpoint.tenant_id.clone(),
            ));
        }

        info!(
            graph = %self.graph_id,
            work_item = %event.work_item_id,
            checkpoint = %checkpoint.checkpoint_id,
            sequence = checkpoint.sequence,
            trigger = %event.kind,
            "Resuming graph run from checkpoint"
        );

        let mut ctx = ExecutionContext::restore(
            &checkpoint.tenant_id,
            &checkpoint.work_item_id,
            &checkpoint.graph_id,
            &checkpoint.blackboard,
        );
        ctx.absorb_event(&event);
        ctx.phase = RunPhase::Running;

        self.run_loop(ctx, cancel).await
    }

    /// Current run status for a work item, derived from its latest
    /// checkpoint; `None` when the work item never ran in this graph
    pub async fn status(&self, work_item_id: &str) -> Result<Option<GraphStatus>> {
        let latest = self
            .checkpoints
            .load_latest(work_item_id, &self.graph_id)
            .await?;
        Ok(latest.map(|cp| {
            let ctx = ExecutionContext::restore(
                &cp.tenant_id,
                &cp.work_item_id,
                &cp.graph_id,
                &cp.blackboard,
            );
            GraphStatus {
                phase: ctx.phase,
                position: ctx.position,
                agent_name: cp.agent_name.clone(),
                retry_count: ctx.retry_count,
                checkpoint_status: cp.status,
                sequence: cp.sequence,
                updated_at: cp.updated_at,
            }
        }))
    }

    /// Retention sweep: expire non-active checkpoints older than the
    /// configured window. Returns how many were expired.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.retention;
        let expired = self.checkpoints.expire_before(cutoff).await?;
        if expired > 0 {
            info!(graph = %self.graph_id, expired, "Retention sweep expired checkpoints");
        }
        Ok(expired)
    }

    async fn run_loop(
        &self,
        mut ctx: ExecutionContext,
        cancel: &CancelToken,
    ) -> Result<ExecutionResult> {
        loop {
            if ctx.position >= self.agents.len() {
                ctx.phase = RunPhase::Completed;
                let checkpoint = self.save_checkpoint(&ctx, None).await?;
                self.checkpoints
                    .mark_status(&checkpoint.checkpoint_id, CheckpointStatus::Completed)
                    .await?;
                info!(
                    graph = %self.graph_id,
                    work_item = %ctx.work_item_id,
                    "Graph run completed"
                );
                return Ok(ExecutionResult::Completed { context: ctx });
            }

            if cancel.is_cancelled() {
                ctx.phase = RunPhase::Suspended;
                let checkpoint = self.save_checkpoint(&ctx, None).await?;
                info!(
                    graph = %self.graph_id,
                    work_item = %ctx.work_item_id,
                    checkpoint = %checkpoint.checkpoint_id,
                    "Cancellation observed, run checkpointed"
                );
                return Ok(ExecutionResult::Cancelled {
                    checkpoint_id: checkpoint.checkpoint_id,
                    context: ctx,
                });
            }

            let agent = Arc::clone(&self.agents[ctx.position]);
            let agent_name = agent.name().to_string();

            // Replay, don't re-invoke: an output already on the blackboard
            // means this step completed in an earlier run.
            if ctx.blackboard.output(&agent_name).is_some() {
                debug!(
                    graph = %self.graph_id,
                    work_item = %ctx.work_item_id,
                    agent = %agent_name,
                    "Replaying recorded output, skipping agent"
                );
                ctx.position += 1;
                continue;
            }

            let outcome = self.chain.execute(agent.as_ref(), &mut ctx).await;

            let result = match outcome {
                Ok(result) => result,
                Err(error @ EngineError::TenantViolation { .. }) => {
                    // Persist nothing for an unauthorized caller.
                    return Err(error);
                }
                Err(error) => {
                    // Budget exhaustion and other typed faults stop the run
                    // but keep it resumable.
                    let checkpoint = self.save_checkpoint(&ctx, Some(&agent_name)).await?;
                    warn!(
                        graph = %self.graph_id,
                        work_item = %ctx.work_item_id,
                        agent = %agent_name,
                        checkpoint = %checkpoint.checkpoint_id,
                        %error,
                        "Run stopped by engine fault, checkpoint left active"
                    );
                    return Err(error);
                }
            };

            match result.status {
                AgentStatus::Completed => {
                    if let Some(output) = result.output.clone() {
                        ctx.blackboard.record(agent_name.clone(), output);
                    }
                    self.apply_result(&ctx, &agent_name, &result).await?;
                    ctx.position += 1;
                    self.save_checkpoint(&ctx, Some(&agent_name)).await?;
                }
                AgentStatus::Pending => {
                    self.apply_result(&ctx, &agent_name, &result).await?;
                    ctx.phase = RunPhase::Suspended;
                    let checkpoint = self.save_checkpoint(&ctx, Some(&agent_name)).await?;
                    self.append_event(
                        &ctx,
                        WorkflowEventKind::RunSuspended,
                        result.error.as_deref().unwrap_or("awaiting external input"),
                    )
                    .await;
                    info!(
                        graph = %self.graph_id,
                        work_item = %ctx.work_item_id,
                        agent = %agent_name,
                        checkpoint = %checkpoint.checkpoint_id,
                        "Run suspended awaiting external input"
                    );
                    return Ok(ExecutionResult::Suspended {
                        checkpoint_id: checkpoint.checkpoint_id,
                        context: ctx,
                    });
                }
                AgentStatus::Cancelled => {
                    ctx.phase = RunPhase::Suspended;
                    let checkpoint = self.save_checkpoint(&ctx, Some(&agent_name)).await?;
                    return Ok(ExecutionResult::Cancelled {
                        checkpoint_id: checkpoint.checkpoint_id,
                        context: ctx,
                    });
                }
                AgentStatus::Failed => {
                    let error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "agent failed".to_string());
                    ctx.phase = RunPhase::Failed;
                    let checkpoint = self.save_checkpoint(&ctx, Some(&agent_name)).await?;
                    self.checkpoints
                        .mark_status(&checkpoint.checkpoint_id, CheckpointStatus::Failed)
                        .await?;
                    self.fail_work_item(&ctx, &agent_name, &error).await;
                    warn!(
                        graph = %self.graph_id,
                        work_item = %ctx.work_item_id,
                        agent = %agent_name,
                        %error,
                        "Graph run failed"
                    );
                    return Ok(ExecutionResult::Failed {
                        error,
                        context: ctx,
                    });
                }
            }
        }
    }

    async fn save_checkpoint(
        &self,
        ctx: &ExecutionContext,
        agent_name: Option<&str>,
    ) -> Result<Checkpoint> {
        let blackboard = ctx.snapshot()?;
        let checkpoint = self
            .checkpoints
            .save(
                &ctx.tenant_id,
                &ctx.work_item_id,
                &self.graph_id,
                agent_name,
                blackboard,
            )
            .await?;
        debug!(
            graph = %self.graph_id,
            work_item = %ctx.work_item_id,
            checkpoint = %checkpoint.checkpoint_id,
            sequence = checkpoint.sequence,
            "Checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// Apply the state transition, artifacts and domain event an agent
    /// result requests
    async fn apply_result(
        &self,
        ctx: &ExecutionContext,
        agent_name: &str,
        result: &AgentResult,
    ) -> Result<()> {
        let touches_artifacts = matches!(
            result.output,
            Some(StagePayload::Plan { .. })
                | Some(StagePayload::Implementation { .. })
                | Some(StagePayload::PullRequest { .. })
        );
        if result.next_state.is_none() && result.event.is_none() && !touches_artifacts {
            return Ok(());
        }

        let mut item = self.work_items.load(&ctx.work_item_id).await?;

        match &result.output {
            Some(StagePayload::Plan { plan }) => item.artifacts.plan = Some(plan.clone()),
            Some(StagePayload::Implementation { branch, .. }) => {
                item.artifacts.branch = Some(branch.clone())
            }
            Some(StagePayload::PullRequest { reference }) => {
                item.artifacts.pull_request = Some(reference.clone())
            }
            _ => {}
        }
        item.retry_count = ctx.retry_count;

        let transition_event = match result.next_state {
            Some(state) => Some(item.transition(state, format!("{agent_name} finished"))?),
            None => None,
        };
        self.work_items.update(&item).await?;
        if let Some(event) = transition_event {
            self.work_items.append_event(event).await?;
        }
        if let Some(kind) = result.event.clone() {
            self.work_items
                .append_event(WorkflowEvent::new(
                    ctx.work_item_id.clone(),
                    kind,
                    agent_name,
                ))
                .await?;
        }
        Ok(())
    }

    /// Move the work item to `Failed` and record why. Best-effort: a
    /// missing or already-terminal item is logged and skipped.
    async fn fail_work_item(&self, ctx: &ExecutionContext, agent_name: &str, error: &str) {
        let mut item = match self.work_items.load(&ctx.work_item_id).await {
            Ok(item) => item,
            Err(load_error) => {
                warn!(
                    work_item = %ctx.work_item_id,
                    %load_error,
                    "Could not load work item to record failure"
                );
                return;
            }
        };
        if item.state.is_terminal() {
            return;
        }
        item.last_error = Some(error.to_string());
        item.retry_count = ctx.retry_count;
        let event = match item.transition(WorkItemState::Failed, format!("{agent_name}: {error}")) {
            Ok(event) => event,
            Err(transition_error) => {
                warn!(work_item = %ctx.work_item_id, %transition_error, "Failure transition rejected");
                return;
            }
        };
        if let Err(store_error) = self.work_items.update(&item).await {
            warn!(work_item = %ctx.work_item_id, %store_error, "Could not persist failed work item");
            return;
        }
        if let Err(store_error) = self.work_items.append_event(event).await {
            warn!(work_item = %ctx.work_item_id, %store_error, "Could not append failure transition event");
        }
        self.append_event(ctx, WorkflowEventKind::RunFailed, error).await;
    }

    async fn append_event(&self, ctx: &ExecutionContext, kind: WorkflowEventKind, detail: &str) {
        if let Err(error) = self
            .work_items
            .append_event(WorkflowEvent::new(ctx.work_item_id.clone(), kind, detail))
            .await
        {
            warn!(work_item = %ctx.work_item_id, %error, "Could not append workflow event");
        }
    }
}
