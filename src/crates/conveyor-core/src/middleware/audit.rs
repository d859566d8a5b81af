//! Audit middleware
//!
//! Wraps the continuation with timing and snapshots and pushes an
//! [`ExecutionRecord`] onto the bounded queue. Sits outside the budget gate
//! so rejected steps are recorded too. Enqueueing never blocks on the sink
//! and never alters the outcome.

use crate::agent::AgentResult;
use crate::audit::{BoundedAuditQueue, ExecutionRecord};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::middleware::{AgentMiddleware, Next};
use async_trait::async_trait;
use chrono::Utc;

/// Audit stage feeding the bounded queue
pub struct AuditMiddleware {
    queue: BoundedAuditQueue,
}

impl AuditMiddleware {
    /// Create an audit stage over the given queue
    pub fn new(queue: BoundedAuditQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl AgentMiddleware for AuditMiddleware {
    async fn handle(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<AgentResult> {
        let started_at = Utc::now();
        let input_snapshot = serde_json::to_value(&*ctx).unwrap_or(serde_json::Value::Null);

        let result = next.run(ctx).await;

        let finished_at = Utc::now();
        let (success, output_snapshot, error) = match &result {
            Ok(agent_result) => (
                agent_result.is_success(),
                serde_json::to_value(agent_result).unwrap_or(serde_json::Value::Null),
                agent_result.error.clone(),
            ),
            Err(engine_error) => (false, serde_json::Value::Null, Some(engine_error.to_string())),
        };

        self.queue
            .push(ExecutionRecord {
                tenant_id: ctx.tenant_id.clone(),
                work_item_id: ctx.work_item_id.clone(),
                graph_id: ctx.graph_id.clone(),
                agent_name: next.agent().name().to_string(),
                started_at,
                finished_at,
                duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
                success,
                input_snapshot,
                output_snapshot,
                error,
            })
            .await;

        result
    }
}
