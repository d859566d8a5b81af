//! Retry middleware (innermost stage)
//!
//! Re-runs the continuation - which at this depth is just the agent - with
//! exponential backoff when the attempt failed transiently. Sitting
//! innermost means a retried attempt never re-runs the gates around it and
//! never re-invokes upstream agents.
//!
//! An attempt is retried when the agent marked its result retryable or the
//! error text classifies as transient. `Err` returns from the agent are
//! converted into failed results here so the graph sees one uniform failure
//! shape.

use crate::agent::{AgentResult, AgentStatus};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::middleware::{AgentMiddleware, Next};
use crate::retry::{classify_error, ErrorClass, RetryConfig};
use async_trait::async_trait;
use tracing::{info, warn};

/// Retry stage over one agent invocation
pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    /// Create a retry stage with the given strategy
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    fn is_retryable(result: &AgentResult) -> bool {
        if result.retryable {
            return true;
        }
        match &result.error {
            Some(text) => classify_error(text) == ErrorClass::Transient,
            None => false,
        }
    }
}

#[async_trait]
impl AgentMiddleware for RetryMiddleware {
    async fn handle(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<AgentResult> {
        let agent_name = next.agent().name().to_string();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let result = match next.run(ctx).await {
                Ok(result) => result,
                Err(error) => {
                    let text = error.to_string();
                    let mut failed = AgentResult::failed(text.clone());
                    failed.retryable = classify_error(&text) == ErrorClass::Transient;
                    failed
                }
            };

            if result.status != AgentStatus::Failed {
                if attempts > 1 {
                    info!(agent = %agent_name, attempts, "Agent recovered after retries");
                }
                return Ok(result);
            }

            if !Self::is_retryable(&result) || !self.config.should_retry(attempts) {
                return Ok(result);
            }

            ctx.retry_count += 1;
            let delay = self.config.backoff_delay(attempts - 1);
            warn!(
                agent = %agent_name,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = result.error.as_deref().unwrap_or(""),
                "Transient agent failure, backing off before retry"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
