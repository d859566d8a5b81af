//! Middleware chain wrapping every agent invocation
//!
//! Cross-cutting concerns are composed around agents as an ordered chain of
//! [`AgentMiddleware`] stages, each receiving the execution context and a
//! [`Next`] continuation for the remainder of the chain. A stage may run
//! the continuation once (tenant, audit, budget), several times (retry), or
//! not at all (budget rejection).
//!
//! The default order is tenant → audit → budget → retry → agent:
//!
//! - the tenant gate is outermost so nothing runs for a mismatched tenant,
//!   not even audit;
//! - audit sits outside budget so budget rejections are still recorded;
//! - retry is innermost so a retried attempt re-runs only the agent, never
//!   the gates around it.
//!
//! [`MiddlewareChain::new`] takes the tenant gate as a separate argument so
//! the outermost position is enforced by construction rather than by
//! convention.

pub mod audit;
pub mod budget;
pub mod retry;
pub mod tenant;

use crate::agent::{Agent, AgentResult};
use crate::context::ExecutionContext;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use audit::AuditMiddleware;
pub use budget::BudgetGate;
pub use retry::RetryMiddleware;
pub use tenant::TenantGate;

/// One stage in the chain around an agent invocation
#[async_trait]
pub trait AgentMiddleware: Send + Sync {
    /// Handle the invocation, calling `next` zero or more times
    async fn handle(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<AgentResult>;
}

/// Continuation for the rest of the chain.
///
/// Copyable so a stage (the retry middleware) can invoke it repeatedly.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn AgentMiddleware>],
    agent: &'a dyn Agent,
}

impl<'a> Next<'a> {
    /// The agent at the end of the chain
    pub fn agent(&self) -> &'a dyn Agent {
        self.agent
    }

    /// Run the remaining stages and finally the agent
    pub async fn run(self, ctx: &mut ExecutionContext) -> Result<AgentResult> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    agent: self.agent,
                };
                stage.handle(ctx, next).await
            }
            None => self.agent.run(ctx).await,
        }
    }
}

/// Ordered middleware chain with the tenant gate pinned outermost
pub struct MiddlewareChain {
    stages: Vec<Arc<dyn AgentMiddleware>>,
}

impl MiddlewareChain {
    /// Build a chain from the mandatory tenant gate plus inner stages, in
    /// outermost-to-innermost order
    pub fn new(tenant: Arc<TenantGate>, inner: Vec<Arc<dyn AgentMiddleware>>) -> Self {
        let mut stages: Vec<Arc<dyn AgentMiddleware>> = Vec::with_capacity(inner.len() + 1);
        stages.push(tenant);
        stages.extend(inner);
        Self { stages }
    }

    /// Assemble the default chain: tenant → audit → budget → retry
    pub fn standard(
        resolver: Arc<dyn crate::tenant::TenantResolver>,
        budget: Arc<dyn crate::budget::BudgetService>,
        audit_queue: crate::audit::BoundedAuditQueue,
        config: &crate::config::EngineConfig,
    ) -> Self {
        Self::new(
            Arc::new(TenantGate::new(resolver)),
            vec![
                Arc::new(AuditMiddleware::new(audit_queue)),
                Arc::new(BudgetGate::new(budget, config.default_step_cost)),
                Arc::new(RetryMiddleware::new(config.retry.clone())),
            ],
        )
    }

    /// Run the full chain around one agent invocation
    pub async fn execute(
        &self,
        agent: &dyn Agent,
        ctx: &mut ExecutionContext,
    ) -> Result<AgentResult> {
        Next {
            stages: &self.stages,
            agent,
        }
        .run(ctx)
        .await
    }
}
