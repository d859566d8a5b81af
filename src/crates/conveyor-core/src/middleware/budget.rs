//! Usage-budget gate
//!
//! Checks the tenant's remaining token allotment against the step's
//! estimated cost before the agent runs, and records actual consumption
//! afterwards. A rejected step never reaches the continuation and is
//! explicitly non-retryable; budget-service outages fail open so an
//! accounting dependency cannot stall the pipeline.
//!
//! The check-then-consume sequence is not atomic across concurrent
//! executions; see the `budget` module for the tolerated overshoot.

use crate::agent::AgentResult;
use crate::budget::BudgetService;
use crate::context::ExecutionContext;
use crate::error::{EngineError, Result};
use crate::middleware::{AgentMiddleware, Next};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Budget middleware stage
pub struct BudgetGate {
    service: Arc<dyn BudgetService>,
    default_step_cost: u64,
}

impl BudgetGate {
    /// Create a gate with the cost assumed for agents that do not estimate
    /// their own
    pub fn new(service: Arc<dyn BudgetService>, default_step_cost: u64) -> Self {
        Self {
            service,
            default_step_cost,
        }
    }
}

#[async_trait]
impl AgentMiddleware for BudgetGate {
    async fn handle(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<AgentResult> {
        let agent_name = next.agent().name().to_string();
        let estimated = next
            .agent()
            .estimated_tokens()
            .unwrap_or(self.default_step_cost);

        match self.service.get_budget(&ctx.tenant_id).await {
            Ok(budget) => {
                if budget.would_exceed(estimated) {
                    warn!(
                        tenant = %ctx.tenant_id,
                        agent = %agent_name,
                        requested = estimated,
                        remaining = budget.remaining(),
                        "Token budget exhausted, step rejected"
                    );
                    return Err(EngineError::BudgetExhausted {
                        tenant: ctx.tenant_id.clone(),
                        requested: estimated,
                        remaining: budget.remaining(),
                    });
                }
            }
            Err(error) => {
                // Fail open: budget accounting must not stall execution.
                warn!(
                    tenant = %ctx.tenant_id,
                    %error,
                    "Budget lookup failed, allowing step without a check"
                );
            }
        }

        let result = next.run(ctx).await;

        if let Ok(agent_result) = &result {
            // Charge actual consumption when the agent reported it, the
            // estimate otherwise (successful steps only).
            let consumed = match agent_result.tokens_used {
                Some(actual) => Some(actual),
                None if agent_result.is_success() => Some(estimated),
                None => None,
            };
            if let Some(amount) = consumed {
                debug!(tenant = %ctx.tenant_id, agent = %agent_name, amount, "Recording token usage");
                if let Err(error) = self
                    .service
                    .record_usage(&ctx.tenant_id, amount, &agent_name, &ctx.work_item_id)
                    .await
                {
                    warn!(tenant = %ctx.tenant_id, %error, "Usage recording failed");
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::budget::{InMemoryBudgetService, TokenBudget};
    use crate::context::InputEvent;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CostedAgent {
        cost: u64,
        runs: AtomicU32,
    }

    #[async_trait]
    impl Agent for CostedAgent {
        fn name(&self) -> &str {
            "planner"
        }

        fn estimated_tokens(&self) -> Option<u64> {
            Some(self.cost)
        }

        async fn run(&self, _ctx: &mut ExecutionContext) -> Result<AgentResult> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(AgentResult::completed().with_tokens_used(self.cost))
        }
    }

    fn ctx() -> ExecutionContext {
        let event = InputEvent::new("tenant-a", "wi-1", "plan-requested");
        ExecutionContext::from_event("planning-graph", &event)
    }

    async fn run_gate(
        service: Arc<InMemoryBudgetService>,
        agent: &CostedAgent,
    ) -> Result<AgentResult> {
        let gate = BudgetGate::new(service, 1_000);
        let stages: Vec<Arc<dyn AgentMiddleware>> = vec![];
        let next = Next {
            stages: &stages,
            agent,
        };
        gate.handle(&mut ctx(), next).await
    }

    #[tokio::test]
    async fn sufficient_budget_runs_and_records() {
        let service = Arc::new(InMemoryBudgetService::new());
        service.set_budget(TokenBudget::new("tenant-a", 10_000)).await;

        let agent = CostedAgent {
            cost: 2_000,
            runs: AtomicU32::new(0),
        };
        let result = run_gate(service.clone(), &agent).await.unwrap();

        assert!(result.is_success());
        assert_eq!(agent.runs.load(Ordering::SeqCst), 1);
        let budget = service.get_budget("tenant-a").await.unwrap();
        assert_eq!(budget.used, 2_000);
    }

    #[tokio::test]
    async fn exhausted_budget_never_invokes_the_agent() {
        let service = Arc::new(InMemoryBudgetService::new());
        let mut budget = TokenBudget::new("tenant-a", 10_000);
        budget.used = 9_900;
        service.set_budget(budget).await;

        let agent = CostedAgent {
            cost: 1_000,
            runs: AtomicU32::new(0),
        };
        let err = run_gate(service.clone(), &agent).await.unwrap_err();

        match err {
            EngineError::BudgetExhausted {
                tenant,
                requested,
                remaining,
            } => {
                assert_eq!(tenant, "tenant-a");
                assert_eq!(requested, 1_000);
                assert_eq!(remaining, 100);
            }
            other => panic!("expected BudgetExhausted, got {other}"),
        }
        assert_eq!(agent.runs.load(Ordering::SeqCst), 0);
        // Nothing was charged for the rejected step
        assert!(service.usage_records().await.is_empty());
    }

    #[tokio::test]
    async fn budget_service_outage_fails_open() {
        struct BrokenService;

        #[async_trait]
        impl BudgetService for BrokenService {
            async fn get_budget(&self, _tenant_id: &str) -> Result<TokenBudget> {
                Err(EngineError::Configuration("budget backend down".to_string()))
            }

            async fn record_usage(
                &self,
                _tenant_id: &str,
                _amount: u64,
                _source: &str,
                _work_item_id: &str,
            ) -> Result<()> {
                Err(EngineError::Configuration("budget backend down".to_string()))
            }
        }

        let gate = BudgetGate::new(Arc::new(BrokenService), 1_000);
        let agent = CostedAgent {
            cost: 500,
            runs: AtomicU32::new(0),
        };
        let stages: Vec<Arc<dyn AgentMiddleware>> = vec![];
        let next = Next {
            stages: &stages,
            agent: &agent,
        };

        let result = gate.handle(&mut ctx(), next).await.unwrap();
        assert!(result.is_success());
        assert_eq!(agent.runs.load(Ordering::SeqCst), 1);
    }
}
