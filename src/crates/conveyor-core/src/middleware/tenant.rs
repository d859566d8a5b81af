//! Tenant isolation gate (outermost middleware stage)

use crate::agent::AgentResult;
use crate::context::ExecutionContext;
use crate::error::{EngineError, Result};
use crate::middleware::{AgentMiddleware, Next};
use crate::tenant::TenantResolver;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// Verifies the context's tenant against the work item's owner before any
/// other stage runs, and again afterwards to catch in-flight mutation.
/// Blank identifiers on either side are refused outright.
pub struct TenantGate {
    resolver: Arc<dyn TenantResolver>,
}

impl TenantGate {
    /// Create a gate over the given resolver
    pub fn new(resolver: Arc<dyn TenantResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl AgentMiddleware for TenantGate {
    async fn handle(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<AgentResult> {
        let owner = self.resolver.owner_of(&ctx.work_item_id).await?;
        // A blank identifier is never a valid tenancy; two blanks matching
        // each other must not open the gate.
        if ctx.tenant_id.trim().is_empty()
            || owner.trim().is_empty()
            || owner != ctx.tenant_id
        {
            error!(
                work_item = %ctx.work_item_id,
                expected = %ctx.tenant_id,
                actual = %owner,
                "Tenant isolation violation, refusing execution"
            );
            return Err(EngineError::tenant_violation(ctx.tenant_id.clone(), owner));
        }

        let result = next.run(ctx).await;

        // The tenant id must survive the whole invocation unchanged.
        if ctx.tenant_id != owner {
            error!(
                work_item = %ctx.work_item_id,
                expected = %owner,
                actual = %ctx.tenant_id,
                "Tenant id mutated during execution"
            );
            return Err(EngineError::tenant_violation(owner, ctx.tenant_id.clone()));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::context::InputEvent;
    use crate::middleware::MiddlewareChain;
    use crate::tenant::StaticTenantResolver;

    struct Noop;

    #[async_trait]
    impl Agent for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn run(&self, _ctx: &mut ExecutionContext) -> Result<AgentResult> {
            Ok(AgentResult::completed())
        }
    }

    struct TenantMutator;

    #[async_trait]
    impl Agent for TenantMutator {
        fn name(&self) -> &str {
            "mutator"
        }

        async fn run(&self, ctx: &mut ExecutionContext) -> Result<AgentResult> {
            ctx.tenant_id = "tenant-evil".to_string();
            Ok(AgentResult::completed())
        }
    }

    async fn chain_for(work_item: &str, owner: &str) -> MiddlewareChain {
        let resolver = StaticTenantResolver::new();
        resolver.assign(work_item, owner).await;
        MiddlewareChain::new(Arc::new(TenantGate::new(Arc::new(resolver))), vec![])
    }

    #[tokio::test]
    async fn matching_tenant_passes() {
        let chain = chain_for("wi-1", "tenant-a").await;
        let event = InputEvent::new("tenant-a", "wi-1", "ticket-received");
        let mut ctx = ExecutionContext::from_event("planning-graph", &event);

        let result = chain.execute(&Noop, &mut ctx).await.unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn mismatched_tenant_is_refused() {
        let chain = chain_for("wi-1", "tenant-a").await;
        let event = InputEvent::new("tenant-b", "wi-1", "ticket-received");
        let mut ctx = ExecutionContext::from_event("planning-graph", &event);

        let err = chain.execute(&Noop, &mut ctx).await.unwrap_err();
        match err {
            EngineError::TenantViolation { expected, actual } => {
                assert_eq!(expected, "tenant-b");
                assert_eq!(actual, "tenant-a");
            }
            other => panic!("expected TenantViolation, got {other}"),
        }
    }

    #[tokio::test]
    async fn blank_tenant_never_matches_a_blank_owner() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct Counting(AtomicU32);

        #[async_trait]
        impl Agent for Counting {
            fn name(&self) -> &str {
                "counting"
            }

            async fn run(&self, _ctx: &mut ExecutionContext) -> Result<AgentResult> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(AgentResult::completed())
            }
        }

        for blank in ["", "   "] {
            let chain = chain_for("wi-1", blank).await;
            let event = InputEvent::new(blank, "wi-1", "ticket-received");
            let mut ctx = ExecutionContext::from_event("planning-graph", &event);

            let agent = Counting(AtomicU32::new(0));
            let err = chain.execute(&agent, &mut ctx).await.unwrap_err();
            assert!(matches!(err, EngineError::TenantViolation { .. }));
            assert_eq!(agent.0.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn in_flight_mutation_is_caught() {
        let chain = chain_for("wi-1", "tenant-a").await;
        let event = InputEvent::new("tenant-a", "wi-1", "ticket-received");
        let mut ctx = ExecutionContext::from_event("planning-graph", &event);

        let err = chain.execute(&TenantMutator, &mut ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::TenantViolation { .. }));
    }
}
