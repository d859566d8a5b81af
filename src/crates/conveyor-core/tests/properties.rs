//! Property tests: transition-table closure, context round-trips and
//! backoff bounds.

use conveyor_core::{
    is_valid_transition, ExecutionContext, InputEvent, RetryConfig, StagePayload, WorkItem,
    WorkItemState,
};
use proptest::prelude::*;

fn arb_state() -> impl Strategy<Value = WorkItemState> {
    prop::sample::select(WorkItemState::all().to_vec())
}

proptest! {
    #[test]
    fn transition_table_is_closed(from in arb_state(), to in arb_state()) {
        let allowed = is_valid_transition(from, to);

        // Terminal states permit nothing
        if from.is_terminal() {
            prop_assert!(!allowed);
        }
        // Every successor is a declared state
        for successor in from.successors() {
            prop_assert!(WorkItemState::all().contains(successor));
        }

        // transition() agrees with the table and never half-applies
        let mut item = WorkItem::new("tenant-a", "property probe");
        item.state = from;
        let outcome = item.transition(to, "probe");
        prop_assert_eq!(allowed, outcome.is_ok());
        if allowed {
            prop_assert_eq!(item.state, to);
        } else {
            prop_assert_eq!(item.state, from);
        }
    }

    #[test]
    fn failure_is_reachable_from_every_non_terminal_state(state in arb_state()) {
        if !state.is_terminal() {
            prop_assert!(is_valid_transition(state, WorkItemState::Failed));
        }
    }

    #[test]
    fn context_snapshot_round_trips(
        work_item in "[a-z0-9-]{1,16}",
        tenant in "[a-z0-9-]{1,12}",
        position in 0usize..16,
        retries in 0u32..10,
        outputs in prop::collection::btree_map("[a-z]{1,8}", "[ -~]{0,32}", 0..6),
    ) {
        let event = InputEvent::new(tenant.clone(), work_item.clone(), "probe");
        let mut ctx = ExecutionContext::from_event("planning-graph", &event);
        ctx.position = position;
        ctx.retry_count = retries;
        for (agent, text) in outputs {
            ctx.blackboard.record(
                agent,
                StagePayload::Opaque {
                    data: serde_json::Value::String(text),
                },
            );
        }

        let payload = ctx.snapshot().unwrap();
        let restored = ExecutionContext::restore(&tenant, &work_item, "planning-graph", &payload);
        prop_assert_eq!(restored, ctx);
    }

    #[test]
    fn backoff_is_monotone_and_capped(
        initial in 1u64..2_000,
        cap in 1u64..60_000,
        attempt in 0u32..12,
    ) {
        let config = RetryConfig::new(5)
            .with_initial_backoff(initial)
            .with_max_backoff(cap)
            .with_jitter(false);

        let delay = config.backoff_delay(attempt).as_millis() as u64;
        prop_assert!(delay <= cap);
        if attempt > 0 {
            let previous = config.backoff_delay(attempt - 1).as_millis() as u64;
            prop_assert!(delay >= previous);
        }
    }

    #[test]
    fn jitter_adds_at_most_a_quarter(
        initial in 1u64..2_000,
        attempt in 0u32..8,
    ) {
        let base = RetryConfig::new(5)
            .with_initial_backoff(initial)
            .with_jitter(false);
        let jittered = base.clone().with_jitter(true);

        let floor = base.backoff_delay(attempt).as_millis() as u64;
        let delay = jittered.backoff_delay(attempt).as_millis() as u64;
        prop_assert!(delay >= floor);
        prop_assert!(delay <= floor + floor / 4 + 1);
    }
}
