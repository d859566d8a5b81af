//! Error types for engine operations
//!
//! Every failure class the engine surfaces is a typed [`EngineError`]
//! variant - callers never see a bare unhandled fault. The taxonomy follows
//! the propagation policy of the engine:
//!
//! - Tenant violations, invalid transitions, budget exhaustion and missing
//!   checkpoints are fatal for the current run and carry the identifiers a
//!   caller needs to diagnose them.
//! - Transient agent failures are retried inside the middleware chain and
//!   only become [`EngineError::AgentFailed`] once the attempt budget is
//!   exhausted.
//! - Audit sink failures are logged and swallowed; they never appear here.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during graph execution
#[derive(Error, Debug)]
pub enum EngineError {
    /// The context's tenant does not match the ambient tenant, or the
    /// tenant id was mutated during execution. Fatal, non-retryable.
    #[error("Tenant isolation violation: expected '{expected}', actual '{actual}'")]
    TenantViolation {
        /// Tenant declared on the execution context
        expected: String,
        /// Ambient tenant resolved for this execution
        actual: String,
    },

    /// A state change was requested that the transition table does not
    /// permit. Indicates a logic defect or a concurrent conflicting
    /// transition.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current work item state
        from: String,
        /// Requested successor state
        to: String,
    },

    /// The estimated step cost exceeds the tenant's remaining allotment.
    /// Fatal for this step only; explicitly non-retryable.
    #[error("Token budget exhausted for tenant '{tenant}': requested {requested}, remaining {remaining}")]
    BudgetExhausted {
        /// Tenant whose budget was checked
        tenant: String,
        /// Estimated cost of the step
        requested: u64,
        /// Allotment left in the current period
        remaining: u64,
    },

    /// Resume was called but no active checkpoint exists. Distinct from
    /// "not started"; never silently treated as a fresh run.
    #[error("No active checkpoint for work item '{work_item}' in graph '{graph}'")]
    MissingCheckpoint {
        /// Work item being resumed
        work_item: String,
        /// Graph being resumed
        graph: String,
    },

    /// An agent failed terminally (after its retry budget, if any).
    #[error("Agent '{agent}' failed: {error}")]
    AgentFailed {
        /// Name of the failing agent
        agent: String,
        /// Error text from the final attempt
        error: String,
    },

    /// The referenced work item does not exist
    #[error("Work item not found: {0}")]
    WorkItemNotFound(String),

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] conveyor_checkpoint::CheckpointError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Create an agent failure error
    pub fn agent_failed(agent: impl Into<String>, error: impl Into<String>) -> Self {
        Self::AgentFailed {
            agent: agent.into(),
            error: error.into(),
        }
    }

    /// Create a tenant violation error
    pub fn tenant_violation(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TenantViolation {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_violation_carries_both_ids() {
        let err = EngineError::tenant_violation("tenant-a", "tenant-b");
        let text = err.to_string();
        assert!(text.contains("tenant-a"));
        assert!(text.contains("tenant-b"));
    }

    #[test]
    fn invalid_transition_names_the_pair() {
        let err = EngineError::InvalidTransition {
            from: "Completed".to_string(),
            to: "Planning".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Completed to Planning"
        );
    }
}
