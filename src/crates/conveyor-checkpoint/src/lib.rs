//! # conveyor-checkpoint - State Persistence for Agent Graph Execution
//!
//! Trait-based checkpoint abstractions and an in-memory reference
//! implementation for persisting and restoring agent graph execution
//! state. Checkpoints are what make suspension (human-in-the-loop waits)
//! and crash recovery indistinguishable from uninterrupted execution: the
//! engine writes one after every agent boundary, and `resume` reconstructs
//! the run from the single active checkpoint per (work item, graph).
//!
//! ## Core types
//!
//! - [`Checkpoint`] - one snapshot: four-part key, opaque blackboard,
//!   status, sequence, timestamps
//! - [`CheckpointStatus`] - `active | resumed | completed | failed | expired`
//! - [`CheckpointStore`] - async storage trait (save / load_latest /
//!   load_active / load_history / mark_status / expire_before)
//! - [`InMemoryCheckpointStore`] - reference implementation for tests and
//!   single-process hosts
//! - [`BlackboardSerializer`] / [`JsonSerializer`] - payload codec
//!
//! ## Guarantees
//!
//! - At most one `active` checkpoint per (work item, graph) key
//! - `save` is write-new-then-mark: a failed save never corrupts the prior
//!   resume point
//! - Sequence numbers are strictly increasing per key; history is retained
//!   for audit and replay until the retention sweep expires it
//!
//! Production deployments implement [`CheckpointStore`] against their own
//! database; the engine is backend-agnostic.

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointId, CheckpointKey, CheckpointStatus};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use serializer::{BlackboardSerializer, JsonSerializer};
pub use store::CheckpointStore;
