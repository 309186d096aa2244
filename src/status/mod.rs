//! Process ledger
//!
//! Owns the per-phase processes attached to a step's execution record:
//! - Idempotent execution initialization
//! - Find-or-create of one process per phase
//! - Forward-only status transitions with patch merging
//! - Execution summary updates once the step concludes
//!
//! Pure state mutation, no I/O. Each step owns its execution; callers must
//! serialize updates to the same step.

mod manager;

pub use manager::{ExecutionPatch, ProcessPatch, StatusManager, UpdateStepHook};
