//! Step executor
//!
//! Drives a step through balance verification, re-quoting, user-gated
//! signing and broadcast, source-chain confirmation and, for cross-chain
//! steps, the receiving-leg wait. Every transition goes through the
//! process ledger so a re-invocation resumes from the recorded state.

pub mod engine;
pub mod options;
pub mod registry;


pub use engine::{StepExecutor, StepOutcome};
pub use options::{ExchangeRateHook, ExecutionOptions, TransactionRequestHook};
pub use registry::{ExecutionClaim, ExecutionRegistry};
