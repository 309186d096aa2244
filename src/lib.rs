//! Step Executor - drives cross-chain transfer steps to completion
//!
//! A step moves through balance verification, optional re-quoting, user-gated
//! signing and broadcast, source-chain confirmation and, for cross-chain
//! steps, the wait for the receiving leg. Progress is recorded on the step
//! itself so an interrupted execution resumes where it stopped.

pub mod balance;
pub mod chain;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod quote;
pub mod receiving;
pub mod service;
pub mod status;
pub mod step;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::{ExecutionOptions, StepExecutor, StepOutcome};
