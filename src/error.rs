//! Error types for the step executor

use crate::step::ProcessType;
use thiserror::Error;

/// Main error type for step execution
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient {token} balance: have {available}, need {required}")]
    InsufficientFunds {
        token: String,
        required: String,
        available: String,
    },

    #[error("Unable to prepare transaction")]
    TransactionUnprepared,

    #[error("Transaction failed on chain: {0}")]
    TransactionFailed(String),

    #[error("Transaction was replaced by {replacement}")]
    TransactionReplaced { replacement: String },

    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    #[error("Exchange rate has changed: expected at least {previous}, now {updated}")]
    ExchangeRateUpdateCanceled { previous: String, updated: String },

    #[error("Signing agent error: {0}")]
    Signer(String),

    #[error("RPC error for chain {chain_id}: {message}")]
    Rpc { chain_id: u64, message: String },

    #[error("API error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid transaction payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid amount {0:?}")]
    InvalidAmount(String),

    #[error("Receiving chain transfer failed ({status}): {message}")]
    ReceivingChainFailed { status: String, message: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u64 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Process {0} not found")]
    ProcessNotFound(ProcessType),

    #[error("Step {step_id} is already being executed")]
    StepAlreadyExecuting { step_id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExecutorError {
    /// Check if the caller may retry the whole step invocation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutorError::Rpc { .. }
                | ExecutorError::Api { .. }
                | ExecutorError::Http(_)
                | ExecutorError::Timeout { .. }
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            ExecutorError::ReceivingChainFailed { .. }
                | ExecutorError::Signer(_)
                | ExecutorError::InvalidStateTransition { .. }
        )
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;
