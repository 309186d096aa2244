//! Per-invocation execution options and interaction hooks

use crate::error::ExecutorResult;
use crate::quote::PlanChange;
use crate::status::UpdateStepHook;
use crate::step::{Step, TransactionRequest};

use async_trait::async_trait;
use std::sync::Arc;

/// Adjusts the prepared transaction right before signing. Fields set on
/// the returned request are merged over the original.
#[async_trait]
pub trait TransactionRequestHook: Send + Sync {
    async fn customize(&self, request: &TransactionRequest) -> ExecutorResult<TransactionRequest>;
}

/// Asks the user to accept a materially changed re-quote
#[async_trait]
pub trait ExchangeRateHook: Send + Sync {
    async fn accept(&self, updated: &Step, change: &PlanChange) -> bool;
}

/// Options for one executor invocation
#[derive(Clone)]
pub struct ExecutionOptions {
    /// When false the executor stops at `ACTION_REQUIRED` before signing
    pub allow_interaction: bool,
    pub update_transaction_request: Option<Arc<dyn TransactionRequestHook>>,
    pub accept_exchange_rate_update: Option<Arc<dyn ExchangeRateHook>>,
    pub update_step: Option<UpdateStepHook>,
}

impl ExecutionOptions {
    pub fn new(allow_interaction: bool) -> Self {
        Self {
            allow_interaction,
            update_transaction_request: None,
            accept_exchange_rate_update: None,
            update_step: None,
        }
    }

    pub fn with_transaction_hook(mut self, hook: Arc<dyn TransactionRequestHook>) -> Self {
        self.update_transaction_request = Some(hook);
        self
    }

    pub fn with_exchange_rate_hook(mut self, hook: Arc<dyn ExchangeRateHook>) -> Self {
        self.accept_exchange_rate_update = Some(hook);
        self
    }

    pub fn with_update_hook(mut self, hook: UpdateStepHook) -> Self {
        self.update_step = Some(hook);
        self
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::new(true)
    }
}
