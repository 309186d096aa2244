//! Remote quoting and status service
//!
//! The executor reaches the quoting service through two capabilities:
//! re-fetching a prepared step and reading the status of a cross-chain
//! transfer's receiving leg.

mod client;

pub use client::StepServiceClient;

use crate::error::ExecutorResult;
use crate::step::{Step, Token};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Transfer status reported by the status service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    NotFound,
    Invalid,
    Pending,
    Done,
    Failed,
}

/// One side of a cross-chain transfer as seen by the status service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub tx_link: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub token: Option<Token>,
    #[serde(default)]
    pub gas_amount: Option<String>,
    #[serde(default, rename = "gasAmountUSD")]
    pub gas_amount_usd: Option<String>,
    #[serde(default)]
    pub gas_token: Option<Token>,
}

/// Status of a transfer keyed by its source transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: TransferStatus,
    #[serde(default)]
    pub substatus: Option<String>,
    #[serde(default)]
    pub substatus_message: Option<String>,
    #[serde(default)]
    pub sending: TransactionInfo,
    #[serde(default)]
    pub receiving: Option<TransactionInfo>,
}

/// Query for the receiving leg of a transfer
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRequest {
    pub tx_hash: String,
    pub bridge: String,
    pub from_chain: u64,
    pub to_chain: u64,
}

impl StatusRequest {
    pub fn for_step(step: &Step, tx_hash: &str) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
            bridge: step.tool.clone(),
            from_chain: step.action.from_chain_id,
            to_chain: step.action.to_chain_id,
        }
    }
}

/// Re-quote of a step, returning a freshly prepared plan
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn fetch_updated_step(&self, step: &Step) -> ExecutorResult<Step>;
}

/// Status lookups for the receiving leg of a transfer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusService: Send + Sync {
    async fn fetch_receiving_leg_status(&self, request: &StatusRequest)
        -> ExecutorResult<StatusResponse>;
}
