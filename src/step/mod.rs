//! Step data model
//!
//! A step is one planned leg of a transfer. It is treated as immutable by
//! convention: only its `execution` record is mutated while it runs, and the
//! plan itself is only ever replaced wholesale after a re-quote.

mod execution;

pub use execution::{
    Execution, ExecutionStatus, GasCost, Process, ProcessError, ProcessStatus, ProcessType,
};

use crate::error::{ExecutorError, ExecutorResult};

use serde::{Deserialize, Serialize};

/// Kind of step as planned by the quoting service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Swap,
    Cross,
    Lifi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: String,
    pub chain_id: u64,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// What the step moves: source/destination chains, tokens and amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub from_token: Token,
    pub to_token: Token,
    pub from_amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    #[serde(default = "default_slippage")]
    pub slippage: f64,
}

fn default_slippage() -> f64 {
    0.005
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeCost {
    pub name: String,
    pub amount: String,
    pub token: Token,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<String>,
}

/// Expected outcome of the step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub from_amount: String,
    pub to_amount: String,
    pub to_amount_min: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_address: Option<String>,
    #[serde(default)]
    pub gas_costs: Vec<GasCost>,
    #[serde(default)]
    pub fee_costs: Vec<FeeCost>,
    #[serde(default)]
    pub execution_duration: f64,
}

/// Prepared, chain-specific transaction payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Encoded transaction: base64 envelope on SVM chains, 0x-hex calldata on EVM chains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
}

impl TransactionRequest {
    /// Payload, if one is actually present
    pub fn payload(&self) -> Option<&str> {
        self.data.as_deref().filter(|d| !d.is_empty())
    }

    /// Merge the fields set in `patch` over this request
    pub fn merge(&mut self, patch: TransactionRequest) {
        if patch.data.is_some() {
            self.data = patch.data;
        }
        if patch.to.is_some() {
            self.to = patch.to;
        }
        if patch.value.is_some() {
            self.value = patch.value;
        }
        if patch.gas_limit.is_some() {
            self.gas_limit = patch.gas_limit;
        }
        if patch.gas_price.is_some() {
            self.gas_price = patch.gas_price;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub tool: String,
    pub action: Action,
    pub estimate: Estimate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_request: Option<TransactionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

impl Step {
    pub fn is_cross_chain(&self) -> bool {
        self.action.from_chain_id != self.action.to_chain_id
    }

    /// Process type of the send phase
    pub fn primary_process_type(&self) -> ProcessType {
        if self.is_cross_chain() {
            ProcessType::CrossChain
        } else {
            ProcessType::Swap
        }
    }

    /// Prepared payload, if any
    pub fn payload(&self) -> Option<&str> {
        self.transaction_request
            .as_ref()
            .and_then(TransactionRequest::payload)
    }

    /// Replace the plan with `updated` while keeping this step's execution record
    pub fn replace_plan(&mut self, updated: Step) {
        let execution = self.execution.take();
        *self = updated;
        self.execution = execution;
    }

    pub fn process(&self, process_type: ProcessType) -> Option<&Process> {
        self.execution
            .as_ref()
            .and_then(|e| e.process.iter().find(|p| p.process_type == process_type))
    }

    /// Error of the first FAILED process, if any
    pub fn failure(&self) -> Option<&ProcessError> {
        self.execution
            .as_ref()?
            .process
            .iter()
            .filter(|p| p.status == ProcessStatus::Failed)
            .find_map(|p| p.error.as_ref())
    }
}

/// Parse a base-unit token amount
pub fn parse_amount(amount: &str) -> ExecutorResult<u128> {
    amount
        .trim()
        .parse::<u128>()
        .map_err(|_| ExecutorError::InvalidAmount(amount.to_string()))
}
