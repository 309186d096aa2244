//! Execution record and per-phase processes

use super::Token;
use crate::classifier::ErrorCode;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of a step's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Done,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Done | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Done => "DONE",
            ExecutionStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Phase identifier of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessType {
    Swap,
    CrossChain,
    ReceivingChain,
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessType::Swap => "SWAP",
            ProcessType::CrossChain => "CROSS_CHAIN",
            ProcessType::ReceivingChain => "RECEIVING_CHAIN",
        };
        f.write_str(name)
    }
}

/// Per-phase state machine: `STARTED -> ACTION_REQUIRED -> PENDING -> DONE`,
/// with `FAILED` reachable from any non-terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Started,
    ActionRequired,
    Pending,
    Done,
    Failed,
}

impl ProcessStatus {
    fn rank(self) -> u8 {
        match self {
            ProcessStatus::Started => 0,
            ProcessStatus::ActionRequired => 1,
            ProcessStatus::Pending => 2,
            ProcessStatus::Done | ProcessStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Done | ProcessStatus::Failed)
    }

    /// Whether `next` is reachable from this status. Re-entering the same
    /// status is always allowed.
    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next == ProcessStatus::Failed || next.rank() > self.rank()
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessStatus::Started => "STARTED",
            ProcessStatus::ActionRequired => "ACTION_REQUIRED",
            ProcessStatus::Pending => "PENDING",
            ProcessStatus::Done => "DONE",
            ProcessStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Classified failure attached to a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasCost {
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<String>,
    pub token: Token,
}

/// Unit of resumable state, one per phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substatus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substatus_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessError>,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<i64>,
}

impl Process {
    pub fn new(process_type: ProcessType, status: ProcessStatus, started_at: i64) -> Self {
        Self {
            process_type,
            status,
            message: None,
            tx_hash: None,
            tx_link: None,
            substatus: None,
            substatus_message: None,
            error: None,
            started_at,
            done_at: None,
        }
    }
}

/// Aggregate status record of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub process: Vec<Process>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_token: Option<Token>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gas_costs: Vec<GasCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<i64>,
}

impl Execution {
    pub fn new() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            process: Vec::new(),
            from_amount: None,
            to_amount: None,
            to_token: None,
            gas_costs: Vec::new(),
            started_at: None,
            done_at: None,
        }
    }

    pub fn process(&self, process_type: ProcessType) -> Option<&Process> {
        self.process.iter().find(|p| p.process_type == process_type)
    }

    pub fn process_mut(&mut self, process_type: ProcessType) -> Option<&mut Process> {
        self.process
            .iter_mut()
            .find(|p| p.process_type == process_type)
    }
}

impl Default for Execution {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use ProcessStatus::*;

        assert!(Started.can_transition_to(ActionRequired));
        assert!(ActionRequired.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Done));
        assert!(Started.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_backward_and_terminal_transitions_rejected() {
        use ProcessStatus::*;

        assert!(!Pending.can_transition_to(ActionRequired));
        assert!(!ActionRequired.can_transition_to(Started));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
        assert!(ActionRequired.can_transition_to(Failed));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ProcessStatus::ActionRequired).unwrap(),
            "\"ACTION_REQUIRED\""
        );
        assert_eq!(
            serde_json::to_string(&ProcessType::ReceivingChain).unwrap(),
            "\"RECEIVING_CHAIN\""
        );
        assert_eq!(ProcessType::CrossChain.to_string(), "CROSS_CHAIN");
    }
}
