//! Error classification
//!
//! Maps raw failures from signing, broadcast, confirmation, quoting and the
//! receiving-leg wait onto a closed set of codes with user-facing messages.
//! Classification is total: it never fails and falls back to `Unknown` with
//! the original message.

use crate::chain::Chain;
use crate::error::ExecutorError;
use crate::step::ProcessError;

use serde::{Deserialize, Serialize};

/// Closed error taxonomy recorded on failed processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InsufficientFunds,
    TransactionUnprepared,
    TransactionFailed,
    TransactionRejected,
    ExchangeRateUpdateCanceled,
    ProviderUnavailable,
    Timeout,
    ReceivingChainTimeout,
    Unknown,
}

/// Substrings reported by signing agents and RPC nodes, checked in order
const MESSAGE_PATTERNS: &[(&str, ErrorCode)] = &[
    ("user rejected", ErrorCode::TransactionRejected),
    ("rejected the request", ErrorCode::TransactionRejected),
    ("user denied", ErrorCode::TransactionRejected),
    ("insufficient funds", ErrorCode::InsufficientFunds),
    ("insufficient lamports", ErrorCode::InsufficientFunds),
    ("blockhash not found", ErrorCode::TransactionFailed),
    ("block height exceeded", ErrorCode::TransactionFailed),
    ("simulation failed", ErrorCode::TransactionFailed),
    ("timed out", ErrorCode::Timeout),
];

/// Classify an error raised during the send phase
pub fn classify(error: &ExecutorError) -> ProcessError {
    let (code, message) = match error {
        ExecutorError::InsufficientFunds {
            token,
            required,
            available,
        } => (
            ErrorCode::InsufficientFunds,
            format!(
                "Your {} balance is too low: the transfer needs {} but your wallet only holds {}.",
                token, required, available
            ),
        ),
        ExecutorError::TransactionUnprepared => (
            ErrorCode::TransactionUnprepared,
            "Unable to prepare the transaction for this step.".to_string(),
        ),
        ExecutorError::TransactionFailed(reason) => (
            ErrorCode::TransactionFailed,
            format!("The transaction failed on chain: {}", reason),
        ),
        ExecutorError::SignatureRejected(_) => (
            ErrorCode::TransactionRejected,
            "The signature request was rejected.".to_string(),
        ),
        ExecutorError::ExchangeRateUpdateCanceled { .. } => (
            ErrorCode::ExchangeRateUpdateCanceled,
            "The exchange rate has changed and the new quote was not accepted.".to_string(),
        ),
        ExecutorError::ReceivingChainFailed { message, .. } => {
            (ErrorCode::TransactionFailed, message.clone())
        }
        ExecutorError::Timeout { .. } => (ErrorCode::Timeout, error.to_string()),
        ExecutorError::Rpc { .. } | ExecutorError::Api { .. } | ExecutorError::Http(_) => {
            (ErrorCode::ProviderUnavailable, error.to_string())
        }
        ExecutorError::Signer(message) => (match_message(message), error.to_string()),
        _ => (ErrorCode::Unknown, error.to_string()),
    };

    ProcessError {
        code,
        message,
        html_message: None,
    }
}

/// Classify a failure of the receiving-leg wait. The result carries an
/// HTML explanation pointing at the source transaction.
pub fn classify_receiving_failure(
    error: &ExecutorError,
    chain: Option<&Chain>,
    tx_link: Option<&str>,
) -> ProcessError {
    let mut classified = classify(error);
    classified.code = match classified.code {
        ErrorCode::Timeout => ErrorCode::ReceivingChainTimeout,
        ErrorCode::Unknown | ErrorCode::ProviderUnavailable => ErrorCode::TransactionFailed,
        code => code,
    };

    let explorer = match (chain, tx_link) {
        (Some(chain), Some(link)) => format!(
            " Check the transaction on the {} explorer: <a href=\"{}\" target=\"_blank\" rel=\"nofollow noreferrer\">{}</a>.",
            chain.name, link, link
        ),
        (None, Some(link)) => format!(
            " Check the source transaction: <a href=\"{}\" target=\"_blank\" rel=\"nofollow noreferrer\">{}</a>.",
            link, link
        ),
        _ => String::new(),
    };
    classified.html_message = Some(format!(
        "The funds were sent but the transfer did not complete on the destination chain ({}).{}",
        classified.message, explorer
    ));
    classified
}

fn match_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();
    MESSAGE_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, code)| *code)
        .unwrap_or(ErrorCode::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainFamily;

    #[test]
    fn test_insufficient_funds_message() {
        let err = ExecutorError::InsufficientFunds {
            token: "USDC".to_string(),
            required: "100".to_string(),
            available: "40".to_string(),
        };
        let classified = classify(&err);
        assert_eq!(classified.code, ErrorCode::InsufficientFunds);
        assert!(classified.message.contains("USDC"));
        assert!(classified.html_message.is_none());
    }

    #[test]
    fn test_signer_messages_are_matched() {
        let rejected = classify(&ExecutorError::Signer("User rejected the request.".into()));
        assert_eq!(rejected.code, ErrorCode::TransactionRejected);

        let lamports = classify(&ExecutorError::Signer(
            "Transfer: insufficient lamports 10, need 5000".into(),
        ));
        assert_eq!(lamports.code, ErrorCode::InsufficientFunds);
    }

    #[test]
    fn test_unknown_keeps_original_message() {
        let err = ExecutorError::Signer("wallet adapter exploded".into());
        let classified = classify(&err);
        assert_eq!(classified.code, ErrorCode::Unknown);
        assert_eq!(classified.message, err.to_string());

        let internal = classify(&ExecutorError::Internal("boom".into()));
        assert_eq!(internal.code, ErrorCode::Unknown);
        assert_eq!(internal.message, "Internal error: boom");
    }

    #[test]
    fn test_receiving_failure_has_html_message() {
        let chain = Chain {
            id: 1,
            name: "Ethereum".to_string(),
            family: ChainFamily::Evm,
            explorer_url: "https://etherscan.io".to_string(),
        };
        let err = ExecutorError::ReceivingChainFailed {
            status: "FAILED".to_string(),
            message: "bridge reverted".to_string(),
        };
        let classified =
            classify_receiving_failure(&err, Some(&chain), Some("https://etherscan.io/tx/0xab"));

        assert_eq!(classified.code, ErrorCode::TransactionFailed);
        let html = classified.html_message.unwrap();
        assert!(html.contains("Ethereum explorer"));
        assert!(html.contains("https://etherscan.io/tx/0xab"));
    }

    #[test]
    fn test_receiving_timeout_code() {
        let err = ExecutorError::Timeout {
            operation: "receiving chain".to_string(),
        };
        let classified = classify_receiving_failure(&err, None, None);
        assert_eq!(classified.code, ErrorCode::ReceivingChainTimeout);
    }
}
