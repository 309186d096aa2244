//! Chain module - reference data and transaction capabilities
//!
//! This module provides:
//! - Chain reference data (id, name, family, explorer) resolved by chain id
//! - The signing-agent and connection capabilities the executor drives
//! - Payload decoding per chain family
//! - A JSON-RPC connection and an HTTP signing agent for SVM chains

pub mod rpc;
pub mod signer;

pub use rpc::RpcConnection;
pub use signer::RemoteSigner;

use crate::config::Settings;
use crate::error::{ExecutorError, ExecutorResult};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Signing-agent family. Families are data: one executor serves all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Svm,
    Evm,
}

impl ChainFamily {
    /// Whether the network may replace a broadcast transaction (fee bump or
    /// resubmission) and report the replacement instead of a failure
    pub fn recognizes_replacement(self) -> bool {
        matches!(self, ChainFamily::Evm)
    }

    /// Decode a prepared payload into the bytes handed to the signing agent
    pub fn decode_payload(self, data: &str) -> ExecutorResult<Vec<u8>> {
        match self {
            ChainFamily::Svm => STANDARD
                .decode(data.trim())
                .map_err(|e| ExecutorError::InvalidPayload(e.to_string())),
            ChainFamily::Evm => {
                let data = data.trim();
                hex::decode(data.strip_prefix("0x").unwrap_or(data))
                    .map_err(|e| ExecutorError::InvalidPayload(e.to_string()))
            }
        }
    }
}

/// Read-only chain reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: u64,
    pub name: String,
    pub family: ChainFamily,
    pub explorer_url: String,
}

impl Chain {
    /// Explorer link for a transaction on this chain
    pub fn tx_link(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

/// Chain reference data indexed by chain id
#[derive(Default)]
pub struct ChainRegistry {
    chains: DashMap<u64, Chain>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self {
            chains: DashMap::new(),
        }
    }

    /// Build the registry from the enabled chains in the settings
    pub fn from_settings(settings: &Settings) -> Self {
        let registry = Self::new();
        for (name, chain) in settings.enabled_chains() {
            debug!("Registering chain {} (ID: {})", name, chain.chain_id);
            registry.insert(Chain {
                id: chain.chain_id,
                name: chain.name.clone(),
                family: chain.family,
                explorer_url: chain.explorer_url.clone(),
            });
        }
        registry
    }

    pub fn insert(&self, chain: Chain) {
        self.chains.insert(chain.id, chain);
    }

    /// Look up a chain by id
    pub fn resolve(&self, chain_id: u64) -> ExecutorResult<Chain> {
        self.chains
            .get(&chain_id)
            .map(|c| c.clone())
            .ok_or(ExecutorError::ChainNotFound { chain_id })
    }
}

/// Commitment level a confirmation must reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// Broadcast options passed to the signing agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub max_retries: u32,
    pub skip_preflight: bool,
}

/// Result of awaiting a transaction at a commitment level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confirmation {
    pub slot: Option<u64>,
    /// Non-empty when the transaction was included but failed on chain
    pub error: Option<String>,
    /// Fee paid, in the native token's base units
    pub fee: Option<String>,
}

/// Chain RPC endpoint used to confirm broadcast transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// Wait until `tx_hash` reaches `commitment`. Returns
    /// `ExecutorError::TransactionReplaced` when the network reports a replacement.
    async fn confirm(&self, tx_hash: &str, commitment: Commitment) -> ExecutorResult<Confirmation>;
}

/// External capability that signs and broadcasts on behalf of the owner
#[async_trait]
pub trait SigningAgent: Send + Sync {
    fn owner_address(&self) -> String;

    fn family(&self) -> ChainFamily;

    /// Sign and broadcast `transaction`, returning the transaction id
    async fn send(
        &self,
        transaction: &[u8],
        connection: &dyn ChainConnection,
        options: SendOptions,
    ) -> ExecutorResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_svm_payload() {
        assert_eq!(ChainFamily::Svm.decode_payload("AQID").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            ChainFamily::Svm.decode_payload("not base64!"),
            Err(ExecutorError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_decode_evm_payload() {
        assert_eq!(
            ChainFamily::Evm.decode_payload("0xdeadbeef").unwrap(),
            vec![0xde, 0xad, 0xbe, 0xef]
        );
        assert_eq!(ChainFamily::Evm.decode_payload("0a0b").unwrap(), vec![10, 11]);
    }

    #[test]
    fn test_replacement_is_family_specific() {
        assert!(ChainFamily::Evm.recognizes_replacement());
        assert!(!ChainFamily::Svm.recognizes_replacement());
    }

    #[test]
    fn test_registry_resolve() {
        let registry = ChainRegistry::new();
        registry.insert(Chain {
            id: 1151111081099710,
            name: "Solana".to_string(),
            family: ChainFamily::Svm,
            explorer_url: "https://solscan.io/".to_string(),
        });

        let chain = registry.resolve(1151111081099710).unwrap();
        assert_eq!(chain.tx_link("abc"), "https://solscan.io/tx/abc");
        assert!(matches!(
            registry.resolve(7),
            Err(ExecutorError::ChainNotFound { chain_id: 7 })
        ));
    }
}
