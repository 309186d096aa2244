//! JSON-RPC connection for SVM chains
//!
//! Confirms signatures by polling `getSignatureStatuses` until the requested
//! commitment is reached, and answers owner balance lookups.

use super::{ChainConnection, Commitment, Confirmation};
use crate::balance::BalanceProvider;
use crate::config::{ExecutorConfig, RpcConfig};
use crate::error::{ExecutorError, ExecutorResult};
use crate::step::{parse_amount, Token};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Address the quoting service uses for the native token
pub const NATIVE_TOKEN_ADDRESS: &str = "11111111111111111111111111111111";

/// JSON-RPC connection to a single chain endpoint
pub struct RpcConnection {
    client: reqwest::Client,
    url: String,
    chain_id: u64,
    poll_interval: Duration,
    confirm_timeout: Duration,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<Commitment>,
}

impl RpcConnection {
    pub fn new(rpc: &RpcConfig, executor: &ExecutorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: rpc.url.clone(),
            chain_id: rpc.chain_id,
            poll_interval: executor.confirm_poll_interval(),
            confirm_timeout: executor.confirm_timeout(),
        }
    }

    /// Issue a JSON-RPC call and decode its `result`
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ExecutorResult<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ExecutorError::Rpc {
                chain_id: self.chain_id,
                message: format!("{} ({})", error.message, error.code),
            });
        }

        response.result.ok_or_else(|| ExecutorError::Rpc {
            chain_id: self.chain_id,
            message: format!("{} returned no result", method),
        })
    }

    async fn signature_status(&self, signature: &str) -> ExecutorResult<Option<SignatureStatus>> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;

        Ok(statuses.value.into_iter().next().flatten())
    }

    /// Fee paid by a confirmed transaction, if the node still has it
    async fn transaction_fee(&self, signature: &str, commitment: Commitment) -> Option<String> {
        let result: ExecutorResult<Value> = self
            .call(
                "getTransaction",
                json!([signature, {
                    "commitment": commitment.as_str(),
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await;

        match result {
            Ok(tx) => tx["meta"]["fee"].as_u64().map(|fee| fee.to_string()),
            Err(e) => {
                warn!("Failed to fetch fee for {}: {}", signature, e);
                None
            }
        }
    }

    async fn poll_until(&self, signature: &str, commitment: Commitment) -> ExecutorResult<Confirmation> {
        loop {
            match self.signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err.filter(|e| !e.is_null()) {
                        return Ok(Confirmation {
                            slot: Some(status.slot),
                            error: Some(err.to_string()),
                            fee: None,
                        });
                    }
                    if status.confirmation_status.is_some_and(|c| c >= commitment) {
                        let fee = self.transaction_fee(signature, commitment).await;
                        return Ok(Confirmation {
                            slot: Some(status.slot),
                            error: None,
                            fee,
                        });
                    }
                    debug!(
                        "Signature {} at {:?}, waiting for {}",
                        signature,
                        status.confirmation_status,
                        commitment.as_str()
                    );
                }
                Ok(None) => debug!("Signature {} not yet visible", signature),
                Err(e) if e.is_retryable() => {
                    warn!("Status lookup for {} failed: {}", signature, e);
                }
                Err(e) => return Err(e),
            }

            sleep(self.poll_interval).await;
        }
    }

    async fn native_balance(&self, owner: &str) -> ExecutorResult<u128> {
        let balance: WithContext<u64> = self.call("getBalance", json!([owner])).await?;
        Ok(u128::from(balance.value))
    }

    async fn token_balance(&self, owner: &str, mint: &str) -> ExecutorResult<u128> {
        let accounts: WithContext<Vec<Value>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]),
            )
            .await?;

        accounts.value.iter().try_fold(0u128, |total, account| {
            let amount = account["account"]["data"]["parsed"]["info"]["tokenAmount"]["amount"]
                .as_str()
                .unwrap_or("0");
            Ok(total.saturating_add(parse_amount(amount)?))
        })
    }
}

#[async_trait]
impl ChainConnection for RpcConnection {
    async fn confirm(&self, tx_hash: &str, commitment: Commitment) -> ExecutorResult<Confirmation> {
        timeout(self.confirm_timeout, self.poll_until(tx_hash, commitment))
            .await
            .map_err(|_| ExecutorError::Timeout {
                operation: format!("confirmation of {}", tx_hash),
            })?
    }
}

#[async_trait]
impl BalanceProvider for RpcConnection {
    async fn balance(&self, owner: &str, token: &Token) -> ExecutorResult<u128> {
        if token.address == NATIVE_TOKEN_ADDRESS {
            self.native_balance(owner).await
        } else {
            self.token_balance(owner, &token.address).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_status_decoding() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": { "slot": 82 },
                "value": [
                    { "slot": 72, "confirmations": 10, "err": null, "confirmationStatus": "confirmed" }
                ]
            }
        });

        let response: RpcResponse<WithContext<Vec<Option<SignatureStatus>>>> =
            serde_json::from_value(raw).unwrap();
        let status = response.result.unwrap().value.remove(0).unwrap();

        assert_eq!(status.slot, 72);
        assert!(status.err.is_none());
        assert_eq!(status.confirmation_status, Some(Commitment::Confirmed));
        assert!(Commitment::Finalized > Commitment::Confirmed);
    }

    #[test]
    fn test_rpc_error_decoding() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "Invalid param" }
        });

        let response: RpcResponse<Value> = serde_json::from_value(raw).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32602);
    }
}
