//! HTTP signing agent
//!
//! Forwards the decoded transaction to an external wallet agent that holds
//! the owner's key, signs, and broadcasts with the requested options.

use super::{ChainConnection, ChainFamily, SendOptions, SigningAgent};
use crate::config::SignerConfig;
use crate::error::{ExecutorError, ExecutorResult};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Signing agent reached over HTTP
pub struct RemoteSigner {
    client: reqwest::Client,
    url: String,
    owner_address: String,
    family: ChainFamily,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    owner: &'a str,
    transaction: String,
    max_retries: u32,
    skip_preflight: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl RemoteSigner {
    pub fn new(config: &SignerConfig) -> Self {
        info!(
            "Signing agent configured at {} for {}",
            config.url, config.owner_address
        );

        Self {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            owner_address: config.owner_address.clone(),
            family: config.family,
        }
    }
}

#[async_trait]
impl SigningAgent for RemoteSigner {
    fn owner_address(&self) -> String {
        self.owner_address.clone()
    }

    fn family(&self) -> ChainFamily {
        self.family
    }

    async fn send(
        &self,
        transaction: &[u8],
        _connection: &dyn ChainConnection,
        options: SendOptions,
    ) -> ExecutorResult<String> {
        let request = SendRequest {
            owner: &self.owner_address,
            transaction: STANDARD.encode(transaction),
            max_retries: options.max_retries,
            skip_preflight: options.skip_preflight,
        };

        let response = self
            .client
            .post(format!("{}/send", self.url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body: SendResponse = response.json().await?;

        match (body.signature, body.error) {
            (Some(signature), None) if status.is_success() => Ok(signature),
            (_, Some(error)) if status.is_client_error() && error.to_lowercase().contains("reject") => {
                warn!("Signing agent rejected the transaction: {}", error);
                Err(ExecutorError::SignatureRejected(error))
            }
            (_, error) => Err(ExecutorError::Signer(
                error.unwrap_or_else(|| format!("signing agent responded with {}", status)),
            )),
        }
    }
}
