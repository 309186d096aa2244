//! HTTP client for the quoting/status service

use super::{QuoteService, StatusRequest, StatusResponse, StatusService, TransactionInfo, TransferStatus};
use crate::config::ApiConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::step::Step;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "x-api-key";

/// Client for the remote quoting and status API
pub struct StepServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl StepServiceClient {
    pub fn new(config: &ApiConfig) -> ExecutorResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key)
                .map_err(|e| ExecutorError::Config(format!("Invalid API key: {}", e)))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ExecutorResult<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Api {
                status: Some(status.as_u16()),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl QuoteService for StepServiceClient {
    async fn fetch_updated_step(&self, step: &Step) -> ExecutorResult<Step> {
        debug!(step_id = %step.id, "Requesting updated step");

        let mut request = step.clone();
        request.execution = None;

        let response = self
            .client
            .post(format!("{}/advanced/stepTransaction", self.base_url))
            .json(&request)
            .send()
            .await?;

        Self::decode(response).await
    }
}

#[async_trait]
impl StatusService for StepServiceClient {
    async fn fetch_receiving_leg_status(
        &self,
        request: &StatusRequest,
    ) -> ExecutorResult<StatusResponse> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .query(&[
                ("txHash", request.tx_hash.clone()),
                ("bridge", request.bridge.clone()),
                ("fromChain", request.from_chain.to_string()),
                ("toChain", request.to_chain.to_string()),
            ])
            .send()
            .await?;

        // The service answers 404 until it has indexed the source transaction
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(StatusResponse {
                status: TransferStatus::NotFound,
                substatus: None,
                substatus_message: None,
                sending: TransactionInfo::default(),
                receiving: None,
            });
        }

        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_decoding() {
        let raw = serde_json::json!({
            "status": "DONE",
            "substatus": "COMPLETED",
            "substatusMessage": "The transfer is complete.",
            "sending": {
                "txHash": "5VfYm",
                "chainId": 1151111081099710u64,
                "amount": "1000000",
                "gasAmount": "5000",
                "gasAmountUSD": "0.001"
            },
            "receiving": {
                "txHash": "0xabc",
                "chainId": 1,
                "amount": "994000"
            }
        });

        let status: StatusResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(status.status, TransferStatus::Done);
        assert_eq!(status.substatus.as_deref(), Some("COMPLETED"));
        assert_eq!(status.sending.gas_amount_usd.as_deref(), Some("0.001"));
        assert_eq!(
            status.receiving.and_then(|r| r.amount).as_deref(),
            Some("994000")
        );
    }

    #[test]
    fn test_client_rejects_invalid_api_key() {
        let config = ApiConfig {
            base_url: "https://li.quest/v1/".to_string(),
            api_key: Some("bad\nkey".to_string()),
            timeout_secs: 5,
        };
        assert!(matches!(
            StepServiceClient::new(&config),
            Err(ExecutorError::Config(_))
        ));
    }
}
