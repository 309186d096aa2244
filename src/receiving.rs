//! Receiving-chain waiter
//!
//! Polls the status service until the destination-side leg of a
//! cross-chain transfer resolves. Polling cadence and the optional overall
//! bound are owned here; the executor sees a single blocking call.

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::service::{StatusRequest, StatusResponse, StatusService, TransferStatus};
use crate::step::Step;

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceivingChainWaiter: Send + Sync {
    /// Wait for the receiving leg of `step`, keyed by the source `tx_hash`.
    /// Resolves with the final status on `DONE`, fails on `FAILED`/`INVALID`.
    async fn wait(&self, step: &Step, tx_hash: &str) -> ExecutorResult<StatusResponse>;
}

/// Receiving-chain waiter polling the remote status service
pub struct StatusPoller<S> {
    service: S,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl<S: StatusService> StatusPoller<S> {
    pub fn new(service: S, poll_interval: Duration, max_wait: Option<Duration>) -> Self {
        Self {
            service,
            poll_interval,
            max_wait,
        }
    }

    pub fn from_config(service: S, config: &ExecutorConfig) -> Self {
        Self::new(
            service,
            config.status_poll_interval(),
            config.status_timeout(),
        )
    }

    async fn poll(&self, request: &StatusRequest) -> ExecutorResult<StatusResponse> {
        loop {
            match self.service.fetch_receiving_leg_status(request).await {
                Ok(status) => match status.status {
                    TransferStatus::Done => return Ok(status),
                    TransferStatus::Failed | TransferStatus::Invalid => {
                        let message = status
                            .substatus_message
                            .clone()
                            .or_else(|| status.substatus.clone())
                            .unwrap_or_else(|| "The transfer did not complete.".to_string());
                        return Err(ExecutorError::ReceivingChainFailed {
                            status: format!("{:?}", status.status).to_uppercase(),
                            message,
                        });
                    }
                    TransferStatus::Pending | TransferStatus::NotFound => {
                        debug!(
                            tx_hash = %request.tx_hash,
                            status = ?status.status,
                            substatus = ?status.substatus,
                            "Receiving leg not settled yet"
                        );
                    }
                },
                // Status lookups are retried until the overall bound expires
                Err(e) => warn!(tx_hash = %request.tx_hash, "Status lookup failed: {}", e),
            }

            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl<S: StatusService> ReceivingChainWaiter for StatusPoller<S> {
    async fn wait(&self, step: &Step, tx_hash: &str) -> ExecutorResult<StatusResponse> {
        let request = StatusRequest::for_step(step, tx_hash);
        let started = Instant::now();

        let result = match self.max_wait {
            Some(max_wait) => timeout(max_wait, self.poll(&request))
                .await
                .map_err(|_| ExecutorError::Timeout {
                    operation: format!("receiving chain for {}", tx_hash),
                })?,
            None => self.poll(&request).await,
        };

        let elapsed = started.elapsed().as_secs_f64();
        crate::metrics::record_receiving_wait(step.action.to_chain_id, elapsed);
        if result.is_ok() {
            info!(step_id = %step.id, tx_hash, elapsed, "Receiving leg settled");
        }
        result
    }
}
