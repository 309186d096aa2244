//! Step execution state machine

use super::options::ExecutionOptions;
use super::registry::ExecutionRegistry;
use crate::balance::BalanceGuard;
use crate::chain::{Chain, ChainConnection, ChainRegistry, Confirmation, SendOptions, SigningAgent};
use crate::classifier::{classify, classify_receiving_failure};
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::metrics;
use crate::quote::QuoteReconciler;
use crate::receiving::ReceivingChainWaiter;
use crate::status::{ExecutionPatch, ProcessPatch, StatusManager};
use crate::step::{ExecutionStatus, GasCost, ProcessStatus, ProcessType, Step};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where an invocation left the step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Execution concluded successfully
    Done,
    /// Halted at `ACTION_REQUIRED`; invoke again with interaction allowed
    ActionRequired,
}

/// Result of the send phase
enum SendOutcome {
    Confirmed(Confirmation),
    AwaitingAction,
}

/// Executes steps against the configured collaborators
pub struct StepExecutor {
    /// Signs and broadcasts on behalf of the owner
    signer: Arc<dyn SigningAgent>,
    /// Source-chain connection used for confirmation
    connection: Arc<dyn ChainConnection>,
    balance: Arc<dyn BalanceGuard>,
    reconciler: Arc<dyn QuoteReconciler>,
    waiter: Arc<dyn ReceivingChainWaiter>,
    /// Chain reference data
    chains: Arc<ChainRegistry>,
    config: ExecutorConfig,
    /// Steps currently running
    registry: ExecutionRegistry,
}

impl StepExecutor {
    pub fn new(
        signer: Arc<dyn SigningAgent>,
        connection: Arc<dyn ChainConnection>,
        balance: Arc<dyn BalanceGuard>,
        reconciler: Arc<dyn QuoteReconciler>,
        waiter: Arc<dyn ReceivingChainWaiter>,
        chains: Arc<ChainRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            signer,
            connection,
            balance,
            reconciler,
            waiter,
            chains,
            config,
            registry: ExecutionRegistry::new(),
        }
    }

    /// Whether `step_id` is currently being executed
    pub fn is_executing(&self, step_id: &str) -> bool {
        self.registry.is_active(step_id)
    }

    /// Drive `step` as far as possible.
    ///
    /// Resumes from the step's recorded execution: a concluded execution is
    /// returned untouched, a failed one is re-armed, and a process that
    /// already holds a transaction hash skips straight to confirmation.
    /// Every failure is classified and recorded on the step before the
    /// original error is returned.
    pub async fn execute_step(
        &self,
        step: &mut Step,
        options: &ExecutionOptions,
    ) -> ExecutorResult<StepOutcome> {
        let _claim = self.registry.claim(&step.id)?;
        let status = match &options.update_step {
            Some(hook) => StatusManager::with_update_hook(hook.clone()),
            None => StatusManager::new(),
        };

        let execution = status.init_execution_object(step);
        match execution.status {
            ExecutionStatus::Done => {
                debug!(step_id = %step.id, "Step already executed");
                return Ok(StepOutcome::Done);
            }
            ExecutionStatus::Failed => {
                let reopened = status.reopen_failed(step);
                info!(step_id = %step.id, reopened, "Retrying failed step");
            }
            ExecutionStatus::Pending => {}
        }

        let chain_id = step.action.from_chain_id;
        metrics::record_step_started(chain_id);
        info!(
            step_id = %step.id,
            tool = %step.tool,
            from_chain = chain_id,
            to_chain = step.action.to_chain_id,
            "Executing step"
        );

        let process_type = step.primary_process_type();
        let process = status.find_or_create_process(step, process_type, None);

        // A send phase concluded by an earlier invocation is not repeated
        let confirmation = if process.status == ProcessStatus::Done {
            None
        } else {
            match self.send_phase(step, &status, options, process_type).await {
                Ok(SendOutcome::Confirmed(confirmation)) => Some(confirmation),
                Ok(SendOutcome::AwaitingAction) => {
                    info!(step_id = %step.id, "Step requires user action");
                    metrics::record_step_halted(chain_id);
                    return Ok(StepOutcome::ActionRequired);
                }
                Err(e) => return Err(self.fail(step, &status, process_type, e)),
            }
        };

        if step.is_cross_chain() {
            if let Err(e) = self.receiving_phase(step, &status).await {
                return Err(self.fail(step, &status, ProcessType::ReceivingChain, e));
            }
        } else {
            let patch = single_chain_summary(step, confirmation.as_ref());
            if let Err(e) = status.update_execution(step, ExecutionStatus::Done, patch) {
                return Err(self.fail(step, &status, process_type, e));
            }
        }

        metrics::record_step_completed(chain_id);
        info!(step_id = %step.id, "Step executed");
        Ok(StepOutcome::Done)
    }

    /// Balance check, re-quote, signing and broadcast, then confirmation
    async fn send_phase(
        &self,
        step: &mut Step,
        status: &StatusManager,
        options: &ExecutionOptions,
        process_type: ProcessType,
    ) -> ExecutorResult<SendOutcome> {
        let chain = self.chains.resolve(step.action.from_chain_id)?;
        let process = status.find_or_create_process(step, process_type, None);

        let tx_hash = match process.tx_hash {
            Some(tx_hash) => {
                info!(step_id = %step.id, %tx_hash, "Resuming confirmation");
                tx_hash
            }
            None => match self
                .prepare_and_broadcast(step, status, options, process_type, &chain)
                .await?
            {
                Some(tx_hash) => tx_hash,
                None => return Ok(SendOutcome::AwaitingAction),
            },
        };

        let confirmation = self
            .confirm(step, status, process_type, &chain, tx_hash)
            .await?;
        status.update_process(step, process_type, ProcessStatus::Done, ProcessPatch::default())?;

        Ok(SendOutcome::Confirmed(confirmation))
    }

    /// Returns the broadcast transaction hash, or `None` when halted for the user
    async fn prepare_and_broadcast(
        &self,
        step: &mut Step,
        status: &StatusManager,
        options: &ExecutionOptions,
        process_type: ProcessType,
        chain: &Chain,
    ) -> ExecutorResult<Option<String>> {
        let owner = self.signer.owner_address();
        self.balance.check(&owner, step).await?;

        if step.payload().is_none() {
            debug!(step_id = %step.id, "No prepared transaction, re-quoting");
            let reconciliation = self.reconciler.reconcile(step).await?;
            step.replace_plan(reconciliation.step);

            if let Some(change) = reconciliation.change {
                if !options.allow_interaction {
                    status.update_process(
                        step,
                        process_type,
                        ProcessStatus::ActionRequired,
                        ProcessPatch::default(),
                    )?;
                    return Ok(None);
                }

                let accepted = match &options.accept_exchange_rate_update {
                    Some(hook) => hook.accept(step, &change).await,
                    None => false,
                };
                if !accepted {
                    return Err(ExecutorError::ExchangeRateUpdateCanceled {
                        previous: change.previous_to_amount_min,
                        updated: change.updated_to_amount_min,
                    });
                }
                info!(step_id = %step.id, "Exchange rate update accepted");
            }
        }

        if step.payload().is_none() {
            return Err(ExecutorError::TransactionUnprepared);
        }

        status.update_process(
            step,
            process_type,
            ProcessStatus::ActionRequired,
            ProcessPatch::default(),
        )?;
        if !options.allow_interaction {
            return Ok(None);
        }

        let mut request = step.transaction_request.clone().unwrap_or_default();
        if let Some(hook) = &options.update_transaction_request {
            let patch = hook.customize(&request).await?;
            request.merge(patch);
        }
        let payload = request.payload().ok_or(ExecutorError::TransactionUnprepared)?;

        if self.signer.family() != chain.family {
            return Err(ExecutorError::Config(format!(
                "Signing agent cannot sign for {} ({:?})",
                chain.name, chain.family
            )));
        }
        let transaction = chain.family.decode_payload(payload)?;

        let send_options = SendOptions {
            max_retries: self.config.max_retries,
            skip_preflight: self.config.skip_preflight,
        };
        let tx_hash = match self
            .signer
            .send(&transaction, self.connection.as_ref(), send_options)
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(ExecutorError::TransactionReplaced { replacement })
                if chain.family.recognizes_replacement() =>
            {
                metrics::record_tx_replaced(chain.id);
                replacement
            }
            Err(e) => return Err(e),
        };

        metrics::record_tx_broadcast(chain.id);
        info!(step_id = %step.id, %tx_hash, chain = %chain.name, "Transaction broadcast");

        status.update_process(
            step,
            process_type,
            ProcessStatus::Pending,
            ProcessPatch::tx(tx_hash.clone(), Some(chain.tx_link(&tx_hash))),
        )?;
        Ok(Some(tx_hash))
    }

    /// Wait for `tx_hash` at the configured commitment, following replacements
    async fn confirm(
        &self,
        step: &mut Step,
        status: &StatusManager,
        process_type: ProcessType,
        chain: &Chain,
        mut tx_hash: String,
    ) -> ExecutorResult<Confirmation> {
        loop {
            match self.connection.confirm(&tx_hash, self.config.commitment).await {
                Ok(confirmation) => {
                    if let Some(reason) = confirmation.error.as_deref().filter(|e| !e.is_empty()) {
                        return Err(ExecutorError::TransactionFailed(reason.to_string()));
                    }
                    debug!(
                        step_id = %step.id,
                        %tx_hash,
                        commitment = self.config.commitment.as_str(),
                        "Transaction confirmed"
                    );
                    return Ok(confirmation);
                }
                Err(ExecutorError::TransactionReplaced { replacement })
                    if chain.family.recognizes_replacement() =>
                {
                    warn!(
                        step_id = %step.id,
                        "Transaction {} replaced by {}",
                        tx_hash,
                        replacement
                    );
                    metrics::record_tx_replaced(chain.id);
                    status.update_process(
                        step,
                        process_type,
                        ProcessStatus::Pending,
                        ProcessPatch::tx(replacement.clone(), Some(chain.tx_link(&replacement))),
                    )?;
                    tx_hash = replacement;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait for the destination-side leg of a cross-chain step
    async fn receiving_phase(&self, step: &mut Step, status: &StatusManager) -> ExecutorResult<()> {
        let sending_tx = step
            .process(step.primary_process_type())
            .and_then(|p| p.tx_hash.clone())
            .ok_or_else(|| ExecutorError::Internal("send transaction missing".to_string()))?;

        status.find_or_create_process(step, ProcessType::ReceivingChain, Some(ProcessStatus::Pending));

        let result = self.waiter.wait(step, &sending_tx).await?;
        let receiving = result.receiving.clone().unwrap_or_default();

        let tx_link = receiving.tx_link.clone().or_else(|| {
            let tx_hash = receiving.tx_hash.as_deref()?;
            let chain = self.chains.resolve(step.action.to_chain_id).ok()?;
            Some(chain.tx_link(tx_hash))
        });

        status.update_process(
            step,
            ProcessType::ReceivingChain,
            ProcessStatus::Done,
            ProcessPatch {
                tx_hash: receiving.tx_hash.clone(),
                tx_link,
                substatus: result.substatus.clone(),
                substatus_message: result.substatus_message.clone(),
                error: None,
            },
        )?;

        let gas_costs = match (&result.sending.gas_amount, &result.sending.gas_token) {
            (Some(amount), Some(token)) => vec![GasCost {
                amount: amount.clone(),
                amount_usd: result.sending.gas_amount_usd.clone(),
                token: token.clone(),
            }],
            _ => Vec::new(),
        };
        status.update_execution(
            step,
            ExecutionStatus::Done,
            ExecutionPatch {
                from_amount: result
                    .sending
                    .amount
                    .clone()
                    .or_else(|| Some(step.action.from_amount.clone())),
                to_amount: receiving.amount.clone(),
                to_token: receiving
                    .token
                    .clone()
                    .or_else(|| Some(step.action.to_token.clone())),
                gas_costs,
            },
        )?;

        info!(
            step_id = %step.id,
            substatus = ?result.substatus,
            "Receiving leg done"
        );
        Ok(())
    }

    /// Record `err` on the step and hand it back to the caller
    fn fail(
        &self,
        step: &mut Step,
        status: &StatusManager,
        process_type: ProcessType,
        err: ExecutorError,
    ) -> ExecutorError {
        let classified = if process_type == ProcessType::ReceivingChain {
            let chain = self.chains.resolve(step.action.from_chain_id).ok();
            let tx_link = step
                .process(step.primary_process_type())
                .and_then(|p| p.tx_link.clone());
            classify_receiving_failure(&err, chain.as_ref(), tx_link.as_deref())
        } else {
            classify(&err)
        };

        error!(
            step_id = %step.id,
            process = %process_type,
            code = ?classified.code,
            "Step failed: {}",
            err
        );
        metrics::record_step_failed(step.action.from_chain_id, &format!("{:?}", classified.code));

        if step.process(process_type).is_none() {
            status.find_or_create_process(step, process_type, None);
        }
        if let Err(e) = status.update_process(
            step,
            process_type,
            ProcessStatus::Failed,
            ProcessPatch::error(classified),
        ) {
            warn!(step_id = %step.id, "Could not mark process failed: {}", e);
        }
        if let Err(e) = status.update_execution(step, ExecutionStatus::Failed, ExecutionPatch::default()) {
            warn!(step_id = %step.id, "Could not mark execution failed: {}", e);
        }

        err
    }
}

/// Summary for a concluded single-chain step
fn single_chain_summary(step: &Step, confirmation: Option<&Confirmation>) -> ExecutionPatch {
    let gas_costs = confirmation
        .and_then(|c| c.fee.clone())
        .zip(step.estimate.gas_costs.first())
        .map(|(fee, estimated)| {
            vec![GasCost {
                amount: fee,
                amount_usd: None,
                token: estimated.token.clone(),
            }]
        })
        .unwrap_or_default();

    ExecutionPatch {
        from_amount: Some(step.action.from_amount.clone()),
        to_amount: Some(step.estimate.to_amount.clone()),
        to_token: Some(step.action.to_token.clone()),
        gas_costs,
    }
}
