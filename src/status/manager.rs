//! In-memory status manager for step executions

use crate::error::{ExecutorError, ExecutorResult};
use crate::step::{
    Execution, ExecutionStatus, GasCost, Process, ProcessError, ProcessStatus, ProcessType, Step,
    Token,
};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback invoked with the step after every ledger mutation
pub type UpdateStepHook = Arc<dyn Fn(&Step) + Send + Sync>;

/// Fields merged into a process on update. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProcessPatch {
    pub tx_hash: Option<String>,
    pub tx_link: Option<String>,
    pub substatus: Option<String>,
    pub substatus_message: Option<String>,
    pub error: Option<ProcessError>,
}

impl ProcessPatch {
    pub fn tx(tx_hash: impl Into<String>, tx_link: Option<String>) -> Self {
        Self {
            tx_hash: Some(tx_hash.into()),
            tx_link,
            ..Default::default()
        }
    }

    pub fn error(error: ProcessError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Summary fields merged into the execution when the step concludes
#[derive(Debug, Clone, Default)]
pub struct ExecutionPatch {
    pub from_amount: Option<String>,
    pub to_amount: Option<String>,
    pub to_token: Option<Token>,
    pub gas_costs: Vec<GasCost>,
}

/// Status manager for the processes of a step
#[derive(Clone, Default)]
pub struct StatusManager {
    update_hook: Option<UpdateStepHook>,
}

impl StatusManager {
    pub fn new() -> Self {
        Self { update_hook: None }
    }

    /// Create a status manager that reports every mutation to `hook`
    pub fn with_update_hook(hook: UpdateStepHook) -> Self {
        Self {
            update_hook: Some(hook),
        }
    }

    /// Create the execution record if absent. Calling this again returns the
    /// existing record unchanged.
    pub fn init_execution_object(&self, step: &mut Step) -> Execution {
        if let Some(execution) = &step.execution {
            return execution.clone();
        }

        let mut execution = Execution::new();
        execution.started_at = Some(now_millis());
        step.execution = Some(execution.clone());
        debug!(step_id = %step.id, "Initialized execution");
        self.notify(step);
        execution
    }

    /// Return the process of `process_type`, creating it with
    /// `initial_status` (default `STARTED`) on first entry
    pub fn find_or_create_process(
        &self,
        step: &mut Step,
        process_type: ProcessType,
        initial_status: Option<ProcessStatus>,
    ) -> Process {
        self.init_execution_object(step);
        if let Some(process) = step.process(process_type) {
            return process.clone();
        }

        let status = initial_status.unwrap_or(ProcessStatus::Started);
        let mut process = Process::new(process_type, status, now_millis());
        process.message = Some(process_message(process_type, status).to_string());

        if let Some(execution) = step.execution.as_mut() {
            execution.process.push(process.clone());
        }
        debug!(step_id = %step.id, process = %process_type, %status, "Created process");
        self.notify(step);
        process
    }

    /// Set the status of a process and merge `patch` into it. Re-applying the
    /// current status is a no-op on state; patch fields still merge.
    pub fn update_process(
        &self,
        step: &mut Step,
        process_type: ProcessType,
        status: ProcessStatus,
        patch: ProcessPatch,
    ) -> ExecutorResult<Process> {
        let process = step
            .execution
            .as_mut()
            .and_then(|e| e.process_mut(process_type))
            .ok_or(ExecutorError::ProcessNotFound(process_type))?;

        if !process.status.can_transition_to(status) {
            warn!(
                process = %process_type,
                from = %process.status,
                to = %status,
                "Rejected backward process transition"
            );
            return Err(ExecutorError::InvalidStateTransition {
                from: process.status.to_string(),
                to: status.to_string(),
            });
        }

        if process.status != status {
            process.status = status;
            process.message = Some(process_message(process_type, status).to_string());
            if status.is_terminal() {
                process.done_at = Some(now_millis());
            }
        }

        if patch.tx_hash.is_some() {
            process.tx_hash = patch.tx_hash;
        }
        if patch.tx_link.is_some() {
            process.tx_link = patch.tx_link;
        }
        if patch.substatus.is_some() {
            process.substatus = patch.substatus;
        }
        if patch.substatus_message.is_some() {
            process.substatus_message = patch.substatus_message;
        }
        if patch.error.is_some() {
            process.error = patch.error;
        }

        let updated = process.clone();
        debug!(step_id = %step.id, process = %process_type, %status, "Updated process");
        self.notify(step);
        Ok(updated)
    }

    /// Set the overall execution status and merge summary fields. A concluded
    /// execution only accepts its own status again.
    pub fn update_execution(
        &self,
        step: &mut Step,
        status: ExecutionStatus,
        patch: ExecutionPatch,
    ) -> ExecutorResult<()> {
        self.init_execution_object(step);
        let Some(execution) = step.execution.as_mut() else {
            return Err(ExecutorError::Internal("execution missing".to_string()));
        };

        if execution.status.is_terminal() && execution.status != status {
            return Err(ExecutorError::InvalidStateTransition {
                from: execution.status.to_string(),
                to: status.to_string(),
            });
        }

        if execution.status != status {
            execution.status = status;
            if status.is_terminal() {
                execution.done_at = Some(now_millis());
            }
        }

        if patch.from_amount.is_some() {
            execution.from_amount = patch.from_amount;
        }
        if patch.to_amount.is_some() {
            execution.to_amount = patch.to_amount;
        }
        if patch.to_token.is_some() {
            execution.to_token = patch.to_token;
        }
        if !patch.gas_costs.is_empty() {
            execution.gas_costs = patch.gas_costs;
        }

        debug!(step_id = %step.id, %status, "Updated execution");
        self.notify(step);
        Ok(())
    }

    /// Re-arm a failed execution for another attempt. Failed processes that
    /// already broadcast go back to `PENDING`, the others to `STARTED`. The
    /// receiving leg never broadcasts and always waits again from `PENDING`.
    /// Returns the number of processes reopened.
    pub fn reopen_failed(&self, step: &mut Step) -> usize {
        let Some(execution) = step.execution.as_mut() else {
            return 0;
        };
        if execution.status != ExecutionStatus::Failed {
            return 0;
        }

        let mut reopened = 0;
        for process in execution
            .process
            .iter_mut()
            .filter(|p| p.status == ProcessStatus::Failed)
        {
            let status = if process.tx_hash.is_some()
                || process.process_type == ProcessType::ReceivingChain
            {
                ProcessStatus::Pending
            } else {
                ProcessStatus::Started
            };
            process.status = status;
            process.message = Some(process_message(process.process_type, status).to_string());
            process.error = None;
            process.done_at = None;
            reopened += 1;
        }
        execution.status = ExecutionStatus::Pending;
        execution.done_at = None;

        debug!(step_id = %step.id, reopened, "Reopened failed execution");
        self.notify(step);
        reopened
    }

    fn notify(&self, step: &Step) {
        if let Some(hook) = &self.update_hook {
            hook(step);
        }
    }
}

/// Human-readable message for a process in a given status
pub fn process_message(process_type: ProcessType, status: ProcessStatus) -> &'static str {
    match (process_type, status) {
        (ProcessType::Swap, ProcessStatus::Started) => "Preparing swap transaction.",
        (ProcessType::Swap, ProcessStatus::Pending) => "Waiting for swap transaction.",
        (ProcessType::Swap, ProcessStatus::Done) => "Swap completed.",
        (ProcessType::CrossChain, ProcessStatus::Started) => "Preparing bridge transaction.",
        (ProcessType::CrossChain, ProcessStatus::Pending) => "Waiting for bridge transaction.",
        (ProcessType::CrossChain, ProcessStatus::Done) => "Bridge transaction confirmed.",
        (ProcessType::Swap | ProcessType::CrossChain, ProcessStatus::ActionRequired) => {
            "Please sign the transaction."
        }
        (ProcessType::ReceivingChain, ProcessStatus::Done) => "Bridge completed.",
        (ProcessType::ReceivingChain, ProcessStatus::Failed) => {
            "Transfer on the destination chain failed."
        }
        (ProcessType::ReceivingChain, _) => "Waiting for destination chain.",
        (_, ProcessStatus::Failed) => "Transaction failed.",
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ErrorCode;
    use crate::step::fixtures::{step, ETHEREUM, SOLANA};
    use std::sync::Mutex;

    #[test]
    fn test_init_execution_is_idempotent() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, SOLANA);

        let first = manager.init_execution_object(&mut step);
        manager.find_or_create_process(&mut step, ProcessType::Swap, None);
        let second = manager.init_execution_object(&mut step);

        assert_eq!(first.status, ExecutionStatus::Pending);
        assert_eq!(second.process.len(), 1);
        assert_eq!(second.started_at, first.started_at);
    }

    #[test]
    fn test_find_or_create_never_duplicates() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, ETHEREUM);

        let created = manager.find_or_create_process(&mut step, ProcessType::CrossChain, None);
        assert_eq!(created.status, ProcessStatus::Started);

        manager
            .update_process(
                &mut step,
                ProcessType::CrossChain,
                ProcessStatus::Pending,
                ProcessPatch::tx("sig", None),
            )
            .unwrap();

        let found = manager.find_or_create_process(
            &mut step,
            ProcessType::CrossChain,
            Some(ProcessStatus::Started),
        );
        assert_eq!(found.status, ProcessStatus::Pending);
        assert_eq!(found.tx_hash.as_deref(), Some("sig"));
        assert_eq!(step.execution.as_ref().unwrap().process.len(), 1);
    }

    #[test]
    fn test_processes_keep_creation_order() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, ETHEREUM);

        manager.find_or_create_process(&mut step, ProcessType::CrossChain, None);
        manager.find_or_create_process(
            &mut step,
            ProcessType::ReceivingChain,
            Some(ProcessStatus::Pending),
        );

        let types: Vec<_> = step
            .execution
            .unwrap()
            .process
            .iter()
            .map(|p| p.process_type)
            .collect();
        assert_eq!(types, vec![ProcessType::CrossChain, ProcessType::ReceivingChain]);
    }

    #[test]
    fn test_same_status_update_still_merges_patch() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, SOLANA);
        manager.find_or_create_process(&mut step, ProcessType::Swap, Some(ProcessStatus::Pending));

        let updated = manager
            .update_process(
                &mut step,
                ProcessType::Swap,
                ProcessStatus::Pending,
                ProcessPatch::tx("replacement", Some("https://solscan.io/tx/replacement".into())),
            )
            .unwrap();

        assert_eq!(updated.status, ProcessStatus::Pending);
        assert_eq!(updated.tx_hash.as_deref(), Some("replacement"));
        assert!(updated.done_at.is_none());
    }

    #[test]
    fn test_backward_transition_rejected() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, SOLANA);
        manager.find_or_create_process(&mut step, ProcessType::Swap, Some(ProcessStatus::Pending));

        let result = manager.update_process(
            &mut step,
            ProcessType::Swap,
            ProcessStatus::ActionRequired,
            ProcessPatch::default(),
        );
        assert!(matches!(
            result,
            Err(ExecutorError::InvalidStateTransition { .. })
        ));
        assert_eq!(
            step.process(ProcessType::Swap).unwrap().status,
            ProcessStatus::Pending
        );
    }

    #[test]
    fn test_update_missing_process() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, SOLANA);

        let result = manager.update_process(
            &mut step,
            ProcessType::ReceivingChain,
            ProcessStatus::Done,
            ProcessPatch::default(),
        );
        assert!(matches!(
            result,
            Err(ExecutorError::ProcessNotFound(ProcessType::ReceivingChain))
        ));
    }

    #[test]
    fn test_concluded_execution_is_immutable() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, SOLANA);

        manager
            .update_execution(&mut step, ExecutionStatus::Done, ExecutionPatch::default())
            .unwrap();
        assert!(step.execution.as_ref().unwrap().done_at.is_some());

        let result =
            manager.update_execution(&mut step, ExecutionStatus::Failed, ExecutionPatch::default());
        assert!(result.is_err());
        assert_eq!(
            step.execution.as_ref().unwrap().status,
            ExecutionStatus::Done
        );
    }

    #[test]
    fn test_update_hook_sees_every_mutation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let manager = StatusManager::with_update_hook(Arc::new(move |step: &Step| {
            let status = step
                .execution
                .as_ref()
                .and_then(|e| e.process.first())
                .map(|p| p.status);
            sink.lock().unwrap().push(status);
        }));

        let mut step = step(SOLANA, SOLANA);
        manager.find_or_create_process(&mut step, ProcessType::Swap, None);
        manager
            .update_process(
                &mut step,
                ProcessType::Swap,
                ProcessStatus::ActionRequired,
                ProcessPatch::default(),
            )
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                None,
                Some(ProcessStatus::Started),
                Some(ProcessStatus::ActionRequired)
            ]
        );
    }

    #[test]
    fn test_reopen_failed() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, ETHEREUM);
        let error = ProcessError {
            code: ErrorCode::TransactionFailed,
            message: "failed".to_string(),
            html_message: None,
        };

        manager.find_or_create_process(&mut step, ProcessType::CrossChain, None);
        manager
            .update_process(
                &mut step,
                ProcessType::CrossChain,
                ProcessStatus::Failed,
                ProcessPatch {
                    tx_hash: Some("sig".into()),
                    error: Some(error),
                    ..Default::default()
                },
            )
            .unwrap();
        manager
            .update_execution(&mut step, ExecutionStatus::Failed, ExecutionPatch::default())
            .unwrap();

        assert_eq!(manager.reopen_failed(&mut step), 1);

        let process = step.process(ProcessType::CrossChain).unwrap();
        assert_eq!(process.status, ProcessStatus::Pending);
        assert!(process.error.is_none());
        assert_eq!(
            step.execution.as_ref().unwrap().status,
            ExecutionStatus::Pending
        );
        assert_eq!(manager.reopen_failed(&mut step), 0);
    }

    #[test]
    fn test_reopen_failed_receiving_leg_waits_again() {
        let manager = StatusManager::new();
        let mut step = step(SOLANA, ETHEREUM);

        manager.find_or_create_process(&mut step, ProcessType::CrossChain, None);
        manager
            .update_process(
                &mut step,
                ProcessType::CrossChain,
                ProcessStatus::Done,
                ProcessPatch::tx("sig", None),
            )
            .unwrap();
        manager.find_or_create_process(
            &mut step,
            ProcessType::ReceivingChain,
            Some(ProcessStatus::Pending),
        );
        manager
            .update_process(
                &mut step,
                ProcessType::ReceivingChain,
                ProcessStatus::Failed,
                ProcessPatch::default(),
            )
            .unwrap();
        manager
            .update_execution(&mut step, ExecutionStatus::Failed, ExecutionPatch::default())
            .unwrap();

        assert_eq!(manager.reopen_failed(&mut step), 1);

        let receiving = step.process(ProcessType::ReceivingChain).unwrap();
        assert!(receiving.tx_hash.is_none());
        assert_eq!(receiving.status, ProcessStatus::Pending);
        assert_eq!(
            step.process(ProcessType::CrossChain).unwrap().status,
            ProcessStatus::Done
        );
    }
}
