//! Quote reconciler
//!
//! Re-fetches a step's plan when no prepared transaction is cached and
//! flags material changes (worse minimum output beyond the step's slippage,
//! or a different tool) that need the user's acceptance before signing.

use crate::error::ExecutorResult;
use crate::service::QuoteService;
use crate::step::{parse_amount, Step};

use async_trait::async_trait;
use tracing::{debug, info};

/// Material difference between the current and the re-quoted plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanChange {
    pub previous_to_amount_min: String,
    pub updated_to_amount_min: String,
    pub tool_changed: bool,
}

/// Outcome of a reconciliation. The original step is never mutated.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub step: Step,
    pub change: Option<PlanChange>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteReconciler: Send + Sync {
    async fn reconcile(&self, step: &Step) -> ExecutorResult<Reconciliation>;
}

/// Quote reconciler backed by the remote quoting service
pub struct StepReconciler<S> {
    service: S,
}

impl<S: QuoteService> StepReconciler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: QuoteService> QuoteReconciler for StepReconciler<S> {
    async fn reconcile(&self, step: &Step) -> ExecutorResult<Reconciliation> {
        let updated = self.service.fetch_updated_step(step).await?;
        let change = compare_steps(step, &updated)?;
        crate::metrics::record_requote(step.action.from_chain_id, change.is_some());

        match &change {
            Some(change) => info!(
                step_id = %step.id,
                previous = %change.previous_to_amount_min,
                updated = %change.updated_to_amount_min,
                tool_changed = change.tool_changed,
                "Re-quoted plan changed materially"
            ),
            None => debug!(step_id = %step.id, "Re-quoted plan within slippage"),
        }

        Ok(Reconciliation {
            step: updated,
            change,
        })
    }
}

/// Compare two plans for the same step. The change is material when the
/// tool differs or the minimum output dropped by more than the step's slippage.
pub fn compare_steps(previous: &Step, updated: &Step) -> ExecutorResult<Option<PlanChange>> {
    let old_min = parse_amount(&previous.estimate.to_amount_min)?;
    let new_min = parse_amount(&updated.estimate.to_amount_min)?;
    let tool_changed = previous.tool != updated.tool;

    let actual_slippage = if old_min > 0 && new_min < old_min {
        (old_min - new_min) as f64 / old_min as f64
    } else {
        0.0
    };

    if !tool_changed && actual_slippage <= previous.action.slippage {
        return Ok(None);
    }

    Ok(Some(PlanChange {
        previous_to_amount_min: previous.estimate.to_amount_min.clone(),
        updated_to_amount_min: updated.estimate.to_amount_min.clone(),
        tool_changed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MockQuoteService;
    use crate::step::fixtures::{step, ETHEREUM, SOLANA};

    #[test]
    fn test_small_drop_within_slippage() {
        let previous = step(SOLANA, ETHEREUM);
        let mut updated = previous.clone();
        // 0.3% drop against 0.5% slippage
        updated.estimate.to_amount_min = "987030".to_string();

        assert_eq!(compare_steps(&previous, &updated).unwrap(), None);
    }

    #[test]
    fn test_large_drop_is_material() {
        let previous = step(SOLANA, ETHEREUM);
        let mut updated = previous.clone();
        updated.estimate.to_amount_min = "900000".to_string();

        let change = compare_steps(&previous, &updated).unwrap().unwrap();
        assert_eq!(change.previous_to_amount_min, "990000");
        assert_eq!(change.updated_to_amount_min, "900000");
        assert!(!change.tool_changed);
    }

    #[test]
    fn test_better_quote_is_not_material() {
        let previous = step(SOLANA, ETHEREUM);
        let mut updated = previous.clone();
        updated.estimate.to_amount_min = "999999".to_string();

        assert_eq!(compare_steps(&previous, &updated).unwrap(), None);
    }

    #[test]
    fn test_tool_change_is_material() {
        let previous = step(SOLANA, ETHEREUM);
        let mut updated = previous.clone();
        updated.tool = "allbridge".to_string();

        let change = compare_steps(&previous, &updated).unwrap().unwrap();
        assert!(change.tool_changed);
    }

    #[tokio::test]
    async fn test_reconcile_does_not_mutate_original() {
        let original = step(SOLANA, ETHEREUM);
        let mut quoted = original.clone();
        quoted.estimate.to_amount_min = "800000".to_string();

        let mut service = MockQuoteService::new();
        let response = quoted.clone();
        service
            .expect_fetch_updated_step()
            .times(1)
            .returning(move |_| Ok(response.clone()));

        let reconciler = StepReconciler::new(service);
        let snapshot = original.clone();
        let reconciliation = reconciler.reconcile(&original).await.unwrap();

        assert_eq!(original, snapshot);
        assert_eq!(reconciliation.step, quoted);
        assert!(reconciliation.change.is_some());
    }
}
