//! Registry of steps currently being executed
//!
//! Enforces one writer per step: a second invocation for a step id that is
//! still running is rejected instead of racing on the same execution record.

use crate::error::{ExecutorError, ExecutorResult};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Instant;
use tracing::debug;

#[derive(Default)]
pub struct ExecutionRegistry {
    active: DashMap<String, Instant>,
}

/// Claim on a step id, released on drop
pub struct ExecutionClaim<'a> {
    registry: &'a ExecutionRegistry,
    step_id: String,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    /// Claim `step_id` for the calling flow
    pub fn claim(&self, step_id: &str) -> ExecutorResult<ExecutionClaim<'_>> {
        match self.active.entry(step_id.to_string()) {
            Entry::Occupied(_) => Err(ExecutorError::StepAlreadyExecuting {
                step_id: step_id.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
                Ok(ExecutionClaim {
                    registry: self,
                    step_id: step_id.to_string(),
                })
            }
        }
    }

    pub fn is_active(&self, step_id: &str) -> bool {
        self.active.contains_key(step_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl Drop for ExecutionClaim<'_> {
    fn drop(&mut self) {
        if let Some((_, since)) = self.registry.active.remove(&self.step_id) {
            debug!(
                step_id = %self.step_id,
                elapsed_ms = since.elapsed().as_millis() as u64,
                "Released step"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_rejected_until_release() {
        let registry = ExecutionRegistry::new();

        let claim = registry.claim("step-1").unwrap();
        assert!(registry.is_active("step-1"));
        assert!(matches!(
            registry.claim("step-1"),
            Err(ExecutorError::StepAlreadyExecuting { .. })
        ));

        // Other steps are independent
        let other = registry.claim("step-2").unwrap();
        assert_eq!(registry.active_count(), 2);

        drop(claim);
        drop(other);
        assert_eq!(registry.active_count(), 0);
        assert!(registry.claim("step-1").is_ok());
    }
}
