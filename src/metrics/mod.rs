//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Step outcomes (completed, failed, halted for user action)
//! - Broadcasts and replacements
//! - Balance check failures and re-quotes
//! - Receiving-leg wait latency

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Step metrics
    pub static ref STEPS_STARTED: CounterVec = register_counter_vec!(
        "step_executor_steps_started_total",
        "Total step executions started",
        &["chain_id"]
    ).unwrap();

    pub static ref STEPS_COMPLETED: CounterVec = register_counter_vec!(
        "step_executor_steps_completed_total",
        "Total step executions completed",
        &["chain_id"]
    ).unwrap();

    pub static ref STEPS_FAILED: CounterVec = register_counter_vec!(
        "step_executor_steps_failed_total",
        "Total step executions failed by error code",
        &["chain_id", "code"]
    ).unwrap();

    pub static ref STEPS_HALTED: CounterVec = register_counter_vec!(
        "step_executor_steps_halted_total",
        "Total step executions halted awaiting user action",
        &["chain_id"]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_BROADCAST: CounterVec = register_counter_vec!(
        "step_executor_transactions_broadcast_total",
        "Total transactions handed to the signing agent",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_REPLACED: CounterVec = register_counter_vec!(
        "step_executor_transactions_replaced_total",
        "Total broadcast transactions replaced by the network",
        &["chain_id"]
    ).unwrap();

    // Collaborator metrics
    pub static ref BALANCE_CHECK_FAILURES: CounterVec = register_counter_vec!(
        "step_executor_balance_check_failures_total",
        "Total balance checks that found insufficient funds",
        &["chain_id"]
    ).unwrap();

    pub static ref REQUOTES: CounterVec = register_counter_vec!(
        "step_executor_requotes_total",
        "Total re-quotes by outcome",
        &["chain_id", "changed"]
    ).unwrap();

    pub static ref RECEIVING_WAIT: HistogramVec = register_histogram_vec!(
        "step_executor_receiving_wait_seconds",
        "Time spent waiting for the receiving leg",
        &["chain_id"],
        vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn encode() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_step_started(chain_id: u64) {
    STEPS_STARTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_step_completed(chain_id: u64) {
    STEPS_COMPLETED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_step_failed(chain_id: u64, code: &str) {
    STEPS_FAILED
        .with_label_values(&[&chain_id.to_string(), code])
        .inc();
}

pub fn record_step_halted(chain_id: u64) {
    STEPS_HALTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_broadcast(chain_id: u64) {
    TX_BROADCAST
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_replaced(chain_id: u64) {
    TX_REPLACED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_balance_check_failure(chain_id: u64) {
    BALANCE_CHECK_FAILURES
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_requote(chain_id: u64, changed: bool) {
    REQUOTES
        .with_label_values(&[&chain_id.to_string(), if changed { "true" } else { "false" }])
        .inc();
}

pub fn record_receiving_wait(chain_id: u64, latency_secs: f64) {
    RECEIVING_WAIT
        .with_label_values(&[&chain_id.to_string()])
        .observe(latency_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_recorded_metrics() {
        record_tx_broadcast(424242);
        let text = encode();
        assert!(text.contains("step_executor_transactions_broadcast_total"));
        assert!(text.contains("chain_id=\"424242\""));
    }
}
