//! Ledger client metrics

use crate::operation::Operation;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge_vec, CounterVec,
    Encoder, HistogramVec, IntGaugeVec, TextEncoder,
};
use std::time::Duration;

lazy_static::lazy_static! {
    pub static ref LEDGER_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "credit_ledger_calls_total",
        "Total ledger client calls",
        &["operation", "outcome"]
    )
    .unwrap();

    pub static ref LEDGER_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "credit_ledger_call_duration_seconds",
        "Ledger call duration, including confirmation for transactions",
        &["operation"]
    )
    .unwrap();

    pub static ref LAST_GAS_ESTIMATE: IntGaugeVec = register_int_gauge_vec!(
        "credit_ledger_last_gas_estimate",
        "Most recent gas estimate per operation",
        &["operation"]
    )
    .unwrap();
}

/// Record one finished call; `outcome` is "ok" or an error kind
pub fn record_call(operation: Operation, outcome: &str, elapsed: Duration) {
    LEDGER_CALLS_TOTAL
        .with_label_values(&[operation.name(), outcome])
        .inc();
    LEDGER_CALL_DURATION
        .with_label_values(&[operation.name()])
        .observe(elapsed.as_secs_f64());
}

pub fn record_gas_estimate(operation: Operation, gas: u64) {
    LAST_GAS_ESTIMATE
        .with_label_values(&[operation.name()])
        .set(i64::try_from(gas).unwrap_or(i64::MAX));
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let mut buffer = Vec::new();
    if TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .is_err()
    {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_call_shows_in_exposition() {
        record_call(Operation::MintTokens, "remote_call_error", Duration::from_millis(12));
        record_gas_estimate(Operation::MintTokens, 70_000);

        let text = render();
        assert!(text.contains("credit_ledger_calls_total"));
        assert!(text.contains("operation=\"mintTokens\""));
        assert!(text.contains("credit_ledger_last_gas_estimate"));
    }
}
