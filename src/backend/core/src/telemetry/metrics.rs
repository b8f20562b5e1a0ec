//! Access decision metrics.
//!
//! Counters are emitted through the `metrics` facade; with no recorder
//! installed they are no-ops.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "access_decisions_total",
        "Total access decisions by policy, action and outcome"
    );
    describe_counter!("access_errors_total", "Total access errors by code");
    describe_counter!(
        "access_license_denials_total",
        "Total denials raised by the license gate"
    );
    describe_histogram!(
        "access_decision_duration_seconds",
        "Time taken to reach a top-level access decision"
    );
}

/// Metrics for point checks.
pub struct DecisionMetrics;

impl DecisionMetrics {
    /// Record one decision outcome.
    pub fn record(policy: &'static str, action: &'static str, allowed: bool) {
        counter!(
            "access_decisions_total",
            "policy" => policy,
            "action" => action,
            "outcome" => if allowed { "allow" } else { "deny" },
        )
        .increment(1);
    }

    /// Record a decision that ended in an error.
    pub fn record_error(policy: &'static str, action: &'static str) {
        counter!(
            "access_decisions_total",
            "policy" => policy,
            "action" => action,
            "outcome" => "error",
        )
        .increment(1);
    }

    pub fn record_duration(action: &'static str, seconds: f64) {
        histogram!("access_decision_duration_seconds", "action" => action).record(seconds);
    }

    pub fn record_license_denial(reason: &'static str) {
        counter!("access_license_denials_total", "reason" => reason).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        register_metrics();
        DecisionMetrics::record("inventory", "change", true);
        DecisionMetrics::record_error("job", "start");
        DecisionMetrics::record_duration("read", 0.001);
        DecisionMetrics::record_license_denial("expired");
    }
}
