//! OpenTelemetry instruments for the request manager
//!
//! All instruments are prefixed `wirecall.manager.`. They only export
//! something once a meter provider is installed, see
//! `wirecall_core::init_observability`.

use crate::manager::ManagerState;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};

/// Request manager metrics
pub struct ManagerMetrics {
    /// Current manager state, see [`ManagerState::as_gauge`]
    pub state: Gauge<i64>,
    /// Requests handed to a transport or a batch
    pub requests_total: Counter<u64>,
    /// Time from registration to settlement, seconds
    pub request_duration: Histogram<f64>,
    /// Requests per drained batch
    pub batch_size: Histogram<u64>,
    /// Demultiplexer diagnostics, by kind
    pub protocol_errors_total: Counter<u64>,
    /// Errors reported by transports through `on_error`
    pub channel_errors_total: Counter<u64>,
}

impl ManagerMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            state: meter
                .i64_gauge("wirecall.manager.state")
                .with_description(
                    "Manager state (0=uninitialized, 1=connecting, 2=ready, 3=closed)",
                )
                .build(),
            requests_total: meter
                .u64_counter("wirecall.manager.requests.total")
                .with_description("Total number of requests issued")
                .build(),
            request_duration: meter
                .f64_histogram("wirecall.manager.request.duration")
                .with_description("Request duration in seconds")
                .with_unit("s")
                .build(),
            batch_size: meter
                .u64_histogram("wirecall.manager.batch.size")
                .with_description("Number of requests sent in one batch payload")
                .build(),
            protocol_errors_total: meter
                .u64_counter("wirecall.manager.protocol_errors.total")
                .with_description("Inbound payloads or entries that could not be correlated")
                .build(),
            channel_errors_total: meter
                .u64_counter("wirecall.manager.channel_errors.total")
                .with_description("Errors reported by transports")
                .build(),
        }
    }

    pub fn update_state(&self, state: ManagerState) {
        self.state.record(state.as_gauge(), &[]);
    }

    pub fn record_request(&self, method: &str, batched: bool) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("batched", batched),
            ],
        );
    }

    /// Called once per settled request
    pub fn record_settlement(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_batch(&self, size: u64) {
        self.batch_size.record(size, &[]);
    }

    pub fn record_protocol_error(&self, kind: &'static str) {
        self.protocol_errors_total
            .add(1, &[KeyValue::new("kind", kind)]);
    }

    pub fn record_channel_error(&self, kind: &'static str) {
        self.channel_errors_total
            .add(1, &[KeyValue::new("kind", kind)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_provider() {
        let metrics = ManagerMetrics::new("test-manager");

        metrics.update_state(ManagerState::Connecting);
        metrics.update_state(ManagerState::Ready);
        metrics.record_request("eth_blockNumber", false);
        metrics.record_request("eth_call", true);
        metrics.record_settlement("eth_blockNumber", "success", 0.02);
        metrics.record_settlement("eth_call", "error", 0.4);
        metrics.record_batch(3);
        metrics.record_protocol_error("unrecognized_response_id");
        metrics.record_channel_error("channel");
    }

    #[test]
    fn test_metrics_with_explicit_meter() {
        let meter = global::meter("wirecall-test");
        let metrics = ManagerMetrics::new_with_meter(&meter);
        metrics.update_state(ManagerState::Closed);
        metrics.record_batch(0);
    }
}
