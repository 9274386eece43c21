//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub operations_total: IntCounterVec,
    pub operations_confirmed: IntCounterVec,
    pub operations_failed: IntCounterVec,
    pub rpc_requests: IntCounterVec,
    pub rate_limited: IntCounter,
    pub existence_checks_failed_open: IntCounter,
    pub proofs_fetched: IntCounter,

    // Histograms
    pub rpc_latency: Histogram,
    pub operation_latency: Histogram,
    pub selected_inputs: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Operations started, by operation"),
            &["operation"],
        )?;

        let operations_confirmed = IntCounterVec::new(
            Opts::new("operations_confirmed", "Operations confirmed on the ledger"),
            &["operation"],
        )?;

        let operations_failed = IntCounterVec::new(
            Opts::new("operations_failed", "Failed operations by error category"),
            &["operation", "category"],
        )?;

        let rpc_requests = IntCounterVec::new(
            Opts::new("rpc_requests_total", "JSON-RPC requests sent, by method"),
            &["method"],
        )?;

        let rate_limited = IntCounter::with_opts(Opts::new(
            "rpc_rate_limited_total",
            "Responses with HTTP 429",
        ))?;

        let existence_checks_failed_open = IntCounter::with_opts(Opts::new(
            "existence_checks_failed_open",
            "Account existence checks whose fetch error was treated as absent",
        ))?;

        let proofs_fetched =
            IntCounter::with_opts(Opts::new("proofs_fetched", "Validity proofs fetched"))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        let operation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "End-to-end latency from assembly to confirmation",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 40.0, 60.0]),
        )?;

        let selected_inputs = Histogram::with_opts(
            HistogramOpts::new("selected_inputs", "Compressed records consumed per operation")
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(operations_confirmed.clone()))?;
        registry.register(Box::new(operations_failed.clone()))?;
        registry.register(Box::new(rpc_requests.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(existence_checks_failed_open.clone()))?;
        registry.register(Box::new(proofs_fetched.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(operation_latency.clone()))?;
        registry.register(Box::new(selected_inputs.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operations_confirmed,
            operations_failed,
            rpc_requests,
            rate_limited,
            existence_checks_failed_open,
            proofs_fetched,
            rpc_latency,
            operation_latency,
            selected_inputs,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(|| {
        // Names and label sets are static, so construction cannot fail at runtime.
        Metrics::new().unwrap_or_else(|e| panic!("Failed to initialize metrics: {}", e))
    });
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_encode_includes_counters() {
        let m = Metrics::new().unwrap();
        m.operations_total.with_label_values(&["transfer"]).inc();
        m.rate_limited.inc();
        let text = m.encode_text().unwrap();
        assert!(text.contains("operations_total{operation=\"transfer\"} 1"));
        assert!(text.contains("rpc_rate_limited_total 1"));
    }

    #[test]
    fn test_global_metrics_is_shared() {
        let before = metrics().proofs_fetched.get();
        metrics().proofs_fetched.inc();
        assert!(metrics().proofs_fetched.get() > before);
    }
}
