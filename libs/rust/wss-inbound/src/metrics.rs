//! Pipeline metrics.

use std::time::Duration;

use rust_common::{Counter, Histogram};

/// Counters and latency histogram for [`crate::InboundProcessor`].
#[derive(Debug)]
pub struct PipelineMetrics {
    /// Messages that completed verification and validation
    pub processed: Counter,
    /// Messages that skipped verification
    pub bypassed: Counter,
    /// Messages rejected with an error
    pub rejected: Counter,
    /// Tokens inserted into token stores
    pub tokens_cached: Counter,
    /// Engine call latency
    pub engine_latency: Histogram,
}

impl PipelineMetrics {
    /// Creates zeroed metrics
    #[must_use]
    pub fn new() -> Self {
        Self {
            processed: Counter::new("wss_inbound_processed_total", "Messages verified and accepted"),
            bypassed: Counter::new("wss_inbound_bypassed_total", "Messages that skipped verification"),
            rejected: Counter::new("wss_inbound_rejected_total", "Messages rejected by the pipeline"),
            tokens_cached: Counter::new("wss_inbound_tokens_cached_total", "Security tokens cached"),
            engine_latency: Histogram::new(
                "wss_inbound_engine_latency_ms",
                "Security engine latency in milliseconds",
            ),
        }
    }

    /// Creates zeroed metrics labeled with the service they serve
    #[must_use]
    pub fn for_service(service: &str) -> Self {
        let base = Self::new();
        Self {
            processed: base.processed.with_label("service", service),
            bypassed: base.bypassed.with_label("service", service),
            rejected: base.rejected.with_label("service", service),
            tokens_cached: base.tokens_cached.with_label("service", service),
            engine_latency: base.engine_latency.with_label("service", service),
        }
    }

    /// Records an engine call
    pub fn record_engine(&self, duration: Duration) {
        self.engine_latency.observe(duration);
    }

    /// Prometheus text exposition of all metrics
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        [
            self.processed.to_prometheus(),
            self.bypassed.to_prometheus(),
            self.rejected.to_prometheus(),
            self.tokens_cached.to_prometheus(),
            self.engine_latency.to_prometheus(),
        ]
        .concat()
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
