//! Prometheus metrics helpers.
//!
//! Counters and millisecond histograms backed by atomics, carrying a fixed
//! set of constant labels (e.g. the service a pipeline serves). Rendering
//! follows the Prometheus text exposition format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default latency buckets, in milliseconds.
pub const DEFAULT_LATENCY_BUCKETS_MS: &[u64] = &[1, 5, 10, 25, 50, 100, 250, 500, 1000];

/// Name, help text and constant labels shared by every series of a metric.
#[derive(Debug, Clone)]
struct Descriptor {
    name: String,
    help: String,
    labels: Vec<(String, String)>,
}

impl Descriptor {
    fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels: Vec::new(),
        }
    }

    fn header(&self, kind: &str) -> String {
        format!("# HELP {0} {1}\n# TYPE {0} {kind}\n", self.name, self.help)
    }

    /// `{a="1",le="10"}`, or nothing when there are no labels at all.
    fn label_set(&self, extra: Option<(&str, &str)>) -> String {
        let pairs: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(extra)
            .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
            .collect();
        if pairs.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", pairs.join(","))
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    desc: Descriptor,
    value: AtomicU64,
}

impl Counter {
    /// Creates a zeroed counter without labels.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            desc: Descriptor::new(name, help),
            value: AtomicU64::new(0),
        }
    }

    /// Adds a constant label to every exported sample.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.desc.labels.push((key.into(), value.into()));
        self
    }

    /// Adds one.
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Adds `amount`.
    pub fn inc_by(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    /// Renders the counter as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = self.desc.header("counter");
        let _ = writeln!(out, "{}{} {}", self.desc.name, self.desc.label_set(None), self.get());
        out
    }
}

/// A latency histogram with fixed millisecond buckets.
///
/// Bucket counts are cumulative on export, as Prometheus expects.
#[derive(Debug)]
pub struct Histogram {
    desc: Descriptor,
    bounds_ms: Vec<u64>,
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    sum_ms: AtomicU64,
}

impl Histogram {
    /// Create a histogram with the default latency buckets.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::with_buckets(name, help, DEFAULT_LATENCY_BUCKETS_MS)
    }

    /// Create a histogram with custom upper bounds (milliseconds).
    #[must_use]
    pub fn with_buckets(name: impl Into<String>, help: impl Into<String>, bounds_ms: &[u64]) -> Self {
        let mut bounds_ms = bounds_ms.to_vec();
        bounds_ms.sort_unstable();
        bounds_ms.dedup();
        let buckets = bounds_ms.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            desc: Descriptor::new(name, help),
            bounds_ms,
            buckets,
            count: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
        }
    }

    /// Adds a constant label to every exported sample.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.desc.labels.push((key.into(), value.into()));
        self
    }

    /// Record one observation.
    pub fn observe(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if let Some(bucket) = self
            .bounds_ms
            .iter()
            .position(|bound| ms <= *bound)
            .and_then(|idx| self.buckets.get(idx))
        {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        // The closure always returns Some, so the update cannot fail.
        let _ = self
            .sum_ms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |sum| Some(sum.saturating_add(ms)));
    }

    /// Total number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all observations in milliseconds.
    #[must_use]
    pub fn sum_ms(&self) -> u64 {
        self.sum_ms.load(Ordering::Relaxed)
    }

    /// Renders buckets, sum and count as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let name = &self.desc.name;
        let mut out = self.desc.header("histogram");
        let mut cumulative = 0;
        for (bound, bucket) in self.bounds_ms.iter().zip(&self.buckets) {
            cumulative += bucket.load(Ordering::Relaxed);
            let labels = self.desc.label_set(Some(("le", &bound.to_string())));
            let _ = writeln!(out, "{name}_bucket{labels} {cumulative}");
        }
        let inf = self.desc.label_set(Some(("le", "+Inf")));
        let plain = self.desc.label_set(None);
        let _ = writeln!(out, "{name}_bucket{inf} {}", self.count());
        let _ = writeln!(out, "{name}_sum{plain} {}", self.sum_ms());
        let _ = writeln!(out, "{name}_count{plain} {}", self.count());
        out
    }
}
