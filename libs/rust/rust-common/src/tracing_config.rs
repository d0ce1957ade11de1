//! Tracing subscriber setup.
//!
//! A [`TracingConfig`] describes one filter (a default level plus per-target
//! overrides) and an output format. `RUST_LOG`, when set, replaces the
//! configured filter entirely.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Service name logged when the subscriber is installed
    pub service_name: String,
    /// Level for targets without an override
    pub default_level: String,
    /// `(target, level)` overrides, applied in order
    pub target_levels: Vec<(String, String)>,
    /// Output format
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::new("wss-inbound")
    }
}

impl TracingConfig {
    /// Config for `service_name` at `info` with text output.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            default_level: "info".to_string(),
            target_levels: Vec::new(),
            format: LogFormat::Text,
        }
    }

    /// Sets the default level.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    /// Overrides the level of one target, e.g. a timing target at `debug`.
    #[must_use]
    pub fn with_target_level(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.target_levels.push((target.into(), level.into()));
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// The filter in `EnvFilter` syntax, e.g. `info,wss_inbound::timing=debug`.
    #[must_use]
    pub fn filter_spec(&self) -> String {
        std::iter::once(self.default_level.clone())
            .chain(self.target_levels.iter().map(|(target, level)| format!("{target}={level}")))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Builds the filter, preferring `RUST_LOG` when it is set and valid.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.filter_spec()))
            .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
    }
}

/// Installs the global subscriber.
///
/// Returns `false` when a subscriber was already installed; the existing one
/// stays in place, so tests can call this freely.
pub fn init_tracing(config: &TracingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
    .is_ok();

    if installed {
        tracing::info!(service = %config.service_name, filter = %config.filter_spec(), "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "wss-inbound");
        assert_eq!(config.filter_spec(), "info");
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_filter_spec_with_overrides() {
        let config = TracingConfig::new("gateway")
            .with_level("warn")
            .with_target_level("wss_inbound::timing", "debug")
            .with_target_level("wss_inbound::sync", "trace")
            .with_format(LogFormat::Json);

        assert_eq!(
            config.filter_spec(),
            "warn,wss_inbound::timing=debug,wss_inbound::sync=trace"
        );
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_second_init_keeps_existing_subscriber() {
        let config = TracingConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
