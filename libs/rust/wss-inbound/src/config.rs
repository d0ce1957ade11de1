//! Processor configuration from environment variables.

use std::env;
use std::path::PathBuf;

use rust_common::{LogFormat, TracingConfig};
use thiserror::Error;

use crate::logging::TIMING_TARGET;
use crate::policy::StaticPolicyResolver;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parse failure
        reason: String,
    },

    /// Unknown log level
    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),

    /// Policy file could not be loaded
    #[error("Failed to load policy file: {0}")]
    PolicyFile(String),
}

/// Processor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Service name for logs
    pub service_name: String,
    /// Default log level
    pub log_level: String,
    /// Emit JSON logs
    pub log_json: bool,
    /// Log per-stage timings
    pub timing_log: bool,
    /// JSON policy table for [`StaticPolicyResolver`]
    pub policy_file: Option<PathBuf>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            service_name: "wss-inbound".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            timing_log: false,
            policy_file: None,
        }
    }
}

impl ProcessorConfig {
    /// Loads configuration from environment variables (and `.env`) with
    /// validation.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable cannot be parsed or the result is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through a variable lookup function.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            service_name: lookup("WSS_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("WSS_LOG_LEVEL")
                .map_or(defaults.log_level, |level| level.trim().to_lowercase()),
            log_json: parse_var(&lookup, "WSS_LOG_JSON", defaults.log_json)?,
            timing_log: parse_var(&lookup, "WSS_TIMING_LOG", defaults.timing_log)?,
            policy_file: lookup("WSS_POLICY_FILE")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("service_name".to_string()));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }
        Ok(())
    }

    /// Tracing configuration for [`rust_common::init_tracing`].
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        let format = if self.log_json { LogFormat::Json } else { LogFormat::Text };
        let config = TracingConfig::new(&self.service_name)
            .with_level(&self.log_level)
            .with_format(format);
        if self.timing_log {
            config.with_target_level(TIMING_TARGET, "debug")
        } else {
            config
        }
    }

    /// Loads the configured policy table, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PolicyFile`] when the file cannot be read or
    /// parsed.
    pub fn policy_resolver(&self) -> Result<Option<StaticPolicyResolver>, ConfigError> {
        self.policy_file
            .as_ref()
            .map(|path| {
                StaticPolicyResolver::from_json_file(path).map_err(|e| ConfigError::PolicyFile(e.to_string()))
            })
            .transpose()
    }
}

/// Parse a variable with a default value.
fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ProcessorConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ProcessorConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(load(&[]).unwrap(), ProcessorConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("WSS_SERVICE_NAME", "billing"),
            ("WSS_LOG_LEVEL", "DEBUG"),
            ("WSS_LOG_JSON", "true"),
            ("WSS_TIMING_LOG", "true"),
            ("WSS_POLICY_FILE", "/etc/wss/policies.json"),
        ])
        .unwrap();

        assert_eq!(config.service_name, "billing");
        assert_eq!(config.log_level, "debug");
        assert!(config.log_json);
        assert!(config.timing_log);
        assert_eq!(config.policy_file, Some(PathBuf::from("/etc/wss/policies.json")));
    }

    #[test]
    fn test_invalid_bool() {
        let result = load(&[("WSS_LOG_JSON", "yes please")]);
        assert!(matches!(result, Err(ConfigError::ParseError { name, .. }) if name == "WSS_LOG_JSON"));
    }

    #[test]
    fn test_invalid_log_level() {
        assert!(matches!(
            load(&[("WSS_LOG_LEVEL", "loud")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_empty_service_name() {
        assert!(matches!(
            load(&[("WSS_SERVICE_NAME", " ")]),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_tracing_config_bridge() {
        let config = load(&[("WSS_TIMING_LOG", "true"), ("WSS_LOG_JSON", "true")]).unwrap();
        let tracing = config.tracing_config();
        assert_eq!(tracing.service_name, "wss-inbound");
        assert_eq!(tracing.format, LogFormat::Json);
        assert_eq!(tracing.filter_spec(), "info,wss_inbound::timing=debug");
    }

    #[test]
    fn test_missing_policy_file() {
        let config = load(&[("WSS_POLICY_FILE", "/nonexistent/wss-policies.json")]).unwrap();
        assert!(matches!(config.policy_resolver(), Err(ConfigError::PolicyFile(_))));
        assert!(ProcessorConfig::default().policy_resolver().unwrap().is_none());
    }
}
