//! Shared library for cross-cutting concerns in the WS-Security inbound crates.
//!
//! This crate provides centralized implementations for:
//! - The platform error type used by storage backends
//! - Tracing subscriber initialisation
//! - Counter and histogram metrics with Prometheus text export

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod metrics;
pub mod tracing_config;

pub use error::PlatformError;
pub use metrics::{Counter, Histogram};
pub use tracing_config::{LogFormat, TracingConfig, init_tracing};
