//! Shared test utilities for the WS-Security inbound crates.
//!
//! This crate provides:
//! - Recording mocks for every collaborator of the inbound pipeline
//! - Envelope, policy and result fixtures
//! - Proptest generators for verification results

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
