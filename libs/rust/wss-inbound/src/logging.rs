//! Structured logging helpers for pipeline events.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ProcessingError;
use crate::message::ServiceIdentity;
use crate::pipeline::SkipReason;
use crate::results::SecurityResults;
use crate::sync::SyncReport;

const TARGET: &str = "wss_inbound";

/// Target for stage timings
pub const TIMING_TARGET: &str = "wss_inbound::timing";

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Log a message that bypassed verification.
pub fn log_bypass(correlation_id: &str, service: &ServiceIdentity, reason: SkipReason) {
    debug!(
        target: TARGET,
        correlation_id = %correlation_id,
        service = %service,
        reason = reason.as_str(),
        status = "bypassed",
        "Security processing skipped"
    );
}

/// Log a completed engine call.
pub fn log_verification(
    correlation_id: &str,
    service: &ServiceIdentity,
    results: &SecurityResults,
    duration: Duration,
) {
    debug!(
        target: TARGET,
        correlation_id = %correlation_id,
        service = %service,
        results = results.len(),
        duration_ms = duration_ms(duration),
        "Security header verified"
    );
}

/// Log the outcome of token synchronization.
pub fn log_tokens_cached(correlation_id: &str, report: &SyncReport) {
    if report.examined() == 0 {
        return;
    }
    info!(
        target: TARGET,
        correlation_id = %correlation_id,
        inserted = report.inserted.len(),
        already_present = report.already_present.len(),
        "Security tokens synchronized"
    );
}

/// Log a stage duration.
pub fn log_stage_timing(correlation_id: &str, stage: &str, duration: Duration) {
    debug!(
        target: TIMING_TARGET,
        correlation_id = %correlation_id,
        stage = stage,
        duration_ms = duration_ms(duration),
        "Stage completed"
    );
}

/// Log a failed `process` call (messages are already sanitized).
pub fn log_processing_error(correlation_id: &str, service: &ServiceIdentity, error: &ProcessingError) {
    let error_type = match error {
        ProcessingError::Configuration { .. } => "configuration",
        ProcessingError::MissingSecurityHeader { .. } => "missing_security_header",
        ProcessingError::Verification(e) => e.failure().as_str(),
        ProcessingError::TokenCache { .. } => "token_cache",
        ProcessingError::PolicyViolation(v) => v.requirement.as_str(),
        ProcessingError::Representation { .. } => "representation",
        _ => "internal",
    };

    warn!(
        target: TARGET,
        correlation_id = %correlation_id,
        service = %service,
        error_code = error.kind().as_str(),
        error_type = error_type,
        error_message = %error,
        status = "rejected",
        "Security processing failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{VerificationError, VerificationFailure};
    use crate::validator::{PolicyViolation, Requirement};

    #[test]
    fn test_log_helpers_do_not_panic() {
        let service = ServiceIdentity::operation("Echo", "ping");
        log_bypass("corr-1", &service, SkipReason::Fault);
        log_verification("corr-1", &service, &SecurityResults::new(), Duration::from_millis(3));
        log_tokens_cached(
            "corr-1",
            &SyncReport {
                inserted: vec!["tok-1".into()],
                already_present: Vec::new(),
            },
        );
        log_stage_timing("corr-1", "engine", Duration::from_micros(250));
    }

    #[test]
    fn test_error_type_mapping() {
        let service = ServiceIdentity::service("Echo");
        let errors = vec![
            ProcessingError::configuration("no provider"),
            ProcessingError::missing_security_header("Echo"),
            VerificationError::new(VerificationFailure::InvalidSignature, "bad digest").into(),
            ProcessingError::token_cache("tok-1", "no id"),
            PolicyViolation::new(Requirement::Layout, "timestamp not first").into(),
            ProcessingError::representation("bad doc"),
        ];

        for error in &errors {
            log_processing_error("corr-1", &service, error);
        }
    }

    #[test]
    fn test_duration_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(42)), 42);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
