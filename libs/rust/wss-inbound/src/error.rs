//! Error handling for the inbound security pipeline.
//!
//! Every failure of [`crate::InboundProcessor::process`] surfaces as a
//! [`ProcessingError`]. The short-circuit for fault messages and messages
//! without policy is not an error and never produces one.

use thiserror::Error;

use crate::engine::VerificationError;
use crate::validator::PolicyViolation;

/// Sensitive patterns that must not leak into error reasons
const SENSITIVE_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "private",
    "credential",
    "keystore",
    "passphrase",
];

/// Errors raised while processing an inbound message.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// A crypto provider, callback or policy could not be resolved
    #[error("Security configuration error: {reason}")]
    Configuration {
        /// What could not be resolved
        reason: String,
    },

    /// Policy applies to the message but it carries no security header
    #[error("Security header missing from message for service {service}")]
    MissingSecurityHeader {
        /// Service the message was addressed to
        service: String,
    },

    /// The security engine rejected the message content
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// A verified security token could not be extracted or stored
    #[error("Failed to cache security token {token_id}: {reason}")]
    TokenCache {
        /// Identifier of the token, when it could be read
        token_id: String,
        /// Description of the failure (sanitized)
        reason: String,
        /// Whether the store reported a transient failure
        retryable: bool,
    },

    /// Verified results do not satisfy the policy
    #[error(transparent)]
    PolicyViolation(#[from] PolicyViolation),

    /// The message could not be moved between wire and working form
    #[error("Message representation error: {reason}")]
    Representation {
        /// Description of the conversion failure
        reason: String,
    },
}

/// Coarse classification of a [`ProcessingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Provider or policy resolution failed
    Configuration,
    /// Expected message structure is absent
    Structural,
    /// Cryptographic verification failed
    Verification,
    /// Token extraction or storage failed
    TokenCache,
    /// Results did not meet policy
    PolicyViolation,
    /// Representation or other internal failure
    Internal,
}

impl ErrorKind {
    /// Stable code for logs and responses
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "WSS_CONFIGURATION",
            Self::Structural => "WSS_STRUCTURE",
            Self::Verification => "WSS_VERIFICATION",
            Self::TokenCache => "WSS_TOKEN_CACHE",
            Self::PolicyViolation => "WSS_POLICY_VIOLATION",
            Self::Internal => "WSS_INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProcessingError {
    /// Creates a Configuration error
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: sanitize_message(&reason.into()),
        }
    }

    /// Creates a MissingSecurityHeader error
    #[must_use]
    pub fn missing_security_header(service: impl Into<String>) -> Self {
        Self::MissingSecurityHeader {
            service: service.into(),
        }
    }

    /// Creates a non-retryable TokenCache error
    #[must_use]
    pub fn token_cache(token_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TokenCache {
            token_id: token_id.into(),
            reason: sanitize_message(&reason.into()),
            retryable: false,
        }
    }

    /// Creates a TokenCache error from a store failure
    #[must_use]
    pub fn token_store(token_id: impl Into<String>, err: &rust_common::PlatformError) -> Self {
        Self::TokenCache {
            token_id: token_id.into(),
            reason: sanitize_message(&err.to_string()),
            retryable: err.is_retryable(),
        }
    }

    /// Creates a Representation error
    #[must_use]
    pub fn representation(reason: impl Into<String>) -> Self {
        Self::Representation {
            reason: sanitize_message(&reason.into()),
        }
    }

    /// Get the classification of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::MissingSecurityHeader { .. } => ErrorKind::Structural,
            Self::Verification(_) => ErrorKind::Verification,
            Self::TokenCache { .. } => ErrorKind::TokenCache,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::Representation { .. } => ErrorKind::Internal,
        }
    }

    /// Whether a caller-level retry may succeed.
    ///
    /// Nothing is retried inside the pipeline; only transient token store
    /// failures are reported as retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TokenCache { retryable: true, .. })
    }
}

/// Sanitize a message by replacing it when it mentions secret material
pub(crate) fn sanitize_message(message: &str) -> String {
    if contains_sensitive_info(message) {
        return "details redacted".to_string();
    }
    message.to_string()
}

/// Check if a string contains sensitive information
#[must_use]
pub fn contains_sensitive_info(text: &str) -> bool {
    let lower = text.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}
