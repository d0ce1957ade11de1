//! Security processing engine contract.
//!
//! The engine does the cryptography: signature and decryption processing,
//! canonicalization and key resolution. This crate only calls it.

use async_trait::async_trait;
use thiserror::Error;

use crate::callback::CredentialCallback;
use crate::crypto::ProviderSet;
use crate::error::sanitize_message;
use crate::representation::WorkingDocument;
use crate::results::SecurityResults;

/// Why the engine rejected a message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationFailure {
    /// Signature or digest did not verify
    InvalidSignature,
    /// Encrypted content could not be decrypted
    DecryptionFailed,
    /// Timestamp or token outside its validity window
    Expired,
    /// A security token is malformed or untrusted
    InvalidToken,
    /// The security header is malformed
    MalformedHeader,
    /// An algorithm is not supported
    UnsupportedAlgorithm,
    /// Authentication of a username token failed
    FailedAuthentication,
}

impl VerificationFailure {
    /// Stable name for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::DecryptionFailed => "decryption_failed",
            Self::Expired => "expired",
            Self::InvalidToken => "invalid_token",
            Self::MalformedHeader => "malformed_header",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::FailedAuthentication => "failed_authentication",
        }
    }
}

impl std::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection reported by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Security verification failed ({failure}): {detail}")]
pub struct VerificationError {
    failure: VerificationFailure,
    detail: String,
}

impl VerificationError {
    /// Creates an error; the detail is sanitized
    #[must_use]
    pub fn new(failure: VerificationFailure, detail: impl Into<String>) -> Self {
        Self {
            failure,
            detail: sanitize_message(&detail.into()),
        }
    }

    /// Failure category
    #[must_use]
    pub const fn failure(&self) -> VerificationFailure {
        self.failure
    }

    /// Sanitized detail
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Verifies the security header of a working document.
#[async_trait]
pub trait SecurityEngine: Send + Sync {
    /// Processes the security header addressed to `actor` (the default
    /// recipient when `None`), returning results in processing order.
    ///
    /// The engine may rewrite the document, e.g. replacing encrypted data
    /// with its plaintext.
    async fn verify(
        &self,
        document: &mut WorkingDocument,
        actor: Option<&str>,
        callback: &dyn CredentialCallback,
        providers: &ProviderSet,
    ) -> Result<SecurityResults, VerificationError>;
}
