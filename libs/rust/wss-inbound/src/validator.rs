//! Policy validation of verification results.
//!
//! [`PolicyValidator`] is the seam; [`PolicyResultsValidator`] is the default
//! implementation checking timestamp, layout, protected parts, transport and
//! required tokens.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::message::{Envelope, QName, ServiceIdentity};
use crate::policy::{BindingKind, Layout, MessagePart, PolicyData, TokenType};
use crate::results::{ActionKind, SecurityResult, SecurityResults};

/// Policy requirement a result sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    /// Timestamp presence
    Timestamp,
    /// Header layout
    Layout,
    /// Signed parts
    SignedParts,
    /// Encrypted parts
    EncryptedParts,
    /// Secure transport
    SecureTransport,
    /// Required token type
    RequiredToken,
}

impl Requirement {
    /// Stable name for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Layout => "layout",
            Self::SignedParts => "signed_parts",
            Self::EncryptedParts => "encrypted_parts",
            Self::SecureTransport => "secure_transport",
            Self::RequiredToken => "required_token",
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Results did not satisfy the policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Policy requirement '{requirement}' not met: {detail}")]
pub struct PolicyViolation {
    /// Failed requirement
    pub requirement: Requirement,
    /// What was missing or misplaced
    pub detail: String,
}

impl PolicyViolation {
    /// Creates a violation
    #[must_use]
    pub fn new(requirement: Requirement, detail: impl Into<String>) -> Self {
        Self {
            requirement,
            detail: detail.into(),
        }
    }
}

/// What the validator sees besides the results.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Policy in force
    pub policy: &'a PolicyData,
    /// Restored wire-form envelope
    pub envelope: &'a Envelope,
    /// Actor scope the header was processed for
    pub actor: Option<&'a str>,
    /// Whether the transport is secure
    pub transport_secure: bool,
    /// Addressed service
    pub service: &'a ServiceIdentity,
}

/// Accepts or rejects verification results against a policy.
#[async_trait]
pub trait PolicyValidator: Send + Sync {
    /// Validates the results in the order the engine produced them.
    async fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        results: &SecurityResults,
    ) -> Result<(), PolicyViolation>;
}

/// Default validator for [`PolicyData`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyResultsValidator;

impl PolicyResultsValidator {
    /// Creates a validator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn check_timestamp(policy: &PolicyData, results: &SecurityResults) -> Result<(), PolicyViolation> {
        let count = results.count_of(ActionKind::Timestamp);
        if policy.include_timestamp && count == 0 {
            return Err(PolicyViolation::new(Requirement::Timestamp, "no timestamp in security header"));
        }
        if count > 1 {
            return Err(PolicyViolation::new(
                Requirement::Timestamp,
                format!("{count} timestamps in security header"),
            ));
        }
        Ok(())
    }

    fn check_layout(policy: &PolicyData, results: &SecurityResults) -> Result<(), PolicyViolation> {
        let Some((position, _)) = results.first_of(ActionKind::Timestamp) else {
            return Ok(());
        };
        match policy.layout {
            Layout::Strict | Layout::LaxTimestampFirst if position != 0 => Err(PolicyViolation::new(
                Requirement::Layout,
                format!("timestamp at position {position}, expected first"),
            )),
            Layout::LaxTimestampLast if position + 1 != results.len() => Err(PolicyViolation::new(
                Requirement::Layout,
                format!("timestamp at position {position}, expected last"),
            )),
            _ => Ok(()),
        }
    }

    fn check_parts(
        envelope: &Envelope,
        parts: &[MessagePart],
        results: &SecurityResults,
        requirement: Requirement,
    ) -> Result<(), PolicyViolation> {
        for part in parts {
            let name = match part {
                MessagePart::Body => envelope.version.body_name(),
                MessagePart::Header { name } => name.clone(),
            };
            if !covers(results, requirement, &name) {
                return Err(PolicyViolation::new(requirement, format!("{name} is not protected")));
            }
        }
        Ok(())
    }

    fn check_tokens(policy: &PolicyData, results: &SecurityResults) -> Result<(), PolicyViolation> {
        for token in &policy.required_tokens {
            let found = match token {
                TokenType::SamlAssertion => {
                    results.contains_action(ActionKind::SignedSecurityToken)
                        || results.contains_action(ActionKind::UnsignedSecurityToken)
                }
                TokenType::UsernameToken => results.contains_action(ActionKind::UsernameToken),
                TokenType::X509 => results.contains_action(ActionKind::BinarySecurityToken),
                TokenType::SecurityContextToken => results.contains_action(ActionKind::SecurityContextToken),
            };
            if !found {
                return Err(PolicyViolation::new(
                    Requirement::RequiredToken,
                    format!("no {token:?} token in security header"),
                ));
            }
        }
        Ok(())
    }
}

fn covers(results: &SecurityResults, requirement: Requirement, name: &QName) -> bool {
    results.iter().any(|result| match (requirement, result) {
        (Requirement::SignedParts, SecurityResult::Signature(sig)) => {
            sig.signed_refs.iter().any(|r| &r.name == name)
        }
        (Requirement::EncryptedParts, SecurityResult::Encryption(enc)) => {
            enc.data_refs.iter().any(|r| &r.name == name)
        }
        _ => false,
    })
}

#[async_trait]
impl PolicyValidator for PolicyResultsValidator {
    async fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        results: &SecurityResults,
    ) -> Result<(), PolicyViolation> {
        let policy = ctx.policy;
        Self::check_timestamp(policy, results)?;
        Self::check_layout(policy, results)?;

        if policy.binding == BindingKind::TransportOnly && !ctx.transport_secure {
            return Err(PolicyViolation::new(
                Requirement::SecureTransport,
                "transport binding requires a secure transport",
            ));
        }
        Self::check_parts(ctx.envelope, &policy.signed_parts, results, Requirement::SignedParts)?;
        Self::check_parts(ctx.envelope, &policy.encrypted_parts, results, Requirement::EncryptedParts)?;
        Self::check_tokens(policy, results)?;

        debug!(service = %ctx.service, results = results.len(), "Results satisfy policy");
        Ok(())
    }
}
