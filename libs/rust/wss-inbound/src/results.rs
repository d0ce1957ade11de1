//! Ordered verification results.
//!
//! The engine reports one [`SecurityResult`] per processed header element, in
//! processing order. [`SecurityResults`] keeps that order; it offers queries
//! but no operation that sorts, filters or removes entries.

use std::ops::Index;

use chrono::{DateTime, Utc};

use crate::assertion::SamlAssertion;
use crate::message::QName;

/// Kind of security action a result reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Timestamp verified
    Timestamp,
    /// Signature verified
    Signature,
    /// Encrypted content decrypted
    Encryption,
    /// Username token verified
    UsernameToken,
    /// Signed security assertion verified
    SignedSecurityToken,
    /// Unsigned security assertion verified
    UnsignedSecurityToken,
    /// Signature confirmation verified
    SignatureConfirmation,
    /// Binary security token (e.g. X.509) processed
    BinarySecurityToken,
    /// Derived key token processed
    DerivedKeyToken,
    /// Security context token processed
    SecurityContextToken,
}

impl ActionKind {
    /// Stable name for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Signature => "signature",
            Self::Encryption => "encryption",
            Self::UsernameToken => "username_token",
            Self::SignedSecurityToken => "signed_security_token",
            Self::UnsignedSecurityToken => "unsigned_security_token",
            Self::SignatureConfirmation => "signature_confirmation",
            Self::BinarySecurityToken => "binary_security_token",
            Self::DerivedKeyToken => "derived_key_token",
            Self::SecurityContextToken => "security_context_token",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a protected element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    /// `wsu:Id` of the element, if it had one
    pub id: Option<String>,
    /// Element name
    pub name: QName,
}

impl ElementRef {
    /// Creates a reference by name
    #[must_use]
    pub const fn new(name: QName) -> Self {
        Self { id: None, name }
    }

    /// Sets the `wsu:Id`
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Verified timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampInfo {
    /// Creation time
    pub created: DateTime<Utc>,
    /// Expiry time
    pub expires: Option<DateTime<Utc>>,
}

/// Verified signature
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureInfo {
    /// Signer, as reported by the engine
    pub principal: Option<String>,
    /// Signed elements
    pub signed_refs: Vec<ElementRef>,
}

/// Decrypted content
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptionInfo {
    /// Decrypted elements
    pub data_refs: Vec<ElementRef>,
}

/// Verified username token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameInfo {
    /// User name
    pub username: String,
}

/// Processed token referenced by identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Token identifier
    pub id: String,
}

/// One outcome of verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityResult {
    /// Timestamp verified
    Timestamp(TimestampInfo),
    /// Signature verified
    Signature(SignatureInfo),
    /// Content decrypted
    Encryption(EncryptionInfo),
    /// Username token verified
    UsernameToken(UsernameInfo),
    /// Signed assertion verified
    SignedSecurityToken(SamlAssertion),
    /// Unsigned assertion verified
    UnsignedSecurityToken(SamlAssertion),
    /// Signature confirmation value
    SignatureConfirmation(Option<String>),
    /// Binary security token processed
    BinarySecurityToken(TokenInfo),
    /// Derived key token processed
    DerivedKeyToken(TokenInfo),
    /// Security context token processed
    SecurityContextToken(TokenInfo),
}

impl SecurityResult {
    /// Action kind of this result
    #[must_use]
    pub const fn action(&self) -> ActionKind {
        match self {
            Self::Timestamp(_) => ActionKind::Timestamp,
            Self::Signature(_) => ActionKind::Signature,
            Self::Encryption(_) => ActionKind::Encryption,
            Self::UsernameToken(_) => ActionKind::UsernameToken,
            Self::SignedSecurityToken(_) => ActionKind::SignedSecurityToken,
            Self::UnsignedSecurityToken(_) => ActionKind::UnsignedSecurityToken,
            Self::SignatureConfirmation(_) => ActionKind::SignatureConfirmation,
            Self::BinarySecurityToken(_) => ActionKind::BinarySecurityToken,
            Self::DerivedKeyToken(_) => ActionKind::DerivedKeyToken,
            Self::SecurityContextToken(_) => ActionKind::SecurityContextToken,
        }
    }
}

/// Ordered verification results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityResults(Vec<SecurityResult>);

impl SecurityResults {
    /// Creates an empty sequence
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a result
    pub fn push(&mut self, result: SecurityResult) {
        self.0.push(result);
    }

    /// Number of results
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no results
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Result at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SecurityResult> {
        self.0.get(index)
    }

    /// Results in processing order
    pub fn iter(&self) -> std::slice::Iter<'_, SecurityResult> {
        self.0.iter()
    }

    /// Results as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[SecurityResult] {
        &self.0
    }

    /// Action kinds in processing order
    #[must_use]
    pub fn actions(&self) -> Vec<ActionKind> {
        self.0.iter().map(SecurityResult::action).collect()
    }

    /// First result of a kind, with its position
    #[must_use]
    pub fn first_of(&self, kind: ActionKind) -> Option<(usize, &SecurityResult)> {
        self.0.iter().enumerate().find(|(_, r)| r.action() == kind)
    }

    /// Number of results of a kind
    #[must_use]
    pub fn count_of(&self, kind: ActionKind) -> usize {
        self.0.iter().filter(|r| r.action() == kind).count()
    }

    /// Whether any result has the given kind
    #[must_use]
    pub fn contains_action(&self, kind: ActionKind) -> bool {
        self.0.iter().any(|r| r.action() == kind)
    }

    /// Assertions of unsigned security-token results, in order
    pub fn unsigned_assertions(&self) -> impl Iterator<Item = &SamlAssertion> {
        self.0.iter().filter_map(|r| match r {
            SecurityResult::UnsignedSecurityToken(assertion) => Some(assertion),
            _ => None,
        })
    }

    /// Consumes the sequence
    #[must_use]
    pub fn into_vec(self) -> Vec<SecurityResult> {
        self.0
    }
}

impl From<Vec<SecurityResult>> for SecurityResults {
    fn from(results: Vec<SecurityResult>) -> Self {
        Self(results)
    }
}

impl FromIterator<SecurityResult> for SecurityResults {
    fn from_iter<I: IntoIterator<Item = SecurityResult>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Index<usize> for SecurityResults {
    type Output = SecurityResult;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a SecurityResults {
    type Item = &'a SecurityResult;
    type IntoIter = std::slice::Iter<'a, SecurityResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for SecurityResults {
    type Item = SecurityResult;
    type IntoIter = std::vec::IntoIter<SecurityResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
