//! Credential resolution callbacks.
//!
//! The security engine asks for passwords and keys through a
//! [`CredentialCallback`]. [`TokenCallbackHandler`] answers key requests from
//! the token store of the security context and delegates everything else to
//! the application's [`PasswordCallback`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::token::TokenStore;

/// Why the engine needs a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialUsage {
    /// Private key password for decryption
    Decryption,
    /// Private key password for signing
    Signature,
    /// Password of a username token
    UsernameToken,
    /// Raw secret key referenced by identifier
    SecretKey,
    /// Secret of a secure-conversation context token
    SecurityContextToken,
    /// Secret of an encrypted key token
    EncryptedKeyToken,
    /// Secret of a custom token (e.g. a SAML holder-of-key assertion)
    CustomToken,
}

impl CredentialUsage {
    /// Whether the credential is a key held in the token store
    #[must_use]
    pub const fn is_token_key(&self) -> bool {
        matches!(
            self,
            Self::SecretKey | Self::SecurityContextToken | Self::EncryptedKeyToken | Self::CustomToken
        )
    }
}

/// A credential request from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    /// Key alias, user name or token identifier
    pub identifier: String,
    /// Requested usage
    pub usage: CredentialUsage,
}

impl CredentialRequest {
    /// Creates a request
    #[must_use]
    pub fn new(identifier: impl Into<String>, usage: CredentialUsage) -> Self {
        Self {
            identifier: identifier.into(),
            usage,
        }
    }
}

/// A resolved credential.
pub enum Credential {
    /// A password
    Password(SecretString),
    /// Raw key material
    Key(Zeroizing<Vec<u8>>),
}

impl Credential {
    /// The password, if this is one
    #[must_use]
    pub const fn password(&self) -> Option<&SecretString> {
        match self {
            Self::Password(p) => Some(p),
            Self::Key(_) => None,
        }
    }

    /// The key bytes, if this is a key
    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            Self::Key(k) => Some(k.as_slice()),
            Self::Password(_) => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password([REDACTED])"),
            Self::Key(_) => f.write_str("Key([REDACTED])"),
        }
    }
}

/// Callback errors
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CallbackError {
    /// Nobody could supply the credential
    #[error("No credential available for {identifier} ({usage:?})")]
    Unresolved {
        /// Requested identifier
        identifier: String,
        /// Requested usage
        usage: CredentialUsage,
    },

    /// The application delegate failed
    #[error("Password callback failed: {reason}")]
    Delegate {
        /// Reason for failure
        reason: String,
    },
}

impl CallbackError {
    /// Creates an Unresolved error for a request
    #[must_use]
    pub fn unresolved(request: &CredentialRequest) -> Self {
        Self::Unresolved {
            identifier: request.identifier.clone(),
            usage: request.usage,
        }
    }
}

/// Application-supplied password source.
#[async_trait]
pub trait PasswordCallback: Send + Sync {
    /// Returns the password for the request, or `None` when unknown.
    async fn password(&self, request: &CredentialRequest) -> Result<Option<SecretString>, CallbackError>;
}

/// Credential source handed to the security engine.
#[async_trait]
pub trait CredentialCallback: Send + Sync {
    /// Resolves a credential.
    async fn resolve(&self, request: &CredentialRequest) -> Result<Credential, CallbackError>;
}

/// Callback bound to a token store and an optional password delegate.
#[derive(Clone)]
pub struct TokenCallbackHandler {
    store: Arc<dyn TokenStore>,
    password: Option<Arc<dyn PasswordCallback>>,
}

impl TokenCallbackHandler {
    /// Creates a handler
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, password: Option<Arc<dyn PasswordCallback>>) -> Self {
        Self { store, password }
    }

    /// Whether a password delegate is configured
    #[must_use]
    pub const fn has_password_delegate(&self) -> bool {
        self.password.is_some()
    }

    async fn from_store(&self, request: &CredentialRequest) -> Result<Option<Credential>, CallbackError> {
        let token = self
            .store
            .get(&request.identifier)
            .await
            .map_err(|e| CallbackError::Delegate {
                reason: format!("Token store lookup failed: {e}"),
            })?;
        Ok(token
            .and_then(|t| t.secret().map(<[u8]>::to_vec))
            .map(|secret| Credential::Key(Zeroizing::new(secret))))
    }
}

#[async_trait]
impl CredentialCallback for TokenCallbackHandler {
    #[instrument(skip(self), fields(identifier = %request.identifier, usage = ?request.usage))]
    async fn resolve(&self, request: &CredentialRequest) -> Result<Credential, CallbackError> {
        if request.usage.is_token_key() {
            if let Some(credential) = self.from_store(request).await? {
                debug!("Credential resolved from token store");
                return Ok(credential);
            }
        }

        let Some(delegate) = &self.password else {
            return Err(CallbackError::unresolved(request));
        };
        delegate
            .password(request)
            .await?
            .map(Credential::Password)
            .ok_or_else(|| CallbackError::unresolved(request))
    }
}

impl fmt::Debug for TokenCallbackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCallbackHandler")
            .field("password_delegate", &self.password.is_some())
            .finish_non_exhaustive()
    }
}
