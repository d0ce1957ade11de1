//! Crypto provider handles.
//!
//! Providers are opaque to the pipeline: it resolves them from policy
//! references and routes them to the security engine. The only operation the
//! pipeline itself needs is unwrapping an assertion's proof-of-possession key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use crate::error::sanitize_message;
use crate::policy::CryptoProviderRef;

/// Crypto provider errors
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CryptoError {
    /// No key under the given alias
    #[error("Key not found: {alias}")]
    KeyNotFound {
        /// Key alias
        alias: String,
    },

    /// A wrapped key could not be unwrapped
    #[error("Key unwrap failed: {reason}")]
    UnwrapFailed {
        /// Reason for failure (sanitized)
        reason: String,
    },

    /// The provider reference does not name a usable provider
    #[error("Invalid crypto configuration: {reason}")]
    InvalidConfig {
        /// Reason for invalid configuration
        reason: String,
    },

    /// Backing keystore or HSM is unavailable
    #[error("Crypto provider unavailable: {reason}")]
    Unavailable {
        /// Reason for unavailability
        reason: String,
    },
}

impl CryptoError {
    /// Creates a KeyNotFound error
    #[must_use]
    pub fn key_not_found(alias: impl Into<String>) -> Self {
        Self::KeyNotFound {
            alias: alias.into(),
        }
    }

    /// Creates an UnwrapFailed error
    #[must_use]
    pub fn unwrap_failed(reason: impl Into<String>) -> Self {
        Self::UnwrapFailed {
            reason: sanitize_message(&reason.into()),
        }
    }

    /// Creates an InvalidConfig error
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: sanitize_message(&reason.into()),
        }
    }

    /// Creates an Unavailable error
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: sanitize_message(&reason.into()),
        }
    }
}

/// A configured crypto provider (keystore, HSM, ...).
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Logical provider name
    fn name(&self) -> &str;

    /// Unwraps a key encrypted for the private key under `alias`.
    async fn unwrap_key(
        &self,
        alias: &str,
        wrapped: &[u8],
        password: &SecretString,
    ) -> Result<Vec<u8>, CryptoError>;
}

/// Resolves policy crypto references into providers.
pub trait CryptoResolver: Send + Sync {
    /// Resolve the provider a reference points to.
    fn resolve(&self, reference: &CryptoProviderRef) -> Result<Arc<dyn CryptoProvider>, CryptoError>;
}

/// Resolver over providers registered by name.
#[derive(Default, Clone)]
pub struct CryptoRegistry {
    providers: HashMap<String, Arc<dyn CryptoProvider>>,
}

impl CryptoRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own name
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl CryptoResolver for CryptoRegistry {
    fn resolve(&self, reference: &CryptoProviderRef) -> Result<Arc<dyn CryptoProvider>, CryptoError> {
        self.providers.get(&reference.name).cloned().ok_or_else(|| {
            CryptoError::invalid_config(format!("No crypto provider named '{}'", reference.name))
        })
    }
}

impl fmt::Debug for CryptoRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("CryptoRegistry").field("providers", &names).finish()
    }
}

/// Providers handed to the security engine for one message.
#[derive(Clone)]
pub enum ProviderSet {
    /// One provider for signature and encryption (symmetric binding)
    Shared(Arc<dyn CryptoProvider>),
    /// Distinct providers
    Split {
        /// Signature provider
        signature: Arc<dyn CryptoProvider>,
        /// Encryption provider
        encryption: Arc<dyn CryptoProvider>,
    },
}

impl ProviderSet {
    /// Number of providers passed to the engine
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Shared(_) => 1,
            Self::Split { .. } => 2,
        }
    }

    /// Always false; a set holds at least one provider
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The signature-capable provider
    #[must_use]
    pub fn signature(&self) -> &Arc<dyn CryptoProvider> {
        match self {
            Self::Shared(provider) => provider,
            Self::Split { signature, .. } => signature,
        }
    }

    /// The provider used for decryption
    #[must_use]
    pub fn encryption(&self) -> &Arc<dyn CryptoProvider> {
        match self {
            Self::Shared(provider) => provider,
            Self::Split { encryption, .. } => encryption,
        }
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared(p) => f.debug_tuple("Shared").field(&p.name()).finish(),
            Self::Split {
                signature,
                encryption,
            } => f
                .debug_struct("Split")
                .field("signature", &signature.name())
                .field("encryption", &encryption.name())
                .finish(),
        }
    }
}
