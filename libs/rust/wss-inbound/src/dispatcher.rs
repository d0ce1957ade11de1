//! Binding dispatch: which crypto providers and callback verify a message.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::callback::{PasswordCallback, TokenCallbackHandler};
use crate::crypto::{CryptoProvider, CryptoResolver, ProviderSet};
use crate::error::ProcessingError;
use crate::policy::{CryptoProviderRef, PolicyData, ProviderLayout};
use crate::token::TokenStore;

/// Providers and callback selected for one message.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// Providers handed to the engine
    pub providers: ProviderSet,
    /// Callback handed to the engine and the token synchronizer
    pub callback: Arc<TokenCallbackHandler>,
}

/// Selects crypto providers by binding kind.
#[derive(Clone)]
pub struct BindingDispatcher {
    crypto: Arc<dyn CryptoResolver>,
    password: Option<Arc<dyn PasswordCallback>>,
}

impl BindingDispatcher {
    /// Creates a dispatcher
    #[must_use]
    pub fn new(crypto: Arc<dyn CryptoResolver>, password: Option<Arc<dyn PasswordCallback>>) -> Self {
        Self { crypto, password }
    }

    /// Resolves the providers the policy's binding requires and builds the
    /// credential callback bound to `store`.
    ///
    /// Symmetric bindings get one shared provider. Every other binding gets
    /// distinct signature and encryption providers.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a required provider reference is
    /// absent or cannot be resolved.
    #[instrument(skip_all, fields(binding = policy.binding.as_str()))]
    pub fn dispatch(&self, policy: &PolicyData, store: Arc<dyn TokenStore>) -> Result<Dispatch, ProcessingError> {
        let providers = match policy.binding.provider_layout() {
            ProviderLayout::Shared => {
                ProviderSet::Shared(self.resolve("signature", policy.crypto.signature.as_ref())?)
            }
            ProviderLayout::Split => ProviderSet::Split {
                signature: self.resolve("signature", policy.crypto.signature.as_ref())?,
                encryption: self.resolve("encryption", policy.crypto.encryption.as_ref())?,
            },
        };
        debug!(providers = providers.len(), "Resolved crypto providers");

        let callback = Arc::new(TokenCallbackHandler::new(store, self.password.clone()));
        Ok(Dispatch {
            providers,
            callback,
        })
    }

    fn resolve(
        &self,
        role: &str,
        reference: Option<&CryptoProviderRef>,
    ) -> Result<Arc<dyn CryptoProvider>, ProcessingError> {
        let reference = reference.ok_or_else(|| {
            ProcessingError::configuration(format!("Policy declares no {role} crypto provider"))
        })?;
        self.crypto.resolve(reference).map_err(|e| {
            ProcessingError::configuration(format!(
                "Cannot resolve {role} crypto provider '{}': {e}",
                reference.name
            ))
        })
    }
}

impl fmt::Debug for BindingDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingDispatcher")
            .field("password_delegate", &self.password.is_some())
            .finish_non_exhaustive()
    }
}
