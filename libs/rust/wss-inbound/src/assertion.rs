//! Security assertions and their proof-of-possession keys.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::callback::{CallbackError, Credential, CredentialCallback, CredentialRequest, CredentialUsage};
use crate::crypto::{CryptoError, CryptoProvider};

/// A verified SAML assertion as reported by the security engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlAssertion {
    /// Assertion identifier
    pub id: String,
    /// Issuer name
    pub issuer: String,
    /// Start of validity
    pub not_before: Option<DateTime<Utc>>,
    /// End of validity (exclusive)
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Subject confirmation key, for holder-of-key assertions
    pub confirmation: Option<SubjectKey>,
    /// Serialized assertion element
    pub xml: String,
}

impl SamlAssertion {
    /// Creates a bearer assertion without validity bounds
    #[must_use]
    pub fn new(id: impl Into<String>, issuer: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            issuer: issuer.into(),
            not_before: None,
            not_on_or_after: None,
            confirmation: None,
            xml: xml.into(),
        }
    }

    /// Sets the validity window
    #[must_use]
    pub const fn with_validity(
        mut self,
        not_before: Option<DateTime<Utc>>,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> Self {
        self.not_before = not_before;
        self.not_on_or_after = not_on_or_after;
        self
    }

    /// Sets the subject confirmation key
    #[must_use]
    pub fn with_confirmation(mut self, key: SubjectKey) -> Self {
        self.confirmation = Some(key);
        self
    }
}

/// Key material confirming the assertion subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectKey {
    /// Symmetric key encrypted for the recipient's private key
    EncryptedKey {
        /// Alias of the recipient key in the crypto provider
        alias: String,
        /// Wrapped key bytes
        wrapped: Vec<u8>,
    },
    /// Reference to a token already held in the token store
    TokenReference {
        /// Referenced token identifier
        token_id: String,
    },
    /// Public key certificate; carries no secret
    Certificate {
        /// Certificate subject name
        subject: String,
    },
}

/// Assertion processing errors
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AssertionError {
    /// The assertion has no identifier
    #[error("Assertion has no identifier")]
    MissingId,

    /// The validity window is empty
    #[error("Assertion {id} has an empty validity window")]
    InvalidValidity {
        /// Assertion identifier
        id: String,
    },

    /// Credential lookup failed
    #[error("Credential lookup failed: {0}")]
    Callback(#[from] CallbackError),

    /// Key unwrap failed
    #[error("Key unwrap failed: {0}")]
    Crypto(#[from] CryptoError),

    /// The callback returned the wrong credential kind
    #[error("Unexpected credential kind for {usage:?}")]
    UnexpectedCredential {
        /// Requested usage
        usage: CredentialUsage,
    },
}

/// Proof-of-possession key derived from an assertion.
#[derive(Default)]
pub struct AssertionKeyInfo {
    secret: Option<Zeroizing<Vec<u8>>>,
}

impl AssertionKeyInfo {
    /// Derives the key of an assertion.
    ///
    /// Encrypted keys are unwrapped by `crypto` with the password the
    /// callback returns for the key alias. Token references resolve to the
    /// referenced token's secret. Bearer and certificate assertions have no
    /// secret.
    ///
    /// # Errors
    ///
    /// Fails when a credential cannot be resolved or the key cannot be
    /// unwrapped.
    pub async fn resolve(
        assertion: &SamlAssertion,
        crypto: &dyn CryptoProvider,
        callback: &dyn CredentialCallback,
    ) -> Result<Self, AssertionError> {
        let secret = match &assertion.confirmation {
            None | Some(SubjectKey::Certificate { .. }) => None,
            Some(SubjectKey::EncryptedKey { alias, wrapped }) => {
                let request = CredentialRequest::new(alias.clone(), CredentialUsage::Decryption);
                let Credential::Password(password) = callback.resolve(&request).await? else {
                    return Err(AssertionError::UnexpectedCredential {
                        usage: request.usage,
                    });
                };
                let key = crypto.unwrap_key(alias, wrapped, &password).await?;
                debug!(assertion_id = %assertion.id, provider = crypto.name(), "Unwrapped assertion key");
                Some(Zeroizing::new(key))
            }
            Some(SubjectKey::TokenReference { token_id }) => {
                let request =
                    CredentialRequest::new(token_id.clone(), CredentialUsage::SecurityContextToken);
                match callback.resolve(&request).await? {
                    Credential::Key(key) => Some(key),
                    Credential::Password(_) => {
                        return Err(AssertionError::UnexpectedCredential {
                            usage: request.usage,
                        });
                    }
                }
            }
        };
        Ok(Self { secret })
    }

    /// The derived secret, if any
    #[must_use]
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref().map(Vec::as_slice)
    }

    /// Consumes the key info, returning the secret
    #[must_use]
    pub fn into_secret(self) -> Option<Zeroizing<Vec<u8>>> {
        self.secret
    }
}

impl std::fmt::Debug for AssertionKeyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionKeyInfo")
            .field("has_secret", &self.secret.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};

    struct XorProvider;

    #[async_trait]
    impl CryptoProvider for XorProvider {
        fn name(&self) -> &str {
            "xor"
        }

        async fn unwrap_key(
            &self,
            alias: &str,
            wrapped: &[u8],
            password: &SecretString,
        ) -> Result<Vec<u8>, CryptoError> {
            if alias != "service" || password.expose_secret() != "changeit" {
                return Err(CryptoError::key_not_found(alias));
            }
            Ok(wrapped.iter().map(|b| b ^ 0xFF).collect())
        }
    }

    struct StaticCallback;

    #[async_trait]
    impl CredentialCallback for StaticCallback {
        async fn resolve(&self, request: &CredentialRequest) -> Result<Credential, CallbackError> {
            match (request.usage, request.identifier.as_str()) {
                (CredentialUsage::Decryption, "service") => {
                    Ok(Credential::Password(SecretString::from("changeit")))
                }
                (CredentialUsage::SecurityContextToken, "sct-1") => {
                    Ok(Credential::Key(Zeroizing::new(vec![9, 9])))
                }
                _ => Err(CallbackError::unresolved(request)),
            }
        }
    }

    #[tokio::test]
    async fn test_bearer_assertion_has_no_secret() {
        let assertion = SamlAssertion::new("a-1", "sts", "<Assertion/>");
        let info = AssertionKeyInfo::resolve(&assertion, &XorProvider, &StaticCallback)
            .await
            .unwrap();
        assert!(info.secret().is_none());
    }

    #[tokio::test]
    async fn test_encrypted_key_unwrapped_with_callback_password() {
        let assertion = SamlAssertion::new("a-1", "sts", "<Assertion/>").with_confirmation(
            SubjectKey::EncryptedKey {
                alias: "service".into(),
                wrapped: vec![0x00, 0x0F],
            },
        );
        let info = AssertionKeyInfo::resolve(&assertion, &XorProvider, &StaticCallback)
            .await
            .unwrap();
        assert_eq!(info.secret(), Some(&[0xFF, 0xF0][..]));
    }

    #[tokio::test]
    async fn test_token_reference_resolved_through_callback() {
        let assertion = SamlAssertion::new("a-1", "sts", "<Assertion/>").with_confirmation(
            SubjectKey::TokenReference {
                token_id: "sct-1".into(),
            },
        );
        let info = AssertionKeyInfo::resolve(&assertion, &XorProvider, &StaticCallback)
            .await
            .unwrap();
        assert_eq!(info.into_secret().as_deref().map(Vec::as_slice), Some(&[9u8, 9][..]));
    }

    #[tokio::test]
    async fn test_unknown_alias_fails() {
        let assertion = SamlAssertion::new("a-1", "sts", "<Assertion/>").with_confirmation(
            SubjectKey::EncryptedKey {
                alias: "other".into(),
                wrapped: vec![1],
            },
        );
        let result = AssertionKeyInfo::resolve(&assertion, &XorProvider, &StaticCallback).await;
        assert!(matches!(result, Err(AssertionError::Callback(_))));
    }

    #[tokio::test]
    async fn test_certificate_confirmation_has_no_secret() {
        let assertion = SamlAssertion::new("a-1", "sts", "<Assertion/>").with_confirmation(
            SubjectKey::Certificate {
                subject: "CN=client".into(),
            },
        );
        let info = AssertionKeyInfo::resolve(&assertion, &XorProvider, &StaticCallback)
            .await
            .unwrap();
        assert!(info.secret().is_none());
        assert_eq!(format!("{info:?}"), "AssertionKeyInfo { has_secret: false }");
    }
}
