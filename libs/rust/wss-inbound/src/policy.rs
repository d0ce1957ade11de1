//! Resolved security policy and policy resolution.
//!
//! [`PolicyData`] is produced outside this crate (by a policy language
//! front-end) and is read-only here. [`StaticPolicyResolver`] serves
//! pre-resolved policies keyed by service and operation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProcessingError;
use crate::message::{MessageContext, QName};

/// Trust model securing the message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Shared secret used for signing and encryption
    Symmetric,
    /// Key pairs on each side
    Asymmetric,
    /// Security provided by the transport
    TransportOnly,
}

/// How many crypto providers a binding hands to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderLayout {
    /// One provider serves signature and encryption
    Shared,
    /// Distinct signature and encryption providers
    Split,
}

impl BindingKind {
    /// Provider layout used when verifying under this binding
    #[must_use]
    pub const fn provider_layout(&self) -> ProviderLayout {
        match self {
            Self::Symmetric => ProviderLayout::Shared,
            Self::Asymmetric | Self::TransportOnly => ProviderLayout::Split,
        }
    }

    /// Name used in logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Symmetric => "symmetric",
            Self::Asymmetric => "asymmetric",
            Self::TransportOnly => "transport",
        }
    }
}

/// Opaque reference to a configured crypto provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoProviderRef {
    /// Logical name, unique per deployment
    pub name: String,
    /// Provider implementation identifier
    pub provider: String,
    /// Provider-specific settings, never interpreted here
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl CryptoProviderRef {
    /// Creates a reference without properties
    #[must_use]
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            properties: HashMap::new(),
        }
    }

    /// Adds a provider property
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Crypto provider references declared by the policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Provider used for signatures (and everything under symmetric binding)
    #[serde(default)]
    pub signature: Option<CryptoProviderRef>,
    /// Provider used for decryption under non-symmetric bindings
    #[serde(default)]
    pub encryption: Option<CryptoProviderRef>,
}

/// Token types a policy can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// SAML assertion
    SamlAssertion,
    /// Username token
    UsernameToken,
    /// X.509 certificate token
    X509,
    /// WS-SecureConversation context token
    SecurityContextToken,
}

/// Security header layout rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Declare-before-use, timestamp first
    Strict,
    /// Any order
    #[default]
    Lax,
    /// Any order, timestamp first
    LaxTimestampFirst,
    /// Any order, timestamp last
    LaxTimestampLast,
}

/// Part of the message that must be signed or encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "part", rename_all = "snake_case")]
pub enum MessagePart {
    /// The SOAP body
    Body,
    /// A header block with the given name
    Header {
        /// Header block name
        name: QName,
    },
}

/// Resolved security requirements for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyData {
    /// Binding kind
    pub binding: BindingKind,
    /// Header layout rule
    #[serde(default)]
    pub layout: Layout,
    /// Whether a timestamp is required
    #[serde(default)]
    pub include_timestamp: bool,
    /// Token types that must be present
    #[serde(default)]
    pub required_tokens: Vec<TokenType>,
    /// Parts that must be signed
    #[serde(default)]
    pub signed_parts: Vec<MessagePart>,
    /// Parts that must be encrypted
    #[serde(default)]
    pub encrypted_parts: Vec<MessagePart>,
    /// Crypto provider references
    #[serde(default)]
    pub crypto: CryptoConfig,
}

impl PolicyData {
    /// Creates a policy with only a binding set
    #[must_use]
    pub fn new(binding: BindingKind) -> Self {
        Self {
            binding,
            layout: Layout::default(),
            include_timestamp: false,
            required_tokens: Vec::new(),
            signed_parts: Vec::new(),
            encrypted_parts: Vec::new(),
            crypto: CryptoConfig::default(),
        }
    }

    /// Sets the signature provider reference
    #[must_use]
    pub fn with_signature_crypto(mut self, crypto: CryptoProviderRef) -> Self {
        self.crypto.signature = Some(crypto);
        self
    }

    /// Sets the encryption provider reference
    #[must_use]
    pub fn with_encryption_crypto(mut self, crypto: CryptoProviderRef) -> Self {
        self.crypto.encryption = Some(crypto);
        self
    }

    /// Sets the layout
    #[must_use]
    pub const fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Requires a timestamp
    #[must_use]
    pub const fn with_timestamp(mut self) -> Self {
        self.include_timestamp = true;
        self
    }

    /// Requires a token type
    #[must_use]
    pub fn require_token(mut self, token: TokenType) -> Self {
        self.required_tokens.push(token);
        self
    }

    /// Requires a part to be signed
    #[must_use]
    pub fn sign_part(mut self, part: MessagePart) -> Self {
        self.signed_parts.push(part);
        self
    }

    /// Requires a part to be encrypted
    #[must_use]
    pub fn encrypt_part(mut self, part: MessagePart) -> Self {
        self.encrypted_parts.push(part);
        self
    }
}

/// Resolves the policy that applies to a message.
#[async_trait]
pub trait PolicyResolver: Send + Sync {
    /// Returns `None` when no policy applies to the message.
    async fn resolve(&self, ctx: &MessageContext) -> Result<Option<Arc<PolicyData>>, ProcessingError>;
}

/// Policy resolver backed by a fixed table.
///
/// Keys are either `service` or `service.operation`; an operation entry
/// takes precedence over the service-wide one.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyResolver {
    policies: HashMap<String, Arc<PolicyData>>,
}

impl StaticPolicyResolver {
    /// Creates an empty resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a policy under a key
    #[must_use]
    pub fn with_policy(mut self, key: impl Into<String>, policy: PolicyData) -> Self {
        self.policies.insert(key.into(), Arc::new(policy));
        self
    }

    /// Loads a resolver from a JSON object mapping keys to policies.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the document is not a valid
    /// policy table.
    pub fn from_json(json: &str) -> Result<Self, ProcessingError> {
        let table: HashMap<String, PolicyData> = serde_json::from_str(json)
            .map_err(|e| ProcessingError::configuration(format!("Invalid policy table: {e}")))?;
        Ok(Self {
            policies: table.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
        })
    }

    /// Loads a resolver from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProcessingError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProcessingError::configuration(format!("Cannot read policy file {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Number of registered policies
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no policy is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    fn lookup(&self, service: &str, operation: Option<&str>) -> Option<Arc<PolicyData>> {
        operation
            .and_then(|op| self.policies.get(&format!("{service}.{op}")))
            .or_else(|| self.policies.get(service))
            .cloned()
    }
}

#[async_trait]
impl PolicyResolver for StaticPolicyResolver {
    async fn resolve(&self, ctx: &MessageContext) -> Result<Option<Arc<PolicyData>>, ProcessingError> {
        let identity = ctx.service();
        let policy = self.lookup(&identity.service, identity.operation.as_deref());
        debug!(service = %identity, found = policy.is_some(), "Resolved policy");
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Envelope, ServiceIdentity, SoapVersion};
    use crate::token::InMemoryTokenStore;

    fn ctx(identity: ServiceIdentity) -> MessageContext {
        MessageContext::new(
            Envelope::new(SoapVersion::Soap11),
            identity,
            Arc::new(InMemoryTokenStore::new()),
        )
    }

    #[test]
    fn test_provider_layout_per_binding() {
        assert_eq!(BindingKind::Symmetric.provider_layout(), ProviderLayout::Shared);
        assert_eq!(BindingKind::Asymmetric.provider_layout(), ProviderLayout::Split);
        assert_eq!(BindingKind::TransportOnly.provider_layout(), ProviderLayout::Split);
    }

    #[test]
    fn test_policy_json_defaults() {
        let policy: PolicyData = serde_json::from_str(r#"{"binding":"asymmetric"}"#).unwrap();
        assert_eq!(policy, PolicyData::new(BindingKind::Asymmetric));
    }

    #[test]
    fn test_policy_json_full() {
        let json = r#"{
            "binding": "symmetric",
            "layout": "lax_timestamp_first",
            "include_timestamp": true,
            "required_tokens": ["saml_assertion"],
            "signed_parts": [{"part": "body"}],
            "crypto": {"signature": {"name": "sts", "provider": "pkcs12"}}
        }"#;
        let policy: PolicyData = serde_json::from_str(json).unwrap();
        assert_eq!(policy.layout, Layout::LaxTimestampFirst);
        assert_eq!(policy.required_tokens, vec![TokenType::SamlAssertion]);
        assert_eq!(policy.signed_parts, vec![MessagePart::Body]);
        assert_eq!(policy.crypto.signature.unwrap().name, "sts");
        assert!(policy.crypto.encryption.is_none());
    }

    #[tokio::test]
    async fn test_static_resolver_prefers_operation_entry() {
        let resolver = StaticPolicyResolver::new()
            .with_policy("Echo", PolicyData::new(BindingKind::Asymmetric))
            .with_policy("Echo.ping", PolicyData::new(BindingKind::Symmetric));

        let op = resolver
            .resolve(&ctx(ServiceIdentity::operation("Echo", "ping")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(op.binding, BindingKind::Symmetric);

        let svc = resolver
            .resolve(&ctx(ServiceIdentity::operation("Echo", "other")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(svc.binding, BindingKind::Asymmetric);
    }

    #[tokio::test]
    async fn test_static_resolver_unknown_service() {
        let resolver = StaticPolicyResolver::new();
        let policy = resolver
            .resolve(&ctx(ServiceIdentity::service("Unknown")))
            .await
            .unwrap();
        assert!(policy.is_none());
    }

    #[test]
    fn test_from_json_invalid() {
        let result = StaticPolicyResolver::from_json("{\"Echo\": {\"binding\": \"quantum\"}}");
        assert!(matches!(result, Err(ProcessingError::Configuration { .. })));
    }

    #[test]
    fn test_from_json_file_missing() {
        let result = StaticPolicyResolver::from_json_file("/nonexistent/policies.json");
        assert!(matches!(result, Err(ProcessingError::Configuration { .. })));
    }
}
