//! Test fixtures with sample data.
//!
//! Envelopes, policies and verification results shared by the integration
//! tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use wss_inbound::{
    BindingKind, CryptoProviderRef, Element, ElementRef, Envelope, MessageContext, MessagePart, PolicyData, QName,
    SamlAssertion, SecurityResult, ServiceIdentity, SignatureInfo, SoapVersion, SubjectKey, TimestampInfo, TokenStore,
    message::{WSSE_LN, WSSE_NS, WSU_NS},
};

/// Service name the fixture policies are registered under
pub const SERVICE: &str = "Echo";

/// Name of the signature crypto provider
pub const SIGNATURE_PROVIDER: &str = "sig";

/// Name of the encryption crypto provider
pub const ENCRYPTION_PROVIDER: &str = "enc";

/// Key alias the mock crypto provider knows
pub const SERVICE_KEY_ALIAS: &str = "service";

/// Password of [`SERVICE_KEY_ALIAS`]
pub const SERVICE_KEY_PASSWORD: &str = "changeit";

/// Body payload element of the fixture envelopes.
#[must_use]
pub fn ping() -> Element {
    Element::new(QName::new("urn:echo", "ping")).with_text("hello")
}

/// An empty `wsse:Security` header block.
#[must_use]
pub fn security_header() -> Element {
    Element::new(QName::new(WSSE_NS, WSSE_LN))
}

/// A `wsse:Security` header block addressed to `actor`.
#[must_use]
pub fn security_header_for(version: SoapVersion, actor: &str) -> Element {
    security_header().with_attribute(version.actor_attribute(), actor)
}

/// Envelope with a security header and a ping body.
#[must_use]
pub fn secured_envelope(version: SoapVersion) -> Envelope {
    Envelope::new(version)
        .with_header_block(
            security_header().with_child(
                Element::new(QName::new(WSU_NS, "Timestamp")).with_attribute(QName::new(WSU_NS, "Id"), "ts-1"),
            ),
        )
        .with_body_element(ping())
}

/// Envelope with a ping body and no security header.
#[must_use]
pub fn unsecured_envelope(version: SoapVersion) -> Envelope {
    Envelope::new(version).with_body_element(ping())
}

/// Envelope whose body is a SOAP fault.
#[must_use]
pub fn fault_envelope(version: SoapVersion) -> Envelope {
    Envelope::new(version).with_body_element(
        Element::new(version.fault_name()).with_child(Element::new(QName::new("", "faultstring")).with_text("boom")),
    )
}

/// Message context for [`SERVICE`].
#[must_use]
pub fn message_context(envelope: Envelope, store: Arc<dyn TokenStore>) -> MessageContext {
    MessageContext::new(envelope, ServiceIdentity::service(SERVICE), store)
}

/// Reference to the signature provider.
#[must_use]
pub fn signature_ref() -> CryptoProviderRef {
    CryptoProviderRef::new(SIGNATURE_PROVIDER, "mock").with_property("alias", SERVICE_KEY_ALIAS)
}

/// Reference to the encryption provider.
#[must_use]
pub fn encryption_ref() -> CryptoProviderRef {
    CryptoProviderRef::new(ENCRYPTION_PROVIDER, "mock")
}

/// Policy of `binding` with both provider references declared.
#[must_use]
pub fn policy(binding: BindingKind) -> PolicyData {
    PolicyData::new(binding)
        .with_signature_crypto(signature_ref())
        .with_encryption_crypto(encryption_ref())
}

/// Symmetric policy with both provider references declared.
#[must_use]
pub fn symmetric_policy() -> PolicyData {
    policy(BindingKind::Symmetric)
}

/// Asymmetric policy with both provider references declared.
#[must_use]
pub fn asymmetric_policy() -> PolicyData {
    policy(BindingKind::Asymmetric)
}

/// Symmetric policy requiring a signed body.
#[must_use]
pub fn signed_body_policy() -> PolicyData {
    symmetric_policy().sign_part(MessagePart::Body)
}

/// Bearer assertion valid for an hour.
#[must_use]
pub fn assertion(id: &str) -> SamlAssertion {
    let now = Utc::now();
    SamlAssertion::new(id, "https://sts.example.com", format!("<saml:Assertion ID=\"{id}\"/>"))
        .with_validity(Some(now - Duration::minutes(1)), Some(now + Duration::hours(1)))
}

/// Holder-of-key assertion whose key is wrapped for [`SERVICE_KEY_ALIAS`].
#[must_use]
pub fn holder_of_key_assertion(id: &str, wrapped: Vec<u8>) -> SamlAssertion {
    assertion(id).with_confirmation(SubjectKey::EncryptedKey {
        alias: SERVICE_KEY_ALIAS.to_string(),
        wrapped,
    })
}

/// Unsigned security-token result for a bearer assertion.
#[must_use]
pub fn unsigned_token(id: &str) -> SecurityResult {
    SecurityResult::UnsignedSecurityToken(assertion(id))
}

/// Timestamp result.
#[must_use]
pub fn timestamp() -> SecurityResult {
    let now = Utc::now();
    SecurityResult::Timestamp(TimestampInfo {
        created: now,
        expires: Some(now + Duration::minutes(5)),
    })
}

/// Signature result covering the body of `version`.
#[must_use]
pub fn body_signature(version: SoapVersion) -> SecurityResult {
    SecurityResult::Signature(SignatureInfo {
        principal: Some("CN=client".to_string()),
        signed_refs: vec![ElementRef::new(version.body_name()).with_id("body-1")],
    })
}
