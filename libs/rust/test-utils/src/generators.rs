//! Shared proptest generators.
//!
//! Verification result sequences, token identifiers and bindings for the
//! property tests of the inbound pipeline.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use wss_inbound::{
    BindingKind, ElementRef, EncryptionInfo, QName, SamlAssertion, SecurityResult, SecurityResults, SignatureInfo,
    TimestampInfo, TokenInfo, UsernameInfo,
};

/// Generate token identifiers in the `_<hex>` form SAML assertions use.
pub fn token_id_strategy() -> impl Strategy<Value = String> {
    "[a-f0-9]{8,16}".prop_map(|hex| format!("_{hex}"))
}

/// Generate binding kinds.
pub fn binding_strategy() -> impl Strategy<Value = BindingKind> {
    prop_oneof![
        Just(BindingKind::Symmetric),
        Just(BindingKind::Asymmetric),
        Just(BindingKind::TransportOnly),
    ]
}

/// Generate element references.
pub fn element_ref_strategy() -> impl Strategy<Value = ElementRef> {
    ("[a-z]{3,10}", "[a-z0-9]{4,8}")
        .prop_map(|(local, id)| ElementRef::new(QName::new("urn:example", local)).with_id(id))
}

/// Generate a bearer assertion with the given identifier.
pub fn assertion_strategy(id: impl Strategy<Value = String>) -> impl Strategy<Value = SamlAssertion> {
    (id, 0i64..86_400).prop_map(|(id, offset)| {
        let start = Utc.timestamp_opt(1_700_000_000 + offset, 0).single().unwrap_or_default();
        SamlAssertion::new(id.clone(), "https://sts.example.com", format!("<saml:Assertion ID=\"{id}\"/>"))
            .with_validity(Some(start), Some(start + Duration::hours(8)))
    })
}

/// Generate a single result of any kind.
pub fn security_result_strategy() -> impl Strategy<Value = SecurityResult> {
    prop_oneof![
        (0i64..1_000).prop_map(|offset| {
            let created = Utc.timestamp_opt(1_700_000_000 + offset, 0).single().unwrap_or_default();
            SecurityResult::Timestamp(TimestampInfo {
                created,
                expires: Some(created + Duration::minutes(5)),
            })
        }),
        prop::collection::vec(element_ref_strategy(), 0..4).prop_map(|signed_refs| {
            SecurityResult::Signature(SignatureInfo {
                principal: Some("CN=client".to_string()),
                signed_refs,
            })
        }),
        prop::collection::vec(element_ref_strategy(), 0..4)
            .prop_map(|data_refs| SecurityResult::Encryption(EncryptionInfo { data_refs })),
        "[a-z]{3,12}".prop_map(|username| SecurityResult::UsernameToken(UsernameInfo { username })),
        assertion_strategy(token_id_strategy()).prop_map(SecurityResult::SignedSecurityToken),
        assertion_strategy(token_id_strategy()).prop_map(SecurityResult::UnsignedSecurityToken),
        token_id_strategy().prop_map(|id| SecurityResult::BinarySecurityToken(TokenInfo { id })),
        token_id_strategy().prop_map(|id| SecurityResult::DerivedKeyToken(TokenInfo { id })),
    ]
}

/// Generate ordered result sequences of up to `max_len` results.
pub fn security_results_strategy(max_len: usize) -> impl Strategy<Value = SecurityResults> {
    prop::collection::vec(security_result_strategy(), 0..=max_len).prop_map(SecurityResults::from)
}

/// Generate sequences of unsigned token results drawn from a small id pool,
/// so identifiers repeat.
pub fn repeating_unsigned_tokens_strategy(max_len: usize) -> impl Strategy<Value = SecurityResults> {
    let id = prop::sample::select(vec!["tok-1", "tok-2", "tok-3"]).prop_map(str::to_string);
    prop::collection::vec(assertion_strategy(id), 1..=max_len)
        .prop_map(|assertions| assertions.into_iter().map(SecurityResult::UnsignedSecurityToken).collect())
}
