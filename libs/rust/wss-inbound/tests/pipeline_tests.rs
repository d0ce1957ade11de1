//! End-to-end scenarios for `InboundProcessor::process`.

use std::sync::Arc;

use test_utils::fixtures::{
    self, ENCRYPTION_PROVIDER, SERVICE, SERVICE_KEY_ALIAS, SIGNATURE_PROVIDER, asymmetric_policy, body_signature,
    fault_envelope, holder_of_key_assertion, message_context, secured_envelope, security_header_for,
    signed_body_policy, symmetric_policy, timestamp, unsecured_envelope, unsigned_token,
};
use test_utils::mocks::{
    MockCryptoResolver, MockPolicyResolver, ObservedTokenStore, PipelineHarness, RecordingConverter,
    RecordingEngine, RecordingValidator, unwrapped_key,
};
use wss_inbound::{
    BindingKind, CredentialUsage, Element, Envelope, ErrorKind, InMemoryTokenStore, InboundProcessor,
    PolicyData, PolicyResultsValidator, PolicyViolation, ProcessingError, QName, Requirement, SecurityResult,
    SecurityResults, SoapVersion, StaticPolicyResolver, TokenStore, VerificationError, VerificationFailure,
};

fn harness(policy: MockPolicyResolver, engine: RecordingEngine) -> PipelineHarness {
    PipelineHarness::new(policy, engine, RecordingValidator::accepting()).unwrap()
}

fn decrypted_body() -> Element {
    Element::new(QName::new("urn:echo", "decrypted"))
}

#[tokio::test]
async fn test_no_policy_returns_none_without_side_effects() {
    let h = harness(MockPolicyResolver::none(), RecordingEngine::returning(vec![unsigned_token("tok-1")]));
    let store = Arc::new(InMemoryTokenStore::new());
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());

    let outcome = h.processor.process(&mut ctx).await.unwrap();

    assert!(outcome.is_none());
    assert_eq!(h.engine.call_count(), 0);
    assert_eq!(h.validator.call_count(), 0);
    assert!(h.crypto.resolved().is_empty());
    assert!(store.is_empty().await);
    assert_eq!(ctx.envelope(), &secured_envelope(SoapVersion::Soap11));
    assert_eq!(h.converter.to_wire_count(), 1);
    assert_eq!(h.metrics.bypassed.get(), 1);
}

#[tokio::test]
async fn test_fault_message_skips_verification() {
    for version in [SoapVersion::Soap11, SoapVersion::Soap12] {
        let h = harness(
            MockPolicyResolver::returning(symmetric_policy()),
            RecordingEngine::returning(vec![unsigned_token("tok-1")]),
        );
        let store = Arc::new(InMemoryTokenStore::new());
        let mut ctx = message_context(fault_envelope(version), store.clone());

        let outcome = h.processor.process(&mut ctx).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(h.engine.call_count(), 0);
        assert!(store.is_empty().await);
        assert_eq!(h.policy.calls(), 1);
    }
}

#[tokio::test]
async fn test_fault_without_security_header_is_not_an_error() {
    let h = harness(MockPolicyResolver::returning(symmetric_policy()), RecordingEngine::returning(vec![]));
    let mut ctx = message_context(fault_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));
    assert!(h.processor.process(&mut ctx).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_security_header_is_structural_error() {
    let h = harness(MockPolicyResolver::returning(symmetric_policy()), RecordingEngine::returning(vec![]));
    let mut ctx = message_context(unsecured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));

    let err = h.processor.process(&mut ctx).await.unwrap_err();

    assert!(matches!(err, ProcessingError::MissingSecurityHeader { ref service } if service == SERVICE));
    assert_eq!(err.kind(), ErrorKind::Structural);
    assert_eq!(h.engine.call_count(), 0);
    assert_eq!(h.metrics.rejected.get(), 1);
}

#[tokio::test]
async fn test_symmetric_policy_caches_unseen_token() {
    let h = harness(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::returning(vec![unsigned_token("tok-1")]),
    );
    let store = Arc::new(InMemoryTokenStore::new());
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());

    let results = h.processor.process(&mut ctx).await.unwrap().unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(store.ids().await.unwrap(), vec!["tok-1"]);
    let token = store.get("tok-1").await.unwrap().unwrap();
    assert_eq!(token.payload(), "<saml:Assertion ID=\"tok-1\"/>");
    assert!(token.secret().is_none());
    assert_eq!(h.metrics.tokens_cached.get(), 1);
    assert_eq!(h.metrics.processed.get(), 1);
}

#[tokio::test]
async fn test_repeated_processing_keeps_single_token() {
    let h = harness(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::returning(vec![unsigned_token("tok-1")]),
    );
    let store = Arc::new(ObservedTokenStore::new());

    for _ in 0..2 {
        let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());
        h.processor.process(&mut ctx).await.unwrap();
    }

    assert_eq!(store.ids().await.unwrap(), vec!["tok-1"]);
    assert_eq!(store.insert_attempts(), 2);
    assert_eq!(h.metrics.tokens_cached.get(), 1);
}

#[tokio::test]
async fn test_symmetric_binding_uses_one_provider() {
    let h = harness(MockPolicyResolver::returning(symmetric_policy()), RecordingEngine::returning(vec![]));
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));

    h.processor.process(&mut ctx).await.unwrap();

    let call = &h.engine.calls()[0];
    assert_eq!(call.provider_count, 1);
    assert_eq!(call.signature_provider, SIGNATURE_PROVIDER);
    assert_eq!(call.encryption_provider, SIGNATURE_PROVIDER);
    assert_eq!(h.crypto.resolved(), vec![SIGNATURE_PROVIDER]);
}

#[tokio::test]
async fn test_non_symmetric_bindings_use_two_providers() {
    for binding in [BindingKind::Asymmetric, BindingKind::TransportOnly] {
        let h = harness(MockPolicyResolver::returning(fixtures::policy(binding)), RecordingEngine::returning(vec![]));
        let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));

        h.processor.process(&mut ctx).await.unwrap();

        let call = &h.engine.calls()[0];
        assert_eq!(call.provider_count, 2);
        assert_eq!(call.signature_provider, SIGNATURE_PROVIDER);
        assert_eq!(call.encryption_provider, ENCRYPTION_PROVIDER);
    }
}

#[tokio::test]
async fn test_missing_encryption_provider_is_configuration_error() {
    let policy = PolicyData::new(BindingKind::Asymmetric).with_signature_crypto(fixtures::signature_ref());
    let h = harness(MockPolicyResolver::returning(policy), RecordingEngine::returning(vec![]));
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));

    let err = h.processor.process(&mut ctx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!err.is_retryable());
    assert_eq!(h.engine.call_count(), 0);
}

#[tokio::test]
async fn test_actor_scope_from_version_specific_attribute() {
    for version in [SoapVersion::Soap11, SoapVersion::Soap12] {
        let h = harness(MockPolicyResolver::returning(symmetric_policy()), RecordingEngine::returning(vec![]));
        let envelope = Envelope::new(version)
            .with_header_block(security_header_for(version, "urn:gateway"))
            .with_body_element(fixtures::ping());
        let mut ctx = message_context(envelope, Arc::new(InMemoryTokenStore::new()));

        h.processor.process(&mut ctx).await.unwrap();

        assert_eq!(h.engine.calls()[0].actor.as_deref(), Some("urn:gateway"));
        assert_eq!(h.validator.calls()[0].actor.as_deref(), Some("urn:gateway"));
    }
}

#[tokio::test]
async fn test_header_without_actor_passes_none() {
    let h = harness(MockPolicyResolver::returning(symmetric_policy()), RecordingEngine::returning(vec![]));
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap12), Arc::new(InMemoryTokenStore::new()));

    h.processor.process(&mut ctx).await.unwrap();

    assert_eq!(h.engine.calls()[0].actor, None);
}

#[tokio::test]
async fn test_verification_error_stops_before_cache_and_validator() {
    let h = harness(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::failing(VerificationError::new(VerificationFailure::InvalidSignature, "digest mismatch"))
            .with_edit(|doc| doc.envelope_mut().body = vec![decrypted_body()]),
    );
    let store = Arc::new(ObservedTokenStore::new());
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());

    let err = h.processor.process(&mut ctx).await.unwrap_err();

    match err {
        ProcessingError::Verification(e) => assert_eq!(e.failure(), VerificationFailure::InvalidSignature),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.insert_attempts(), 0);
    assert_eq!(h.validator.call_count(), 0);
    assert_eq!(ctx.envelope(), &secured_envelope(SoapVersion::Soap11));
}

#[tokio::test]
async fn test_results_reach_validator_in_engine_order() {
    let results = SecurityResults::from(vec![
        timestamp(),
        unsigned_token("tok-2"),
        body_signature(SoapVersion::Soap11),
        unsigned_token("tok-1"),
    ]);
    let h = harness(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::returning(results.clone()),
    );
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));

    let returned = h.processor.process(&mut ctx).await.unwrap().unwrap();

    assert_eq!(h.validator.calls()[0].results, results);
    assert_eq!(returned, results);
}

#[tokio::test]
async fn test_policy_rejection_after_restore() {
    let h = PipelineHarness::new(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::returning(vec![unsigned_token("tok-1")])
            .with_edit(|doc| doc.envelope_mut().body = vec![decrypted_body()]),
        RecordingValidator::rejecting(PolicyViolation::new(Requirement::SignedParts, "body not signed")),
    )
    .unwrap();
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));

    let err = h.processor.process(&mut ctx).await.unwrap_err();

    assert!(matches!(err, ProcessingError::PolicyViolation(ref v) if v.requirement == Requirement::SignedParts));
    assert_eq!(h.converter.to_wire_count(), 1);
    assert_eq!(h.validator.calls()[0].envelope.body, vec![decrypted_body()]);
    assert_eq!(ctx.envelope().body, vec![decrypted_body()]);
}

#[tokio::test]
async fn test_holder_of_key_secret_unwrapped_through_password_delegate() {
    let wrapped = vec![0x10, 0x20, 0x30];
    let h = harness(
        MockPolicyResolver::returning(asymmetric_policy()),
        RecordingEngine::returning(vec![SecurityResult::UnsignedSecurityToken(holder_of_key_assertion(
            "hok-1",
            wrapped.clone(),
        ))]),
    );
    let store = Arc::new(InMemoryTokenStore::new());
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());

    h.processor.process(&mut ctx).await.unwrap();

    let token = store.get("hok-1").await.unwrap().unwrap();
    assert_eq!(token.secret(), Some(unwrapped_key(&wrapped).as_slice()));
    let requests = h.password.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].identifier, SERVICE_KEY_ALIAS);
    assert_eq!(requests[0].usage, CredentialUsage::Decryption);
}

#[tokio::test]
async fn test_unresolvable_token_key_aborts_call() {
    let h = harness(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::returning(vec![
            unsigned_token("tok-1"),
            SecurityResult::UnsignedSecurityToken(fixtures::assertion("hok-2").with_confirmation(
                wss_inbound::SubjectKey::EncryptedKey {
                    alias: "unknown".to_string(),
                    wrapped: vec![1],
                },
            )),
        ]),
    );
    let store = Arc::new(InMemoryTokenStore::new());
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());

    let err = h.processor.process(&mut ctx).await.unwrap_err();

    assert!(matches!(err, ProcessingError::TokenCache { ref token_id, .. } if token_id == "hok-2"));
    assert_eq!(h.validator.call_count(), 0);
    assert_eq!(ctx.envelope(), &secured_envelope(SoapVersion::Soap11));
}

#[tokio::test]
async fn test_unavailable_store_is_retryable_token_cache_error() {
    let h = harness(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::returning(vec![unsigned_token("tok-1")]),
    );
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(ObservedTokenStore::unavailable()));

    let err = h.processor.process(&mut ctx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TokenCache);
    assert!(err.is_retryable());
    assert_eq!(h.validator.call_count(), 0);
}

#[tokio::test]
async fn test_restore_failure_is_representation_error() {
    let h = PipelineHarness::with_converter(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::returning(vec![]),
        RecordingValidator::accepting(),
        RecordingConverter::failing_restore(),
    )
    .unwrap();
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));

    let err = h.processor.process(&mut ctx).await.unwrap_err();

    assert!(matches!(err, ProcessingError::Representation { .. }));
    assert_eq!(h.validator.call_count(), 0);
}

fn processor_with_default_validator(policy: PolicyData, engine: RecordingEngine) -> InboundProcessor {
    InboundProcessor::builder()
        .policy_resolver(Arc::new(StaticPolicyResolver::new().with_policy(SERVICE, policy)))
        .engine(Arc::new(engine))
        .validator(Arc::new(PolicyResultsValidator::new()))
        .crypto_resolver(Arc::new(MockCryptoResolver::standard()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_default_validator_rejects_unsigned_body() {
    let processor = processor_with_default_validator(
        signed_body_policy(),
        RecordingEngine::returning(vec![timestamp(), unsigned_token("tok-1")]),
    );
    let store = Arc::new(InMemoryTokenStore::new());
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());

    let err = processor.process(&mut ctx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    // Caching precedes validation.
    assert_eq!(store.ids().await.unwrap(), vec!["tok-1"]);
}

#[tokio::test]
async fn test_default_validator_accepts_signed_body() {
    let processor = processor_with_default_validator(
        signed_body_policy().with_timestamp(),
        RecordingEngine::returning(vec![timestamp(), body_signature(SoapVersion::Soap12)]),
    );
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap12), Arc::new(InMemoryTokenStore::new()));

    let results = processor.process(&mut ctx).await.unwrap().unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_transport_binding_requires_secure_transport() {
    let processor = processor_with_default_validator(
        fixtures::policy(BindingKind::TransportOnly),
        RecordingEngine::returning(vec![timestamp()]),
    );

    let mut plain = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()));
    let err = processor.process(&mut plain).await.unwrap_err();
    assert!(matches!(err, ProcessingError::PolicyViolation(ref v) if v.requirement == Requirement::SecureTransport));

    let mut tls = message_context(secured_envelope(SoapVersion::Soap11), Arc::new(InMemoryTokenStore::new()))
        .with_transport_secure(true);
    assert!(processor.process(&mut tls).await.unwrap().is_some());
}

async fn store_with_expired_token() -> Arc<InMemoryTokenStore> {
    let store = Arc::new(InMemoryTokenStore::new());
    let expired = chrono::Utc::now() - chrono::Duration::minutes(1);
    store
        .insert(wss_inbound::Token::new("old", "<A/>").with_validity(None, Some(expired)))
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_rejected_message_leaves_expired_tokens_in_store() {
    let h = harness(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::failing(VerificationError::new(VerificationFailure::InvalidSignature, "bad")),
    );
    let store = store_with_expired_token().await;
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());

    let err = h.processor.process(&mut ctx).await.unwrap_err();

    assert!(matches!(err, ProcessingError::Verification(_)));
    assert_eq!(store.ids().await.unwrap(), vec!["old".to_string()]);
}

#[tokio::test]
async fn test_accepted_message_leaves_expired_tokens_in_store() {
    let h = harness(
        MockPolicyResolver::returning(symmetric_policy()),
        RecordingEngine::returning(vec![timestamp()]),
    );
    let store = store_with_expired_token().await;
    let mut ctx = message_context(secured_envelope(SoapVersion::Soap11), store.clone());

    assert!(h.processor.process(&mut ctx).await.unwrap().is_some());
    assert_eq!(store.ids().await.unwrap(), vec!["old".to_string()]);
}
