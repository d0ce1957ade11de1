//! Mock implementations for testing.
//!
//! Every collaborator of [`InboundProcessor`] has a recording mock here.
//! [`PipelineHarness`] wires them into a processor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_common::PlatformError;
use secrecy::{ExposeSecret, SecretString};
use wss_inbound::{
    BindingKind, CallbackError, CredentialCallback, CredentialRequest, CryptoError, CryptoProvider,
    CryptoProviderRef, CryptoResolver, Envelope, InMemoryTokenStore, InboundProcessor, MessageContext,
    PasswordCallback, PipelineMetrics, PolicyData, PolicyResolver, PolicyValidator, PolicyViolation,
    ProcessingError, ProviderSet, RepresentationConverter, SecurityEngine, SecurityResults, Token, TokenStore,
    ValidationContext, VerificationError, WorkingDocument,
};

use crate::fixtures::{ENCRYPTION_PROVIDER, SERVICE_KEY_ALIAS, SERVICE_KEY_PASSWORD, SIGNATURE_PROVIDER};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The key a [`MockCryptoProvider`] unwraps from `wrapped`.
#[must_use]
pub fn unwrapped_key(wrapped: &[u8]) -> Vec<u8> {
    wrapped.iter().map(|b| b ^ 0xFF).collect()
}

/// Crypto provider that unwraps keys for [`SERVICE_KEY_ALIAS`].
#[derive(Debug)]
pub struct MockCryptoProvider {
    name: String,
}

impl MockCryptoProvider {
    /// Create a provider.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl CryptoProvider for MockCryptoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn unwrap_key(&self, alias: &str, wrapped: &[u8], password: &SecretString) -> Result<Vec<u8>, CryptoError> {
        if alias != SERVICE_KEY_ALIAS {
            return Err(CryptoError::key_not_found(alias));
        }
        if password.expose_secret() != SERVICE_KEY_PASSWORD {
            return Err(CryptoError::unwrap_failed("wrong key password"));
        }
        Ok(unwrapped_key(wrapped))
    }
}

/// Crypto resolver recording the names it resolved.
#[derive(Debug, Default)]
pub struct MockCryptoResolver {
    providers: HashMap<String, Arc<MockCryptoProvider>>,
    resolved: Mutex<Vec<String>>,
}

impl MockCryptoResolver {
    /// Resolver knowing the fixture signature and encryption providers.
    #[must_use]
    pub fn standard() -> Self {
        Self::default()
            .with_provider(SIGNATURE_PROVIDER)
            .with_provider(ENCRYPTION_PROVIDER)
    }

    /// Add a provider.
    #[must_use]
    pub fn with_provider(mut self, name: &str) -> Self {
        self.providers
            .insert(name.to_string(), Arc::new(MockCryptoProvider::new(name)));
        self
    }

    /// Names resolved so far.
    #[must_use]
    pub fn resolved(&self) -> Vec<String> {
        lock(&self.resolved).clone()
    }
}

impl CryptoResolver for MockCryptoResolver {
    fn resolve(&self, reference: &CryptoProviderRef) -> Result<Arc<dyn CryptoProvider>, CryptoError> {
        lock(&self.resolved).push(reference.name.clone());
        self.providers
            .get(&reference.name)
            .map(|p| Arc::clone(p) as Arc<dyn CryptoProvider>)
            .ok_or_else(|| CryptoError::invalid_config(format!("unknown provider {}", reference.name)))
    }
}

/// Policy resolver returning a fixed policy.
#[derive(Debug, Default)]
pub struct MockPolicyResolver {
    policy: Option<Arc<PolicyData>>,
    calls: AtomicUsize,
}

impl MockPolicyResolver {
    /// Resolver that finds no policy.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Resolver that always returns `policy`.
    #[must_use]
    pub fn returning(policy: PolicyData) -> Self {
        Self {
            policy: Some(Arc::new(policy)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of resolve calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyResolver for MockPolicyResolver {
    async fn resolve(&self, _ctx: &MessageContext) -> Result<Option<Arc<PolicyData>>, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.policy.clone())
    }
}

/// Password delegate knowing the fixture key password.
#[derive(Debug, Default)]
pub struct MockPasswordCallback {
    requests: Mutex<Vec<CredentialRequest>>,
}

impl MockPasswordCallback {
    /// Create a delegate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<CredentialRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PasswordCallback for MockPasswordCallback {
    async fn password(&self, request: &CredentialRequest) -> Result<Option<SecretString>, CallbackError> {
        lock(&self.requests).push(request.clone());
        Ok((request.identifier == SERVICE_KEY_ALIAS).then(|| SecretString::from(SERVICE_KEY_PASSWORD)))
    }
}

/// One recorded engine call.
#[derive(Debug, Clone)]
pub struct EngineCall {
    /// Actor scope passed in
    pub actor: Option<String>,
    /// Number of providers passed in
    pub provider_count: usize,
    /// Signature provider name
    pub signature_provider: String,
    /// Encryption provider name
    pub encryption_provider: String,
    /// Working document envelope on entry
    pub envelope: Envelope,
}

type DocumentEdit = Box<dyn Fn(&mut WorkingDocument) + Send + Sync>;

/// Security engine returning a scripted outcome.
pub struct RecordingEngine {
    outcome: Result<SecurityResults, VerificationError>,
    edit: Option<DocumentEdit>,
    calls: Mutex<Vec<EngineCall>>,
}

impl RecordingEngine {
    /// Engine returning `results`.
    #[must_use]
    pub fn returning(results: impl Into<SecurityResults>) -> Self {
        Self {
            outcome: Ok(results.into()),
            edit: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Engine rejecting every message with `error`.
    #[must_use]
    pub fn failing(error: VerificationError) -> Self {
        Self {
            outcome: Err(error),
            edit: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Apply `edit` to the working document on each call, e.g. to simulate
    /// decryption.
    #[must_use]
    pub fn with_edit(mut self, edit: impl Fn(&mut WorkingDocument) + Send + Sync + 'static) -> Self {
        self.edit = Some(Box::new(edit));
        self
    }

    /// Calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl SecurityEngine for RecordingEngine {
    async fn verify(
        &self,
        document: &mut WorkingDocument,
        actor: Option<&str>,
        _callback: &dyn CredentialCallback,
        providers: &ProviderSet,
    ) -> Result<SecurityResults, VerificationError> {
        lock(&self.calls).push(EngineCall {
            actor: actor.map(str::to_string),
            provider_count: providers.len(),
            signature_provider: providers.signature().name().to_string(),
            encryption_provider: providers.encryption().name().to_string(),
            envelope: document.envelope().clone(),
        });
        if let Some(edit) = &self.edit {
            edit(document);
        }
        self.outcome.clone()
    }
}

/// One recorded validator call.
#[derive(Debug, Clone)]
pub struct ValidatorCall {
    /// Results as received
    pub results: SecurityResults,
    /// Envelope as seen by the validator
    pub envelope: Envelope,
    /// Actor scope
    pub actor: Option<String>,
    /// Binding of the policy in force
    pub binding: BindingKind,
}

/// Policy validator returning a scripted verdict.
#[derive(Debug, Default)]
pub struct RecordingValidator {
    violation: Option<PolicyViolation>,
    calls: Mutex<Vec<ValidatorCall>>,
}

impl RecordingValidator {
    /// Validator accepting everything.
    #[must_use]
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Validator rejecting everything with `violation`.
    #[must_use]
    pub fn rejecting(violation: PolicyViolation) -> Self {
        Self {
            violation: Some(violation),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ValidatorCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl PolicyValidator for RecordingValidator {
    async fn validate(&self, ctx: &ValidationContext<'_>, results: &SecurityResults) -> Result<(), PolicyViolation> {
        lock(&self.calls).push(ValidatorCall {
            results: results.clone(),
            envelope: ctx.envelope.clone(),
            actor: ctx.actor.map(str::to_string),
            binding: ctx.policy.binding,
        });
        self.violation.clone().map_or(Ok(()), Err)
    }
}

/// Identity converter counting conversions.
#[derive(Debug, Default)]
pub struct RecordingConverter {
    to_working: AtomicUsize,
    to_wire: AtomicUsize,
    fail_wire: bool,
}

impl RecordingConverter {
    /// Create a converter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Converter whose wire conversion always fails.
    #[must_use]
    pub fn failing_restore() -> Self {
        Self {
            fail_wire: true,
            ..Self::default()
        }
    }

    /// Conversions to working form so far.
    #[must_use]
    pub fn to_working_count(&self) -> usize {
        self.to_working.load(Ordering::SeqCst)
    }

    /// Conversions to wire form so far.
    #[must_use]
    pub fn to_wire_count(&self) -> usize {
        self.to_wire.load(Ordering::SeqCst)
    }
}

impl RepresentationConverter for RecordingConverter {
    fn to_working_form(&self, envelope: &Envelope) -> Result<WorkingDocument, ProcessingError> {
        self.to_working.fetch_add(1, Ordering::SeqCst);
        Ok(WorkingDocument::new(envelope.clone()))
    }

    fn to_wire_form(&self, document: WorkingDocument) -> Result<Envelope, ProcessingError> {
        self.to_wire.fetch_add(1, Ordering::SeqCst);
        if self.fail_wire {
            return Err(ProcessingError::representation("wire serialization failed"));
        }
        Ok(document.into_envelope())
    }
}

/// In-memory token store counting writes, optionally unavailable.
#[derive(Debug, Default)]
pub struct ObservedTokenStore {
    inner: InMemoryTokenStore,
    unavailable: bool,
    insert_attempts: AtomicUsize,
}

impl ObservedTokenStore {
    /// Working store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose writes fail with a transient error.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Number of insert calls so far.
    #[must_use]
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    fn write_guard(&self) -> Result<(), PlatformError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(PlatformError::unavailable("token store offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for ObservedTokenStore {
    async fn get(&self, id: &str) -> Result<Option<Arc<Token>>, PlatformError> {
        self.inner.get(id).await
    }

    async fn insert(&self, token: Token) -> Result<(), PlatformError> {
        self.write_guard()?;
        self.inner.insert(token).await
    }

    async fn insert_if_absent(&self, token: Token) -> Result<bool, PlatformError> {
        self.write_guard()?;
        self.inner.insert_if_absent(token).await
    }

    async fn remove(&self, id: &str) -> Result<Option<Arc<Token>>, PlatformError> {
        self.inner.remove(id).await
    }

    async fn ids(&self) -> Result<Vec<String>, PlatformError> {
        self.inner.ids().await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, PlatformError> {
        self.inner.purge_expired(now).await
    }
}

/// A processor wired to recording mocks.
pub struct PipelineHarness {
    /// The processor under test
    pub processor: InboundProcessor,
    /// Policy resolver mock
    pub policy: Arc<MockPolicyResolver>,
    /// Engine mock
    pub engine: Arc<RecordingEngine>,
    /// Validator mock
    pub validator: Arc<RecordingValidator>,
    /// Crypto resolver mock
    pub crypto: Arc<MockCryptoResolver>,
    /// Converter mock
    pub converter: Arc<RecordingConverter>,
    /// Password delegate mock
    pub password: Arc<MockPasswordCallback>,
    /// Metrics of the processor
    pub metrics: Arc<PipelineMetrics>,
}

impl PipelineHarness {
    /// Build a harness around the given policy, engine and validator.
    ///
    /// # Errors
    ///
    /// Propagates builder failures.
    pub fn new(
        policy: MockPolicyResolver,
        engine: RecordingEngine,
        validator: RecordingValidator,
    ) -> Result<Self, ProcessingError> {
        Self::with_converter(policy, engine, validator, RecordingConverter::new())
    }

    /// Same as [`new`](Self::new) with a custom converter.
    ///
    /// # Errors
    ///
    /// Propagates builder failures.
    pub fn with_converter(
        policy: MockPolicyResolver,
        engine: RecordingEngine,
        validator: RecordingValidator,
        converter: RecordingConverter,
    ) -> Result<Self, ProcessingError> {
        let policy = Arc::new(policy);
        let engine = Arc::new(engine);
        let validator = Arc::new(validator);
        let crypto = Arc::new(MockCryptoResolver::standard());
        let converter = Arc::new(converter);
        let password = Arc::new(MockPasswordCallback::new());
        let metrics = Arc::new(PipelineMetrics::new());

        let processor = InboundProcessor::builder()
            .policy_resolver(policy.clone())
            .engine(engine.clone())
            .validator(validator.clone())
            .crypto_resolver(crypto.clone())
            .converter(converter.clone())
            .password_callback(password.clone())
            .metrics(metrics.clone())
            .build()?;

        Ok(Self {
            processor,
            policy,
            engine,
            validator,
            crypto,
            converter,
            password,
            metrics,
        })
    }
}
