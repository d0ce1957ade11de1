//! Inbound processing pipeline.
//!
//! [`InboundProcessor::process`] runs one message through:
//!
//! 1. the gate (no policy or a fault body skips verification),
//! 2. security header lookup and actor capture,
//! 3. binding dispatch and the security engine,
//! 4. token cache synchronization,
//! 5. restoring the wire representation,
//! 6. policy validation.
//!
//! The processor holds no per-message state, so one instance can serve
//! concurrent calls.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Span, field, instrument};
use uuid::Uuid;

use crate::callback::PasswordCallback;
use crate::config::{ConfigError, ProcessorConfig};
use crate::crypto::CryptoResolver;
use crate::dispatcher::BindingDispatcher;
use crate::engine::SecurityEngine;
use crate::error::ProcessingError;
use crate::logging::{
    log_bypass, log_processing_error, log_stage_timing, log_tokens_cached, log_verification,
};
use crate::message::MessageContext;
use crate::metrics::PipelineMetrics;
use crate::policy::{PolicyData, PolicyResolver};
use crate::representation::{DocumentScope, IdentityConverter, RepresentationConverter};
use crate::results::SecurityResults;
use crate::sync::TokenCacheSynchronizer;
use crate::validator::{PolicyValidator, ValidationContext};

/// Why a message skipped verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// No policy applies to the message
    NoPolicy,
    /// The body carries a SOAP fault
    Fault,
}

impl SkipReason {
    /// Stable name for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoPolicy => "no_policy",
            Self::Fault => "fault",
        }
    }
}

/// Per-call decision whether to verify, taken once before any processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Restore the representation and return no results
    Skip(SkipReason),
    /// Verify under this policy
    Run(Arc<PolicyData>),
}

impl Gate {
    /// Resolves the policy, then inspects the body for a fault.
    ///
    /// # Errors
    ///
    /// Propagates policy resolver failures.
    pub async fn select(resolver: &dyn PolicyResolver, ctx: &MessageContext) -> Result<Self, ProcessingError> {
        let Some(policy) = resolver.resolve(ctx).await? else {
            return Ok(Self::Skip(SkipReason::NoPolicy));
        };
        if ctx.envelope().is_fault() {
            return Ok(Self::Skip(SkipReason::Fault));
        }
        Ok(Self::Run(policy))
    }
}

/// The inbound security processor.
pub struct InboundProcessor {
    policy: Arc<dyn PolicyResolver>,
    engine: Arc<dyn SecurityEngine>,
    validator: Arc<dyn PolicyValidator>,
    converter: Arc<dyn RepresentationConverter>,
    dispatcher: BindingDispatcher,
    synchronizer: TokenCacheSynchronizer,
    metrics: Option<Arc<PipelineMetrics>>,
    timing: bool,
}

impl InboundProcessor {
    /// Starts building a processor
    #[must_use]
    pub fn builder() -> InboundProcessorBuilder {
        InboundProcessorBuilder::default()
    }

    /// Processes one inbound message.
    ///
    /// Returns `Ok(None)` when the message has no applicable policy or is a
    /// fault; verification is skipped and the envelope is only round-tripped
    /// through the converter. Otherwise returns the engine's results, in
    /// engine order, after they passed policy validation.
    ///
    /// On success the context holds the restored wire form (e.g. decrypted).
    /// On a failure before restoration the context's envelope is unchanged.
    ///
    /// # Errors
    ///
    /// Returns the [`ProcessingError`] of the first failing stage. Nothing
    /// is retried.
    #[instrument(
        name = "wss_inbound.process",
        skip_all,
        fields(
            service = %ctx.service(),
            message_id = ctx.message_id().unwrap_or_default(),
            correlation_id = field::Empty,
        )
    )]
    pub async fn process(&self, ctx: &mut MessageContext) -> Result<Option<SecurityResults>, ProcessingError> {
        let correlation_id = Uuid::new_v4().to_string();
        Span::current().record("correlation_id", correlation_id.as_str());

        let outcome = self.run(ctx, &correlation_id).await;
        match &outcome {
            Ok(Some(_)) => self.count(|m| m.processed.inc()),
            Ok(None) => self.count(|m| m.bypassed.inc()),
            Err(error) => {
                self.count(|m| m.rejected.inc());
                log_processing_error(&correlation_id, ctx.service(), error);
            }
        }
        outcome
    }

    async fn run(
        &self,
        ctx: &mut MessageContext,
        correlation_id: &str,
    ) -> Result<Option<SecurityResults>, ProcessingError> {
        let policy = match Gate::select(self.policy.as_ref(), ctx).await? {
            Gate::Skip(reason) => {
                log_bypass(correlation_id, ctx.service(), reason);
                let scope = DocumentScope::enter(self.converter.as_ref(), ctx.envelope())?;
                ctx.set_envelope(scope.restore()?);
                return Ok(None);
            }
            Gate::Run(policy) => policy,
        };

        let actor = {
            let envelope = ctx.envelope();
            let header = envelope
                .security_header()
                .ok_or_else(|| ProcessingError::missing_security_header(ctx.service().to_string()))?;
            header
                .attribute(&envelope.version.actor_attribute())
                .map(str::to_owned)
        };

        let store = Arc::clone(ctx.token_store());

        let dispatch = self.dispatcher.dispatch(&policy, Arc::clone(&store))?;
        let mut scope = DocumentScope::enter(self.converter.as_ref(), ctx.envelope())?;

        let started = Instant::now();
        let results = self
            .engine
            .verify(
                scope.document_mut(),
                actor.as_deref(),
                dispatch.callback.as_ref(),
                &dispatch.providers,
            )
            .await?;
        let elapsed = started.elapsed();
        self.count(|m| m.record_engine(elapsed));
        log_verification(correlation_id, ctx.service(), &results, elapsed);
        self.stage_timing(correlation_id, "engine", elapsed);

        let report = self
            .synchronizer
            .synchronize(
                &results,
                dispatch.providers.signature().as_ref(),
                dispatch.callback.as_ref(),
                store.as_ref(),
            )
            .await?;
        let inserted = u64::try_from(report.inserted.len()).unwrap_or(u64::MAX);
        self.count(|m| m.tokens_cached.inc_by(inserted));
        log_tokens_cached(correlation_id, &report);

        let started = Instant::now();
        ctx.set_envelope(scope.restore()?);
        self.stage_timing(correlation_id, "restore", started.elapsed());

        let started = Instant::now();
        let validation = ValidationContext {
            policy: &policy,
            envelope: ctx.envelope(),
            actor: actor.as_deref(),
            transport_secure: ctx.is_transport_secure(),
            service: ctx.service(),
        };
        self.validator.validate(&validation, &results).await?;
        self.stage_timing(correlation_id, "validator", started.elapsed());

        Ok(Some(results))
    }

    fn count(&self, record: impl FnOnce(&PipelineMetrics)) {
        if let Some(metrics) = &self.metrics {
            record(metrics);
        }
    }

    fn stage_timing(&self, correlation_id: &str, stage: &str, elapsed: std::time::Duration) {
        if self.timing {
            log_stage_timing(correlation_id, stage, elapsed);
        }
    }
}

impl fmt::Debug for InboundProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundProcessor")
            .field("dispatcher", &self.dispatcher)
            .field("metrics", &self.metrics.is_some())
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

/// Builder for [`InboundProcessor`].
#[derive(Default)]
pub struct InboundProcessorBuilder {
    policy: Option<Arc<dyn PolicyResolver>>,
    engine: Option<Arc<dyn SecurityEngine>>,
    validator: Option<Arc<dyn PolicyValidator>>,
    crypto: Option<Arc<dyn CryptoResolver>>,
    converter: Option<Arc<dyn RepresentationConverter>>,
    password: Option<Arc<dyn PasswordCallback>>,
    metrics: Option<Arc<PipelineMetrics>>,
    timing: bool,
}

impl InboundProcessorBuilder {
    /// Sets the policy resolver
    #[must_use]
    pub fn policy_resolver(mut self, resolver: Arc<dyn PolicyResolver>) -> Self {
        self.policy = Some(resolver);
        self
    }

    /// Sets the security engine
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn SecurityEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the policy validator
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn PolicyValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Sets the crypto resolver
    #[must_use]
    pub fn crypto_resolver(mut self, crypto: Arc<dyn CryptoResolver>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Sets the representation converter (default: [`IdentityConverter`])
    #[must_use]
    pub fn converter(mut self, converter: Arc<dyn RepresentationConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Sets the password delegate of the credential callback
    #[must_use]
    pub fn password_callback(mut self, password: Arc<dyn PasswordCallback>) -> Self {
        self.password = Some(password);
        self
    }

    /// Enables metrics
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Logs per-stage timings
    #[must_use]
    pub const fn timing(mut self, enabled: bool) -> Self {
        self.timing = enabled;
        self
    }

    /// Applies a [`ProcessorConfig`]: timing, service-labeled metrics unless
    /// metrics were already set and, when a policy file is configured, the
    /// policy resolver.
    ///
    /// # Errors
    ///
    /// Returns an error when the policy file cannot be loaded.
    pub fn with_config(mut self, config: &ProcessorConfig) -> Result<Self, ConfigError> {
        self.timing = config.timing_log;
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(PipelineMetrics::for_service(&config.service_name)));
        }
        if let Some(resolver) = config.policy_resolver()? {
            self.policy = Some(Arc::new(resolver));
        }
        Ok(self)
    }

    /// Builds the processor.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first missing collaborator.
    pub fn build(self) -> Result<InboundProcessor, ProcessingError> {
        let missing = |what: &str| ProcessingError::configuration(format!("InboundProcessor requires a {what}"));
        let crypto = self.crypto.ok_or_else(|| missing("crypto resolver"))?;
        Ok(InboundProcessor {
            policy: self.policy.ok_or_else(|| missing("policy resolver"))?,
            engine: self.engine.ok_or_else(|| missing("security engine"))?,
            validator: self.validator.ok_or_else(|| missing("policy validator"))?,
            converter: self.converter.unwrap_or_else(|| Arc::new(IdentityConverter)),
            dispatcher: BindingDispatcher::new(crypto, self.password),
            synchronizer: TokenCacheSynchronizer::new(),
            metrics: self.metrics,
            timing: self.timing,
        })
    }
}
