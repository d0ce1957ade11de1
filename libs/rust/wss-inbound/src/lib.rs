//! Inbound WS-Security processing.
//!
//! Verifies the security header of inbound SOAP messages through an external
//! security engine, caches verified SAML assertions in the token store of the
//! security context, and validates the results against the resolved policy.
//!
//! # Features
//! - Fault and no-policy bypass, decided once per call
//! - Binding dispatch: one shared crypto provider for symmetric bindings,
//!   distinct signature and encryption providers otherwise
//! - Atomic token caching with `insert_if_absent`
//! - Ordered, typed verification results
//! - Call-scoped working representation of the document

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assertion;
pub mod callback;
pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod representation;
pub mod results;
pub mod sync;
pub mod token;
pub mod validator;

pub use assertion::{AssertionError, AssertionKeyInfo, SamlAssertion, SubjectKey};
pub use callback::{
    CallbackError, Credential, CredentialCallback, CredentialRequest, CredentialUsage, PasswordCallback,
    TokenCallbackHandler,
};
pub use config::{ConfigError, ProcessorConfig};
pub use crypto::{CryptoError, CryptoProvider, CryptoRegistry, CryptoResolver, ProviderSet};
pub use dispatcher::{BindingDispatcher, Dispatch};
pub use engine::{SecurityEngine, VerificationError, VerificationFailure};
pub use error::{ErrorKind, ProcessingError};
pub use message::{Element, Envelope, MessageContext, QName, ServiceIdentity, SoapVersion};
pub use metrics::PipelineMetrics;
pub use pipeline::{Gate, InboundProcessor, InboundProcessorBuilder, SkipReason};
pub use policy::{
    BindingKind, CryptoConfig, CryptoProviderRef, Layout, MessagePart, PolicyData, PolicyResolver, ProviderLayout,
    StaticPolicyResolver, TokenType,
};
pub use representation::{DocumentScope, IdentityConverter, RepresentationConverter, WorkingDocument};
pub use results::{
    ActionKind, ElementRef, EncryptionInfo, SecurityResult, SecurityResults, SignatureInfo, TimestampInfo, TokenInfo,
    UsernameInfo,
};
pub use sync::{SyncReport, TokenCacheSynchronizer};
pub use token::{InMemoryTokenStore, Token, TokenStore};
pub use validator::{PolicyResultsValidator, PolicyValidator, PolicyViolation, Requirement, ValidationContext};
