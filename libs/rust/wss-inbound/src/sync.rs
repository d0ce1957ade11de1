//! Caching of verified assertions in the token store.

use tracing::{debug, instrument};

use crate::assertion::AssertionKeyInfo;
use crate::callback::CredentialCallback;
use crate::crypto::CryptoProvider;
use crate::error::ProcessingError;
use crate::results::SecurityResults;
use crate::token::{Token, TokenStore};

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Identifiers inserted by this pass, in result order
    pub inserted: Vec<String>,
    /// Identifiers the store already held
    pub already_present: Vec<String>,
}

impl SyncReport {
    /// Number of assertions examined
    #[must_use]
    pub fn examined(&self) -> usize {
        self.inserted.len() + self.already_present.len()
    }
}

/// Inserts unseen unsigned assertions into the token store.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCacheSynchronizer;

impl TokenCacheSynchronizer {
    /// Creates a synchronizer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Caches every unsigned assertion in `results`.
    ///
    /// Each assertion's key is derived through `crypto` and `callback`, then
    /// the token is inserted with `insert_if_absent`. The results are only
    /// read.
    ///
    /// # Errors
    ///
    /// The first assertion whose key cannot be derived, or whose token cannot
    /// be built or stored, aborts the pass with a token cache error. Tokens
    /// inserted before the failure stay in the store.
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn synchronize(
        &self,
        results: &SecurityResults,
        crypto: &dyn CryptoProvider,
        callback: &dyn CredentialCallback,
        store: &dyn TokenStore,
    ) -> Result<SyncReport, ProcessingError> {
        let mut report = SyncReport::default();

        for assertion in results.unsigned_assertions() {
            let key = AssertionKeyInfo::resolve(assertion, crypto, callback)
                .await
                .map_err(|e| ProcessingError::token_cache(&assertion.id, e.to_string()))?;
            let token = Token::from_assertion(assertion, key.into_secret())
                .map_err(|e| ProcessingError::token_cache(&assertion.id, e.to_string()))?;

            let inserted = store
                .insert_if_absent(token)
                .await
                .map_err(|e| ProcessingError::token_store(&assertion.id, &e))?;
            if inserted {
                debug!(token_id = %assertion.id, "Cached security token");
                report.inserted.push(assertion.id.clone());
            } else {
                debug!(token_id = %assertion.id, "Security token already cached");
                report.already_present.push(assertion.id.clone());
            }
        }

        Ok(report)
    }
}
