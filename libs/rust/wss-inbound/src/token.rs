//! Cached security tokens and the token store contract.
//!
//! Tokens are created from verified assertions only and never change after
//! insertion. The store is shared by every message of a security context, so
//! its `insert_if_absent` must be atomic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_common::PlatformError;
use tokio::sync::RwLock;
use tracing::debug;
use zeroize::Zeroizing;

use crate::assertion::{AssertionError, SamlAssertion};

/// A cached credential derived from a verified assertion.
#[derive(Clone)]
pub struct Token {
    id: String,
    payload: String,
    not_before: Option<DateTime<Utc>>,
    not_on_or_after: Option<DateTime<Utc>>,
    secret: Option<Zeroizing<Vec<u8>>>,
}

impl Token {
    /// Creates a token with no validity bounds and no secret
    #[must_use]
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            not_before: None,
            not_on_or_after: None,
            secret: None,
        }
    }

    /// Builds the cached form of a verified assertion.
    ///
    /// # Errors
    ///
    /// Fails when the assertion has no identifier or its validity window is
    /// empty.
    pub fn from_assertion(
        assertion: &SamlAssertion,
        secret: Option<Zeroizing<Vec<u8>>>,
    ) -> Result<Self, AssertionError> {
        if assertion.id.is_empty() {
            return Err(AssertionError::MissingId);
        }
        if let (Some(start), Some(end)) = (assertion.not_before, assertion.not_on_or_after) {
            if start >= end {
                return Err(AssertionError::InvalidValidity {
                    id: assertion.id.clone(),
                });
            }
        }
        Ok(Self {
            id: assertion.id.clone(),
            payload: assertion.xml.clone(),
            not_before: assertion.not_before,
            not_on_or_after: assertion.not_on_or_after,
            secret,
        })
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

    /// Sets the secret key material
    #[must_use]
    pub fn with_secret(mut self, secret: Vec<u8>) -> Self {
        self.secret = Some(Zeroizing::new(secret));
        self
    }

    /// Token identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Serialized assertion this token was built from
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Start of validity
    #[must_use]
    pub const fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// End of validity (exclusive)
    #[must_use]
    pub const fn not_on_or_after(&self) -> Option<DateTime<Utc>> {
        self.not_on_or_after
    }

    /// Secret key material, if the assertion carried one
    #[must_use]
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref().map(Vec::as_slice)
    }

    /// Whether the token has expired at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.not_on_or_after.is_some_and(|end| now >= end)
    }

    /// Whether `now` lies inside the validity window
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|start| now >= start) && !self.is_expired_at(now)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("not_before", &self.not_before)
            .field("not_on_or_after", &self.not_on_or_after)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// Shared store of tokens keyed by identifier.
///
/// Implementations must be safe to call from concurrent `process` calls.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Looks a token up by identifier.
    async fn get(&self, id: &str) -> Result<Option<Arc<Token>>, PlatformError>;

    /// Inserts a token, failing with `PlatformError::Conflict` when the
    /// identifier is taken.
    async fn insert(&self, token: Token) -> Result<(), PlatformError>;

    /// Inserts a token unless the identifier is taken, atomically.
    ///
    /// Returns `true` when the token was inserted.
    async fn insert_if_absent(&self, token: Token) -> Result<bool, PlatformError>;

    /// Removes a token.
    async fn remove(&self, id: &str) -> Result<Option<Arc<Token>>, PlatformError>;

    /// Identifiers of all stored tokens.
    async fn ids(&self) -> Result<Vec<String>, PlatformError>;

    /// Removes tokens expired at `now`, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, PlatformError>;
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, Arc<Token>>>,
}

impl InMemoryTokenStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

fn check_id(token: &Token) -> Result<(), PlatformError> {
    if token.id().is_empty() {
        return Err(PlatformError::invalid_input("token identifier is empty"));
    }
    Ok(())
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, id: &str) -> Result<Option<Arc<Token>>, PlatformError> {
        Ok(self.tokens.read().await.get(id).cloned())
    }

    async fn insert(&self, token: Token) -> Result<(), PlatformError> {
        check_id(&token)?;
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(token.id()) {
            return Err(PlatformError::conflict(token.id()));
        }
        tokens.insert(token.id().to_string(), Arc::new(token));
        Ok(())
    }

    async fn insert_if_absent(&self, token: Token) -> Result<bool, PlatformError> {
        check_id(&token)?;
        // Check and insert under one write guard.
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(token.id()) {
            return Ok(false);
        }
        tokens.insert(token.id().to_string(), Arc::new(token));
        Ok(true)
    }

    async fn remove(&self, id: &str) -> Result<Option<Arc<Token>>, PlatformError> {
        Ok(self.tokens.write().await.remove(id))
    }

    async fn ids(&self) -> Result<Vec<String>, PlatformError> {
        let mut ids: Vec<String> = self.tokens.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, PlatformError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, token| !token.is_expired_at(now));
        let purged = before - tokens.len();
        if purged > 0 {
            debug!(purged, remaining = tokens.len(), "Purged expired tokens");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_validity_window() {
        let now = Utc::now();
        let token = Token::new("tok-1", "<Assertion/>")
            .with_validity(Some(now - Duration::minutes(5)), Some(now + Duration::minutes(5)));

        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(now - Duration::minutes(10)));
        assert!(token.is_expired_at(now + Duration::minutes(5)));
        assert!(!token.is_expired_at(now));
    }

    #[test]
    fn test_from_assertion_copies_fields() {
        let now = Utc::now();
        let assertion = SamlAssertion::new("a-1", "sts", "<Assertion ID=\"a-1\"/>")
            .with_validity(Some(now), Some(now + Duration::hours(1)));
        let token = Token::from_assertion(&assertion, Some(Zeroizing::new(vec![3, 4]))).unwrap();

        assert_eq!(token.id(), "a-1");
        assert_eq!(token.payload(), "<Assertion ID=\"a-1\"/>");
        assert_eq!(token.not_before(), Some(now));
        assert_eq!(token.secret(), Some(&[3u8, 4][..]));
    }

    #[test]
    fn test_from_assertion_rejects_bad_input() {
        let now = Utc::now();
        let unnamed = SamlAssertion::new("", "sts", "<Assertion/>");
        assert!(matches!(
            Token::from_assertion(&unnamed, None),
            Err(AssertionError::MissingId)
        ));

        let inverted = SamlAssertion::new("a-1", "sts", "<Assertion/>")
            .with_validity(Some(now), Some(now - Duration::seconds(1)));
        assert!(matches!(
            Token::from_assertion(&inverted, None),
            Err(AssertionError::InvalidValidity { .. })
        ));
    }

    #[test]
    fn test_unbounded_token_never_expires() {
        let token = Token::new("tok-1", "<Assertion/>");
        assert!(token.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let token = Token::new("tok-1", "<Assertion/>").with_secret(vec![0xAB; 16]);
        let debug = format!("{token:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("171"));
        assert_eq!(token.secret(), Some(&[0xAB; 16][..]));
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let store = InMemoryTokenStore::new();

        let first = store
            .insert_if_absent(Token::new("tok-1", "<A/>").with_secret(vec![1]))
            .await
            .unwrap();
        let second = store
            .insert_if_absent(Token::new("tok-1", "<B/>").with_secret(vec![2]))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(store.len().await, 1);
        let stored = store.get("tok-1").await.unwrap().unwrap();
        assert_eq!(stored.payload(), "<A/>");
        assert_eq!(stored.secret(), Some(&[1u8][..]));
    }

    #[tokio::test]
    async fn test_insert_conflict() {
        let store = InMemoryTokenStore::new();
        store.insert(Token::new("tok-1", "<A/>")).await.unwrap();
        let result = store.insert(Token::new("tok-1", "<A/>")).await;
        assert!(matches!(result, Err(PlatformError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let store = InMemoryTokenStore::new();
        let result = store.insert_if_absent(Token::new("", "<A/>")).await;
        assert!(matches!(result, Err(PlatformError::InvalidInput(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_and_ids() {
        let store = InMemoryTokenStore::new();
        store.insert(Token::new("b", "<B/>")).await.unwrap();
        store.insert(Token::new("a", "<A/>")).await.unwrap();
        assert_eq!(store.ids().await.unwrap(), vec!["a", "b"]);

        let removed = store.remove("a").await.unwrap();
        assert_eq!(removed.unwrap().id(), "a");
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let now = Utc::now();
        let store = InMemoryTokenStore::new();
        store
            .insert(Token::new("old", "<A/>").with_validity(None, Some(now - Duration::seconds(1))))
            .await
            .unwrap();
        store
            .insert(Token::new("fresh", "<A/>").with_validity(None, Some(now + Duration::hours(1))))
            .await
            .unwrap();
        store.insert(Token::new("forever", "<A/>")).await.unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.ids().await.unwrap(), vec!["forever", "fresh"]);
    }
}
