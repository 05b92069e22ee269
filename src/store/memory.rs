/**
 * In-Memory Principal Store
 *
 * Single-node `AuthStore` adapter backed by a `tokio::sync::RwLock` map,
 * with one keyed `tokio::sync::Mutex` per principal record standing in for
 * a database row lock. Suitable for tests and single-process deployments.
 *
 * # Fault Injection
 *
 * Concurrent-failure behavior (retry-once lookups, fatal persistence
 * errors) is hard to provoke against a real backend, so the store carries
 * two counters that make the next N operations fail:
 *
 * - `fail_lookups(n)` - the next `n` calls to `find_by_uid` return a
 *   transient `Lookup` error
 * - `fail_saves(n)` - the next `n` calls to `update_tokens` fail with a
 *   `Persistence` error without committing the mutation
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::AuthError;
use crate::store::{AuthStore, Principal};
use crate::token::TokenMap;

/// A principal held in the in-memory store
#[derive(Debug, Clone)]
pub struct MemoryPrincipal {
    /// Public identifier
    pub uid: String,
    /// bcrypt hash of the password
    pub password_hash: String,
    /// Per-device token mapping
    pub tokens: TokenMap,
}

impl MemoryPrincipal {
    /// Create a principal with a freshly hashed password
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Hashing` if bcrypt rejects the cost or input.
    pub fn with_password(
        uid: impl Into<String>,
        password: &str,
        cost: u32,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            uid: uid.into(),
            password_hash: bcrypt::hash(password, cost)?,
            tokens: TokenMap::new(),
        })
    }
}

impl Principal for MemoryPrincipal {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn tokens(&self) -> &TokenMap {
        &self.tokens
    }

    fn valid_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

type RecordKey = (String, String);

/// In-memory `AuthStore` implementation
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, MemoryPrincipal>>,
    record_locks: StdMutex<HashMap<RecordKey, Arc<Mutex<()>>>>,
    lookup_failures: AtomicUsize,
    save_failures: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a principal under a resource namespace
    pub async fn insert(&self, resource: impl Into<String>, principal: MemoryPrincipal) {
        let key = (resource.into(), principal.uid.clone());
        self.records.write().await.insert(key, principal);
    }

    /// Make the next `n` lookups fail with a transient error
    pub fn fail_lookups(&self, n: usize) {
        self.lookup_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` saves fail with a persistence error
    pub fn fail_saves(&self, n: usize) {
        self.save_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Get or create the record lock for a principal
    fn record_lock(&self, key: &RecordKey) -> Arc<Mutex<()>> {
        let mut locks = self.record_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    type Principal = MemoryPrincipal;

    async fn find_by_uid(
        &self,
        resource: &str,
        uid: &str,
    ) -> Result<Option<Self::Principal>, AuthError> {
        if Self::take_failure(&self.lookup_failures) {
            return Err(AuthError::lookup("injected transient lookup failure"));
        }
        let records = self.records.read().await;
        Ok(records.get(&(resource.to_string(), uid.to_string())).cloned())
    }

    async fn update_tokens<R, F>(
        &self,
        resource: &str,
        uid: &str,
        apply: F,
    ) -> Result<Option<R>, AuthError>
    where
        F: FnOnce(&mut TokenMap) -> R + Send + 'async_trait,
        R: Send + 'async_trait,
    {
        let key = (resource.to_string(), uid.to_string());
        let lock = self.record_lock(&key);
        let _guard = lock.lock().await;

        let mut records = self.records.write().await;
        let Some(principal) = records.get_mut(&key) else {
            return Ok(None);
        };

        // Apply against a working copy so an injected save failure leaves
        // the stored state untouched, like a rolled-back transaction.
        let mut tokens = principal.tokens.clone();
        let result = apply(&mut tokens);

        if Self::take_failure(&self.save_failures) {
            return Err(AuthError::persistence("injected save failure"));
        }

        principal.tokens = tokens;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const COST: u32 = 4;

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryStore::new();
        let principal = MemoryPrincipal::with_password("a@b.com", "secret", COST).unwrap();
        store.insert("users", principal).await;

        let found = store.find_by_uid("users", "a@b.com").await.unwrap().unwrap();
        assert_eq!(found.uid(), "a@b.com");
        assert!(found.valid_password("secret"));
        assert!(!found.valid_password("wrong"));
    }

    #[tokio::test]
    async fn test_resources_are_namespaced() {
        let store = MemoryStore::new();
        let principal = MemoryPrincipal::with_password("a@b.com", "secret", COST).unwrap();
        store.insert("users", principal).await;

        assert!(store.find_by_uid("admins", "a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_tokens_persists_mutation() {
        let store = MemoryStore::new();
        let principal = MemoryPrincipal::with_password("a@b.com", "secret", COST).unwrap();
        store.insert("users", principal).await;

        let token = store
            .update_tokens("users", "a@b.com", |tokens| {
                tokens.create_new_auth_token(None, Duration::seconds(60), COST)
            })
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let found = store.find_by_uid("users", "a@b.com").await.unwrap().unwrap();
        assert!(found.tokens().current_record(token.client_id()).is_some());
    }

    #[tokio::test]
    async fn test_update_tokens_unknown_principal() {
        let store = MemoryStore::new();
        let result = store
            .update_tokens("users", "ghost@b.com", |tokens| tokens.len())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_injected_lookup_failure_is_transient() {
        let store = MemoryStore::new();
        store.fail_lookups(1);

        let err = store.find_by_uid("users", "a@b.com").await.unwrap_err();
        assert!(err.is_transient());

        // Second attempt succeeds.
        assert!(store.find_by_uid("users", "a@b.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_save_failure_rolls_back() {
        let store = MemoryStore::new();
        let principal = MemoryPrincipal::with_password("a@b.com", "secret", COST).unwrap();
        store.insert("users", principal).await;
        store.fail_saves(1);

        let err = store
            .update_tokens("users", "a@b.com", |tokens| {
                tokens.create_new_auth_token(None, Duration::seconds(60), COST)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Persistence { .. }));

        let found = store.find_by_uid("users", "a@b.com").await.unwrap().unwrap();
        assert!(found.tokens().is_empty());
    }
}
