/**
 * Store Abstraction
 *
 * The token protocol does not implement its own persistence engine; it
 * assumes an external durable record store with row-level locking. This
 * module defines the two collaborator contracts the core consumes:
 *
 * - **`Principal`** - the authenticated resource (a user record): public
 *   identifier, its token mapping, and password verification
 * - **`AuthStore`** - lookup by uid plus `update_tokens`, the locked
 *   read-modify-write primitive every token-map mutation must go through
 *
 * # Adapters
 *
 * - **`memory`** - in-process store with keyed `tokio::sync::Mutex` record
 *   locks; used by tests and single-node deployments
 * - **`postgres`** - sqlx-backed store using `SELECT ... FOR UPDATE` row
 *   locks inside a transaction
 *
 * # Locking Discipline
 *
 * `update_tokens` is the only way to mutate a principal's token mapping.
 * An implementation must acquire the per-record lock, load current state,
 * apply the caller's closure, persist durably, and only then release the
 * lock. Read-then-later-write is a protocol violation: two concurrent
 * rotations for the same principal could both mint and one client would be
 * handed a token that is immediately invalid.
 */

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::token::TokenMap;

/// The authenticated resource owning a token mapping
pub trait Principal: Send + Sync {
    /// Public identifier used for lookup and emitted in the `uid` header
    fn uid(&self) -> &str;

    /// The per-device token mapping
    fn tokens(&self) -> &TokenMap;

    /// Verify a password against the stored credential hash
    ///
    /// Used by the session-creation endpoint, not by token validation.
    fn valid_password(&self, password: &str) -> bool;
}

/// Durable store of principals, keyed by resource name and uid
///
/// `resource` is the per-scope resource name from `ScopeConfig` - a
/// namespace key for the memory adapter, a table name for postgres.
#[async_trait]
pub trait AuthStore: Send + Sync + 'static {
    /// The concrete principal type this store yields
    type Principal: Principal + Clone + Send + Sync + 'static;

    /// Load a principal by public identifier, without locking
    ///
    /// # Errors
    ///
    /// `AuthError::Lookup` on store failure; the resolver treats this as
    /// transient and retries once.
    async fn find_by_uid(
        &self,
        resource: &str,
        uid: &str,
    ) -> Result<Option<Self::Principal>, AuthError>;

    /// Read-modify-write a principal's token mapping under the record lock
    ///
    /// Acquires the per-record lock, applies `apply` to the current token
    /// map, persists the result durably, then releases the lock. Returns
    /// `Ok(None)` when no principal exists for `uid`.
    ///
    /// # Errors
    ///
    /// `AuthError::Persistence` when the mutated state cannot be saved; the
    /// mutation must not be considered applied in that case.
    async fn update_tokens<R, F>(
        &self,
        resource: &str,
        uid: &str,
        apply: F,
    ) -> Result<Option<R>, AuthError>
    where
        F: FnOnce(&mut TokenMap) -> R + Send + 'async_trait,
        R: Send + 'async_trait;
}
