/**
 * Postgres Principal Store
 *
 * `AuthStore` adapter backed by a sqlx connection pool. The record lock is
 * a real row lock: `update_tokens` runs `SELECT ... FOR UPDATE` inside a
 * transaction, mutates the token map, writes it back, and commits.
 *
 * # Schema Expectations
 *
 * Each configured resource names a table with at least:
 *
 * ```sql
 * CREATE TABLE users (
 *     uid           TEXT PRIMARY KEY,
 *     password_hash TEXT NOT NULL,
 *     tokens        JSONB NOT NULL DEFAULT '{}'
 * );
 * ```
 *
 * The `tokens` column holds the serialized `TokenMap`
 * (`{ "<clientId>": { "token": ..., "expiry": ..., "last_token": ...,
 * "updated_at": ... } }`).
 *
 * # Error Mapping
 *
 * Plain lookups map to `AuthError::Lookup` (transient, retried once by the
 * resolver). Anything failing inside `update_tokens` - including the locked
 * read - maps to `AuthError::Persistence` and aborts the request; a
 * rotation whose commit failed must never be reported as applied.
 */

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::AuthError;
use crate::store::{AuthStore, Principal};
use crate::token::TokenMap;

/// A principal row loaded from Postgres
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PgPrincipal {
    /// Public identifier (primary key)
    pub uid: String,
    /// bcrypt hash of the password
    pub password_hash: String,
    /// Per-device token mapping, stored as JSONB
    pub tokens: Json<TokenMap>,
}

impl Principal for PgPrincipal {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn tokens(&self) -> &TokenMap {
        &self.tokens.0
    }

    fn valid_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

/// Postgres-backed `AuthStore` implementation
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a principal row with a freshly hashed password
    ///
    /// # Errors
    ///
    /// `AuthError::Hashing` if the password cannot be hashed,
    /// `AuthError::Persistence` if the insert fails.
    pub async fn create_principal(
        &self,
        resource: &str,
        uid: &str,
        password: &str,
        cost: u32,
    ) -> Result<(), AuthError> {
        let table = checked_table(resource)?;
        let password_hash = bcrypt::hash(password, cost)?;
        let sql = format!(
            "INSERT INTO {table} (uid, password_hash, tokens) VALUES ($1, $2, $3)"
        );
        sqlx::query(&sql)
            .bind(uid)
            .bind(&password_hash)
            .bind(Json(TokenMap::new()))
            .execute(&self.pool)
            .await
            .map_err(AuthError::persistence)?;
        Ok(())
    }
}

/// Reject resource names that are not plain SQL identifiers
///
/// Resource names come from the scope registry, not from requests, but they
/// are interpolated into SQL and must never be anything but an identifier.
fn checked_table(resource: &str) -> Result<&str, AuthError> {
    let mut chars = resource.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(resource)
    } else {
        Err(AuthError::lookup(format!(
            "resource `{resource}` is not a valid table identifier"
        )))
    }
}

#[async_trait]
impl AuthStore for PostgresStore {
    type Principal = PgPrincipal;

    async fn find_by_uid(
        &self,
        resource: &str,
        uid: &str,
    ) -> Result<Option<Self::Principal>, AuthError> {
        let table = checked_table(resource)?;
        let sql = format!("SELECT uid, password_hash, tokens FROM {table} WHERE uid = $1");
        sqlx::query_as::<_, PgPrincipal>(&sql)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(AuthError::lookup)
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
        let table = checked_table(resource)?;
        let mut tx = self.pool.begin().await.map_err(AuthError::persistence)?;

        let select = format!(
            "SELECT uid, password_hash, tokens FROM {table} WHERE uid = $1 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, PgPrincipal>(&select)
            .bind(uid)
            .fetch_optional(&mut *tx)
            .await
            .map_err(AuthError::persistence)?;

        let Some(principal) = row else {
            // Nothing to update; the implicit rollback releases no locks of note.
            return Ok(None);
        };

        let mut tokens = principal.tokens.0;
        let result = apply(&mut tokens);

        let update = format!("UPDATE {table} SET tokens = $1 WHERE uid = $2");
        sqlx::query(&update)
            .bind(Json(&tokens))
            .bind(uid)
            .execute(&mut *tx)
            .await
            .map_err(AuthError::persistence)?;

        tx.commit().await.map_err(AuthError::persistence)?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_table_accepts_identifiers() {
        assert!(checked_table("users").is_ok());
        assert!(checked_table("admin_accounts").is_ok());
        assert!(checked_table("_staging2").is_ok());
    }

    #[test]
    fn test_checked_table_rejects_injection() {
        assert!(checked_table("users; DROP TABLE users").is_err());
        assert!(checked_table("users--").is_err());
        assert!(checked_table("2users").is_err());
        assert!(checked_table("").is_err());
    }
}
