/**
 * Token Value Object and Per-Principal Token Store
 *
 * This module implements the device-credential model:
 *
 * - `Token` - one rotation of a device credential (client id, secret, expiry)
 * - `TokenRecord` - the persisted, hashed form of a token, keyed by client id
 * - `TokenMap` - the principal-owned mapping of client id -> `TokenRecord`,
 *   including validation and the mint/extend primitives used by the
 *   rotation engine
 *
 * # Security
 *
 * - Secrets and client ids are 16 bytes of CSPRNG output, URL-safe
 *   base64-encoded (22 characters, no padding)
 * - A secret is never persisted in plaintext; only its bcrypt hash is stored
 * - Validation accepts the current secret, or - for a short grace window
 *   after a rotation - the immediately prior secret, so that concurrent
 *   requests racing a rotation are not spuriously rejected
 */

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Generate a URL-safe random credential string
///
/// 16 bytes from the thread-local CSPRNG, encoded without padding. Used for
/// both client ids and secrets.
pub fn secure_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One rotation of a device credential
///
/// A `Token` is ephemeral: it exists only while a rotation is being performed
/// and while its fields are rendered into response headers. The plaintext
/// secret lives here and nowhere else.
///
/// # Fields
///
/// * `client_id` - stable per-device identifier; generated once per device
///   and carried across rotations unless explicitly reset
/// * `secret` - the bearer credential; regenerated on every rotation
/// * `expiry` - absolute expiry, creation time + configured lifespan
#[derive(Debug, Clone)]
pub struct Token {
    client_id: String,
    secret: String,
    expiry: DateTime<Utc>,
}

impl Token {
    /// Construct a token, generating any omitted field
    ///
    /// # Arguments
    ///
    /// * `client_id` - reuse an existing device id, or `None` for a fresh one
    /// * `lifespan` - configured token lifespan, used to compute the expiry
    pub fn generate(client_id: Option<String>, lifespan: Duration) -> Self {
        Self {
            client_id: client_id.unwrap_or_else(secure_token),
            secret: secure_token(),
            expiry: Utc::now() + lifespan,
        }
    }

    /// The device identifier this token belongs to
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The plaintext bearer secret
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Absolute expiry as epoch seconds
    pub fn expiry_epoch(&self) -> i64 {
        self.expiry.timestamp()
    }

    /// Hash this token into its persisted record form
    ///
    /// # Arguments
    ///
    /// * `previous_hash` - hash of the secret this rotation replaces, kept
    ///   for grace-window validation
    /// * `cost` - bcrypt cost factor
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Hashing` if bcrypt rejects the cost or input.
    pub fn to_record(&self, previous_hash: Option<String>, cost: u32) -> Result<TokenRecord, AuthError> {
        Ok(TokenRecord {
            hash: bcrypt::hash(&self.secret, cost)?,
            expiry: self.expiry_epoch(),
            previous_hash,
            updated_at: Utc::now(),
        })
    }
}

/// Persisted token state for one client id
///
/// Serialized field names match the wire/persisted format:
/// `token` (current hash), `expiry` (epoch seconds), `last_token`
/// (prior hash, nullable) and `updated_at` (RFC 3339).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// bcrypt hash of the current secret
    #[serde(rename = "token")]
    pub hash: String,
    /// Absolute expiry in epoch seconds
    pub expiry: i64,
    /// bcrypt hash of the secret this one replaced, if any
    #[serde(rename = "last_token")]
    pub previous_hash: Option<String>,
    /// Timestamp of the last mutation (rotation or batch-window extension)
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether `updated_at` is still within `batch_window` of `now`
    pub fn within_batch_window(&self, batch_window: Duration, now: DateTime<Utc>) -> bool {
        self.updated_at + batch_window > now
    }
}

/// The principal-owned mapping of client id -> `TokenRecord`
///
/// One entry per logged-in device, unbounded in count. All mutation of a
/// principal's `TokenMap` must happen inside the store's record lock
/// (see `AuthStore::update_tokens`); this type itself is plain data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenMap {
    records: HashMap<String, TokenRecord>,
}

impl TokenMap {
    /// Create an empty token map
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the record for a client id
    pub fn current_record(&self, client_id: &str) -> Option<&TokenRecord> {
        self.records.get(client_id)
    }

    /// Insert or replace the record for a client id
    ///
    /// Records for other client ids are preserved.
    pub fn set_record(&mut self, client_id: impl Into<String>, record: TokenRecord) {
        self.records.insert(client_id.into(), record);
    }

    /// Remove the record for a client id (sign-out)
    ///
    /// Returns the removed record, or `None` if the client id was unknown.
    pub fn remove_record(&mut self, client_id: &str) -> Option<TokenRecord> {
        self.records.remove(client_id)
    }

    /// Number of device records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no device is logged in
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Validate a presented secret against stored state
    ///
    /// # Algorithm
    ///
    /// 1. No record for `client_id` -> invalid
    /// 2. Current path: valid if the record has not expired and the bcrypt
    ///    hash matches the presented secret
    /// 3. Reuse path (only when step 2 fails): valid if a previous hash is
    ///    stored, the record was updated within `batch_window` of `now`, and
    ///    the previous hash matches - tolerates requests racing a rotation
    /// 4. Otherwise invalid
    ///
    /// Validation failure is a local decision, never an error; a malformed
    /// stored hash is logged and treated as a mismatch.
    pub fn valid_token(
        &self,
        presented: &str,
        client_id: &str,
        batch_window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(record) = self.records.get(client_id) else {
            return false;
        };

        if record.expiry > now.timestamp() && hashes_match(&record.hash, presented) {
            return true;
        }

        if let Some(previous_hash) = &record.previous_hash {
            if record.within_batch_window(batch_window, now) && hashes_match(previous_hash, presented) {
                tracing::debug!(client_id, "accepted previous token inside batch window");
                return true;
            }
        }

        false
    }

    /// Mint a new token for a client id, retiring the current hash
    ///
    /// Generates a fresh secret (and a fresh client id when `client_id` is
    /// `None`), moves the current hash - if any - into `last_token`, and
    /// stores the new record. The caller is responsible for persisting the
    /// owning principal inside the record lock.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Hashing` if the new secret cannot be hashed.
    pub fn create_new_auth_token(
        &mut self,
        client_id: Option<String>,
        lifespan: Duration,
        cost: u32,
    ) -> Result<Token, AuthError> {
        let token = Token::generate(client_id, lifespan);
        let previous_hash = self
            .records
            .get(token.client_id())
            .map(|record| record.hash.clone());
        let record = token.to_record(previous_hash, cost)?;
        self.records.insert(token.client_id().to_string(), record);
        Ok(token)
    }

    /// Refresh `updated_at` on an existing record without rotating
    ///
    /// Used for batch-window extensions and when per-request rotation is
    /// disabled: the secret, hash and expiry are untouched, only the
    /// update timestamp moves. Returns the record's expiry for header
    /// rendering, or `None` if the client id has no record.
    pub fn extend_batch_buffer(&mut self, client_id: &str, now: DateTime<Utc>) -> Option<i64> {
        let record = self.records.get_mut(client_id)?;
        record.updated_at = now;
        Some(record.expiry)
    }
}

fn hashes_match(hash: &str, presented: &str) -> bool {
    bcrypt::verify(presented, hash).unwrap_or_else(|e| {
        tracing::warn!("stored token hash could not be verified: {:?}", e);
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const COST: u32 = 4; // bcrypt minimum, tests only
    const LIFESPAN: i64 = 60;
    const WINDOW: i64 = 5;

    fn window() -> Duration {
        Duration::seconds(WINDOW)
    }

    #[test]
    fn test_secure_token_is_url_safe() {
        let token = secure_token();
        assert_eq!(token.len(), 22);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_secure_token_is_unique() {
        assert_ne!(secure_token(), secure_token());
    }

    #[test]
    fn test_generate_reuses_client_id() {
        let token = Token::generate(Some("device-1".to_string()), Duration::seconds(LIFESPAN));
        assert_eq!(token.client_id(), "device-1");
        assert!(token.expiry_epoch() > Utc::now().timestamp());
    }

    #[test]
    fn test_generate_fresh_client_id() {
        let token = Token::generate(None, Duration::seconds(LIFESPAN));
        assert_eq!(token.client_id().len(), 22);
    }

    #[test]
    fn test_valid_immediately_after_mint() {
        let mut map = TokenMap::new();
        let token = map
            .create_new_auth_token(None, Duration::seconds(LIFESPAN), COST)
            .unwrap();

        assert!(map.valid_token(token.secret(), token.client_id(), window(), Utc::now()));
    }

    #[test]
    fn test_unknown_client_id_is_invalid() {
        let mut map = TokenMap::new();
        let token = map
            .create_new_auth_token(None, Duration::seconds(LIFESPAN), COST)
            .unwrap();

        assert!(!map.valid_token(token.secret(), "other-client", window(), Utc::now()));
    }

    #[test]
    fn test_expired_token_rejected_even_with_matching_hash() {
        let mut map = TokenMap::new();
        let token = map
            .create_new_auth_token(None, Duration::seconds(-1), COST)
            .unwrap();

        // Push updated_at outside the window too, so the reuse path cannot fire.
        let mut record = map.current_record(token.client_id()).unwrap().clone();
        record.updated_at = Utc::now() - Duration::seconds(WINDOW + 1);
        map.set_record(token.client_id().to_string(), record);

        assert!(!map.valid_token(token.secret(), token.client_id(), window(), Utc::now()));
    }

    #[test]
    fn test_previous_secret_valid_inside_batch_window() {
        let mut map = TokenMap::new();
        let first = map
            .create_new_auth_token(None, Duration::seconds(LIFESPAN), COST)
            .unwrap();
        let second = map
            .create_new_auth_token(Some(first.client_id().to_string()), Duration::seconds(LIFESPAN), COST)
            .unwrap();

        let now = Utc::now();
        assert!(map.valid_token(second.secret(), second.client_id(), window(), now));
        assert!(map.valid_token(first.secret(), first.client_id(), window(), now));
    }

    #[test]
    fn test_previous_secret_invalid_outside_batch_window() {
        let mut map = TokenMap::new();
        let first = map
            .create_new_auth_token(None, Duration::seconds(LIFESPAN), COST)
            .unwrap();
        let second = map
            .create_new_auth_token(Some(first.client_id().to_string()), Duration::seconds(LIFESPAN), COST)
            .unwrap();

        let after_window = Utc::now() + Duration::seconds(WINDOW + 1);
        assert!(!map.valid_token(first.secret(), first.client_id(), window(), after_window));
        // The current secret has not expired and stays valid.
        assert!(map.valid_token(second.secret(), second.client_id(), window(), after_window));
    }

    #[test]
    fn test_rotation_retires_old_secret_outside_window() {
        let mut map = TokenMap::new();
        let first = map
            .create_new_auth_token(None, Duration::seconds(LIFESPAN), COST)
            .unwrap();

        // Age the rotation so the grace window has elapsed before the second mint.
        let mut record = map.current_record(first.client_id()).unwrap().clone();
        record.updated_at = Utc::now() - Duration::seconds(WINDOW + 10);
        map.set_record(first.client_id().to_string(), record);

        let second = map
            .create_new_auth_token(Some(first.client_id().to_string()), Duration::seconds(LIFESPAN), COST)
            .unwrap();

        let after_window = Utc::now() + Duration::seconds(WINDOW + 1);
        assert!(!map.valid_token(first.secret(), first.client_id(), window(), after_window));
        assert!(map.valid_token(second.secret(), second.client_id(), window(), after_window));
    }

    #[test]
    fn test_remove_record_preserves_other_devices() {
        let mut map = TokenMap::new();
        let phone = map
            .create_new_auth_token(None, Duration::seconds(LIFESPAN), COST)
            .unwrap();
        let laptop = map
            .create_new_auth_token(None, Duration::seconds(LIFESPAN), COST)
            .unwrap();

        assert!(map.remove_record(phone.client_id()).is_some());
        assert!(map.remove_record(phone.client_id()).is_none());
        assert_eq!(map.len(), 1);
        assert!(map.valid_token(laptop.secret(), laptop.client_id(), window(), Utc::now()));
    }

    #[test]
    fn test_extend_batch_buffer_touches_only_updated_at() {
        let mut map = TokenMap::new();
        let token = map
            .create_new_auth_token(None, Duration::seconds(LIFESPAN), COST)
            .unwrap();
        let before = map.current_record(token.client_id()).unwrap().clone();

        let later = Utc::now() + Duration::seconds(2);
        let expiry = map.extend_batch_buffer(token.client_id(), later);

        let after = map.current_record(token.client_id()).unwrap();
        assert_eq!(expiry, Some(before.expiry));
        assert_eq!(after.hash, before.hash);
        assert_eq!(after.expiry, before.expiry);
        assert_eq!(after.updated_at, later);
    }

    #[test]
    fn test_extend_batch_buffer_unknown_client() {
        let mut map = TokenMap::new();
        assert_eq!(map.extend_batch_buffer("nope", Utc::now()), None);
    }

    #[test]
    fn test_record_serializes_with_wire_field_names() {
        let record = TokenRecord {
            hash: "hashed".to_string(),
            expiry: 1_700_000_000,
            previous_hash: None,
            updated_at: Utc::now(),
        };
        let mut map = TokenMap::new();
        map.set_record("device-1", record);

        let json = serde_json::to_value(&map).unwrap();
        let entry = &json["device-1"];
        assert_eq!(entry["token"], "hashed");
        assert_eq!(entry["expiry"], 1_700_000_000);
        assert_eq!(entry["last_token"], serde_json::Value::Null);
        assert!(entry["updated_at"].is_string());

        let parsed: TokenMap = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, map);
    }
}
