/**
 * Authentication Configuration
 *
 * Explicit configuration object injected into the resolver, rotation engine
 * and HTTP layer. There is no ambient global state: construct one
 * `AuthConfig`, wrap it in an `Arc`, and hand it to whatever needs it.
 *
 * # Defaults
 *
 * - token lifespan: 2 weeks
 * - batch window: 5 seconds
 * - per-request header rotation: enabled
 * - bcrypt cost: library default
 *
 * # Scopes
 *
 * The system supports multiple independently configured principal types
 * ("user", "admin", ...). Each scope maps to a resource name, which store
 * adapters interpret as a namespace (memory store) or table name (postgres
 * store). Resolution against an unregistered scope is a hard
 * `ScopeUndefined` error, not a 401.
 */

use std::collections::HashMap;

use chrono::Duration;

use crate::error::AuthError;
use crate::headers::HeaderNames;

/// Per-scope settings
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    /// Resource name backing this scope (namespace key or table name)
    pub resource: String,
}

/// Configuration for the token protocol
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Lifespan of a freshly minted token
    pub token_lifespan: Duration,
    /// Grace period tolerating request races against a rotation
    pub batch_window: Duration,
    /// When false, authenticated requests extend the current token instead
    /// of rotating it
    pub rotate_headers_each_request: bool,
    /// bcrypt cost factor for token and password hashes
    pub hash_cost: u32,
    /// Request/response header names
    pub header_names: HeaderNames,
    scopes: HashMap<String, ScopeConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_lifespan: Duration::weeks(2),
            batch_window: Duration::seconds(5),
            rotate_headers_each_request: true,
            hash_cost: bcrypt::DEFAULT_COST,
            header_names: HeaderNames::default(),
            scopes: HashMap::new(),
        }
    }
}

impl AuthConfig {
    /// Create a configuration with default settings and no scopes
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scope -> resource mapping
    ///
    /// # Example
    ///
    /// ```rust
    /// use rotauth::config::AuthConfig;
    ///
    /// let config = AuthConfig::new()
    ///     .mount_scope("user", "users")
    ///     .mount_scope("admin", "admins");
    /// assert!(config.scope("admin").is_ok());
    /// ```
    pub fn mount_scope(mut self, scope: impl Into<String>, resource: impl Into<String>) -> Self {
        self.scopes.insert(
            scope.into(),
            ScopeConfig {
                resource: resource.into(),
            },
        );
        self
    }

    /// Look up the configuration for a scope
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ScopeUndefined` when the scope was never
    /// registered. This is a configuration fault and is surfaced
    /// immediately, never retried.
    pub fn scope(&self, scope: &str) -> Result<&ScopeConfig, AuthError> {
        self.scopes
            .get(scope)
            .ok_or_else(|| AuthError::scope_undefined(scope))
    }

    /// Registered scope names
    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol() {
        let config = AuthConfig::default();
        assert_eq!(config.token_lifespan, Duration::weeks(2));
        assert_eq!(config.batch_window, Duration::seconds(5));
        assert!(config.rotate_headers_each_request);
    }

    #[test]
    fn test_scope_lookup() {
        let config = AuthConfig::new().mount_scope("user", "users");
        assert_eq!(config.scope("user").unwrap().resource, "users");
    }

    #[test]
    fn test_unknown_scope_is_a_configuration_error() {
        let config = AuthConfig::new();
        let err = config.scope("admin").unwrap_err();
        assert!(matches!(err, AuthError::ScopeUndefined { .. }));
    }
}
