/**
 * Authentication Error Types
 *
 * This module defines the error taxonomy for the token protocol.
 *
 * # Error Categories
 *
 * - `Unauthorized` - no usable credentials, or validation failed; the only
 *   client-recoverable variant
 * - `ScopeUndefined` - a request referenced a principal scope with no
 *   configured resource mapping; fatal configuration error, never retried
 * - `Lookup` - the durable store failed during a principal read; the
 *   resolver retries this exactly once before propagating
 * - `Persistence` - saving rotated token state failed; fatal, the request
 *   must fail loudly rather than return headers that do not match stored
 *   state
 * - `Hashing` / `HeaderValue` - a minted secret could not be hashed or
 *   rendered; treated like persistence failures
 *
 * Validation failures are local decisions (`Ok(None)` / `false` at the call
 * site) and never surface as errors; everything in this enum terminates the
 * request.
 */

use axum::http::header::InvalidHeaderValue;
use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised by the token authentication pipeline
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials were missing or did not validate
    #[error("unauthorized")]
    Unauthorized,

    /// A scope with no configured resource mapping was used
    #[error("scope `{scope}` has no configured resource mapping")]
    ScopeUndefined {
        /// The scope that was requested
        scope: String,
    },

    /// The durable store failed while loading a principal
    #[error("principal lookup failed: {message}")]
    Lookup {
        /// Underlying store error, rendered
        message: String,
    },

    /// Rotated token state could not be saved
    #[error("failed to persist token state: {message}")]
    Persistence {
        /// Underlying store error, rendered
        message: String,
    },

    /// bcrypt failed to hash or verify a secret
    #[error("secret hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    /// A rotated credential could not be rendered as an HTTP header value
    #[error("auth header value is invalid: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),
}

impl AuthError {
    /// Create a scope configuration error
    pub fn scope_undefined(scope: impl Into<String>) -> Self {
        Self::ScopeUndefined { scope: scope.into() }
    }

    /// Create a lookup error from any displayable store error
    pub fn lookup(err: impl std::fmt::Display) -> Self {
        Self::Lookup {
            message: err.to_string(),
        }
    }

    /// Create a persistence error from any displayable store error
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }

    /// The HTTP status code this error maps to
    ///
    /// # Status Code Mapping
    ///
    /// - `Unauthorized` - 401 Unauthorized
    /// - everything else - 500 Internal Server Error; these are server-side
    ///   configuration or storage faults, never the client's doing
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ScopeUndefined { .. }
            | Self::Lookup { .. }
            | Self::Persistence { .. }
            | Self::Hashing(_)
            | Self::HeaderValue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable error message
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the resolver may retry the failed operation once
    ///
    /// Only transient store reads qualify; configuration and persistence
    /// errors propagate immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_undefined_names_the_scope() {
        let error = AuthError::scope_undefined("admin");
        assert!(error.message().contains("admin"));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.is_transient());
    }

    #[test]
    fn test_unauthorized_status() {
        assert_eq!(AuthError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_lookup_is_transient() {
        let error = AuthError::lookup("connection reset");
        assert!(error.is_transient());
        assert!(error.message().contains("connection reset"));
    }

    #[test]
    fn test_persistence_is_not_transient() {
        let error = AuthError::persistence("commit failed");
        assert!(!error.is_transient());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
