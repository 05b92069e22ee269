/**
 * Response Header Builder
 *
 * Renders a rotation outcome into the wire header set, and defines the
 * configurable header names shared by request parsing and response
 * rendering.
 *
 * # Wire Format
 *
 * Response headers (default names): `access-token` (plaintext secret, not
 * the hash), `expiry` (epoch seconds), `client` (device id), `token-type`
 * (constant `Bearer`), `uid` (principal's public identifier). All values
 * are serialized as strings.
 *
 * # Suppression
 *
 * No auth headers are emitted when the request explicitly signed out, or
 * when no principal/client pair was available at all.
 */

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::AuthError;
use crate::rotation::RotationOutcome;
use crate::token::Token;

/// The constant `token-type` value
pub const TOKEN_TYPE: &str = "Bearer";

/// Configurable header names for both request and response directions
///
/// Defaults match the wire format: `uid`, `client`, `access-token`,
/// `expiry`, `token-type`.
#[derive(Debug, Clone)]
pub struct HeaderNames {
    /// Principal's public identifier
    pub uid: String,
    /// Device / client identifier
    pub client: String,
    /// Bearer secret
    pub access_token: String,
    /// Absolute expiry, epoch seconds
    pub expiry: String,
    /// Token type constant (response only)
    pub token_type: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            uid: "uid".to_string(),
            client: "client".to_string(),
            access_token: "access-token".to_string(),
            expiry: "expiry".to_string(),
            token_type: "token-type".to_string(),
        }
    }
}

/// The credential set returned to the client after a request
///
/// Carries the plaintext secret; it exists only on the response path and is
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthHeaders {
    /// Plaintext bearer secret
    pub access_token: String,
    /// Absolute expiry, epoch seconds
    pub expiry: i64,
    /// Device identifier
    pub client: String,
    /// Principal's public identifier
    pub uid: String,
}

impl AuthHeaders {
    /// Build the header set from a freshly minted token
    pub fn from_token(token: &Token, uid: impl Into<String>) -> Self {
        Self {
            access_token: token.secret().to_string(),
            expiry: token.expiry_epoch(),
            client: token.client_id().to_string(),
            uid: uid.into(),
        }
    }

    /// Render into an HTTP header map
    ///
    /// # Errors
    ///
    /// Returns `AuthError::HeaderValue` if any value is not a valid HTTP
    /// header value (e.g. a uid containing non-ASCII bytes). The request
    /// fails rather than silently dropping credentials the client needs.
    pub fn to_header_map(&self, names: &HeaderNames) -> Result<HeaderMap, AuthError> {
        let mut headers = HeaderMap::with_capacity(5);
        set(&mut headers, &names.access_token, &self.access_token)?;
        set(&mut headers, &names.expiry, &self.expiry.to_string())?;
        set(&mut headers, &names.client, &self.client)?;
        set(&mut headers, &names.token_type, TOKEN_TYPE)?;
        set(&mut headers, &names.uid, &self.uid)?;
        Ok(headers)
    }
}

fn set(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), AuthError> {
    let name = HeaderName::try_from(name).map_err(|e| AuthError::persistence(e))?;
    headers.insert(name, HeaderValue::from_str(value)?);
    Ok(())
}

/// Render a rotation outcome into response headers
///
/// # Arguments
///
/// * `outcome` - what the rotation engine decided for this request
/// * `suppress` - set when an explicit sign-out happened during the request
/// * `names` - configured header names
///
/// # Emission Rules
///
/// - suppressed -> empty map, even though a principal was in scope
/// - no principal/client pair (`RotationOutcome::Skipped`) -> empty map
/// - rotated -> new-token headers
/// - batch-window extension or rotation disabled -> same-secret headers;
///   the secret is unchanged but the client still receives a complete,
///   valid credential set
pub fn response_headers(
    outcome: &RotationOutcome,
    suppress: bool,
    names: &HeaderNames,
) -> Result<HeaderMap, AuthError> {
    if suppress {
        tracing::debug!("auth headers suppressed for this request");
        return Ok(HeaderMap::new());
    }
    match outcome {
        RotationOutcome::Skipped => Ok(HeaderMap::new()),
        RotationOutcome::Rotated(headers) | RotationOutcome::Extended(headers) => {
            headers.to_header_map(names)
        }
    }
}
