/**
 * Authorization Resolver
 *
 * Resolves a request's credentials to an authenticated principal. Two
 * credential sources are tried in a fixed, documented order:
 *
 * 1. A framework-level session principal, when one was attached to the
 *    request for the expected scope - "existing session wins", no token
 *    check is performed
 * 2. Bearer-token credentials from the request headers (`uid`, `client`,
 *    `access-token`), validated against the principal's stored token state
 *
 * # Failure Semantics
 *
 * Missing or invalid credentials are a local decision (`Ok(None)`), never
 * an error. A transient store failure during the uid lookup is retried
 * exactly once - observed real-world flakiness under concurrent load - and
 * propagates as a hard error on the second failure. Referencing an
 * unconfigured scope is a fatal configuration error.
 */

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::headers::HeaderNames;
use crate::store::{AuthStore, Principal};

/// The client id assumed when the request carries none
pub const DEFAULT_CLIENT_ID: &str = "default";

/// Per-request, transient credential context
///
/// Extracted from request headers before the handler runs, and consulted by
/// the rotation engine and header builder afterwards.
#[derive(Debug, Clone)]
pub struct RequestAuthContext {
    /// Principal's public identifier, if presented
    pub uid: Option<String>,
    /// Device identifier; defaults to `"default"` when absent
    pub client_id: String,
    /// Presented bearer secret, if any
    pub token: Option<String>,
    /// Expiry echoed by the client, informational only
    pub expiry: Option<i64>,
    /// True when this request authenticated via its bearer token rather
    /// than a pre-existing session principal
    pub authed_with_token: bool,
    /// Set when rotation output must not be sent (explicit sign-out)
    pub suppress_headers: bool,
}

impl RequestAuthContext {
    /// Build an empty context (no credentials presented)
    pub fn empty() -> Self {
        Self {
            uid: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            token: None,
            expiry: None,
            authed_with_token: false,
            suppress_headers: false,
        }
    }

    /// Extract credentials from request headers
    pub fn from_headers(headers: &HeaderMap, names: &HeaderNames) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Self {
            uid: get(&names.uid),
            client_id: get(&names.client).unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            token: get(&names.access_token),
            expiry: get(&names.expiry).and_then(|raw| raw.parse().ok()),
            authed_with_token: false,
            suppress_headers: false,
        }
    }

    /// Whether both fields required for a token lookup are present
    pub fn token_prerequisites_present(&self) -> bool {
        self.uid.is_some() && self.token.is_some()
    }
}

/// A principal authenticated upstream by a framework session layer
///
/// Insert one of these into the request extensions (keyed by the concrete
/// principal type) to let a cookie-session or similar layer satisfy
/// authentication without a bearer token. The `scope` tag must match the
/// scope being authenticated or the session principal is ignored.
#[derive(Debug, Clone)]
pub struct SessionPrincipal<P> {
    /// Scope this session was established for
    pub scope: String,
    /// The session's principal
    pub principal: P,
}

/// Resolves request credentials to a principal for one store
pub struct Authenticator<S: AuthStore> {
    store: Arc<S>,
    config: Arc<AuthConfig>,
}

impl<S: AuthStore> Authenticator<S> {
    /// Create a resolver over a store and configuration
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    /// Resolve the request to an authenticated principal, or `None`
    ///
    /// # Arguments
    ///
    /// * `ctx` - per-request credential context; `authed_with_token` is set
    ///   to reflect which source authenticated the request
    /// * `scope` - the principal scope to authenticate against
    /// * `session` - an upstream session principal, if any
    ///
    /// # Errors
    ///
    /// `ScopeUndefined` for an unregistered scope; `Lookup` when the store
    /// failed twice in a row.
    pub async fn authenticate(
        &self,
        ctx: &mut RequestAuthContext,
        scope: &str,
        session: Option<&SessionPrincipal<S::Principal>>,
    ) -> Result<Option<S::Principal>, AuthError> {
        let scope_config = self.config.scope(scope)?;

        if let Some(session) = session {
            if session.scope == scope {
                tracing::debug!(scope, "authenticated from existing session principal");
                ctx.authed_with_token = false;
                return Ok(Some(session.principal.clone()));
            }
        }

        let (Some(uid), Some(secret)) = (ctx.uid.as_deref(), ctx.token.as_deref()) else {
            return Ok(None);
        };

        let Some(principal) = self.find_with_retry(&scope_config.resource, uid).await? else {
            tracing::warn!(scope, uid, "no principal found for presented uid");
            return Ok(None);
        };

        let valid = principal.tokens().valid_token(
            secret,
            &ctx.client_id,
            self.config.batch_window,
            Utc::now(),
        );
        if !valid {
            tracing::warn!(scope, uid, client_id = %ctx.client_id, "presented token failed validation");
            return Ok(None);
        }

        ctx.authed_with_token = true;
        Ok(Some(principal))
    }

    /// Load a principal, retrying one transient store failure
    async fn find_with_retry(
        &self,
        resource: &str,
        uid: &str,
    ) -> Result<Option<S::Principal>, AuthError> {
        match self.store.find_by_uid(resource, uid).await {
            Ok(found) => Ok(found),
            Err(err) if err.is_transient() => {
                tracing::warn!(uid, "principal lookup failed, retrying once: {}", err.message());
                self.store.find_by_uid(resource, uid).await
            }
            Err(err) => Err(err),
        }
    }
}

impl<S: AuthStore> Clone for Authenticator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}
