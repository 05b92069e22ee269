/**
 * Token Authentication Middleware
 *
 * Axum middleware wrapping protected routes. Per request it:
 *
 * 1. Extracts the credential context from the request headers
 * 2. Resolves the principal - an upstream session principal for the scope
 *    wins; otherwise the bearer-token path runs
 * 3. Rejects with 401 when no principal resolves
 * 4. Attaches `CurrentPrincipal` and the `RequestAuthContext` to request
 *    extensions for handlers
 * 5. After the handler, runs the rotation engine and appends the response
 *    auth headers - unless the handler suppressed them (sign-out)
 */

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::headers::response_headers;
use crate::resolver::{Authenticator, RequestAuthContext, SessionPrincipal};
use crate::rotation::RotationEngine;
use crate::store::{AuthStore, Principal};

/// Shared state for the authentication layer of one scope
///
/// Cheap to clone; holds the store, the configuration and the scope name.
pub struct AuthLayer<S: AuthStore> {
    /// The durable principal store
    pub store: Arc<S>,
    /// Protocol configuration
    pub config: Arc<AuthConfig>,
    /// The principal scope this layer authenticates
    pub scope: String,
}

impl<S: AuthStore> AuthLayer<S> {
    /// Create an authentication layer for one scope
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>, scope: impl Into<String>) -> Self {
        Self {
            store,
            config,
            scope: scope.into(),
        }
    }

    /// Build the resolver for this layer
    pub fn authenticator(&self) -> Authenticator<S> {
        Authenticator::new(Arc::clone(&self.store), Arc::clone(&self.config))
    }

    /// Build the rotation engine for this layer
    pub fn rotation_engine(&self) -> RotationEngine {
        RotationEngine::new(Arc::clone(&self.config))
    }
}

impl<S: AuthStore> Clone for AuthLayer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            scope: self.scope.clone(),
        }
    }
}

/// The authenticated principal, attached to request extensions
///
/// Usable directly as an extractor in handlers behind `require_token_auth`:
///
/// ```rust,ignore
/// async fn me(CurrentPrincipal(user): CurrentPrincipal<MemoryPrincipal>) -> String {
///     user.uid().to_string()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentPrincipal<P>(pub P);

impl<St, P> FromRequestParts<St> for CurrentPrincipal<P>
where
    P: Clone + Send + Sync + 'static,
    St: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentPrincipal<P>>()
            .cloned()
            .ok_or_else(|| {
                tracing::warn!("CurrentPrincipal missing from request extensions");
                AuthError::Unauthorized
            })
    }
}

/// Response extension marking that auth headers must not be emitted
///
/// Inserted by the sign-out handler; the middleware checks for it before
/// running the rotation engine.
#[derive(Debug, Clone, Copy)]
pub struct SuppressAuthHeaders;

/// Middleware requiring an authenticated principal for the wrapped routes
///
/// # Errors
///
/// `Unauthorized` (401) when no credential source yields a principal;
/// resolver and rotation hard errors (500) propagate unchanged.
pub async fn require_token_auth<S: AuthStore>(
    State(auth): State<AuthLayer<S>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let request_start = Utc::now();
    let mut ctx = RequestAuthContext::from_headers(request.headers(), &auth.config.header_names);
    let session = request
        .extensions()
        .get::<SessionPrincipal<S::Principal>>()
        .cloned();

    let principal = auth
        .authenticator()
        .authenticate(&mut ctx, &auth.scope, session.as_ref())
        .await?
        .ok_or(AuthError::Unauthorized)?;

    let uid = principal.uid().to_string();
    request.extensions_mut().insert(CurrentPrincipal(principal));
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;

    let suppress =
        ctx.suppress_headers || response.extensions().get::<SuppressAuthHeaders>().is_some();
    if suppress {
        return Ok(response);
    }

    let outcome = auth
        .rotation_engine()
        .rotate_for_request(&*auth.store, &auth.scope, &uid, &ctx, request_start)
        .await?;
    let headers = response_headers(&outcome, false, &auth.config.header_names)?;
    response.headers_mut().extend(headers);
    Ok(response)
}
