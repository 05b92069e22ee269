/**
 * Session Endpoints
 *
 * The boundary surface of the token protocol:
 *
 * - `POST /sign_in` - password authentication; mints a fresh device token
 * - `DELETE /sign_out` - removes the presented device's token record and
 *   suppresses response auth headers
 * - `GET /validate_token` - authenticated no-op; exercises the full
 *   resolve -> rotate -> headers pipeline
 *
 * # Security
 *
 * - Passwords are verified with bcrypt (constant-time comparison)
 * - Unknown uid and wrong password return the same 401 body, so the
 *   endpoint cannot be used to enumerate accounts
 * - Secrets are never logged
 */

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::headers::AuthHeaders;
use crate::http::middleware::{AuthLayer, CurrentPrincipal, SuppressAuthHeaders};
use crate::resolver::RequestAuthContext;
use crate::store::{AuthStore, Principal};

/// Sign-in request body
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    /// Principal's public identifier
    pub uid: String,
    /// Plaintext password
    pub password: String,
}

/// Body returned by authenticated endpoints
#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    /// The authenticated principal's public identifier
    pub uid: String,
}

/// Sign-in handler
///
/// Verifies the password and mints a fresh device token (fresh random
/// client id) under the record lock. Responds 200 with the full auth
/// header set and the principal body.
///
/// # Errors
///
/// * `401 Unauthorized` - unknown uid or wrong password, indistinguishable
/// * `500 Internal Server Error` - store or hashing failure
pub async fn sign_in<S: AuthStore>(
    State(auth): State<AuthLayer<S>>,
    Json(request): Json<SignInRequest>,
) -> Result<Response, AuthError> {
    let resource = auth.config.scope(&auth.scope)?.resource.clone();

    let principal = auth
        .store
        .find_by_uid(&resource, &request.uid)
        .await?
        .ok_or_else(|| {
            tracing::warn!(uid = %request.uid, "sign-in for unknown uid");
            AuthError::Unauthorized
        })?;

    if !principal.valid_password(&request.password) {
        tracing::warn!(uid = %request.uid, "sign-in with invalid password");
        return Err(AuthError::Unauthorized);
    }

    let lifespan = auth.config.token_lifespan;
    let cost = auth.config.hash_cost;
    let token = auth
        .store
        .update_tokens(&resource, &request.uid, move |tokens| {
            tokens.create_new_auth_token(None, lifespan, cost)
        })
        .await?
        .ok_or(AuthError::Unauthorized)??;

    tracing::info!(uid = %request.uid, client_id = token.client_id(), "signed in");

    let headers =
        AuthHeaders::from_token(&token, principal.uid()).to_header_map(&auth.config.header_names)?;
    let mut response = (
        StatusCode::OK,
        Json(PrincipalResponse {
            uid: principal.uid().to_string(),
        }),
    )
        .into_response();
    response.headers_mut().extend(headers);
    Ok(response)
}

/// Sign-out handler
///
/// Removes the presented client id's token record under the record lock
/// and marks the response so no auth headers are emitted for this request.
/// Responds 404 when the device had no record to remove.
pub async fn sign_out<S: AuthStore>(
    State(auth): State<AuthLayer<S>>,
    CurrentPrincipal(principal): CurrentPrincipal<S::Principal>,
    Extension(ctx): Extension<RequestAuthContext>,
) -> Result<Response, AuthError> {
    let resource = auth.config.scope(&auth.scope)?.resource.clone();
    let client_id = ctx.client_id.clone();

    let removed = auth
        .store
        .update_tokens(&resource, principal.uid(), move |tokens| {
            tokens.remove_record(&client_id).is_some()
        })
        .await?
        .unwrap_or(false);

    let status = if removed {
        tracing::info!(uid = principal.uid(), client_id = %ctx.client_id, "signed out");
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    let mut response = (status, Json(serde_json::json!({ "success": removed }))).into_response();
    response.extensions_mut().insert(SuppressAuthHeaders);
    Ok(response)
}

/// Token validation handler
///
/// An authenticated no-op: reaching it proves the presented credentials
/// resolved, and the middleware's rotation pass attaches refreshed headers
/// on the way out.
pub async fn validate_token<S: AuthStore>(
    CurrentPrincipal(principal): CurrentPrincipal<S::Principal>,
) -> Json<PrincipalResponse> {
    Json(PrincipalResponse {
        uid: principal.uid().to_string(),
    })
}
