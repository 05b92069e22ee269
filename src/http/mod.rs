//! HTTP Integration Module
//!
//! Axum glue around the token protocol core.
//!
//! - **`middleware`** - `AuthLayer`, the `require_token_auth` middleware,
//!   the `CurrentPrincipal` extractor and header suppression marker
//! - **`session`** - sign-in / sign-out / validate-token handlers
//!
//! # Wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rotauth::config::AuthConfig;
//! use rotauth::http::{session_router, AuthLayer};
//! use rotauth::store::memory::MemoryStore;
//!
//! let config = Arc::new(AuthConfig::new().mount_scope("user", "users"));
//! let store = Arc::new(MemoryStore::new());
//! let auth = AuthLayer::new(store, config, "user");
//! let app: axum::Router = session_router(auth);
//! ```
//!
//! Protect application routes by applying the same middleware:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/api/things", get(list_things))
//!     .route_layer(middleware::from_fn_with_state(auth.clone(), require_token_auth::<MemoryStore>))
//! ```

pub mod middleware;
pub mod session;

use axum::routing::{delete, get, post};
use axum::Router;

pub use middleware::{require_token_auth, AuthLayer, CurrentPrincipal, SuppressAuthHeaders};
pub use session::{sign_in, sign_out, validate_token, PrincipalResponse, SignInRequest};

use crate::store::AuthStore;

/// Build the session API router for one scope
///
/// Routes:
/// - `POST /auth/sign_in` - public
/// - `DELETE /auth/sign_out` - requires authentication
/// - `GET /auth/validate_token` - requires authentication
pub fn session_router<S: AuthStore>(auth: AuthLayer<S>) -> Router {
    let protected = Router::new()
        .route("/auth/validate_token", get(validate_token::<S>))
        .route("/auth/sign_out", delete(sign_out::<S>))
        .route_layer(axum::middleware::from_fn_with_state(
            auth.clone(),
            require_token_auth::<S>,
        ));

    Router::new()
        .route("/auth/sign_in", post(sign_in::<S>))
        .merge(protected)
        .with_state(auth)
}
