/**
 * Rotation Engine
 *
 * Runs once per completed request, after the handler, and decides what
 * happens to the authenticated principal's device token: mint a new one,
 * extend the current one silently, or leave things alone.
 *
 * # Decision Table (first match wins, evaluated inside the record lock)
 *
 * 1. Request authenticated via a pre-existing session principal, not a
 *    bearer token -> mint a brand-new token with a fresh client id; a new
 *    device/token pair is established
 * 2. Per-request header rotation disabled in configuration -> refresh
 *    `updated_at` on the existing record and echo the unchanged credentials
 * 3. Request started inside the batch window of the record's last update ->
 *    treat as a batched/duplicate request: refresh `updated_at` only, echo
 *    the unchanged credentials; a duplicate mint here would invalidate the
 *    token sibling in-flight requests are still presenting
 * 4. Otherwise -> mint a new token for the same client id, moving the old
 *    hash into `last_token` for grace-window validation
 *
 * The whole read-modify-write runs under `AuthStore::update_tokens`, so two
 * concurrent requests for the same principal+client cannot both mint:
 * whichever acquires the lock second observes the refreshed `updated_at`
 * and takes the batch-window branch.
 */

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::headers::AuthHeaders;
use crate::resolver::RequestAuthContext;
use crate::store::AuthStore;
use crate::token::Token;

/// What the rotation engine decided for a request
#[derive(Debug, Clone, PartialEq)]
pub enum RotationOutcome {
    /// A new secret was minted; headers carry the fresh credentials
    Rotated(AuthHeaders),
    /// The existing secret was kept (batch window or rotation disabled);
    /// headers echo the still-current credentials
    Extended(AuthHeaders),
    /// No principal/client pair was available; nothing to emit
    Skipped,
}

impl RotationOutcome {
    /// The headers to return to the client, if any
    pub fn headers(&self) -> Option<&AuthHeaders> {
        match self {
            Self::Rotated(headers) | Self::Extended(headers) => Some(headers),
            Self::Skipped => None,
        }
    }
}

enum Decision {
    Minted(Token),
    Extended {
        secret: String,
        expiry: i64,
        client_id: String,
    },
}

/// Applies the rotation policy for completed requests
#[derive(Clone)]
pub struct RotationEngine {
    config: Arc<AuthConfig>,
}

impl RotationEngine {
    /// Create an engine over the shared configuration
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }

    /// Rotate or extend the principal's token for one completed request
    ///
    /// # Arguments
    ///
    /// * `store` - the durable store; all mutation happens inside its
    ///   record lock
    /// * `scope` - principal scope of the request
    /// * `uid` - the authenticated principal's public identifier
    /// * `ctx` - the request's credential context (client id, presented
    ///   secret, how it authenticated)
    /// * `request_start` - when the request began; batch-window membership
    ///   is judged against this, not against completion time
    ///
    /// # Errors
    ///
    /// `ScopeUndefined` for an unregistered scope, `Hashing` when a new
    /// secret cannot be hashed, `Persistence` when the store cannot save
    /// the mutated state.
    pub async fn rotate_for_request<S: AuthStore>(
        &self,
        store: &S,
        scope: &str,
        uid: &str,
        ctx: &RequestAuthContext,
        request_start: DateTime<Utc>,
    ) -> Result<RotationOutcome, AuthError> {
        let resource = self.config.scope(scope)?.resource.clone();
        let lifespan = self.config.token_lifespan;
        let batch_window = self.config.batch_window;
        let rotate_each_request = self.config.rotate_headers_each_request;
        let cost = self.config.hash_cost;

        let authed_with_token = ctx.authed_with_token;
        let client_id = ctx.client_id.clone();
        let presented = ctx.token.clone();

        let decision = store
            .update_tokens(&resource, uid, move |tokens| -> Result<Decision, AuthError> {
                if !authed_with_token {
                    // Session-authenticated request: establish a fresh
                    // device/token pair regardless of any prior binding.
                    let token = tokens.create_new_auth_token(None, lifespan, cost)?;
                    return Ok(Decision::Minted(token));
                }

                if !rotate_each_request {
                    if let Some(secret) = presented.as_deref() {
                        if let Some(expiry) = tokens.extend_batch_buffer(&client_id, Utc::now()) {
                            return Ok(Decision::Extended {
                                secret: secret.to_string(),
                                expiry,
                                client_id: client_id.clone(),
                            });
                        }
                    }
                    let token =
                        tokens.create_new_auth_token(Some(client_id.clone()), lifespan, cost)?;
                    return Ok(Decision::Minted(token));
                }

                let in_batch_window = tokens
                    .current_record(&client_id)
                    .is_some_and(|record| record.within_batch_window(batch_window, request_start));

                if in_batch_window {
                    if let Some(secret) = presented.as_deref() {
                        if let Some(expiry) = tokens.extend_batch_buffer(&client_id, Utc::now()) {
                            tracing::debug!(
                                client_id = %client_id,
                                "batched request, duplicate rotation suppressed"
                            );
                            return Ok(Decision::Extended {
                                secret: secret.to_string(),
                                expiry,
                                client_id: client_id.clone(),
                            });
                        }
                    }
                }

                let token = tokens.create_new_auth_token(Some(client_id.clone()), lifespan, cost)?;
                Ok(Decision::Minted(token))
            })
            .await?;

        match decision {
            None => {
                // Principal disappeared between handler and rotation
                // (e.g. account deletion mid-flight).
                tracing::warn!(uid, "principal vanished before rotation, emitting no headers");
                Ok(RotationOutcome::Skipped)
            }
            Some(Ok(Decision::Minted(token))) => {
                tracing::debug!(uid, client_id = token.client_id(), "minted rotated token");
                Ok(RotationOutcome::Rotated(AuthHeaders::from_token(&token, uid)))
            }
            Some(Ok(Decision::Extended {
                secret,
                expiry,
                client_id,
            })) => Ok(RotationOutcome::Extended(AuthHeaders {
                access_token: secret,
                expiry,
                client: client_id,
                uid: uid.to_string(),
            })),
            Some(Err(err)) => Err(err),
        }
    }
}
