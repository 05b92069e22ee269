//! rotauth - Rotating Per-Device Token Authentication
//!
//! A token-based authentication layer for HTTP APIs: per-device, rotating
//! bearer tokens in place of cookie sessions. A fresh secret is issued after
//! each authenticated request (or each batch-window-eligible burst of
//! requests), per-device token state lives on the principal record, and
//! incoming requests are validated against that stored state.
//!
//! # Module Structure
//!
//! - **`token`** - the `Token` value object, persisted `TokenRecord`, and
//!   the principal-owned `TokenMap` with validation and mint/extend
//!   primitives
//! - **`rotation`** - the per-request rotation decision table, executed
//!   inside the store's record lock
//! - **`resolver`** - request credentials -> authenticated principal, with
//!   session-principal precedence and retry-once lookups
//! - **`headers`** - the wire header set and suppression rules
//! - **`config`** - explicit configuration (lifespans, batch window, scope
//!   registry); no ambient global state
//! - **`store`** - the `Principal`/`AuthStore` collaborator contracts plus
//!   in-memory and Postgres adapters
//! - **`http`** - axum middleware, extractor, and session endpoints
//! - **`error`** - error taxonomy and response conversion
//!
//! # Protocol Sketch
//!
//! A request presents `uid`, `client` and `access-token` headers. The
//! resolver loads the principal and validates the secret against the stored
//! bcrypt hash - or, within a short batch window after a rotation, against
//! the immediately prior hash, so parallel requests racing a rotation are
//! not spuriously rejected. After the handler runs, the rotation engine
//! decides under the record lock whether to mint a new secret, silently
//! extend the current one, or establish a fresh device pair, and the
//! response carries the resulting credential headers.
//!
//! # Concurrency
//!
//! Every mutation of a principal's token mapping happens inside
//! `AuthStore::update_tokens`: lock, read, modify, persist, release. Two
//! concurrent rotations for the same principal and device resolve to
//! exactly one mint; the loser observes the refreshed state and takes the
//! batch-window branch, so every client walks away with a secret that still
//! validates.

/// Explicit protocol configuration
pub mod config;

/// Error taxonomy and response conversion
pub mod error;

/// Wire header set and response header builder
pub mod headers;

/// Axum middleware and session endpoints
pub mod http;

/// Credential resolution
pub mod resolver;

/// Per-request rotation policy
pub mod rotation;

/// Store contracts and adapters
pub mod store;

/// Token value object and per-principal token store
pub mod token;

pub use config::{AuthConfig, ScopeConfig};
pub use error::AuthError;
pub use headers::{AuthHeaders, HeaderNames, TOKEN_TYPE};
pub use resolver::{Authenticator, RequestAuthContext, SessionPrincipal, DEFAULT_CLIENT_ID};
pub use rotation::{RotationEngine, RotationOutcome};
pub use store::{AuthStore, Principal};
pub use token::{Token, TokenMap, TokenRecord};
