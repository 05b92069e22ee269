//! Error Types Module
//!
//! Error taxonomy for the token authentication pipeline plus the axum
//! response conversion.
//!
//! - **`types`** - the `AuthError` enum and status-code mapping
//! - **`conversion`** - `IntoResponse` so errors flow out of handlers

pub mod conversion;
pub mod types;

pub use types::AuthError;
