/**
 * Error Conversion
 *
 * `IntoResponse` for `AuthError`, so handlers and middleware can return
 * `Result<_, AuthError>` directly.
 *
 * # Response Format
 *
 * ```json
 * { "error": "unauthorized", "status": 401 }
 * ```
 *
 * Server-side faults (5xx) are logged at error level before the response is
 * built; rejected credentials are only logged at warn level by the call
 * sites that rejected them.
 */

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::types::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "auth pipeline failed: {}", message);
        }

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap_or_else(|_| {
                format!(r#"{{"error":"{}","status":{}}}"#, message, status.as_u16())
            })))
            .unwrap_or_else(|_| {
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Internal Server Error"))
                    .unwrap()
            })
    }
}
