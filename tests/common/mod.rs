//! Shared helpers for the end-to-end pipeline tests
//!
//! Builds a session router over a seeded in-memory store and provides
//! request/response plumbing for driving it through `tower::ServiceExt`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, Response};
use axum::Router;
use chrono::Duration;

use rotauth::config::AuthConfig;
use rotauth::http::{session_router, AuthLayer};
use rotauth::store::memory::{MemoryPrincipal, MemoryStore};
use rotauth::store::AuthStore;

/// bcrypt minimum cost, tests only
pub const COST: u32 = 4;
pub const UID: &str = "a@b.com";
pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub config: Arc<AuthConfig>,
}

/// Initialize test logging once; respects RUST_LOG
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Build a session router over a store seeded with one principal
pub async fn test_app() -> TestApp {
    init_tracing();
    let mut config = AuthConfig::new().mount_scope("user", "users");
    config.hash_cost = COST;
    config.token_lifespan = Duration::seconds(300);
    config.batch_window = Duration::seconds(5);
    let config = Arc::new(config);

    let store = Arc::new(MemoryStore::new());
    store
        .insert(
            "users",
            MemoryPrincipal::with_password(UID, PASSWORD, COST).unwrap(),
        )
        .await;

    let auth = AuthLayer::new(Arc::clone(&store), Arc::clone(&config), "user");
    TestApp {
        app: session_router(auth),
        store,
        config,
    }
}

/// Build a sign-in request with a JSON body
pub fn sign_in_request(uid: &str, password: &str) -> Request<Body> {
    let body = serde_json::json!({ "uid": uid, "password": password });
    Request::builder()
        .method(Method::POST)
        .uri("/auth/sign_in")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Build a request carrying bearer-token credential headers
pub fn authed_request(
    method: Method,
    path: &str,
    creds: &ClientCredentials,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("uid", &creds.uid)
        .header("client", &creds.client)
        .header("access-token", &creds.token)
        .body(Body::empty())
        .unwrap()
}

/// Read a response header as an owned string, if present
pub fn header_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// The credential triple a client retains between requests
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub uid: String,
    pub client: String,
    pub token: String,
}

impl ClientCredentials {
    /// Extract retained credentials from a response's auth headers
    pub fn from_response(response: &Response<Body>) -> Self {
        Self {
            uid: header_value(response, "uid").expect("uid header"),
            client: header_value(response, "client").expect("client header"),
            token: header_value(response, "access-token").expect("access-token header"),
        }
    }

    /// Update the retained token when the response rotated it
    pub fn absorb(&mut self, response: &Response<Body>) {
        if let Some(token) = header_value(response, "access-token") {
            self.token = token;
        }
    }
}

/// Push the stored record's updated_at into the past, so the next request
/// falls outside the batch window
pub async fn age_token(store: &MemoryStore, client_id: &str, seconds: i64) {
    let client_id = client_id.to_string();
    store
        .update_tokens("users", UID, move |tokens| {
            let mut record = tokens
                .current_record(&client_id)
                .expect("record to age")
                .clone();
            record.updated_at = chrono::Utc::now() - Duration::seconds(seconds);
            tokens.set_record(client_id, record);
        })
        .await
        .expect("store update")
        .expect("principal present");
}

/// Force the stored record's expiry into the past
pub async fn expire_token(store: &MemoryStore, client_id: &str) {
    let client_id = client_id.to_string();
    store
        .update_tokens("users", UID, move |tokens| {
            let mut record = tokens
                .current_record(&client_id)
                .expect("record to expire")
                .clone();
            record.expiry = chrono::Utc::now().timestamp() - 60;
            record.updated_at = chrono::Utc::now() - Duration::seconds(60);
            tokens.set_record(client_id, record);
        })
        .await
        .expect("store update")
        .expect("principal present");
}
