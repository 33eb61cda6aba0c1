//! In-process mock servers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

use tiny_session::config::SessionConfig;

pub const ANON_KEY: &str = "anon-key";
pub const PASSWORD: &str = "correct horse";
/// Storage key the client derives from `http://127.0.0.1:<port>`.
pub const SESSION_KEY: &str = "sb-127-auth-token";

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// =============================================================================
// GOTRUE
// =============================================================================

#[derive(Default)]
pub struct GoTrueState {
    pub require_confirmation: Mutex<bool>,
    pub fail_with_500: Mutex<bool>,
    pub valid_refresh_tokens: Mutex<Vec<String>>,
    pub token_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
}

impl GoTrueState {
    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct MockGoTrue {
    pub url: String,
    pub state: Arc<GoTrueState>,
    pub dir: TempDir,
}

impl MockGoTrue {
    pub async fn start() -> Self {
        let state = Arc::new(GoTrueState::default());
        let router = Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/signup", post(signup))
            .route("/auth/v1/logout", post(logout))
            .with_state(Arc::clone(&state));
        let url = serve(router).await;
        Self { url, state, dir: TempDir::new().unwrap() }
    }

    /// Delegated-mode config pointing at this server with storage in a temp dir.
    pub fn config(&self) -> SessionConfig {
        let vars = HashMap::from([
            ("SUPABASE_URL", self.url.clone()),
            ("SUPABASE_ANON_KEY", ANON_KEY.to_string()),
            ("SESSION_STORAGE_DIR", self.dir.path().display().to_string()),
        ]);
        SessionConfig::from_lookup(|key| vars.get(key).cloned())
    }
}

fn token_body(email: &str, refresh_token: &str) -> Value {
    json!({
        "access_token": format!("access-{email}"),
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": refresh_token,
        "user": {
            "id": format!("uid-{email}"),
            "email": email,
            "user_metadata": { "full_name": "Remote Person" }
        }
    })
}

fn rejected(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant", "error_description": message })))
}

async fn token(
    State(state): State<Arc<GoTrueState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(ANON_KEY) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "No API key found in request" })));
    }
    if *state.fail_with_500.lock().unwrap() {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "msg": "database unavailable" })));
    }

    match query.get("grant_type").map(String::as_str) {
        Some("password") => {
            state.token_calls.fetch_add(1, Ordering::SeqCst);
            let email = body["email"].as_str().unwrap_or_default();
            if body["password"].as_str() != Some(PASSWORD) {
                return rejected("Invalid login credentials");
            }
            let refresh = format!("refresh-{email}");
            state.valid_refresh_tokens.lock().unwrap().push(refresh.clone());
            (StatusCode::OK, Json(token_body(email, &refresh)))
        }
        Some("refresh_token") => {
            state.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let presented = body["refresh_token"].as_str().unwrap_or_default().to_string();
            let mut valid = state.valid_refresh_tokens.lock().unwrap();
            if !valid.contains(&presented) {
                return rejected("Invalid Refresh Token: Refresh Token Not Found");
            }
            // Rotation revokes the presented token.
            valid.retain(|t| t != &presented);
            let rotated = format!("{presented}-next");
            valid.push(rotated.clone());
            (StatusCode::OK, Json(token_body("refreshed@example.com", &rotated)))
        }
        _ => (StatusCode::BAD_REQUEST, Json(json!({ "error": "unsupported_grant_type" }))),
    }
}

async fn signup(State(state): State<Arc<GoTrueState>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let email = body["email"].as_str().unwrap_or_default();
    if *state.require_confirmation.lock().unwrap() {
        return (
            StatusCode::OK,
            Json(json!({
                "id": format!("uid-{email}"),
                "email": email,
                "user_metadata": { "full_name": body["data"]["full_name"] }
            })),
        );
    }
    let refresh = format!("refresh-{email}");
    state.valid_refresh_tokens.lock().unwrap().push(refresh.clone());
    (StatusCode::OK, Json(token_body(email, &refresh)))
}

async fn logout(State(state): State<Arc<GoTrueState>>, headers: HeaderMap) -> StatusCode {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(bearer) if bearer.starts_with("Bearer access-") => StatusCode::NO_CONTENT,
        _ => StatusCode::UNAUTHORIZED,
    }
}

// =============================================================================
// POSTS
// =============================================================================

#[derive(Default)]
pub struct PostsState {
    pub list_calls: AtomicUsize,
    pub flaky_list_failures: AtomicUsize,
}

pub struct MockPosts {
    pub url: String,
    pub state: Arc<PostsState>,
}

impl MockPosts {
    pub async fn start() -> Self {
        let state = Arc::new(PostsState::default());
        let router = Router::new()
            .route("/posts", get(list_posts).post(create_post))
            .route("/posts/{id}", get(get_post))
            .with_state(Arc::clone(&state));
        let url = serve(router).await;
        Self { url, state }
    }
}

fn post_json(id: u64) -> Value {
    json!({ "userId": 1, "id": id, "title": format!("title {id}"), "body": format!("body {id}") })
}

async fn list_posts(State(state): State<Arc<PostsState>>) -> (StatusCode, Json<Value>) {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    let remaining = state.flaky_list_failures.load(Ordering::SeqCst);
    if remaining > 0 {
        state.flaky_list_failures.store(remaining - 1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
    }
    (StatusCode::OK, Json(Value::Array((1..=3).map(post_json).collect())))
}

async fn get_post(Path(id): Path<u64>) -> (StatusCode, Json<Value>) {
    if (1..=3).contains(&id) {
        (StatusCode::OK, Json(post_json(id)))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({})))
    }
}

async fn create_post(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut created = body;
    created["id"] = json!(101);
    (StatusCode::CREATED, Json(created))
}
