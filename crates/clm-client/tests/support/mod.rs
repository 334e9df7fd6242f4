//! Local mock of the CLM backend for client tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use clm_auth::{MemoryTokenStore, Session};
use clm_client::{ApiClient, ClientConfig};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "correct-horse";
pub const ISSUED_ACCESS: &str = "at_issued";
pub const ISSUED_REFRESH: &str = "rt_issued";
pub const REFRESHED_ACCESS: &str = "at_refreshed";
pub const GOOD_REFRESH: &str = "rt_good";
/// Registrations for this address wait for email verification.
pub const PENDING_EMAIL: &str = "pending@example.com";
pub const GOOD_OTP: &str = "123456";
pub const GOOGLE_CREDENTIAL: &str = "google-id-token";

#[derive(Default)]
pub struct Backend {
    /// Access token the protected routes accept.
    pub valid_access: Mutex<Option<String>>,
    /// Whether a successful refresh makes the new token acceptable.
    pub refresh_validates: Mutex<bool>,
    pub refresh_calls: AtomicUsize,
    pub contract_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    /// `Authorization` header of every protected request, in arrival order.
    pub seen_auth: Mutex<Vec<Option<String>>>,
    /// Raw request paths, before percent-decoding.
    pub raw_paths: Mutex<Vec<String>>,
    pub seen_queries: Mutex<Vec<String>>,
    pub seen_bodies: Mutex<Vec<Value>>,
}

impl Backend {
    pub fn accepting(token: &str) -> Arc<Self> {
        let backend = Self::default();
        *backend.valid_access.lock().unwrap() = Some(token.to_string());
        *backend.refresh_validates.lock().unwrap() = true;
        Arc::new(backend)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn contract_calls(&self) -> usize {
        self.contract_calls.load(Ordering::SeqCst)
    }

    pub fn last_auth(&self) -> Option<String> {
        self.seen_auth.lock().unwrap().last().cloned().flatten()
    }

    fn record_auth(&self, headers: &HeaderMap) -> Option<String> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.seen_auth.lock().unwrap().push(auth.clone());
        auth
    }

    fn authorize(&self, headers: &HeaderMap) -> bool {
        let auth = self.record_auth(headers);
        let valid = self.valid_access.lock().unwrap().clone();
        matches!((auth, valid), (Some(a), Some(v)) if a == format!("Bearer {v}"))
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Given token not valid for any token type"})),
    )
        .into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    match (body["email"].as_str(), body["password"].as_str()) {
        (Some(EMAIL), Some(PASSWORD)) => Json(json!({
            "access": ISSUED_ACCESS,
            "refresh": ISSUED_REFRESH,
            "user": {"id": 7, "email": EMAIL, "full_name": "Ada Lovelace"}
        }))
        .into_response(),
        (_, Some("unauthorized")) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid credentials"})),
        )
            .into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Invalid credentials"})),
        )
            .into_response(),
    }
}

fn issued_for(email: &str, full_name: &str) -> Response {
    Json(json!({
        "access": ISSUED_ACCESS,
        "refresh": ISSUED_REFRESH,
        "user": {"id": 8, "email": email, "full_name": full_name}
    }))
    .into_response()
}

async fn register(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record_auth(&headers);
    backend.seen_bodies.lock().unwrap().push(body.clone());
    match body["email"].as_str() {
        Some(PENDING_EMAIL) => (
            StatusCode::CREATED,
            Json(json!({"detail": "Verification code sent", "email": PENDING_EMAIL})),
        )
            .into_response(),
        Some(email) => issued_for(email, body["full_name"].as_str().unwrap_or("")),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"email": ["This field is required."]})),
        )
            .into_response(),
    }
}

async fn verify_email_otp(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record_auth(&headers);
    match (body["email"].as_str(), body["otp"].as_str()) {
        (Some(email), Some(GOOD_OTP)) => issued_for(email, "Grace Hopper"),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Invalid or expired code"})),
        )
            .into_response(),
    }
}

async fn google(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.record_auth(&headers);
    if body["credential"] != GOOGLE_CREDENTIAL {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid Google credential"})),
        )
            .into_response();
    }
    issued_for("ada@gmail.example", "Ada Lovelace")
}

async fn refresh(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    // Give concurrent callers time to pile up behind the refresh lock.
    tokio::time::sleep(Duration::from_millis(20)).await;
    if body["refresh"] != GOOD_REFRESH {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired"})),
        )
            .into_response();
    }
    if *backend.refresh_validates.lock().unwrap() {
        *backend.valid_access.lock().unwrap() = Some(REFRESHED_ACCESS.to_string());
    }
    Json(json!({"access": REFRESHED_ACCESS})).into_response()
}

async fn contracts(State(backend): State<Arc<Backend>>, uri: Uri, headers: HeaderMap) -> Response {
    backend.contract_calls.fetch_add(1, Ordering::SeqCst);
    backend
        .seen_queries
        .lock()
        .unwrap()
        .push(uri.query().unwrap_or("").to_string());
    if !backend.authorize(&headers) {
        return unauthorized();
    }
    Json(json!([
        {"id": 1, "title": "Mutual NDA", "status": "draft", "created_at": "2025-01-01", "updated_at": "2025-01-02"},
        {"id": "c-2", "title": "MSA", "status": "approved", "created_at": "2025-01-03", "updated_at": "2025-01-04"}
    ]))
    .into_response()
}

async fn delete_contract(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !backend.authorize(&headers) {
        return unauthorized();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn statistics(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !backend.authorize(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        "{\"total\": 4,",
    )
        .into_response()
}

async fn approval(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !backend.authorize(&headers) {
        return unauthorized();
    }
    backend.seen_bodies.lock().unwrap().push(body.clone());
    Json(json!({
        "id": id,
        "entity_type": "contract",
        "entity_id": "c-2",
        "requester_id": 3,
        "status": body["status"],
        "comment": body["comment"],
        "created_at": "2025-01-05",
        "updated_at": "2025-01-06"
    }))
    .into_response()
}

async fn template_content(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    uri: Uri,
    Path(filename): Path<String>,
) -> Response {
    backend.raw_paths.lock().unwrap().push(uri.path().to_string());
    if !backend.authorize(&headers) {
        return unauthorized();
    }
    Json(json!({
        "filename": filename,
        "name": "My Template",
        "template_type": "NDA",
        "content": "This NDA is between {{ party_a }} and {{party_b}}.",
        "size": 49
    }))
    .into_response()
}

async fn health(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.record_auth(&headers);
    Json(json!({"status": "ok"})).into_response()
}

async fn report(State(backend): State<Arc<Backend>>, headers: HeaderMap, uri: Uri) -> Response {
    if !backend.authorize(&headers) {
        return unauthorized();
    }
    backend
        .seen_queries
        .lock()
        .unwrap()
        .push(uri.query().unwrap_or("").to_string());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/pdf")],
        Bytes::from_static(b"%PDF-1.7 report"),
    )
        .into_response()
}

fn data(frame: &str) -> Result<Bytes, Infallible> {
    Ok(Bytes::from(format!("data: {frame}\n\n")))
}

fn raw(chunk: &'static str) -> Result<Bytes, Infallible> {
    Ok(Bytes::from_static(chunk.as_bytes()))
}

/// Prompts select the stream's behavior:
/// `refuse` (429 before streaming), `hang` (two deltas, then silence),
/// `fail` (a delta, then an error frame), `eof` (two deltas, no done frame);
/// anything else streams "Hello, world!" and a done frame.
async fn generate_stream(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.stream_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorize(&headers) {
        return unauthorized();
    }

    let hello = || {
        vec![
            data(r#"{"type":"delta","delta":"Hello, "}"#),
            raw(": ping\n\n"),
            data(r#"{"type":"delta","delta":"world"}"#),
        ]
    };
    let frames = match body["prompt"].as_str().unwrap_or("") {
        "refuse" => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"message": "AI quota exhausted"})),
            )
                .into_response();
        }
        "hang" => {
            let body = futures_util::stream::iter(hello()).chain(futures_util::stream::pending());
            return sse_response(Body::from_stream(body));
        }
        "fail" => vec![
            data(r#"{"type":"delta","delta":"Hello, "}"#),
            data(r#"{"type":"error","error":"model overloaded"}"#),
            data(r#"{"type":"delta","delta":"never seen"}"#),
        ],
        "eof" => hello(),
        _ => {
            let mut frames = hello();
            frames.push(data(r#"{"type":"usage","tokens":3}"#));
            frames.push(raw("event: delta\ndata: !\n\n"));
            frames.push(data(r#"{"type":"done"}"#));
            frames.push(data(r#"{"type":"delta","delta":"after done"}"#));
            frames
        }
    };
    sse_response(Body::from_stream(futures_util::stream::iter(frames)))
}

fn sse_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}

/// Start the mock backend; returns its base URL.
pub async fn start(backend: Arc<Backend>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let app = axum::Router::new()
        .route("/api/auth/login/", post(login))
        .route("/api/auth/token/refresh/", post(refresh))
        .route("/api/auth/register/", post(register))
        .route("/api/auth/verify-email-otp/", post(verify_email_otp))
        .route("/api/auth/google/", post(google))
        .route("/api/v1/contracts/", get(contracts))
        .route("/api/v1/contracts/recent/", get(contracts))
        .route("/api/v1/contracts/statistics/", get(statistics))
        .route("/api/v1/contracts/{id}/", axum::routing::delete(delete_contract))
        .route("/api/v1/approvals/{id}/", axum::routing::put(approval))
        .route("/api/v1/templates/files/content/{filename}/", get(template_content))
        .route("/api/v1/review-contracts/{id}/report/", get(report))
        .route("/api/v1/templates/ai/generate/stream/", post(generate_stream))
        .route("/api/v1/health/", get(health))
        .with_state(backend);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    url
}

pub fn session_with(access: Option<&str>, refresh: Option<&str>) -> Session {
    let store = match access {
        Some(access) => MemoryTokenStore::with_tokens(access, refresh),
        None => MemoryTokenStore::new(),
    };
    Session::new(Arc::new(store))
}

pub fn client(base_url: &str, session: Session) -> ApiClient {
    ApiClient::new(ClientConfig::new(base_url).unwrap(), session).unwrap()
}

/// JWT whose `exp` is `secs_from_now` seconds away.
pub fn jwt_expiring_in(secs_from_now: i64) -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let now = clm_auth::unix_now_secs() as i64;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, now + secs_from_now));
    format!("{header}.{payload}.sig")
}
