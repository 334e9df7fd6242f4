//! API gateway client core
//!
//! Every capability method builds a `RequestDescriptor` and hands it to
//! `ApiClient::send`, which:
//!
//! 1. resynchronizes the in-memory credential pair if a session event arrived
//! 2. refreshes proactively when the access token expires within 60s
//! 3. sends with `Content-Type: application/json`, the bearer header when a
//!    token is held, and a JSON body only for POST/PUT/PATCH
//! 4. on 401, refreshes once (concurrent 401s share one refresh) and retries
//!    the request exactly once; if that is impossible the session is expired
//!    and the `Unauthorized` envelope is returned
//! 5. folds the outcome into an `ApiResponse`
//!
//! Anonymous requests (sign-in flows) skip steps 1, 2 and 4: their 401 is an
//! ordinary application error and the token store is left alone.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use bytes::Bytes;
use clm_auth::{
    AuthTokens, CredentialPair, REFRESH_PATH, REFRESH_THRESHOLD_SECS, Session, SessionEvent,
    expires_within, refresh_access_token, unix_now_secs,
};
use common::Secret;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::envelope::{
    self, ApiFailure, ApiResponse, FailureKind, UNAUTHORIZED_MESSAGE, status_is_success,
};
use crate::error::{Error, Result};
use crate::metrics::{RefreshOutcome, record_refresh, record_request};

/// Whether a request carries the session's bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Bearer,
    /// Sign-in flows: no bearer header, no session recovery.
    Anonymous,
}

/// Per-call request value. Built by capability methods, never persisted.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    body: Option<Value>,
    encode_error: Option<String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    auth: Auth,
    streaming: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            encode_error: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
            auth: Auth::Bearer,
            streaming: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// JSON body. Ignored when sent with GET or DELETE.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = Some(value),
            Err(e) => self.encode_error = Some(format!("request body could not be encoded: {e}")),
        }
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn params(mut self, params: &ListParams) -> Self {
        self.query.extend(params.pairs.iter().cloned());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.auth = Auth::Anonymous;
        self
    }

    /// Exempt from the per-request timeout; the body is read incrementally.
    pub(crate) fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn auth(&self) -> Auth {
        self.auth
    }
}

/// Query parameters for list endpoints (filters, paging, search).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pairs: Vec<(String, String)>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl ToString) -> Self {
        self.pairs.retain(|(k, _)| k != key);
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn page(self, page: u32) -> Self {
        self.set("page", page)
    }

    pub fn page_size(self, size: u32) -> Self {
        self.set("page_size", size)
    }

    pub fn search(self, term: &str) -> Self {
        self.set("search", term)
    }

    pub fn status(self, status: &str) -> Self {
        self.set("status", status)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Why a request produced no usable response.
#[derive(Debug)]
enum Failure {
    Unauthorized,
    Transport(String),
}

impl Failure {
    fn into_api_failure(self) -> ApiFailure {
        match self {
            Failure::Unauthorized => ApiFailure {
                status: 401,
                kind: FailureKind::Unauthorized,
                message: UNAUTHORIZED_MESSAGE.to_string(),
            },
            Failure::Transport(message) => ApiFailure {
                status: 0,
                kind: FailureKind::Transport,
                message,
            },
        }
    }

    fn into_envelope<T>(self) -> ApiResponse<T> {
        let failure = self.into_api_failure();
        ApiResponse::failure(failure.status, failure.message, failure.kind)
    }
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    session: Session,
    /// Pair loaded from the store; reloaded when a session event arrives.
    credentials: RwLock<Option<CredentialPair>>,
    events: Mutex<broadcast::Receiver<SessionEvent>>,
    /// Serializes refreshes so concurrent 401s trigger a single refresh call.
    refresh_lock: tokio::sync::Mutex<()>,
}

/// Typed client for the CLM backend. Cheap to clone; clones share credentials.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Session) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        // Subscribe before loading so no change between the two is missed.
        let events = session.subscribe();
        let credentials = session.credentials();
        debug!(
            base_url = config.base_url(),
            authenticated = credentials.is_some(),
            "API client created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                session,
                credentials: RwLock::new(credentials),
                events: Mutex::new(events),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Client for the origin named by the environment.
    pub fn from_env(session: Session) -> Result<Self> {
        Self::new(ClientConfig::from_env()?, session)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.resync();
        self.credentials().is_some()
    }

    /// Send a request and decode a 2xx body as `T`.
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4(), method = %req.method, path = %req.path))]
    pub async fn send<T: DeserializeOwned>(&self, req: RequestDescriptor) -> ApiResponse<T> {
        let response = match self.execute(&req).await {
            Ok(response) => response,
            Err(failure) => return failure.into_envelope(),
        };
        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => envelope::from_body(status, &body),
            Err(e) => {
                warn!(status, error = %e, "failed to read response body");
                ApiResponse::failure(
                    status,
                    format!("failed to read response body: {e}"),
                    FailureKind::Transport,
                )
            }
        }
    }

    /// Send a request whose 2xx body is binary (report downloads).
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4(), method = %req.method, path = %req.path))]
    pub async fn send_bytes(&self, req: RequestDescriptor) -> ApiResponse<Bytes> {
        let response = match self.execute(&req).await {
            Ok(response) => response,
            Err(failure) => return failure.into_envelope(),
        };
        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) if status_is_success(status) => ApiResponse::ok(body, status),
            Ok(body) => ApiResponse::failure(
                status,
                envelope::failure_message(&body),
                FailureKind::Application,
            ),
            Err(e) => ApiResponse::failure(
                status,
                format!("failed to read response body: {e}"),
                FailureKind::Transport,
            ),
        }
    }

    /// Open a streaming request. A 2xx response is returned unread; anything
    /// else is reported as an `ApiFailure`.
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4(), path = %req.path))]
    pub async fn open_stream(&self, req: RequestDescriptor) -> std::result::Result<reqwest::Response, ApiFailure> {
        let req = req.streaming();
        let response = self
            .execute(&req)
            .await
            .map_err(Failure::into_api_failure)?;
        let status = response.status().as_u16();
        if status_is_success(status) {
            return Ok(response);
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(ApiFailure {
            status,
            kind: FailureKind::Application,
            message: envelope::failure_message(&body),
        })
    }

    /// Store a token-bearing sign-in response and publish `SignedIn`.
    pub(crate) fn establish(&self, tokens: &AuthTokens) {
        self.inner.session.sign_in(tokens);
        self.reload();
    }

    /// Drop the session after an explicit sign-out.
    pub(crate) fn end_session(&self) {
        self.inner.session.sign_out();
        *write(&self.inner.credentials) = None;
    }

    async fn execute(&self, req: &RequestDescriptor) -> std::result::Result<reqwest::Response, Failure> {
        if let Some(e) = &req.encode_error {
            return Err(Failure::Transport(e.clone()));
        }
        if req.auth == Auth::Anonymous {
            return self.send_once(req, None).await;
        }

        self.resync();
        self.refresh_if_expiring().await?;

        let sent_with = self.access_token();
        let response = self.send_once(req, sent_with.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("backend answered 401, attempting session recovery");
        if !self.recover(sent_with.as_ref()).await {
            self.expire();
            return Err(Failure::Unauthorized);
        }

        let retry_with = self.access_token();
        let response = self.send_once(req, retry_with.as_ref()).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("request rejected again after refresh");
            self.expire();
            return Err(Failure::Unauthorized);
        }
        Ok(response)
    }

    async fn send_once(
        &self,
        req: &RequestDescriptor,
        token: Option<&Secret<String>>,
    ) -> std::result::Result<reqwest::Response, Failure> {
        let inner = &self.inner;
        let mut builder = inner
            .http
            .request(req.method.clone(), inner.config.url(&req.path))
            .headers(req.headers.clone())
            .header(CONTENT_TYPE, "application/json");

        if !req.streaming {
            builder = builder.timeout(inner.config.timeout);
        }
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(token) = token {
            match bearer_header(token) {
                Some(value) => builder = builder.header(AUTHORIZATION, value),
                None => warn!("access token is not a valid header value, sending without it"),
            }
        }
        if carries_body(&req.method) {
            if let Some(body) = &req.body {
                builder = builder.json(body);
            }
        }

        let started = Instant::now();
        let result = builder.send().await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(status, elapsed_ms = (elapsed * 1000.0) as u64, "response received");
                record_request(req.method.as_str(), status, elapsed);
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, "request failed before a response arrived");
                record_request(req.method.as_str(), 0, elapsed);
                Err(Failure::Transport(e.to_string()))
            }
        }
    }

    /// Make a fresh access token available after a 401 for `stale`.
    ///
    /// Returns true when the request should be retried.
    async fn recover(&self, stale: Option<&Secret<String>>) -> bool {
        let _guard = self.inner.refresh_lock.lock().await;
        self.resync();

        let Some(current) = self.credentials() else {
            record_refresh(RefreshOutcome::NoRefreshToken);
            return false;
        };
        if stale != Some(&current.access) {
            debug!("access token already replaced by a concurrent request");
            record_refresh(RefreshOutcome::Shared);
            return true;
        }
        let Some(refresh) = current.refresh else {
            info!("no refresh token held, session cannot be recovered");
            record_refresh(RefreshOutcome::NoRefreshToken);
            return false;
        };

        self.refresh_with(&refresh).await.is_ok()
    }

    /// Refresh before sending when the held JWT is about to expire.
    ///
    /// A rejected refresh token ends the session; any other refresh failure
    /// sends with the current token and leaves the 401 path to decide.
    async fn refresh_if_expiring(&self) -> std::result::Result<(), Failure> {
        let Some(pair) = self.credentials() else {
            return Ok(());
        };
        if pair.refresh.is_none()
            || !expires_within(pair.access.expose(), unix_now_secs(), REFRESH_THRESHOLD_SECS)
        {
            return Ok(());
        }

        let _guard = self.inner.refresh_lock.lock().await;
        self.resync();
        let Some(current) = self.credentials() else {
            return Ok(());
        };
        if current.access != pair.access {
            return Ok(());
        }
        let Some(refresh) = current.refresh else {
            return Ok(());
        };

        debug!("access token expiring soon, refreshing before send");
        match self.refresh_with(&refresh).await {
            Ok(()) => Ok(()),
            Err(clm_auth::Error::InvalidCredentials(_)) => {
                self.expire();
                Err(Failure::Unauthorized)
            }
            Err(_) => Ok(()),
        }
    }

    async fn refresh_with(&self, refresh: &Secret<String>) -> clm_auth::Result<()> {
        let url = self.inner.config.url(REFRESH_PATH);
        match refresh_access_token(&self.inner.http, &url, refresh.expose()).await {
            Ok(tokens) => {
                self.inner.session.refreshed(&tokens);
                self.reload();
                record_refresh(RefreshOutcome::Refreshed);
                info!(rotated = tokens.refresh.is_some(), "session refreshed");
                Ok(())
            }
            Err(e) => {
                let outcome = match e {
                    clm_auth::Error::InvalidCredentials(_) => RefreshOutcome::Rejected,
                    _ => RefreshOutcome::Failed,
                };
                record_refresh(outcome);
                warn!(error = %e, "session refresh failed");
                Err(e)
            }
        }
    }

    /// Clear an unrecoverable session. `Expired` is only published when the
    /// store still held one.
    fn expire(&self) {
        if self.inner.session.is_authenticated() {
            self.inner.session.expire();
        }
        *write(&self.inner.credentials) = None;
    }

    fn credentials(&self) -> Option<CredentialPair> {
        self.inner
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn access_token(&self) -> Option<Secret<String>> {
        self.credentials().map(|pair| pair.access)
    }

    fn reload(&self) {
        *write(&self.inner.credentials) = self.inner.session.credentials();
    }

    /// Reload from the store if any session event arrived since the last call.
    fn resync(&self) {
        let mut changed = false;
        {
            let mut events = self
                .inner
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            loop {
                match events.try_recv() {
                    Ok(event) => {
                        trace!(?event, "session event");
                        changed = true;
                    }
                    Err(TryRecvError::Lagged(skipped)) => {
                        trace!(skipped, "session events lagged");
                        changed = true;
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
        }
        if changed {
            self.reload();
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url())
            .field("session", &self.inner.session)
            .finish()
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn bearer_header(token: &Secret<String>) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&token.bearer()).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Percent-encode one path segment (filenames may contain spaces or `/`).
pub(crate) fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}
