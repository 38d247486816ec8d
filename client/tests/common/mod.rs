//! Common Test Utilities for Integration Tests
//!
//! An in-process stand-in for the SignalDesk REST backend, served with axum on
//! an ephemeral port and driven through the real reqwest client.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use signaldesk_client::AppContext;
use signaldesk_client::api::HttpBackend;
use signaldesk_client::entitlement::{EntitlementConfig, MockBillingProvider};
use signaldesk_client::storage::SecureStore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const ANN_EMAIL: &str = "user@test.com";
pub const ANN_PASSWORD: &str = "secret1";

type Reply = (StatusCode, Json<Value>);

struct StubUser {
    id: Value,
    name: String,
    password: String,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, StubUser>,
    tokens: HashMap<String, String>,
    subscriptions: HashMap<String, Value>,
    /// Owner email and stored signal document, oldest first
    signals: Vec<(String, Value)>,
    subscription_failure: Option<u16>,
    cancel_failure: Option<u16>,
    hits: HashMap<String, usize>,
    token_seq: u64,
    user_seq: u64,
    signal_seq: u64,
}

/// Backend state shared between the handlers and the test body
#[derive(Default)]
pub struct StubState {
    inner: Mutex<Inner>,
}

impl StubState {
    fn seeded() -> Self {
        let state = Self::default();
        state.inner.lock().unwrap().users.insert(
            ANN_EMAIL.to_string(),
            StubUser {
                id: json!(1),
                name: "Ann".to_string(),
                password: ANN_PASSWORD.to_string(),
            },
        );
        state
    }

    /// Invalidate every issued token, as an expired JWT would be
    pub fn revoke_tokens(&self) {
        self.inner.lock().unwrap().tokens.clear();
    }

    pub fn set_subscription(&self, email: &str, record: Value) {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .insert(email.to_string(), record);
    }

    pub fn subscription(&self, email: &str) -> Option<Value> {
        self.inner.lock().unwrap().subscriptions.get(email).cloned()
    }

    pub fn fail_subscription(&self, status: Option<u16>) {
        self.inner.lock().unwrap().subscription_failure = status;
    }

    pub fn fail_cancel(&self, status: Option<u16>) {
        self.inner.lock().unwrap().cancel_failure = status;
    }

    /// Stored signal documents of `email`, oldest first
    pub fn signals_of(&self, email: &str) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .signals
            .iter()
            .filter(|(owner, _)| owner == email)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    fn is_subscribed(&self, email: &str) -> bool {
        self.subscription(email)
            .is_some_and(|record| record["is_active"] == json!(true))
    }

    pub fn hits(&self, path: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .hits
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.inner.lock().unwrap().hits.values().sum()
    }

    fn record_hit(&self, path: &str) {
        *self
            .inner
            .lock()
            .unwrap()
            .hits
            .entry(path.to_string())
            .or_default() += 1;
    }

    fn issue_token(&self, email: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.token_seq += 1;
        let token = format!("tok{}", inner.token_seq);
        inner.tokens.insert(token.clone(), email.to_string());
        token
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<String, Reply> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let inner = self.inner.lock().unwrap();
        match token.and_then(|t| inner.tokens.get(t)) {
            Some(email) => Ok(email.clone()),
            None if token.is_none() => Err(detail(StatusCode::FORBIDDEN, "Not authenticated")),
            None => Err(detail(StatusCode::UNAUTHORIZED, "Invalid token")),
        }
    }

    fn user_json(&self, email: &str) -> Value {
        let inner = self.inner.lock().unwrap();
        let user = &inner.users[email];
        json!({
            "user_id": user.id,
            "email": email,
            "name": user.name,
            "created_at": "2026-01-01T00:00:00+00:00",
        })
    }
}

fn detail(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "detail": message })))
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RegisterBody {
    name: String,
    email: String,
    password: String,
}

async fn login(State(state): State<Arc<StubState>>, Json(body): Json<LoginBody>) -> Reply {
    state.record_hit("/auth/login");
    let valid = {
        let inner = state.inner.lock().unwrap();
        inner
            .users
            .get(&body.email)
            .is_some_and(|u| u.password == body.password)
    };
    if !valid {
        return detail(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }
    let token = state.issue_token(&body.email);
    (
        StatusCode::OK,
        Json(json!({
            "access_token": token,
            "token_type": "bearer",
            "user": state.user_json(&body.email),
        })),
    )
}

async fn register(State(state): State<Arc<StubState>>, Json(body): Json<RegisterBody>) -> Reply {
    state.record_hit("/auth/register");
    if body.password.len() < 6 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": [{ "msg": "String should have at least 6 characters" }] })),
        );
    }
    {
        let mut inner = state.inner.lock().unwrap();
        if inner.users.contains_key(&body.email) {
            return detail(StatusCode::BAD_REQUEST, "Email already registered");
        }
        inner.user_seq += 1;
        let id = json!(format!("u-{}", inner.user_seq));
        inner.users.insert(
            body.email.clone(),
            StubUser {
                id,
                name: body.name,
                password: body.password,
            },
        );
    }
    let token = state.issue_token(&body.email);
    (
        StatusCode::OK,
        Json(json!({
            "access_token": token,
            "token_type": "bearer",
            "user": state.user_json(&body.email),
        })),
    )
}

async fn me(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Reply {
    state.record_hit("/auth/me");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    let mut user = state.user_json(&email);
    user["subscription"] = state.subscription(&email).unwrap_or(Value::Null);
    (StatusCode::OK, Json(user))
}

async fn get_subscription(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Reply {
    state.record_hit("/subscription");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    if let Some(code) = state.inner.lock().unwrap().subscription_failure {
        return detail(status_code(code), "Database unavailable");
    }
    let record = state
        .subscription(&email)
        .unwrap_or_else(|| json!({ "is_active": false, "plan": "none" }));
    (StatusCode::OK, Json(record))
}

async fn activate(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    state.record_hit("/subscription/activate");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    let record = json!({
        "is_active": body["is_active"],
        "plan": body["plan"],
        "price": 49.99,
        "expires_at": body["expires_at"],
    });
    state.set_subscription(&email, record.clone());
    (
        StatusCode::OK,
        Json(json!({ "success": true, "subscription": record })),
    )
}

async fn cancel(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Reply {
    state.record_hit("/subscription/cancel");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    if let Some(code) = state.inner.lock().unwrap().cancel_failure {
        return detail(status_code(code), "Cancel failed");
    }
    if let Some(record) = state.inner.lock().unwrap().subscriptions.get_mut(&email) {
        record["is_active"] = json!(false);
    }
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Subscription cancelled" })),
    )
}

#[derive(Deserialize)]
struct SignalBody {
    #[serde(default = "default_asset")]
    asset: String,
    #[serde(default = "default_timeframe")]
    timeframe: String,
}

fn default_asset() -> String {
    "BTCUSDT".to_string()
}

fn default_timeframe() -> String {
    "Intraday".to_string()
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct StatusQuery {
    status: String,
}

async fn generate_signal(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<SignalBody>,
) -> Reply {
    state.record_hit("/signals/generate");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    if !state.is_subscribed(&email) {
        return detail(StatusCode::FORBIDDEN, "Active subscription required");
    }
    let id = {
        let mut inner = state.inner.lock().unwrap();
        inner.signal_seq += 1;
        format!("sig-{}", inner.signal_seq)
    };
    let created = chrono::Utc::now();
    let doc = json!({
        "signal_id": id,
        "asset": body.asset,
        "signal": "BUY",
        "entry": 42350.0,
        "take_profit": [43500.0, 44200.0],
        "stop_loss": 41700.0,
        "confidence": 78,
        "timeframe": body.timeframe,
        "status": "active",
        "ai_reasoning": "Technical analysis indicates bullish momentum.",
        "risk_reward": "1:2.5",
        "created_at": created.to_rfc3339(),
        "expires_at": (created + chrono::Duration::hours(8)).to_rfc3339(),
    });
    state
        .inner
        .lock()
        .unwrap()
        .signals
        .push((email, doc.clone()));

    // Fresh signals come back under `id`
    let mut response = doc;
    if let Some(map) = response.as_object_mut()
        && let Some(id) = map.remove("signal_id")
    {
        map.insert("id".to_string(), id);
    }
    (StatusCode::OK, Json(response))
}

async fn list_signals(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Reply {
    state.record_hit("/signals");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    if !state.is_subscribed(&email) {
        return detail(StatusCode::FORBIDDEN, "Active subscription required");
    }
    let signals: Vec<Value> = state
        .signals_of(&email)
        .into_iter()
        .rev()
        .take(query.limit.unwrap_or(20))
        .collect();
    let count = signals.len();
    (
        StatusCode::OK,
        Json(json!({ "signals": signals, "count": count })),
    )
}

async fn get_signal(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply {
    state.record_hit("/signals/{id}");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    match state
        .signals_of(&email)
        .into_iter()
        .find(|doc| doc["signal_id"] == json!(id))
    {
        Some(doc) => (StatusCode::OK, Json(doc)),
        None => detail(StatusCode::NOT_FOUND, "Signal not found"),
    }
}

async fn update_signal_status(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Reply {
    state.record_hit("/signals/{id}/status");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    let mut inner = state.inner.lock().unwrap();
    let found = inner
        .signals
        .iter_mut()
        .find(|(owner, doc)| *owner == email && doc["signal_id"] == json!(id));
    match found {
        Some((_, doc)) => {
            doc["status"] = json!(query.status);
            (
                StatusCode::OK,
                Json(json!({ "success": true, "status": query.status })),
            )
        }
        None => detail(StatusCode::NOT_FOUND, "Signal not found"),
    }
}

async fn performance(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Reply {
    state.record_hit("/performance");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    let signals = state.signals_of(&email);
    let count = |status: &str| signals.iter().filter(|s| s["status"] == json!(status)).count();
    let (hit_tp, stopped) = (count("hit_tp"), count("stopped_out"));
    let completed = hit_tp + stopped;
    let win_rate = if completed > 0 {
        hit_tp as f64 / completed as f64 * 100.0
    } else {
        0.0
    };
    (
        StatusCode::OK,
        Json(json!({
            "total_signals": signals.len(),
            "win_rate": win_rate,
            "active_signals": count("active"),
            "hit_tp": hit_tp,
            "stopped_out": stopped,
            "avg_confidence": if signals.is_empty() { 0.0 } else { 78.0 },
        })),
    )
}

async fn dashboard(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Reply {
    state.record_hit("/dashboard");
    let email = match state.authorize(&headers) {
        Ok(email) => email,
        Err(reply) => return reply,
    };
    let signals = state.signals_of(&email);
    let recent: Vec<Value> = signals.iter().rev().take(5).cloned().collect();
    let subscription = state
        .subscription(&email)
        .unwrap_or_else(|| json!({ "is_active": false, "plan": "none" }));
    (
        StatusCode::OK,
        Json(json!({
            "subscription": subscription,
            "active_signals": signals.iter().filter(|s| s["status"] == json!("active")).count(),
            "total_signals": signals.len(),
            "ai_confidence": if signals.is_empty() { 0.0 } else { 78.0 },
            "last_signal_at": recent.first().map(|s| s["created_at"].clone()),
            "recent_signals": recent,
        })),
    )
}

async fn assets(State(state): State<Arc<StubState>>) -> Reply {
    state.record_hit("/assets");
    (
        StatusCode::OK,
        Json(json!({
            "assets": [
                { "symbol": "BTCUSDT", "name": "Bitcoin", "category": "Crypto" },
                { "symbol": "SPY", "name": "S&P 500 ETF", "category": "Stocks" },
                { "symbol": "XAUUSD", "name": "Gold", "category": "Commodities" },
            ],
            "timeframes": ["Scalp", "Intraday", "Swing"],
        })),
    )
}

async fn health(State(state): State<Arc<StubState>>) -> Reply {
    state.record_hit("/health");
    (
        StatusCode::OK,
        Json(json!({ "status": "healthy", "service": "SignalDesk AI", "version": "1.0.0" })),
    )
}

/// A running stub backend
pub struct StubServer {
    pub base_url: String,
    pub state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve the stub backend on 127.0.0.1 with an ephemeral port
pub async fn spawn_stub() -> StubServer {
    let state = Arc::new(StubState::seeded());
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/me", get(me))
        .route("/subscription", get(get_subscription))
        .route("/subscription/activate", post(activate))
        .route("/subscription/cancel", post(cancel))
        .route("/signals/generate", post(generate_signal))
        .route("/signals", get(list_signals))
        .route("/signals/:id", get(get_signal))
        .route("/signals/:id/status", patch(update_signal_status))
        .route("/performance", get(performance))
        .route("/dashboard", get(dashboard))
        .route("/assets", get(assets))
        .route("/health", get(health))
        .with_state(state.clone());
    let app = Router::new().nest("/api", api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubServer {
        base_url: format!("http://{}/api", addr),
        state,
        handle,
    }
}

/// Base URL on which nothing listens
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

/// Context over the real HTTP backend with an instant mock store
pub fn create_app(
    base_url: &str,
    store: Arc<dyn SecureStore>,
    config: EntitlementConfig,
) -> AppContext {
    let backend = Arc::new(HttpBackend::new(base_url, Duration::from_secs(5)).unwrap());
    let billing = Arc::new(MockBillingProvider::new(Duration::ZERO));
    AppContext::with_parts(backend, store, billing, config)
}

/// Poll `check` until it holds or a second has passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
