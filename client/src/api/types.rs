//! Wire types and error definitions for the backend API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when talking to the backend
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("{}", .detail.as_deref().unwrap_or("Not authenticated"))]
    Unauthorized { detail: Option<String> },

    #[error("Request failed with status {status}")]
    Status { status: u16, detail: Option<String> },

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Human-readable message supplied by the backend, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { detail } | ApiError::Status { detail, .. } => {
                detail.as_deref().filter(|d| !d.trim().is_empty())
            }
            _ => None,
        }
    }

    /// Whether the backend rejected the credential attached to the request
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }
}

/// User identifier. The backend has shipped both numeric and UUID ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{}", n),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// User profile as returned by the auth endpoints
///
/// Fields the client does not model (`created_at`, the embedded `subscription`
/// of `/auth/me`, ...) are kept in `extra` so a persisted profile round-trips
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "user_id")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Response body of `POST /auth/login` and `POST /auth/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Subscription record as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub is_active: bool,
    #[serde(default)]
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    /// Set by the backend when it answered with its own placeholder record
    #[serde(default)]
    pub mock: bool,
}

/// Body of `POST /subscription/activate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivateRequest {
    pub is_active: bool,
    pub plan: String,
    pub expires_at: DateTime<Utc>,
}

/// Response body of `POST /subscription/activate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    #[serde(default)]
    pub success: bool,
    pub subscription: SubscriptionRecord,
}

/// Chart horizon a signal is generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    Scalp,
    #[default]
    Intraday,
    Swing,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Scalp => "Scalp",
            Timeframe::Intraday => "Intraday",
            Timeframe::Swing => "Swing",
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scalp" => Ok(Timeframe::Scalp),
            "intraday" => Ok(Timeframe::Intraday),
            "swing" => Ok(Timeframe::Swing),
            _ => Err(format!("unknown timeframe: {}", s)),
        }
    }
}

pub const DEFAULT_ASSET: &str = "BTCUSDT";

/// Body of `POST /signals/generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub asset: String,
    pub timeframe: Timeframe,
}

impl Default for SignalRequest {
    fn default() -> Self {
        Self {
            asset: DEFAULT_ASSET.to_string(),
            timeframe: Timeframe::default(),
        }
    }
}

/// Lifecycle of a generated signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Active,
    HitTp,
    StoppedOut,
    Expired,
}

impl SignalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalStatus::Active => "active",
            SignalStatus::HitTp => "hit_tp",
            SignalStatus::StoppedOut => "stopped_out",
            SignalStatus::Expired => "expired",
        }
    }
}

impl FromStr for SignalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SignalStatus::Active),
            "hit_tp" => Ok(SignalStatus::HitTp),
            "stopped_out" => Ok(SignalStatus::StoppedOut),
            "expired" => Ok(SignalStatus::Expired),
            _ => Err(format!("unknown signal status: {}", s)),
        }
    }
}

/// A trading signal
///
/// Freshly generated signals carry `id`, stored ones `signal_id`. The status
/// stays a plain string since the backend accepts any value on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(alias = "signal_id")]
    pub id: String,
    pub asset: String,
    /// `BUY` or `SELL`
    pub signal: String,
    pub entry: f64,
    #[serde(default)]
    pub take_profit: Vec<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    pub confidence: u32,
    pub timeframe: String,
    pub status: String,
    #[serde(default)]
    pub ai_reasoning: String,
    #[serde(default)]
    pub risk_reward: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Signal {
    /// Parsed status, `None` for values this client does not know
    pub fn status(&self) -> Option<SignalStatus> {
        self.status.parse().ok()
    }
}

/// Response body of `GET /signals`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SignalList {
    pub signals: Vec<Signal>,
}

/// Response body of `PATCH /signals/{id}/status`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusUpdate {
    pub status: String,
}

/// Statistics over the signals of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Performance {
    pub total_signals: u32,
    /// Percentage of completed signals that hit take-profit
    pub win_rate: f64,
    pub active_signals: u32,
    pub hit_tp: u32,
    pub stopped_out: u32,
    pub avg_confidence: f64,
}

/// Response body of `GET /dashboard`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Dashboard {
    pub subscription: SubscriptionRecord,
    #[serde(default)]
    pub active_signals: u32,
    #[serde(default)]
    pub total_signals: u32,
    #[serde(default)]
    pub ai_confidence: f64,
    #[serde(default)]
    pub recent_signals: Vec<Signal>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub last_signal_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub category: String,
}

/// Response body of `GET /assets`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssetCatalog {
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub timeframes: Vec<String>,
}

/// Response body of `GET /health`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
}

/// FastAPI style error body: `{"detail": "..."}` or a validation list
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Text(String),
    Items(Vec<ErrorItem>),
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    msg: String,
}

impl ErrorBody {
    /// Extract the detail message from a raw error body
    pub(crate) fn parse(body: &[u8]) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
        match parsed.detail? {
            ErrorDetail::Text(text) => Some(text),
            ErrorDetail::Items(items) if !items.is_empty() => Some(
                items
                    .into_iter()
                    .map(|i| i.msg)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            ErrorDetail::Items(_) => None,
        }
    }
}

mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};

    /// Accepts RFC 3339 timestamps and offset-less ISO timestamps (read as UTC)
    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(parsed.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(Utc.from_utc_datetime(&naive)))
            .map_err(serde::de::Error::custom)
    }
}
