use crate::access::Access;
use crate::api::{
    ApiError, AssetCatalog, Backend, Dashboard, Health, Performance, Signal, SignalRequest,
    SignalStatus,
};
use crate::entitlement::EntitlementManager;
use crate::session::SessionManager;
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Page size of the signal feed
pub const DEFAULT_SIGNAL_LIMIT: u32 = 20;

const MSG_REQUEST_FAILED: &str = "Request failed";

/// Signal service errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignalError {
    #[error("Not signed in")]
    NotAuthenticated,

    /// Refused locally or answered 403 by the backend
    #[error("Active subscription required")]
    SubscriptionRequired,

    #[error("Signal not found")]
    NotFound,

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("{0}")]
    Failed(String),
}

impl SignalError {
    pub fn message(&self) -> String {
        self.to_string()
    }

    fn from_api(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized { .. } => SignalError::SessionExpired,
            ApiError::Status { status: 403, .. } => SignalError::SubscriptionRequired,
            ApiError::Status { status: 404, .. } => SignalError::NotFound,
            other => SignalError::Failed(other.detail().unwrap_or(MSG_REQUEST_FAILED).to_string()),
        }
    }
}

/// Signal feed, statistics and market data for the signed-in user
///
/// Authenticated calls carry the current session token; a 401 ends that
/// session through the session manager.
pub struct SignalService {
    backend: Arc<dyn Backend>,
    session: Arc<SessionManager>,
    entitlements: Arc<EntitlementManager>,
}

impl SignalService {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<SessionManager>,
        entitlements: Arc<EntitlementManager>,
    ) -> Self {
        Self {
            backend,
            session,
            entitlements,
        }
    }

    /// Ask the backend for a new signal; premium access only
    ///
    /// While the subscription status is still loading the request is refused
    /// like any other non-premium state.
    pub async fn generate(&self, request: &SignalRequest) -> Result<Signal, SignalError> {
        match Access::current(&self.session, &self.entitlements).await {
            access if access.can_generate_signals() => {}
            Access::SignedOut => return Err(SignalError::NotAuthenticated),
            access => {
                debug!("Refusing signal generation with access {:?}", access);
                counter!("signaldesk_signals_generated_total", "outcome" => "refused")
                    .increment(1);
                return Err(SignalError::SubscriptionRequired);
            }
        }

        let result = self
            .with_token(|token| async move { self.backend.generate_signal(&token, request).await })
            .await;

        match &result {
            Ok(signal) => {
                counter!("signaldesk_signals_generated_total", "outcome" => "success").increment(1);
                info!(
                    "Generated {} signal for {} ({})",
                    signal.signal, signal.asset, signal.id
                );
            }
            Err(SignalError::SubscriptionRequired) => {
                counter!("signaldesk_signals_generated_total", "outcome" => "refused")
                    .increment(1);
                warn!("Backend requires a subscription the client believed active");
            }
            Err(err) => {
                counter!("signaldesk_signals_generated_total", "outcome" => "failure").increment(1);
                warn!("Signal generation failed: {}", err);
            }
        }
        result
    }

    /// Most recent signals, newest first
    pub async fn list(&self, limit: u32) -> Result<Vec<Signal>, SignalError> {
        self.with_token(|token| async move { self.backend.list_signals(&token, limit).await })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Signal, SignalError> {
        self.with_token(|token| async move { self.backend.get_signal(&token, id).await })
            .await
    }

    /// Record how a signal played out; returns the status the backend stored
    pub async fn update_status(
        &self,
        id: &str,
        status: SignalStatus,
    ) -> Result<String, SignalError> {
        let stored = self
            .with_token(|token| async move {
                self.backend.update_signal_status(&token, id, status).await
            })
            .await?;
        debug!("Signal {} now {}", id, stored);
        Ok(stored)
    }

    pub async fn performance(&self) -> Result<Performance, SignalError> {
        self.with_token(|token| async move { self.backend.performance(&token).await })
            .await
    }

    pub async fn dashboard(&self) -> Result<Dashboard, SignalError> {
        self.with_token(|token| async move { self.backend.dashboard(&token).await })
            .await
    }

    /// Tradable assets and timeframes; works signed out
    pub async fn assets(&self) -> Result<AssetCatalog, SignalError> {
        self.backend.assets().await.map_err(SignalError::from_api)
    }

    /// Backend liveness; works signed out
    pub async fn health(&self) -> Result<Health, SignalError> {
        self.backend.health().await.map_err(SignalError::from_api)
    }

    /// Run `call` with the current session token and pass the result through
    /// the session's credential-rejection check
    async fn with_token<T, F, Fut>(&self, call: F) -> Result<T, SignalError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let ticket = self
            .session
            .ticket()
            .await
            .ok_or(SignalError::NotAuthenticated)?;
        let result = call(ticket.token.clone()).await;
        self.session
            .observe(&ticket, result)
            .await
            .map_err(SignalError::from_api)
    }
}
