//! Backend trait definition

use async_trait::async_trait;

use super::types::{
    ActivateRequest, ApiError, AssetCatalog, AuthResponse, Dashboard, Health, Performance, Signal,
    SignalRequest, SignalStatus, SubscriptionRecord, User,
};

/// Trait for the SignalDesk backend (HTTP in production, scripted in tests)
///
/// Authenticated calls take the bearer token explicitly: the session manager
/// hands it out, the backend only attaches it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    /// `POST /auth/register`
    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError>;

    /// `GET /auth/me`
    async fn me(&self, token: &str) -> Result<User, ApiError>;

    /// `GET /subscription`
    async fn get_subscription(&self, token: &str) -> Result<SubscriptionRecord, ApiError>;

    /// `POST /subscription/activate`
    async fn activate_subscription(
        &self,
        token: &str,
        request: &ActivateRequest,
    ) -> Result<SubscriptionRecord, ApiError>;

    /// `POST /subscription/cancel`
    async fn cancel_subscription(&self, token: &str) -> Result<(), ApiError>;

    /// `POST /signals/generate`
    async fn generate_signal(
        &self,
        token: &str,
        request: &SignalRequest,
    ) -> Result<Signal, ApiError>;

    /// `GET /signals?limit=`, newest first
    async fn list_signals(&self, token: &str, limit: u32) -> Result<Vec<Signal>, ApiError>;

    /// `GET /signals/{id}`
    async fn get_signal(&self, token: &str, id: &str) -> Result<Signal, ApiError>;

    /// `PATCH /signals/{id}/status?status=`
    async fn update_signal_status(
        &self,
        token: &str,
        id: &str,
        status: SignalStatus,
    ) -> Result<String, ApiError>;

    /// `GET /performance`
    async fn performance(&self, token: &str) -> Result<Performance, ApiError>;

    /// `GET /dashboard`
    async fn dashboard(&self, token: &str) -> Result<Dashboard, ApiError>;

    /// `GET /assets`, no credential needed
    async fn assets(&self) -> Result<AssetCatalog, ApiError>;

    /// `GET /health`, no credential needed
    async fn health(&self) -> Result<Health, ApiError>;
}
