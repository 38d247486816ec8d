//! reqwest implementation of the backend contract

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::backend::Backend;
use super::types::{
    ActivateRequest, ActivateResponse, ApiError, AssetCatalog, AuthResponse, Dashboard,
    ErrorBody, Health, LoginRequest, Performance, RegisterRequest, Signal, SignalList,
    SignalRequest, SignalStatus, StatusUpdate, SubscriptionRecord, User,
};

/// Backend reached over HTTPS with JSON bodies
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend client rooted at `base_url` (e.g. `https://host/api`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/signals/{id}` plus `tail`, with the id percent-encoded as one segment
    fn signal_url(&self, id: &str, tail: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.url("/signals"))
            .map_err(|e| ApiError::Network(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Network("base URL cannot hold a path".to_string()))?
            .push(id)
            .extend(tail);
        Ok(url)
    }

    /// Send a request and return the raw body of a 2xx response
    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;

        if status.is_success() {
            return Ok(body.to_vec());
        }

        let detail = ErrorBody::parse(&body);
        debug!("Backend answered {} ({:?})", status, detail);

        if status == StatusCode::UNAUTHORIZED {
            Err(ApiError::Unauthorized { detail })
        } else {
            Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn map_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let request = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest { email, password });
        self.send_json(request).await
    }

    async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let request = self
            .client
            .post(self.url("/auth/register"))
            .json(&RegisterRequest {
                name,
                email,
                password,
            });
        self.send_json(request).await
    }

    async fn me(&self, token: &str) -> Result<User, ApiError> {
        let request = self.client.get(self.url("/auth/me")).bearer_auth(token);
        self.send_json(request).await
    }

    async fn get_subscription(&self, token: &str) -> Result<SubscriptionRecord, ApiError> {
        let request = self.client.get(self.url("/subscription")).bearer_auth(token);
        self.send_json(request).await
    }

    async fn activate_subscription(
        &self,
        token: &str,
        activate: &ActivateRequest,
    ) -> Result<SubscriptionRecord, ApiError> {
        let request = self
            .client
            .post(self.url("/subscription/activate"))
            .bearer_auth(token)
            .json(activate);
        let response: ActivateResponse = self.send_json(request).await?;
        Ok(response.subscription)
    }

    async fn cancel_subscription(&self, token: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url("/subscription/cancel"))
            .bearer_auth(token);
        // The body is informational only
        self.send(request).await.map(|_| ())
    }

    async fn generate_signal(
        &self,
        token: &str,
        signal: &SignalRequest,
    ) -> Result<Signal, ApiError> {
        let request = self
            .client
            .post(self.url("/signals/generate"))
            .bearer_auth(token)
            .json(signal);
        self.send_json(request).await
    }

    async fn list_signals(&self, token: &str, limit: u32) -> Result<Vec<Signal>, ApiError> {
        let request = self
            .client
            .get(self.url("/signals"))
            .bearer_auth(token)
            .query(&[("limit", limit)]);
        let list: SignalList = self.send_json(request).await?;
        Ok(list.signals)
    }

    async fn get_signal(&self, token: &str, id: &str) -> Result<Signal, ApiError> {
        let request = self
            .client
            .get(self.signal_url(id, &[])?)
            .bearer_auth(token);
        self.send_json(request).await
    }

    async fn update_signal_status(
        &self,
        token: &str,
        id: &str,
        status: SignalStatus,
    ) -> Result<String, ApiError> {
        let request = self
            .client
            .patch(self.signal_url(id, &["status"])?)
            .bearer_auth(token)
            .query(&[("status", status.as_str())]);
        let update: StatusUpdate = self.send_json(request).await?;
        Ok(update.status)
    }

    async fn performance(&self, token: &str) -> Result<Performance, ApiError> {
        let request = self.client.get(self.url("/performance")).bearer_auth(token);
        self.send_json(request).await
    }

    async fn dashboard(&self, token: &str) -> Result<Dashboard, ApiError> {
        let request = self.client.get(self.url("/dashboard")).bearer_auth(token);
        self.send_json(request).await
    }

    async fn assets(&self) -> Result<AssetCatalog, ApiError> {
        self.send_json(self.client.get(self.url("/assets"))).await
    }

    async fn health(&self) -> Result<Health, ApiError> {
        self.send_json(self.client.get(self.url("/health"))).await
    }
}
