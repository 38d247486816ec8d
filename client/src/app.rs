//! Application context wiring the session and entitlement managers and the
//! signal service together

use crate::access::Access;
use crate::api::{ApiError, Backend, HttpBackend};
use crate::config::Config;
use crate::entitlement::{
    BillingProvider, EntitlementConfig, EntitlementManager, MockBillingProvider,
};
use crate::session::{SessionManager, SessionPhase};
use crate::signal::SignalService;
use crate::storage::{FileStore, SecureStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Owns both managers and the task keeping the entitlement in step with the
/// session
pub struct AppContext {
    pub session: Arc<SessionManager>,
    pub entitlements: Arc<EntitlementManager>,
    pub signals: SignalService,
    watcher: Option<JoinHandle<()>>,
}

impl AppContext {
    /// Production wiring: HTTP backend, file-backed storage, mock store billing
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let backend = Arc::new(HttpBackend::new(&config.api_url, config.request_timeout)?);
        let store = Arc::new(FileStore::new(&config.storage_path));
        let billing = Arc::new(MockBillingProvider::new(config.billing.mock_delay));
        info!(
            "Using backend {} with storage {:?}",
            backend.base_url(),
            config.storage_path
        );
        Ok(Self::with_parts(backend, store, billing, config.entitlement()))
    }

    pub fn with_parts(
        backend: Arc<dyn Backend>,
        store: Arc<dyn SecureStore>,
        billing: Arc<dyn BillingProvider>,
        entitlement_config: EntitlementConfig,
    ) -> Self {
        let session = Arc::new(SessionManager::new(backend.clone(), store));
        let entitlements = Arc::new(EntitlementManager::new(
            backend.clone(),
            session.clone(),
            billing,
            entitlement_config,
        ));
        let signals = SignalService::new(backend, session.clone(), entitlements.clone());
        Self {
            session,
            entitlements,
            signals,
            watcher: None,
        }
    }

    /// Start following the session, then restore the persisted one
    pub async fn start(&mut self) -> SessionPhase {
        if self.watcher.is_none() {
            self.watcher = Some(self.entitlements.spawn_session_watcher());
        }
        self.session.restore().await
    }

    pub async fn access(&self) -> Access {
        Access::current(&self.session, &self.entitlements).await
    }

    pub fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
