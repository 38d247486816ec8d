use crate::api::{ActivateRequest, ApiError, Backend};
use crate::busy::BusyGuard;
use crate::entitlement::billing::{BillingError, BillingProvider};
use crate::entitlement::offerings::{Offering, Package};
use crate::entitlement::state::{
    Entitlement, EntitlementConfig, EntitlementPhase, EntitlementState, PURCHASED_PLAN,
};
use crate::session::{SessionManager, SessionTicket};
use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MSG_PURCHASE_FAILED: &str = "Purchase failed";
const MSG_CANCEL_FAILED: &str = "Failed to cancel subscription";
const MSG_NOTHING_TO_RESTORE: &str = "No purchases found to restore";
const MSG_FETCH_FAILED: &str = "Failed to load subscription";

/// Entitlement manager errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EntitlementError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Unknown package: {0}")]
    UnknownPackage(String),

    #[error("Purchase cancelled")]
    PurchaseCancelled,

    #[error("{0}")]
    Failed(String),

    #[error("Superseded by a newer request")]
    Superseded,
}

impl EntitlementError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Result of a successful `purchase`
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseOutcome {
    /// Already entitled; nothing was charged or sent
    AlreadyEntitled,
    Purchased(Entitlement),
}

/// Owns the subscription status of the signed-in user
///
/// Fetch, purchase, restore and cancel run one at a time. Each takes a new
/// generation; a result is applied only while its generation and the session
/// it was issued for are both still current.
pub struct EntitlementManager {
    backend: Arc<dyn Backend>,
    session: Arc<SessionManager>,
    billing: Arc<dyn BillingProvider>,
    config: EntitlementConfig,
    offerings: Vec<Offering>,
    state: RwLock<EntitlementState>,
    /// Serializes mutating operations
    op_lock: Mutex<()>,
    generation: AtomicU64,
    in_flight: AtomicUsize,
}

impl EntitlementManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<SessionManager>,
        billing: Arc<dyn BillingProvider>,
        config: EntitlementConfig,
    ) -> Self {
        Self {
            backend,
            session,
            billing,
            config,
            offerings: vec![Offering::premium()],
            state: RwLock::new(EntitlementState::default()),
            op_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Load the subscription record for the current session
    ///
    /// With the fallback enabled a failed fetch yields a tagged placeholder
    /// record instead of an error, except when the credential was rejected.
    pub async fn fetch_status(&self) -> Result<Entitlement, EntitlementError> {
        let ticket = self.require_session().await?;
        let _busy = BusyGuard::enter(&self.in_flight);
        let _op = self.op_lock.lock().await;
        let generation = self.next_generation();

        self.fetch_locked(&ticket, generation).await
    }

    /// Buy `package_id` through the billing provider and activate it
    pub async fn purchase(&self, package_id: &str) -> Result<PurchaseOutcome, EntitlementError> {
        let ticket = self.require_session().await?;
        let _busy = BusyGuard::enter(&self.in_flight);
        let _op = self.op_lock.lock().await;
        let generation = self.next_generation();

        if self.entitled_for(&ticket).await {
            debug!("Already entitled, skipping purchase of {}", package_id);
            counter!("signaldesk_purchases_total", "outcome" => "already_entitled").increment(1);
            return Ok(PurchaseOutcome::AlreadyEntitled);
        }

        let package = self
            .find_package(package_id)
            .cloned()
            .ok_or_else(|| EntitlementError::UnknownPackage(package_id.to_string()))?;

        let started = Instant::now();
        let result = self.purchase_locked(&ticket, generation, &package).await;
        histogram!("signaldesk_purchase_duration_seconds").record(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "success",
            Err(EntitlementError::PurchaseCancelled) => "cancelled",
            Err(_) => "failure",
        };
        counter!("signaldesk_purchases_total", "outcome" => outcome).increment(1);
        result
    }

    async fn purchase_locked(
        &self,
        ticket: &SessionTicket,
        generation: u64,
        package: &Package,
    ) -> Result<PurchaseOutcome, EntitlementError> {
        let receipt = match self.billing.purchase(package).await {
            Ok(receipt) => receipt,
            Err(BillingError::Cancelled) => {
                info!("Purchase of {} cancelled by the user", package.identifier);
                return Err(EntitlementError::PurchaseCancelled);
            }
            Err(BillingError::Store(message)) => {
                return Err(self.fail(ticket, generation, message).await);
            }
        };

        if !self.is_live(ticket, generation).await {
            debug!("Session changed during store purchase, not activating");
            return Err(EntitlementError::Superseded);
        }

        let request = ActivateRequest {
            is_active: true,
            plan: PURCHASED_PLAN.to_string(),
            expires_at: Utc::now() + self.config.subscription_period,
        };
        let result = self
            .backend
            .activate_subscription(&ticket.token, &request)
            .await;

        match self.session.observe(ticket, result).await {
            Ok(record) => {
                let entitlement = Entitlement::confirmed(record);
                let applied = entitlement.clone();
                self.commit(ticket, generation, |state| {
                    state.replace(applied, Utc::now())
                })
                .await?;
                info!(
                    "Activated {} (transaction {})",
                    entitlement.plan, receipt.transaction_id
                );
                Ok(PurchaseOutcome::Purchased(entitlement))
            }
            Err(err) => {
                warn!("Subscription activation failed: {}", err);
                let message = err.detail().unwrap_or(MSG_PURCHASE_FAILED).to_string();
                Err(self.fail(ticket, generation, message).await)
            }
        }
    }

    /// Ask the store for earlier purchases, then re-fetch the status
    ///
    /// Succeeds when a record was obtained from the backend. A fallback record
    /// only counts when the policy says so.
    pub async fn restore(&self, package_id: Option<&str>) -> Result<Entitlement, EntitlementError> {
        if let Some(id) = package_id
            && self.find_package(id).is_none()
        {
            return Err(EntitlementError::UnknownPackage(id.to_string()));
        }
        let ticket = self.require_session().await?;
        let _busy = BusyGuard::enter(&self.in_flight);
        let _op = self.op_lock.lock().await;
        let generation = self.next_generation();

        match self.billing.restore().await {
            Ok(receipts) => debug!("Store reported {} earlier purchases", receipts.len()),
            Err(e) => warn!("Store restore failed, asking the backend anyway: {}", e),
        }

        let restored = match self.fetch_locked(&ticket, generation).await {
            Ok(entitlement)
                if !entitlement.is_fallback() || self.config.fallback.counts_as_restore =>
            {
                Some(entitlement)
            }
            Ok(_) => None,
            Err(EntitlementError::Superseded) => return Err(EntitlementError::Superseded),
            Err(_) => None,
        };

        match restored {
            Some(entitlement) => {
                info!("Restored {} subscription", entitlement.plan);
                Ok(entitlement)
            }
            None => Err(self
                .fail(&ticket, generation, MSG_NOTHING_TO_RESTORE.to_string())
                .await),
        }
    }

    /// Cancel the subscription
    ///
    /// On success the held record is marked inactive locally; the backend is
    /// not asked again.
    pub async fn cancel(&self) -> Result<(), EntitlementError> {
        let ticket = self.require_session().await?;
        let _busy = BusyGuard::enter(&self.in_flight);
        let _op = self.op_lock.lock().await;
        let generation = self.next_generation();

        let result = self.backend.cancel_subscription(&ticket.token).await;
        match self.session.observe(&ticket, result).await {
            Ok(()) => {
                self.commit(&ticket, generation, |state| {
                    if let Some(record) = state.record.as_mut() {
                        record.is_active = false;
                    }
                    state.last_error = None;
                    state.settle(Utc::now());
                })
                .await?;
                info!("Subscription cancelled");
                Ok(())
            }
            Err(err) => {
                warn!("Subscription cancel failed: {}", err);
                Err(self
                    .fail(&ticket, generation, MSG_CANCEL_FAILED.to_string())
                    .await)
            }
        }
    }

    /// Forget everything; in-flight operations will not apply their results
    pub async fn clear(&self) {
        self.next_generation();
        self.state.write().await.reset();
        debug!("Entitlement cleared");
    }

    /// Drop contents written for sessions older than `epoch`
    ///
    /// Unlike `clear`, operations of the current session keep running.
    async fn discard_before(&self, epoch: u64) {
        let mut state = self.state.write().await;
        if state.epoch.is_some_and(|held| held < epoch) {
            state.reset();
            debug!("Discarded entitlement of an ended session");
        }
    }

    /// Follow the session: every new session starts from a cleared record and
    /// an authenticated one triggers a status fetch
    ///
    /// The fetch runs inside the returned task, so aborting the task stops it
    /// too. A session change while it runs drops it.
    pub fn spawn_session_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut changes = self.session.subscribe();

        tokio::spawn(async move {
            let mut seen_epoch = None;
            loop {
                let snapshot = *changes.borrow_and_update();
                if seen_epoch != Some(snapshot.epoch) {
                    seen_epoch = Some(snapshot.epoch);
                    manager.discard_before(snapshot.epoch).await;
                    if snapshot.phase.is_authenticated() {
                        tokio::select! {
                            result = manager.fetch_status() => {
                                if let Err(e) = result {
                                    debug!("Status fetch after sign-in did not apply: {}", e);
                                }
                            }
                            changed = changes.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                                debug!("Session changed during status fetch");
                                continue;
                            }
                        }
                    }
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Record held for the current session
    pub async fn entitlement(&self) -> Option<Entitlement> {
        let epoch = self.session.epoch().await;
        self.state.read().await.view(epoch).1.cloned()
    }

    pub async fn phase(&self) -> EntitlementPhase {
        let epoch = self.session.epoch().await;
        self.state.read().await.view(epoch).0
    }

    /// Active and unexpired right now, for the current session
    pub async fn is_entitled(&self) -> bool {
        let epoch = self.session.epoch().await;
        self.state
            .read()
            .await
            .view(epoch)
            .1
            .is_some_and(|r| r.is_entitled(Utc::now()))
    }

    async fn entitled_for(&self, ticket: &SessionTicket) -> bool {
        self.state
            .read()
            .await
            .view(Some(ticket.epoch))
            .1
            .is_some_and(|r| r.is_entitled(Utc::now()))
    }

    pub fn offerings(&self) -> &[Offering] {
        &self.offerings
    }

    pub async fn last_error(&self) -> Option<String> {
        let epoch = self.session.epoch().await;
        let state = self.state.read().await;
        match epoch {
            Some(epoch) if state.epoch == Some(epoch) => state.last_error.clone(),
            _ => None,
        }
    }

    pub async fn clear_error(&self) {
        self.state.write().await.last_error = None;
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn config(&self) -> &EntitlementConfig {
        &self.config
    }

    async fn fetch_locked(
        &self,
        ticket: &SessionTicket,
        generation: u64,
    ) -> Result<Entitlement, EntitlementError> {
        self.commit(ticket, generation, |state| {
            state.phase = EntitlementPhase::Fetching
        })
        .await?;

        let result = self.backend.get_subscription(&ticket.token).await;
        let entitlement = match self.session.observe(ticket, result).await {
            Ok(record) => {
                counter!("signaldesk_entitlement_fetch_total", "outcome" => "success").increment(1);
                Entitlement::confirmed(record)
            }
            Err(err) if self.config.fallback.enabled && !err.is_unauthorized() => {
                counter!("signaldesk_entitlement_fetch_total", "outcome" => "fallback")
                    .increment(1);
                warn!("Subscription fetch failed, using fallback record: {}", err);
                Entitlement::fallback(Utc::now(), self.config.subscription_period)
            }
            Err(err) => {
                counter!("signaldesk_entitlement_fetch_total", "outcome" => "failure").increment(1);
                warn!("Subscription fetch failed: {}", err);
                let message = fetch_failure_message(&err);
                let failure = self.fail(ticket, generation, message.clone()).await;
                // A rejected credential already ended the session; report why
                if err.is_unauthorized() {
                    return Err(EntitlementError::Failed(message));
                }
                return Err(failure);
            }
        };

        let applied = entitlement.clone();
        self.commit(ticket, generation, |state| {
            state.replace(applied, Utc::now())
        })
        .await?;
        debug!(
            "Subscription status: active={} plan={} source={:?}",
            entitlement.is_active, entitlement.plan, entitlement.source
        );
        Ok(entitlement)
    }

    /// Apply `update` if `generation` and the ticket's session are still current
    async fn commit<R>(
        &self,
        ticket: &SessionTicket,
        generation: u64,
        update: impl FnOnce(&mut EntitlementState) -> R,
    ) -> Result<R, EntitlementError> {
        let mut state = self.state.write().await;
        if !self.is_live(ticket, generation).await {
            debug!("Discarding entitlement result of generation {}", generation);
            return Err(EntitlementError::Superseded);
        }
        state.adopt(ticket.epoch);
        Ok(update(&mut state))
    }

    /// Record a failure message and settle the phase from the held record
    async fn fail(
        &self,
        ticket: &SessionTicket,
        generation: u64,
        message: String,
    ) -> EntitlementError {
        let applied = self
            .commit(ticket, generation, |state| {
                state.last_error = Some(message.clone());
                state.settle(Utc::now());
            })
            .await;
        match applied {
            Ok(()) => EntitlementError::Failed(message),
            Err(superseded) => superseded,
        }
    }

    async fn is_live(&self, ticket: &SessionTicket, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
            && self.session.is_current(ticket).await
    }

    async fn require_session(&self) -> Result<SessionTicket, EntitlementError> {
        self.session
            .ticket()
            .await
            .ok_or(EntitlementError::NotAuthenticated)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn find_package(&self, package_id: &str) -> Option<&Package> {
        self.offerings
            .iter()
            .find_map(|offering| offering.package(package_id))
    }
}

fn fetch_failure_message(err: &ApiError) -> String {
    err.detail().unwrap_or(MSG_FETCH_FAILED).to_string()
}
