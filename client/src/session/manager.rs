use crate::api::{ApiError, AuthResponse, Backend, User};
use crate::busy::BusyGuard;
use crate::session::state::{
    Session, SessionPhase, SessionSnapshot, SessionState, SessionTicket,
};
use crate::session::validation::{self, RegisterForm, Registration};
use crate::storage::{AUTH_TOKEN_KEY, SecureStore, USER_KEY};
use metrics::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

/// Session manager errors
///
/// `Display` is the message shown to the user and is never empty.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Could not save session: {0}")]
    Storage(String),

    #[error("Superseded by a newer request")]
    Superseded,
}

impl SessionError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Session manager: owns the bearer credential and the user profile
///
/// Token and profile are persisted to secure storage and restored on start.
/// Every sign-in and sign-out bumps the session epoch; results of requests
/// issued under an older epoch are never applied.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    store: Arc<dyn SecureStore>,
    state: RwLock<SessionState>,
    /// Bumped when an auth request starts or a sign-out happens
    auth_generation: AtomicU64,
    in_flight: AtomicUsize,
    changes: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn SecureStore>) -> Self {
        let state = SessionState::default();
        let (changes, _) = watch::channel(state.snapshot());
        Self {
            backend,
            store,
            state: RwLock::new(state),
            auth_generation: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            changes,
        }
    }

    /// Restore the persisted session; runs once at start-up
    ///
    /// Missing, partial or unreadable storage leaves the manager anonymous.
    /// Calling it again after the first run returns the current phase.
    pub async fn restore(&self) -> SessionPhase {
        {
            let mut state = self.state.write().await;
            if state.phase != SessionPhase::Uninitialized {
                return state.phase;
            }
            state.phase = SessionPhase::Restoring;
            self.publish(&state);
        }

        let restored = self.load_persisted().await;

        let mut state = self.state.write().await;
        if state.phase != SessionPhase::Restoring {
            // A sign-in or sign-out finished first and wins
            debug!("Session restore overtaken, keeping {:?}", state.phase);
            return state.phase;
        }
        match restored {
            Some(session) => {
                info!("Restored session for {}", session.user.email);
                state.sign_in(session);
            }
            None => {
                debug!("No stored session, starting anonymous");
                state.phase = SessionPhase::Anonymous;
            }
        }
        self.publish(&state);
        state.phase
    }

    /// Sign in with email and password
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let credentials = validation::validate_login(email, password)?;
        let _busy = BusyGuard::enter(&self.in_flight);
        let generation = self.next_generation();

        match self
            .backend
            .login(&credentials.email, &credentials.password)
            .await
        {
            Ok(response) => {
                counter!("signaldesk_logins_total", "outcome" => "success").increment(1);
                self.establish(response, generation).await
            }
            Err(err) => {
                counter!("signaldesk_logins_total", "outcome" => "failure").increment(1);
                Err(self.reject(&err, "Login failed").await)
            }
        }
    }

    /// Create an account; name, email and password are checked first
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        let registration = validation::validate_registration(name, email, password)?;
        self.submit_registration(registration).await
    }

    /// Create an account from the sign-up form (password confirmation and
    /// terms acceptance included)
    pub async fn register_form(&self, form: &RegisterForm) -> Result<User, SessionError> {
        let registration = form.validate()?;
        self.submit_registration(registration).await
    }

    async fn submit_registration(&self, registration: Registration) -> Result<User, SessionError> {
        let _busy = BusyGuard::enter(&self.in_flight);
        let generation = self.next_generation();

        match self
            .backend
            .register(
                &registration.name,
                &registration.email,
                &registration.password,
            )
            .await
        {
            Ok(response) => self.establish(response, generation).await,
            Err(err) => Err(self.reject(&err, "Registration failed").await),
        }
    }

    /// Sign out; never fails
    ///
    /// Storage errors are logged and swallowed: the caller ends up signed out
    /// either way.
    pub async fn logout(&self) {
        self.next_generation();
        let mut state = self.state.write().await;
        self.clear_persisted().await;
        let had_session = state.sign_out();
        self.publish(&state);

        counter!("signaldesk_logouts_total").increment(1);
        if had_session {
            info!("Signed out");
        }
    }

    /// Re-fetch the profile of the signed-in user
    ///
    /// On failure the held profile stays as it was. A 401 tears the session
    /// down through `observe`, not through this method.
    pub async fn refresh_profile(&self) -> Result<User, SessionError> {
        let ticket = self.ticket().await.ok_or(SessionError::NotAuthenticated)?;
        let _busy = BusyGuard::enter(&self.in_flight);

        let result = self.backend.me(&ticket.token).await;
        let user = match self.observe(&ticket, result).await {
            Ok(user) => user,
            Err(err) => return Err(self.reject(&err, "Failed to refresh profile").await),
        };

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let session = match state.session.as_mut() {
            Some(session) if state.epoch == ticket.epoch => session,
            _ => {
                debug!("Dropping profile refresh for a finished session");
                return Err(SessionError::Superseded);
            }
        };

        match serde_json::to_string(&user) {
            Ok(json) => {
                if let Err(e) = self.store.set(USER_KEY, &json).await {
                    warn!("Failed to persist refreshed profile: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize refreshed profile: {}", e),
        }
        session.user = user.clone();
        Ok(user)
    }

    /// Tear the current session down after the backend rejected its credential
    ///
    /// This is the hook for a transport-level response interceptor.
    pub async fn handle_unauthorized(&self) {
        let epoch = self.state.read().await.epoch;
        self.expire(epoch).await;
    }

    /// Pass a backend result through the credential-rejection check
    ///
    /// A 401 answered for `ticket` clears the session, unless a newer session
    /// has been established since the request was sent.
    pub async fn observe<T>(
        &self,
        ticket: &SessionTicket,
        result: Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        if let Err(err) = &result
            && err.is_unauthorized()
        {
            self.expire(ticket.epoch).await;
        }
        result
    }

    /// Run a backend call with the current token attached
    ///
    /// Anonymous callers get `NotAuthenticated` without a call being made.
    pub async fn authorized<T, F, Fut>(&self, call: F) -> Result<T, SessionError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let ticket = self.ticket().await.ok_or(SessionError::NotAuthenticated)?;
        let result = call(ticket.token.clone()).await;
        self.observe(&ticket, result).await.map_err(|err| {
            let message = err.detail().map_or_else(|| err.to_string(), str::to_string);
            SessionError::Rejected(message)
        })
    }

    async fn expire(&self, epoch: u64) {
        let mut state = self.state.write().await;
        if state.epoch != epoch || state.session.is_none() {
            debug!("Ignoring credential rejection for a finished session");
            return;
        }
        // Only a real teardown cancels sign-ins in flight
        self.next_generation();
        self.clear_persisted().await;
        state.sign_out();
        state.last_error = Some("Session expired, please sign in again".to_string());
        self.publish(&state);

        counter!("signaldesk_unauthorized_total").increment(1);
        warn!("Backend rejected the session credential, signed out");
    }

    /// Bearer token for request authorization
    pub async fn token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.token.clone())
    }

    /// Token plus the epoch it belongs to
    pub async fn ticket(&self) -> Option<SessionTicket> {
        let state = self.state.read().await;
        state.session.as_ref().map(|s| SessionTicket {
            token: s.token.clone(),
            epoch: state.epoch,
        })
    }

    /// Whether `ticket` still names the held session
    pub async fn is_current(&self, ticket: &SessionTicket) -> bool {
        let state = self.state.read().await;
        state.session.is_some() && state.epoch == ticket.epoch
    }

    /// Epoch of the held session, if any
    pub async fn epoch(&self) -> Option<u64> {
        let state = self.state.read().await;
        state.session.as_ref().map(|_| state.epoch)
    }

    pub async fn user(&self) -> Option<User> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.user.clone())
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase
    }

    /// Derived from the presence of a session, never stored
    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.session.is_some()
    }

    /// Most recent failure message
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn clear_error(&self) {
        self.state.write().await.last_error = None;
    }

    /// A sign-in, registration or profile refresh is in flight
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Channel of phase changes, starting with the current value
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.changes.subscribe()
    }

    fn next_generation(&self) -> u64 {
        self.auth_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, state: &SessionState) {
        self.changes.send_replace(state.snapshot());
    }

    /// Persist and install the session from a successful auth response
    async fn establish(
        &self,
        response: AuthResponse,
        generation: u64,
    ) -> Result<User, SessionError> {
        let session = Session {
            token: response.access_token,
            user: response.user,
        };

        let mut state = self.state.write().await;
        if self.auth_generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding sign-in result overtaken by a newer request");
            return Err(SessionError::Superseded);
        }

        if let Err(err) = self.persist(&session).await {
            // Put back whatever the held session had stored
            match state.session.as_ref() {
                Some(previous) => {
                    if let Err(e) = self.persist(previous).await {
                        warn!("Failed to restore the stored session: {}", e);
                    }
                }
                None => self.clear_persisted().await,
            }
            let err = SessionError::Storage(err);
            state.last_error = Some(err.message());
            warn!("Sign-in succeeded but the session could not be stored: {}", err);
            return Err(err);
        }

        let user = session.user.clone();
        state.sign_in(session);
        self.publish(&state);

        info!("Signed in as {} ({})", user.email, user.id);
        Ok(user)
    }

    async fn persist(&self, session: &Session) -> Result<(), String> {
        let user_json = serde_json::to_string(&session.user).map_err(|e| e.to_string())?;
        self.store
            .set(AUTH_TOKEN_KEY, &session.token)
            .await
            .map_err(|e| e.to_string())?;
        self.store
            .set(USER_KEY, &user_json)
            .await
            .map_err(|e| e.to_string())
    }

    async fn load_persisted(&self) -> Option<Session> {
        let token = match self.store.get(AUTH_TOKEN_KEY).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Error loading stored token: {}", e);
                self.clear_persisted().await;
                return None;
            }
        };
        let user_json = match self.store.get(USER_KEY).await {
            Ok(json) => json,
            Err(e) => {
                warn!("Error loading stored profile: {}", e);
                self.clear_persisted().await;
                return None;
            }
        };

        match (token, user_json) {
            (Some(token), Some(json)) => match serde_json::from_str::<User>(&json) {
                Ok(user) => Some(Session { token, user }),
                Err(e) => {
                    warn!("Discarding unreadable stored profile: {}", e);
                    self.clear_persisted().await;
                    None
                }
            },
            (None, None) => None,
            _ => {
                debug!("Discarding partially stored session");
                self.clear_persisted().await;
                None
            }
        }
    }

    async fn clear_persisted(&self) {
        for key in [AUTH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.delete(key).await {
                warn!("Failed to delete stored {}: {}", key, e);
            }
        }
    }

    /// Map a backend failure to the user-facing error and remember it
    async fn reject(&self, err: &ApiError, fallback: &str) -> SessionError {
        let message = err.detail().unwrap_or(fallback).to_string();
        warn!("{}: {}", fallback, err);
        self.state.write().await.last_error = Some(message.clone());
        SessionError::Rejected(message)
    }
}
