use crate::api::User;

/// Lifecycle phase of the session container
///
/// `Uninitialized → Restoring → {Anonymous, Authenticated}`. After that only
/// sign-in moves to `Authenticated` and only sign-out or a credential
/// rejection moves back to `Anonymous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Restoring,
    Anonymous,
    Authenticated,
}

impl SessionPhase {
    /// Restoration finished, dependent UI may render
    pub fn is_ready(self) -> bool {
        matches!(self, SessionPhase::Anonymous | SessionPhase::Authenticated)
    }

    pub fn is_authenticated(self) -> bool {
        self == SessionPhase::Authenticated
    }
}

/// Value published on the session change channel
///
/// `epoch` increases on every sign-in and sign-out, so observers can tell
/// two different sessions apart even when the phase did not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub epoch: u64,
}

/// Credential and profile, always held together
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Token handed to collaborators making a request for the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub token: String,
    pub epoch: u64,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub epoch: u64,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            epoch: self.epoch,
        }
    }

    /// Install a new session; token and profile change in one step
    pub fn sign_in(&mut self, session: Session) {
        self.session = Some(session);
        self.phase = SessionPhase::Authenticated;
        self.epoch += 1;
        self.last_error = None;
    }

    /// Drop the session; returns whether one was held
    pub fn sign_out(&mut self) -> bool {
        let had_session = self.session.take().is_some();
        if had_session {
            self.epoch += 1;
        }
        self.phase = SessionPhase::Anonymous;
        had_session
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            session: None,
            epoch: 0,
            last_error: None,
        }
    }
}
