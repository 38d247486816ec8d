//! What the signed-in user may do right now

use crate::entitlement::{Entitlement, EntitlementManager, EntitlementPhase};
use crate::session::{SessionManager, SessionPhase};
use chrono::{DateTime, Utc};

/// Gate for premium features such as signal generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Session restore or the first status fetch is still running
    Loading,
    SignedOut,
    NeedsSubscription,
    Premium,
}

impl Access {
    pub fn resolve(
        session: SessionPhase,
        entitlement_phase: EntitlementPhase,
        entitlement: Option<&Entitlement>,
        now: DateTime<Utc>,
    ) -> Self {
        match session {
            SessionPhase::Uninitialized | SessionPhase::Restoring => Access::Loading,
            SessionPhase::Anonymous => Access::SignedOut,
            SessionPhase::Authenticated => match entitlement {
                Some(record) if record.is_entitled(now) => Access::Premium,
                Some(_) => Access::NeedsSubscription,
                None => match entitlement_phase {
                    EntitlementPhase::Unknown | EntitlementPhase::Fetching => Access::Loading,
                    EntitlementPhase::Inactive | EntitlementPhase::Active => {
                        Access::NeedsSubscription
                    }
                },
            },
        }
    }

    /// Gate for what both managers hold right now
    pub async fn current(session: &SessionManager, entitlements: &EntitlementManager) -> Self {
        let phase = session.phase().await;
        let entitlement_phase = entitlements.phase().await;
        let record = entitlements.entitlement().await;
        Self::resolve(phase, entitlement_phase, record.as_ref(), Utc::now())
    }

    pub fn can_generate_signals(self) -> bool {
        self == Access::Premium
    }
}
