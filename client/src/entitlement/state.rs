use crate::api::SubscriptionRecord;
use chrono::{DateTime, Duration, Utc};

pub const FALLBACK_PLAN: &str = "premium_mock";
pub const FALLBACK_PRICE: f64 = 49.99;
pub const PURCHASED_PLAN: &str = "premium";

/// Where the held entitlement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementSource {
    /// Answered by the backend
    Confirmed,
    /// Synthesized locally after the backend could not be reached
    Fallback,
}

/// Subscription held for the current session
#[derive(Debug, Clone, PartialEq)]
pub struct Entitlement {
    pub is_active: bool,
    pub plan: String,
    pub price: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source: EntitlementSource,
    /// The backend flagged the record as its own placeholder
    pub server_mock: bool,
}

impl Entitlement {
    pub fn confirmed(record: SubscriptionRecord) -> Self {
        Self {
            is_active: record.is_active,
            plan: record.plan,
            price: record.price,
            expires_at: record.expires_at,
            source: EntitlementSource::Confirmed,
            server_mock: record.mock,
        }
    }

    pub fn fallback(now: DateTime<Utc>, period: Duration) -> Self {
        Self {
            is_active: true,
            plan: FALLBACK_PLAN.to_string(),
            price: Some(FALLBACK_PRICE),
            expires_at: Some(now + period),
            source: EntitlementSource::Fallback,
            server_mock: false,
        }
    }

    /// Active and not past its expiry; a record without expiry never lapses
    pub fn is_entitled(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires| expires > now)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == EntitlementSource::Fallback
    }
}

/// Lifecycle phase of the entitlement container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementPhase {
    /// Nothing known yet, or the session just ended
    Unknown,
    Fetching,
    Inactive,
    Active,
}

/// What to do when the status fetch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Grant a tagged placeholder entitlement instead of failing
    pub enabled: bool,
    /// Whether a placeholder obtained during restore counts as restored
    pub counts_as_restore: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            counts_as_restore: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntitlementConfig {
    pub fallback: FallbackPolicy,
    /// Length of a purchased (or synthesized) subscription period
    pub subscription_period: Duration,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::default(),
            subscription_period: Duration::days(30),
        }
    }
}

#[derive(Debug)]
pub(crate) struct EntitlementState {
    pub phase: EntitlementPhase,
    pub record: Option<Entitlement>,
    pub last_error: Option<String>,
    /// Session epoch the contents were written for
    pub epoch: Option<u64>,
}

impl EntitlementState {
    /// Start over unless the contents already belong to `epoch`
    pub fn adopt(&mut self, epoch: u64) {
        if self.epoch != Some(epoch) {
            self.reset();
            self.epoch = Some(epoch);
        }
    }

    /// Phase and record as seen from the session at `epoch`
    ///
    /// Contents written for another session read as nothing known.
    pub fn view(&self, epoch: Option<u64>) -> (EntitlementPhase, Option<&Entitlement>) {
        match epoch {
            Some(epoch) if self.epoch == Some(epoch) => (self.phase, self.record.as_ref()),
            _ => (EntitlementPhase::Unknown, None),
        }
    }

    /// Recompute the phase from the held record
    pub fn settle(&mut self, now: DateTime<Utc>) {
        self.phase = match &self.record {
            Some(record) if record.is_entitled(now) => EntitlementPhase::Active,
            _ => EntitlementPhase::Inactive,
        };
    }

    pub fn replace(&mut self, record: Entitlement, now: DateTime<Utc>) {
        self.record = Some(record);
        self.last_error = None;
        self.settle(now);
    }

    pub fn reset(&mut self) {
        self.phase = EntitlementPhase::Unknown;
        self.record = None;
        self.last_error = None;
        self.epoch = None;
    }
}

impl Default for EntitlementState {
    fn default() -> Self {
        Self {
            phase: EntitlementPhase::Unknown,
            record: None,
            last_error: None,
            epoch: None,
        }
    }
}
