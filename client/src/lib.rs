//! SignalDesk Client Library
//!
//! Session and subscription state for the SignalDesk trading-signal app:
//! sign-in and persisted credentials, entitlement status, purchase flows and
//! the access gate derived from both, and the signal calls behind that gate.

pub mod access;
pub mod api;
pub mod app;
pub mod config;
pub mod entitlement;
pub mod session;
pub mod signal;
pub mod storage;

pub(crate) mod busy;


// Re-export commonly used types
pub use access::Access;
pub use app::AppContext;
pub use config::Config;
pub use entitlement::{EntitlementError, EntitlementManager, PurchaseOutcome};
pub use session::{SessionError, SessionManager, SessionPhase};
pub use signal::{SignalError, SignalService};
