//! Trading signals and market data
//!
//! `SignalService` runs the signal, performance and dashboard calls for the
//! signed-in user. Generating a signal requires premium access.

pub mod service;

pub use service::{DEFAULT_SIGNAL_LIMIT, SignalError, SignalService};
