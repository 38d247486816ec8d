//! Subscription entitlement module
//!
//! This module provides:
//! - `EntitlementManager` owning the subscription record of the signed-in user
//! - `BillingProvider` trait for the platform store, with a mock implementation
//! - The static offering catalogue

pub mod billing;
pub mod manager;
pub mod offerings;
pub mod state;

pub use billing::{BillingError, BillingProvider, BillingReceipt, MockBillingProvider};
pub use manager::{EntitlementError, EntitlementManager, PurchaseOutcome};
pub use offerings::{MONTHLY_PACKAGE, Offering, Package, PackageType};
pub use state::{
    Entitlement, EntitlementConfig, EntitlementPhase, EntitlementSource, FallbackPolicy,
};
