//! Backend API module
//!
//! This module provides:
//! - `Backend` trait describing the SignalDesk REST contract (auth,
//!   subscription, signals and market data)
//! - `HttpBackend` talking JSON over HTTPS with reqwest
//! - Wire types and the `ApiError` taxonomy shared by both managers

mod backend;
mod http;
mod types;

pub use backend::Backend;
pub use http::HttpBackend;
pub use types::{
    ActivateRequest, ActivateResponse, ApiError, Asset, AssetCatalog, AuthResponse,
    DEFAULT_ASSET, Dashboard, Health, Performance, Signal, SignalRequest, SignalStatus,
    SubscriptionRecord, Timeframe, User, UserId,
};
