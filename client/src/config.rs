//! Client configuration
//!
//! Configuration is loaded from `SIGNALDESK_*` environment variables over
//! built-in defaults.

use crate::entitlement::{EntitlementConfig, FallbackPolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend API base URL
    pub api_url: String,
    /// Transport timeout for every backend request
    pub request_timeout: Duration,
    /// Secure storage file
    pub storage_path: PathBuf,

    /// Subscription configuration
    pub subscription: SubscriptionConfig,

    /// Billing configuration
    pub billing: BillingConfig,
}

/// Subscription-related configuration
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Substitute a placeholder entitlement when the status fetch fails
    pub fallback_enabled: bool,
    /// Whether that placeholder makes a restore succeed
    pub fallback_counts_as_restore: bool,
    /// Length of a purchased period in days
    pub period_days: u32,
}

/// Billing-related configuration
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Artificial delay of the mock store purchase
    pub mock_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://your-backend-url.com/api".to_string(),
            request_timeout: Duration::from_secs(30),
            storage_path: default_storage_path(env::var("HOME").ok()),
            subscription: SubscriptionConfig::default(),
            billing: BillingConfig::default(),
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            fallback_counts_as_restore: false,
            period_days: 30,
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            mock_delay: Duration::from_millis(1500),
        }
    }
}

fn default_storage_path(home: Option<String>) -> PathBuf {
    match home {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".signaldesk").join("secure.json"),
        _ => PathBuf::from("signaldesk-secure.json"),
    }
}

fn parse_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("SIGNALDESK_API_URL")
            && !url.is_empty()
        {
            config.api_url = url;
        }
        if let Some(val) = lookup("SIGNALDESK_REQUEST_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("SIGNALDESK_STORAGE_PATH")
            && !path.is_empty()
        {
            config.storage_path = PathBuf::from(path);
        }

        // Subscription config
        if let Some(val) = lookup("SIGNALDESK_FALLBACK_ENABLED") {
            config.subscription.fallback_enabled = parse_flag(&val);
        }
        if let Some(val) = lookup("SIGNALDESK_FALLBACK_COUNTS_AS_RESTORE") {
            config.subscription.fallback_counts_as_restore = parse_flag(&val);
        }
        if let Some(val) = lookup("SIGNALDESK_SUBSCRIPTION_DAYS")
            && let Ok(days) = val.parse()
        {
            config.subscription.period_days = days;
        }

        // Billing config
        if let Some(val) = lookup("SIGNALDESK_BILLING_DELAY_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.billing.mock_delay = Duration::from_millis(ms);
        }

        config
    }

    pub fn entitlement(&self) -> EntitlementConfig {
        EntitlementConfig {
            fallback: FallbackPolicy {
                enabled: self.subscription.fallback_enabled,
                counts_as_restore: self.subscription.fallback_counts_as_restore,
            },
            subscription_period: chrono::Duration::days(i64::from(self.subscription.period_days)),
        }
    }
}
