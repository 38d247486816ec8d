//! Store billing abstraction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::offerings::Package;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BillingError {
    #[error("Purchase cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(String),
}

/// Proof of a completed store transaction
#[derive(Debug, Clone, PartialEq)]
pub struct BillingReceipt {
    pub transaction_id: Uuid,
    pub package_id: String,
    pub purchased_at: DateTime<Utc>,
}

/// Trait for the platform store (App Store / Play billing)
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Run the store purchase sheet for `package`
    async fn purchase(&self, package: &Package) -> Result<BillingReceipt, BillingError>;

    /// Previously completed purchases known to the store
    async fn restore(&self) -> Result<Vec<BillingReceipt>, BillingError>;
}

/// Store stand-in that always succeeds after a fixed delay
pub struct MockBillingProvider {
    delay: Duration,
}

impl MockBillingProvider {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockBillingProvider {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn purchase(&self, package: &Package) -> Result<BillingReceipt, BillingError> {
        tokio::time::sleep(self.delay).await;
        let receipt = BillingReceipt {
            transaction_id: Uuid::new_v4(),
            package_id: package.identifier.clone(),
            purchased_at: Utc::now(),
        };
        debug!(
            "Mock store completed purchase {} of {}",
            receipt.transaction_id, receipt.package_id
        );
        Ok(receipt)
    }

    async fn restore(&self) -> Result<Vec<BillingReceipt>, BillingError> {
        Ok(Vec::new())
    }
}
