//! Persistent secure storage for the session credential
//!
//! This module provides:
//! - `SecureStore` trait, a small async key/value contract
//! - `MemoryStore` for tests and ephemeral runs
//! - `FileStore` keeping all keys in one owner-only JSON file

mod file;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key holding the bearer credential
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Key holding the serialized user profile
pub const USER_KEY: &str = "user";

/// Errors that can occur when reading or writing secure storage
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage file: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Key to string store surviving process restarts
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
