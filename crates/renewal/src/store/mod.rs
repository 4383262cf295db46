//! Versioned, scoped secret storage
//!
//! The renewal pipeline reads the latest payload of a scope and appends new
//! versions; it never rewrites a stored version. Two implementations ship:
//!
//! - [`FileStore`] - one JSON envelope per version under `<base>/<scope>/`
//! - [`MemoryStore`] - in-process store for tests and embedders

mod file;
mod memory;

use std::fmt;

use async_trait::async_trait;
use certrenew_common::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Encoding of a stored payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Toml,
    Json,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::Toml => write!(f, "toml"),
            PayloadFormat::Json => write!(f, "json"),
        }
    }
}

/// One stored version of a scope
#[derive(Clone, PartialEq, Eq)]
pub struct VersionedPayload {
    /// Monotonic per scope, starting at 1
    pub version: u64,
    pub payload: Vec<u8>,
    pub format: PayloadFormat,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl VersionedPayload {
    /// Payload as UTF-8 text
    pub fn text(&self) -> Result<&str, StoreError> {
        std::str::from_utf8(&self.payload).map_err(|e| StoreError::Corrupt {
            location: format!("version {}", self.version),
            message: format!("payload is not UTF-8: {}", e),
        })
    }
}

impl fmt::Debug for VersionedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads carry private keys
        f.debug_struct("VersionedPayload")
            .field("version", &self.version)
            .field("payload_len", &self.payload.len())
            .field("format", &self.format)
            .field("description", &self.description)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored version in scope '{scope}'")]
    NotFound { scope: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt stored entry at {location}: {message}")]
    Corrupt { location: String, message: String },

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Versioned secret storage.
///
/// `save` appends a version and returns its number. `latest` returns the
/// newest version or [`StoreError::NotFound`] for an empty scope.
#[async_trait]
pub trait SecureStore: Send + Sync + fmt::Debug {
    async fn save(
        &self,
        scope: &Scope,
        payload: &[u8],
        format: PayloadFormat,
        description: &str,
    ) -> Result<u64, StoreError>;

    async fn latest(&self, scope: &Scope) -> Result<VersionedPayload, StoreError>;
}
