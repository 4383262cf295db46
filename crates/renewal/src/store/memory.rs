//! In-process versioned store

use std::collections::HashMap;

use async_trait::async_trait;
use certrenew_common::Scope;
use chrono::Utc;
use parking_lot::Mutex;

use super::{PayloadFormat, SecureStore, StoreError, VersionedPayload};

/// Store keeping every version in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    scopes: Mutex<HashMap<Scope, Vec<VersionedPayload>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All versions of a scope, oldest first
    pub fn versions(&self, scope: &Scope) -> Vec<VersionedPayload> {
        self.scopes.lock().get(scope).cloned().unwrap_or_default()
    }

    /// Number of versions saved in a scope
    pub fn version_count(&self, scope: &Scope) -> usize {
        self.scopes.lock().get(scope).map_or(0, Vec::len)
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn save(
        &self,
        scope: &Scope,
        payload: &[u8],
        format: PayloadFormat,
        description: &str,
    ) -> Result<u64, StoreError> {
        let mut scopes = self.scopes.lock();
        let versions = scopes.entry(scope.clone()).or_default();
        let version = versions.len() as u64 + 1;
        versions.push(VersionedPayload {
            version,
            payload: payload.to_vec(),
            format,
            description: description.to_string(),
            created_at: Utc::now(),
        });
        Ok(version)
    }

    async fn latest(&self, scope: &Scope) -> Result<VersionedPayload, StoreError> {
        self.scopes
            .lock()
            .get(scope)
            .and_then(|versions| versions.last().cloned())
            .ok_or_else(|| StoreError::NotFound {
                scope: scope.to_string(),
            })
    }
}
