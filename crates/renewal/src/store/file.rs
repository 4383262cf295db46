//! Filesystem-backed versioned store
//!
//! # Directory Structure
//!
//! ```text
//! store/
//! ├── acme_config/
//! │   └── 00000001.json
//! └── certificate_output/
//!     ├── 00000001.json     # first issuance
//!     └── 00000002.json     # renewal
//! ```
//!
//! Each file is a JSON envelope holding the base64 payload, its format,
//! a description and the creation time. Versions are never rewritten.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use certrenew_common::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{PayloadFormat, SecureStore, StoreError, VersionedPayload};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u64,
    format: PayloadFormat,
    description: String,
    created_at: DateTime<Utc>,
    payload: String,
}

/// Versioned store rooted at a directory
///
/// Directories are created with 0700 and files with 0600 permissions on Unix.
#[derive(Debug)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store at the given path
    pub fn new(base_path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(base_path)?;
        set_dir_permissions(base_path)?;

        info!(
            storage_path = %base_path.display(),
            "Initialized certificate store"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    /// Get the storage base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn scope_path(&self, scope: &Scope) -> PathBuf {
        self.base_path.join(scope.as_str())
    }

    fn version_path(&self, scope: &Scope, version: u64) -> PathBuf {
        self.scope_path(scope).join(format!("{:08}.json", version))
    }

    /// Version numbers present in a scope, ascending
    pub fn versions(&self, scope: &Scope) -> Result<Vec<u64>, StoreError> {
        let scope_path = self.scope_path(scope);
        if !scope_path.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&scope_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(version) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn read_version(&self, scope: &Scope, version: u64) -> Result<VersionedPayload, StoreError> {
        let path = self.version_path(scope, version);
        let content = fs::read_to_string(&path)?;
        let envelope: Envelope = serde_json::from_str(&content)?;

        if envelope.version != version {
            return Err(StoreError::Corrupt {
                location: path.display().to_string(),
                message: format!("envelope claims version {}", envelope.version),
            });
        }

        let payload = STANDARD
            .decode(envelope.payload.as_bytes())
            .map_err(|e| StoreError::Corrupt {
                location: path.display().to_string(),
                message: format!("payload is not valid base64: {}", e),
            })?;

        Ok(VersionedPayload {
            version,
            payload,
            format: envelope.format,
            description: envelope.description,
            created_at: envelope.created_at,
        })
    }
}

#[async_trait]
impl SecureStore for FileStore {
    async fn save(
        &self,
        scope: &Scope,
        payload: &[u8],
        format: PayloadFormat,
        description: &str,
    ) -> Result<u64, StoreError> {
        let scope_path = self.scope_path(scope);
        fs::create_dir_all(&scope_path)?;
        set_dir_permissions(&scope_path)?;

        let version = self.versions(scope)?.last().copied().unwrap_or(0) + 1;
        let envelope = Envelope {
            version,
            format,
            description: description.to_string(),
            created_at: Utc::now(),
            payload: STANDARD.encode(payload),
        };
        let content = serde_json::to_vec_pretty(&envelope)?;

        // create_new: a concurrent writer that picked the same version fails
        // here instead of replacing the stored entry
        let path = self.version_path(scope, version);
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(&content)?;
        file.sync_all()?;

        info!(
            scope = %scope,
            version = version,
            format = %format,
            "Saved new version to store"
        );

        Ok(version)
    }

    async fn latest(&self, scope: &Scope) -> Result<VersionedPayload, StoreError> {
        let Some(version) = self.versions(scope)?.last().copied() else {
            trace!(scope = %scope, "No stored version found");
            return Err(StoreError::NotFound {
                scope: scope.to_string(),
            });
        };

        let payload = self.read_version(scope, version)?;
        debug!(
            scope = %scope,
            version = version,
            created_at = %payload.created_at,
            "Loaded latest stored version"
        );
        Ok(payload)
    }
}

fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
