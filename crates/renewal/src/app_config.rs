//! Application config consumer
//!
//! Copies a certificate into the `[server]` table of the application
//! configuration stored in the `app_config` scope, appending the result as a
//! new version. The application reads `cert_data`/`key_data` from there.

use certrenew_common::Scope;
use thiserror::Error;
use toml::{Table, Value};
use tracing::{debug, info};

use crate::record::{CertificateRecord, RecordError};
use crate::store::{PayloadFormat, SecureStore, StoreError};

const SERVER_TABLE: &str = "server";
const CERT_DATA_KEY: &str = "cert_data";
const KEY_DATA_KEY: &str = "key_data";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("no certificate stored yet")]
    NoCertificate,

    #[error("no application config stored yet")]
    NoAppConfig,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stored certificate is unreadable: {0}")]
    Record(#[from] RecordError),

    #[error("application config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode application config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("application config key '{0}' is not a table")]
    NotATable(&'static str),
}

/// What an update did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppConfigUpdate {
    /// The config already carried this certificate
    Unchanged { version: u64 },
    /// A new config version was stored
    Updated { version: u64 },
}

/// Copy the latest stored certificate into the latest application config
pub async fn update_app_certificate(store: &dyn SecureStore) -> Result<AppConfigUpdate, AppConfigError> {
    let latest = store
        .latest(&Scope::certificate_output())
        .await
        .map_err(|e| match e {
            e if e.is_not_found() => AppConfigError::NoCertificate,
            e => AppConfigError::Store(e),
        })?;
    let record = CertificateRecord::from_stored(&latest)?;

    let description = format!(
        "Updated TLS cert/key data from certificate {} (expires {})",
        record.identifier,
        certrenew_common::time::format_rfc3339(Some(record.expires_at))
    );
    install_certificate(store, &record.certificate_chain, &record.private_key, &description).await
}

/// Write a chain and key into the latest application config
pub async fn install_certificate(
    store: &dyn SecureStore,
    certificate_chain: &str,
    private_key: &str,
    description: &str,
) -> Result<AppConfigUpdate, AppConfigError> {
    let scope = Scope::app_config();
    let latest = store.latest(&scope).await.map_err(|e| match e {
        e if e.is_not_found() => AppConfigError::NoAppConfig,
        e => AppConfigError::Store(e),
    })?;

    let mut config: Table = toml::from_str(latest.text()?)?;
    let server = config
        .entry(SERVER_TABLE)
        .or_insert_with(|| Value::Table(Table::new()))
        .as_table_mut()
        .ok_or(AppConfigError::NotATable(SERVER_TABLE))?;

    let unchanged = server.get(CERT_DATA_KEY).and_then(Value::as_str) == Some(certificate_chain)
        && server.get(KEY_DATA_KEY).and_then(Value::as_str) == Some(private_key);
    if unchanged {
        debug!(version = latest.version, "Application config already has this certificate");
        return Ok(AppConfigUpdate::Unchanged {
            version: latest.version,
        });
    }

    server.insert(CERT_DATA_KEY.to_string(), Value::String(certificate_chain.to_string()));
    server.insert(KEY_DATA_KEY.to_string(), Value::String(private_key.to_string()));

    let encoded = toml::to_string(&config)?;
    let version = store
        .save(&scope, encoded.as_bytes(), PayloadFormat::Toml, description)
        .await?;

    info!(version, previous = latest.version, "Stored application config with new certificate");
    Ok(AppConfigUpdate::Updated { version })
}
