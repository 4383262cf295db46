//! Configuration errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("missing required configuration fields: {0}")]
    MissingFields(String),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("wildcard domain '{wildcard}' requires '{base}' in the domain list")]
    WildcardWithoutBase { wildcard: String, base: String },

    #[error("invalid domain '{0}'")]
    InvalidDomain(String),

    #[error("duplicate domain '{0}'")]
    DuplicateDomain(String),

    #[error("provider '{0}' has an empty api_token")]
    EmptyProviderToken(String),

    #[error("CA directory URL must use https: {0}")]
    InsecureDirectoryUrl(String),

    #[error("active provider '{name}' is not configured (configured: {configured})")]
    UnknownProvider { name: String, configured: String },
}
