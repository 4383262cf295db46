//! Certificate records
//!
//! A [`CertificateRecord`] is what a successful issuance produces and what
//! the certificate scope stores: the PEM chain and key plus the validity
//! window read from the leaf certificate.

use std::fmt;

use certrenew_common::time::{format_rfc3339, parse_rfc3339};
use certrenew_common::CertificateId;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x509_parser::prelude::{GeneralName, Pem, X509Certificate};

use crate::store::{StoreError, VersionedPayload};

/// Errors building or decoding a certificate record
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("certificate chain contains no PEM block")]
    NoPemBlock,

    #[error("failed to decode PEM block: {0}")]
    InvalidPem(String),

    #[error("expected a CERTIFICATE PEM block, found '{0}'")]
    UnexpectedPemLabel(String),

    #[error("failed to parse X.509 certificate: {0}")]
    InvalidCertificate(String),

    #[error("certificate validity is out of range")]
    InvalidTimestamp,

    #[error("certificate expires at {expires_at} which is not after issuance at {issued_at}")]
    InvalidValidity {
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },

    #[error("issued certificate has no private key")]
    EmptyPrivateKey,

    #[error("no identifier given and the certificate names no subject")]
    NoIdentifier,

    #[error("failed to decode stored record: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("failed to encode domain list: {0}")]
    DomainList(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validity window and names read from a leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub dns_names: Vec<String>,
    pub common_name: Option<String>,
}

/// Decode the first PEM block of a chain and read the leaf certificate
pub fn parse_leaf(chain_pem: &str) -> Result<LeafInfo, RecordError> {
    let pem = Pem::iter_from_buffer(chain_pem.as_bytes())
        .next()
        .ok_or(RecordError::NoPemBlock)?
        .map_err(|e| RecordError::InvalidPem(e.to_string()))?;

    if pem.label != "CERTIFICATE" {
        return Err(RecordError::UnexpectedPemLabel(pem.label));
    }

    let cert = pem
        .parse_x509()
        .map_err(|e| RecordError::InvalidCertificate(e.to_string()))?;

    leaf_info(&cert)
}

fn leaf_info(cert: &X509Certificate<'_>) -> Result<LeafInfo, RecordError> {
    let validity = cert.validity();
    let not_before = DateTime::<Utc>::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or(RecordError::InvalidTimestamp)?;
    let not_after = DateTime::<Utc>::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or(RecordError::InvalidTimestamp)?;

    let mut dns_names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                dns_names.push(dns.to_string());
            }
        }
    }

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    Ok(LeafInfo {
        not_before,
        not_after,
        dns_names,
        common_name,
    })
}

/// An obtained certificate, ready to be stored
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Stable across renewals; the primary domain of the request
    pub identifier: CertificateId,
    pub domains: Vec<String>,
    /// PEM leaf followed by intermediates
    pub certificate_chain: String,
    /// PEM private key of the certificate
    pub private_key: String,
    #[serde(with = "rfc3339")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "rfc3339")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, with = "rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub last_renewal_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, with = "rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("identifier", &self.identifier)
            .field("domains", &self.domains)
            .field("certificate_chain_len", &self.certificate_chain.len())
            .field("private_key", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("last_renewal_attempt_at", &self.last_renewal_attempt_at)
            .finish()
    }
}

impl CertificateRecord {
    /// Start building a record from freshly issued material
    pub fn builder<'a>(
        domains: &'a [String],
        certificate_chain: &'a str,
        private_key: &'a str,
    ) -> CertificateRecordBuilder<'a> {
        CertificateRecordBuilder {
            domains,
            certificate_chain,
            private_key,
            identifier: None,
            attempted_at: None,
        }
    }

    /// Human-readable summary stored as the version description
    pub fn description(&self) -> String {
        format!(
            "Obtained certificate for domains: {} (expires {})",
            self.domains.join(", "),
            format_rfc3339(Some(self.expires_at))
        )
    }

    /// Domain list encoded as a JSON array
    pub fn domains_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(&self.domains)?)
    }

    pub fn to_toml_string(&self) -> Result<String, RecordError> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RecordError> {
        Ok(toml::from_str(content)?)
    }

    /// Decode a stored version. `updated_at` is when that version was
    /// written; `created_at` keeps the value carried over from earlier
    /// versions, or is the version's own timestamp. Both have second
    /// precision, like every persisted timestamp.
    pub fn from_stored(stored: &VersionedPayload) -> Result<Self, RecordError> {
        let mut record = Self::from_toml_str(stored.text()?)?;
        let written = stored.created_at.trunc_subsecs(0);
        record.created_at.get_or_insert(written);
        record.updated_at = Some(written);
        Ok(record)
    }
}

/// Builds a [`CertificateRecord`] from a PEM chain and key
#[derive(Debug)]
pub struct CertificateRecordBuilder<'a> {
    domains: &'a [String],
    certificate_chain: &'a str,
    private_key: &'a str,
    identifier: Option<CertificateId>,
    attempted_at: Option<DateTime<Utc>>,
}

impl<'a> CertificateRecordBuilder<'a> {
    /// Use an explicit identifier instead of one read from the leaf
    pub fn identifier(mut self, identifier: impl Into<CertificateId>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Record when the renewal attempt that produced this certificate started
    pub fn attempted_at(mut self, at: DateTime<Utc>) -> Self {
        self.attempted_at = Some(at);
        self
    }

    pub fn build(self) -> Result<CertificateRecord, RecordError> {
        let leaf = parse_leaf(self.certificate_chain)?;

        if self.private_key.trim().is_empty() {
            return Err(RecordError::EmptyPrivateKey);
        }

        if leaf.not_after <= leaf.not_before {
            return Err(RecordError::InvalidValidity {
                issued_at: leaf.not_before,
                expires_at: leaf.not_after,
            });
        }

        let identifier = match self.identifier {
            Some(id) => id,
            None => leaf
                .dns_names
                .first()
                .cloned()
                .or(leaf.common_name)
                .map(CertificateId::from)
                .ok_or(RecordError::NoIdentifier)?,
        };

        Ok(CertificateRecord {
            identifier,
            domains: self.domains.to_vec(),
            certificate_chain: self.certificate_chain.to_string(),
            private_key: self.private_key.to_string(),
            issued_at: leaf.not_before,
            expires_at: leaf.not_after,
            last_renewal_attempt_at: self.attempted_at,
            created_at: None,
            updated_at: None,
        })
    }
}

mod rfc3339 {
    use super::{format_rfc3339, parse_rfc3339};
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_rfc3339(Some(*value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_rfc3339(&raw)
            .map_err(de::Error::custom)?
            .ok_or_else(|| de::Error::custom("timestamp must not be empty"))
    }
}

mod rfc3339_opt {
    use super::{format_rfc3339, parse_rfc3339};
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_rfc3339(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_rfc3339(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PayloadFormat;
    use crate::testutil::{self_signed, self_signed_with_cn};
    use chrono::TimeZone;

    fn domains() -> Vec<String> {
        vec!["example.com".to_string(), "www.example.com".to_string()]
    }

    #[test]
    fn test_build_reads_validity_window() {
        let (chain, key) = self_signed(&["example.com", "www.example.com"], (2025, 1, 10), (2025, 4, 10));

        let record = CertificateRecord::builder(&domains(), &chain, &key)
            .build()
            .unwrap();

        assert_eq!(record.issued_at, Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap());
        assert_eq!(record.expires_at, Utc.with_ymd_and_hms(2025, 4, 10, 0, 0, 0).unwrap());
        assert_eq!(record.identifier.as_str(), "example.com");
        assert_eq!(record.domains, domains());
        assert!(record.last_renewal_attempt_at.is_none());
    }

    #[test]
    fn test_explicit_identifier_and_attempt_time() {
        let (chain, key) = self_signed(&["www.example.com"], (2025, 1, 10), (2025, 4, 10));
        let attempt = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();

        let record = CertificateRecord::builder(&domains(), &chain, &key)
            .identifier("example.com")
            .attempted_at(attempt)
            .build()
            .unwrap();

        assert_eq!(record.identifier.as_str(), "example.com");
        assert_eq!(record.last_renewal_attempt_at, Some(attempt));
    }

    #[test]
    fn test_identifier_falls_back_to_common_name() {
        let (chain, key) = self_signed_with_cn("legacy.example.com", (2025, 1, 10), (2025, 4, 10));
        let record = CertificateRecord::builder(&domains(), &chain, &key)
            .build()
            .unwrap();
        assert_eq!(record.identifier.as_str(), "legacy.example.com");
    }

    #[test]
    fn test_rejects_bad_material() {
        let (chain, key) = self_signed(&["example.com"], (2025, 1, 10), (2025, 4, 10));

        assert!(matches!(
            CertificateRecord::builder(&domains(), "", &key).build(),
            Err(RecordError::NoPemBlock)
        ));
        assert!(matches!(
            CertificateRecord::builder(&domains(), &key, &key).build(),
            Err(RecordError::UnexpectedPemLabel(_))
        ));
        assert!(matches!(
            CertificateRecord::builder(
                &domains(),
                "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n",
                &key
            )
            .build(),
            Err(RecordError::InvalidCertificate(_))
        ));
        assert!(matches!(
            CertificateRecord::builder(&domains(), &chain, "  ").build(),
            Err(RecordError::EmptyPrivateKey)
        ));
    }

    #[test]
    fn test_rejects_inverted_validity() {
        let (chain, key) = self_signed(&["example.com"], (2025, 4, 10), (2025, 1, 10));
        assert!(matches!(
            CertificateRecord::builder(&domains(), &chain, &key).build(),
            Err(RecordError::InvalidValidity { .. })
        ));
    }

    #[test]
    fn test_description_and_domains_json() {
        let (chain, key) = self_signed(&["example.com"], (2025, 1, 10), (2025, 4, 10));
        let record = CertificateRecord::builder(&domains(), &chain, &key)
            .build()
            .unwrap();

        assert_eq!(
            record.description(),
            "Obtained certificate for domains: example.com, www.example.com (expires 2025-04-10T00:00:00Z)"
        );
        assert_eq!(
            record.domains_json().unwrap(),
            r#"["example.com","www.example.com"]"#
        );
    }

    #[test]
    fn test_toml_roundtrip_and_debug_redaction() {
        let (chain, key) = self_signed(&["example.com"], (2025, 1, 10), (2025, 4, 10));
        let record = CertificateRecord::builder(&domains(), &chain, &key)
            .attempted_at(Utc.with_ymd_and_hms(2025, 1, 9, 23, 0, 0).unwrap())
            .build()
            .unwrap();

        let text = record.to_toml_string().unwrap();
        assert!(text.contains("issued_at = \"2025-01-10T00:00:00Z\""));
        assert!(!text.contains("created_at"));
        assert_eq!(CertificateRecord::from_toml_str(&text).unwrap(), record);

        assert!(!format!("{:?}", record).contains("PRIVATE KEY"));
    }

    #[test]
    fn test_from_stored_fills_store_timestamps() {
        let (chain, key) = self_signed(&["example.com"], (2025, 1, 10), (2025, 4, 10));
        let mut record = CertificateRecord::builder(&domains(), &chain, &key)
            .build()
            .unwrap();
        let written = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
        let stored = |record: &CertificateRecord| VersionedPayload {
            version: 3,
            payload: record.to_toml_string().unwrap().into_bytes(),
            format: PayloadFormat::Toml,
            description: record.description(),
            created_at: written,
        };

        let decoded = CertificateRecord::from_stored(&stored(&record)).unwrap();
        assert_eq!(decoded.created_at, Some(written));
        assert_eq!(decoded.updated_at, Some(written));

        let first = Utc.with_ymd_and_hms(2024, 10, 12, 8, 0, 0).unwrap();
        record.created_at = Some(first);
        let decoded = CertificateRecord::from_stored(&stored(&record)).unwrap();
        assert_eq!(decoded.created_at, Some(first));
        assert_eq!(decoded.updated_at, Some(written));
    }

    #[test]
    fn test_from_stored_rejects_binary_payload() {
        let stored = VersionedPayload {
            version: 1,
            payload: vec![0xff, 0xfe],
            format: PayloadFormat::Toml,
            description: String::new(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            CertificateRecord::from_stored(&stored),
            Err(RecordError::Store(_))
        ));
    }

    #[test]
    fn test_empty_optional_timestamps_decode_as_none() {
        let (chain, key) = self_signed(&["example.com"], (2025, 1, 10), (2025, 4, 10));
        let record = CertificateRecord::builder(&domains(), &chain, &key)
            .build()
            .unwrap();
        let text = format!("{}updated_at = \"\"\n", record.to_toml_string().unwrap());
        let decoded = CertificateRecord::from_toml_str(&text).unwrap();
        assert_eq!(decoded.updated_at, None);
    }
}
