//! ACME account keys and registration
//!
//! The account key comes from configuration as a PEM-encoded EC P-256 key,
//! either PKCS#8 (`PRIVATE KEY`) or SEC1 (`EC PRIVATE KEY`). SEC1 keys are
//! wrapped into PKCS#8 so every later step handles a single encoding.
//!
//! Registration is a signed `newAccount` request. The CA answers with the
//! account URL whether the account was just created or already existed, so
//! the same call both registers and retrieves.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, StatusCode};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use rustls_pemfile::Item;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::IssuanceError;

const JOSE_JSON: &str = "application/jose+json";
const REPLAY_NONCE: &str = "replay-nonce";
const BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";

/// Account key rejection reasons
#[derive(Debug, Error)]
pub enum AccountKeyError {
    #[error("account_private_key contains no private key PEM block")]
    NoKey,

    #[error("failed to read account key PEM: {0}")]
    Pem(String),

    #[error("unsupported account key type {0}; use an EC P-256 key")]
    Unsupported(&'static str),

    #[error("account key is not a usable EC P-256 key: {0}")]
    Rejected(String),
}

/// EC P-256 account key in PKCS#8 form
#[derive(Clone, PartialEq, Eq)]
pub struct AccountKey {
    pkcs8: Vec<u8>,
    /// Uncompressed SEC1 point: 0x04 || x || y
    public_key: Vec<u8>,
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("algorithm", &"ES256")
            .field("public_key", &URL_SAFE_NO_PAD.encode(&self.public_key))
            .finish()
    }
}

impl AccountKey {
    /// Parse the first private key in a PEM document
    pub fn from_pem(pem: &str) -> Result<Self, AccountKeyError> {
        let mut reader = pem.as_bytes();
        loop {
            let item = rustls_pemfile::read_one(&mut reader)
                .map_err(|e| AccountKeyError::Pem(e.to_string()))?;
            match item {
                Some(Item::Pkcs8Key(key)) => return Self::from_pkcs8_der(key.secret_pkcs8_der()),
                Some(Item::Sec1Key(key)) => {
                    return Self::from_pkcs8_der(&sec1_to_pkcs8(key.secret_sec1_der()))
                }
                Some(Item::Pkcs1Key(_)) => return Err(AccountKeyError::Unsupported("RSA (PKCS#1)")),
                Some(_) => continue,
                None => return Err(AccountKeyError::NoKey),
            }
        }
    }

    /// Load a PKCS#8 DER key, checking it is EC P-256
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, AccountKeyError> {
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, der, &SystemRandom::new())
            .map_err(|e| AccountKeyError::Rejected(e.to_string()))?;

        Ok(Self {
            pkcs8: der.to_vec(),
            public_key: key_pair.public_key().as_ref().to_vec(),
        })
    }

    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Public key as a JSON Web Key
    pub fn jwk(&self) -> serde_json::Value {
        let (x, y) = self.public_key[1..].split_at(32);
        json!({
            "crv": "P-256",
            "kty": "EC",
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
        })
    }

    /// ES256 signature (r || s, 64 bytes)
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, IssuanceError> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &self.pkcs8, &rng)
            .map_err(|e| IssuanceError::Signing(e.to_string()))?;
        let signature = key_pair
            .sign(&rng, message)
            .map_err(|_| IssuanceError::Signing("ECDSA signing failed".to_string()))?;
        Ok(signature.as_ref().to_vec())
    }

    /// Flattened JWS with the public key embedded, as `newAccount` requires
    pub fn sign_jws_with_jwk(
        &self,
        url: &str,
        nonce: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, IssuanceError> {
        let protected = json!({
            "alg": "ES256",
            "jwk": self.jwk(),
            "nonce": nonce,
            "url": url,
        });
        let protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected)?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
        let signature = self.sign(format!("{}.{}", protected, payload).as_bytes())?;

        Ok(json!({
            "protected": protected,
            "payload": payload,
            "signature": URL_SAFE_NO_PAD.encode(signature),
        }))
    }
}

/// Wrap a SEC1 `ECPrivateKey` for P-256 into a PKCS#8 `PrivateKeyInfo`
fn sec1_to_pkcs8(sec1: &[u8]) -> Vec<u8> {
    // id-ecPublicKey, prime256v1
    const EC_PUBLIC_KEY_OID: &[u8] = &[0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
    const P256_OID: &[u8] = &[0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];

    let algorithm = der_tlv(0x30, &[EC_PUBLIC_KEY_OID, P256_OID].concat());
    let version = [0x02, 0x01, 0x00];
    let private_key = der_tlv(0x04, sec1);

    der_tlv(0x30, &[&version[..], &algorithm, &private_key].concat())
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        // Long form: length of the length, then big-endian without leading zeros
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Directory {
    new_nonce: String,
    new_account: String,
}

#[derive(Debug, Deserialize)]
struct Problem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    detail: String,
}

/// Register the key with the CA, or find the existing account for it.
///
/// Returns the account URL.
pub async fn register_account(
    http: &Client,
    directory_url: &str,
    email: &str,
    key: &AccountKey,
) -> Result<String, IssuanceError> {
    let directory: Directory = http
        .get(directory_url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| IssuanceError::Directory(e.to_string()))?
        .json()
        .await
        .map_err(|e| IssuanceError::Directory(e.to_string()))?;

    let contact: Vec<String> = if email.is_empty() {
        Vec::new()
    } else {
        vec![format!("mailto:{}", email)]
    };
    let payload = json!({
        "termsOfServiceAgreed": true,
        "contact": contact,
    });

    let mut nonce = fetch_nonce(http, &directory.new_nonce).await?;

    // One retry when the CA rejects the nonce, using the fresh one it returns
    for attempt in 0..2 {
        let body = key.sign_jws_with_jwk(&directory.new_account, &nonce, &payload)?;
        let response = http
            .post(&directory.new_account)
            .header(CONTENT_TYPE, JOSE_JSON)
            .body(serde_json::to_vec(&body)?)
            .send()
            .await?;

        let status = response.status();
        let next_nonce = header_value(&response, REPLAY_NONCE);

        if status == StatusCode::OK || status == StatusCode::CREATED {
            let account_url = header_value(&response, LOCATION.as_str()).ok_or_else(|| {
                IssuanceError::Registration("CA response has no Location header".to_string())
            })?;
            if status == StatusCode::CREATED {
                info!(account = %account_url, "Registered new ACME account");
            } else {
                debug!(account = %account_url, "Found existing ACME account");
            }
            return Ok(account_url);
        }

        let problem: Problem = response.json().await.unwrap_or(Problem {
            kind: String::new(),
            detail: String::new(),
        });

        match next_nonce {
            Some(fresh) if problem.kind == BAD_NONCE && attempt == 0 => {
                warn!("CA rejected the replay nonce, retrying once");
                nonce = fresh;
            }
            _ => {
                return Err(IssuanceError::Registration(format!(
                    "HTTP {}: {} {}",
                    status, problem.kind, problem.detail
                )))
            }
        }
    }

    Err(IssuanceError::Registration(
        "CA kept rejecting the replay nonce".to_string(),
    ))
}

async fn fetch_nonce(http: &Client, new_nonce_url: &str) -> Result<String, IssuanceError> {
    let response = http.head(new_nonce_url).send().await?;
    header_value(&response, REPLAY_NONCE)
        .ok_or_else(|| IssuanceError::Directory("newNonce returned no Replay-Nonce".to_string()))
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
