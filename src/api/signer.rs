//! ACS3-HMAC-SHA256 request signing for Aliyun RPC-style APIs.
//!
//! Every request is a bodiless `POST /` with its parameters in the query
//! string. The signature covers the method, the canonical query, the `host`
//! and `x-acs-*` headers and the hash of the (empty) payload.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::RemoteError;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "ACS3-HMAC-SHA256";

const METHOD: &str = "POST";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Headers and query string of a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// Canonical query string, ready to append after `?`.
    pub query: String,
    /// Headers to send, `Authorization` included.
    pub headers: Vec<(String, String)>,
}

impl SignedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Signs requests with an AccessKey pair.
#[derive(Clone)]
pub struct Signer {
    access_key_id: String,
    access_key_secret: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"***")
            .finish()
    }
}

impl Signer {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    /// Signs a call with the current time and a fresh nonce.
    pub fn sign(
        &self,
        host: &str,
        action: &str,
        version: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<SignedRequest, RemoteError> {
        let nonce = uuid::Uuid::new_v4().to_string();
        self.sign_at(host, action, version, params, Utc::now(), &nonce)
    }

    /// Signs a call at a fixed time with a fixed nonce.
    pub fn sign_at(
        &self,
        host: &str,
        action: &str,
        version: &str,
        params: &BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
        nonce: &str,
    ) -> Result<SignedRequest, RemoteError> {
        if self.access_key_id.is_empty() || self.access_key_secret.is_empty() {
            return Err(RemoteError::MissingCredentials(
                "Aliyun AccessKey id and secret are required".to_string(),
            ));
        }

        let query = canonical_query(params);
        let payload_hash = sha256_hex(b"");

        // Sorted by lowercase name.
        let signed: Vec<(&str, String)> = vec![
            ("host", host.to_string()),
            ("x-acs-action", action.to_string()),
            ("x-acs-content-sha256", payload_hash.clone()),
            ("x-acs-date", timestamp.format(DATE_FORMAT).to_string()),
            ("x-acs-signature-nonce", nonce.to_string()),
            ("x-acs-version", version.to_string()),
        ];

        let canonical_headers: String = signed
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_headers = signed
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n/\n{}\n{}\n{}\n{}",
            METHOD, query, canonical_headers, signed_headers, payload_hash
        );
        let string_to_sign = format!(
            "{}\n{}",
            ALGORITHM,
            sha256_hex(canonical_request.as_bytes())
        );

        let mut mac = HmacSha256::new_from_slice(self.access_key_secret.as_bytes())
            .map_err(|e| RemoteError::MissingCredentials(format!("invalid signing key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let authorization = format!(
            "{} Credential={},SignedHeaders={},Signature={}",
            ALGORITHM, self.access_key_id, signed_headers, signature
        );

        let mut headers: Vec<(String, String)> = signed
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        headers.push(("authorization".to_string(), authorization));

        Ok(SignedRequest { query, headers })
    }
}

/// Sorted, RFC 3986 encoded `key=value` pairs joined by `&`.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
