//! HMAC request signing.
//!
//! A signed request proves its authenticity with headers computed from a
//! shared secret and a canonical form of the request, instead of a bearer
//! token. Two schemes exist:
//!
//! - [`HmacSigner`]: the IAM/IDM scheme. Emits `SignedDate` and
//!   `hsdp-api-signature` over the canonical request.
//! - [`BodySigner`]: the Cartel scheme. Emits `Authorization` computed over
//!   the signed date and raw body, plus the caller's shared key.
//!
//! Both implement [`RequestSigner`], so the dispatcher stays agnostic of the
//! scheme a family uses.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, DATE, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;

use crate::error::{ApiError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Prefix prepended to the secret to form the HMAC key.
const SECRET_PREFIX: &str = "DHPWS";

/// Algorithm token in the signature header.
const ALGORITHM: &str = "HmacSHA256";

/// Header carrying the date that was signed.
pub const SIGNED_DATE: HeaderName = HeaderName::from_static("signeddate");

/// Header carrying the IAM/IDM signature.
pub const API_SIGNATURE: HeaderName = HeaderName::from_static("hsdp-api-signature");

/// Header carrying the Cartel shared key.
pub const CARTEL_TOKEN: HeaderName = HeaderName::from_static("x-cartel-token");

/// Current time in the format expected for `SignedDate`.
pub fn signed_date_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The parts of a request that a signature covers.
#[derive(Debug, Clone)]
pub struct CanonicalRequest<'a> {
    /// HTTP verb.
    pub method: &'a Method,
    /// URL path plus query string with pairs sorted by key, then value.
    pub path: String,
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub signed_date: &'a str,
    /// Raw request body (empty when there is none).
    pub body: &'a [u8],
}

impl<'a> CanonicalRequest<'a> {
    /// Canonicalizes `url` so query parameter order does not affect the
    /// signature.
    pub fn new(method: &'a Method, url: &Url, signed_date: &'a str, body: &'a [u8]) -> Self {
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        pairs.sort();
        let path = if pairs.is_empty() {
            url.path().to_string()
        } else {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            format!("{}?{query}", url.path())
        };
        CanonicalRequest {
            method,
            path,
            signed_date,
            body,
        }
    }

    /// `METHOD\nPATH?QUERY\nSIGNED_DATE\nhex(sha256(body))`
    pub fn string_to_sign(&self) -> String {
        let body_hash = hex::encode(Sha256::digest(self.body));
        format!(
            "{}\n{}\n{}\n{body_hash}",
            self.method.as_str(),
            self.path,
            self.signed_date
        )
    }
}

/// Computes authentication headers for a request.
///
/// Implementations must be immutable after construction: the dispatcher
/// shares one signer across concurrent calls.
pub trait RequestSigner: fmt::Debug + Send + Sync {
    /// Whether the signer holds usable key material.
    fn is_valid(&self) -> bool;

    /// Produces the headers to attach to `request`.
    fn sign(&self, request: &CanonicalRequest<'_>) -> Result<Vec<(HeaderName, HeaderValue)>>;
}

fn hmac_base64(key: &[u8], parts: &[&[u8]]) -> Result<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| ApiError::Signing(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ApiError::Signing(e.to_string()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ── IAM / IDM ──────────────────────────────────────────────────────────

/// The IAM/IDM request signer.
#[derive(Clone)]
pub struct HmacSigner {
    shared_key: String,
    secret_key: String,
}

impl HmacSigner {
    /// Signer over a shared/secret key pair.
    pub fn new(shared_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        HmacSigner {
            shared_key: shared_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Base64 HMAC-SHA256 of the canonical request.
    pub fn signature(&self, request: &CanonicalRequest<'_>) -> Result<String> {
        let key = format!("{SECRET_PREFIX}{}", self.secret_key);
        hmac_base64(key.as_bytes(), &[request.string_to_sign().as_bytes()])
    }

    /// Value of the `hsdp-api-signature` header.
    pub fn signature_header(&self, request: &CanonicalRequest<'_>) -> Result<String> {
        Ok(format!(
            "{ALGORITHM};Credential:{};SignedHeaders:SignedDate;Signature:{}",
            self.shared_key,
            self.signature(request)?
        ))
    }

    /// Checks a received `hsdp-api-signature` header against `request`.
    pub fn verify(&self, request: &CanonicalRequest<'_>, header: &str) -> bool {
        let Some(received) = header
            .split(';')
            .find_map(|part| part.strip_prefix("Signature:"))
        else {
            return false;
        };
        let credential_matches = header
            .split(';')
            .any(|part| part.strip_prefix("Credential:") == Some(self.shared_key.as_str()));
        match self.signature(request) {
            Ok(expected) => credential_matches && constant_time_eq(received, &expected),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("shared_key", &self.shared_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl RequestSigner for HmacSigner {
    fn is_valid(&self) -> bool {
        !self.shared_key.is_empty() && !self.secret_key.is_empty()
    }

    fn sign(&self, request: &CanonicalRequest<'_>) -> Result<Vec<(HeaderName, HeaderValue)>> {
        Ok(vec![
            (SIGNED_DATE, header_value(request.signed_date)?),
            (API_SIGNATURE, header_value(&self.signature_header(request)?)?),
        ])
    }
}

// ── Cartel ─────────────────────────────────────────────────────────────

/// The Cartel request signer.
#[derive(Clone)]
pub struct BodySigner {
    shared_key: String,
    secret_key: String,
}

impl BodySigner {
    /// Signer over a shared/secret key pair.
    pub fn new(shared_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        BodySigner {
            shared_key: shared_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Base64 HMAC-SHA256 of `signed_date || body`.
    pub fn signature(&self, request: &CanonicalRequest<'_>) -> Result<String> {
        hmac_base64(
            self.secret_key.as_bytes(),
            &[request.signed_date.as_bytes(), request.body],
        )
    }

    /// Checks a received `Authorization` header against `request`.
    pub fn verify(&self, request: &CanonicalRequest<'_>, authorization: &str) -> bool {
        match self.signature(request) {
            Ok(expected) => constant_time_eq(authorization, &expected),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for BodySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodySigner")
            .field("shared_key", &self.shared_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl RequestSigner for BodySigner {
    fn is_valid(&self) -> bool {
        !self.shared_key.is_empty() && !self.secret_key.is_empty()
    }

    fn sign(&self, request: &CanonicalRequest<'_>) -> Result<Vec<(HeaderName, HeaderValue)>> {
        Ok(vec![
            (DATE, header_value(request.signed_date)?),
            (CARTEL_TOKEN, header_value(&self.shared_key)?),
            (AUTHORIZATION, header_value(&self.signature(request)?)?),
        ])
    }
}
