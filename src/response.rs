//! Response envelope and the known body shapes.
//!
//! The dispatcher reads each HTTP response body exactly once into a
//! [`Response`] envelope. Typed decoding then happens against one of the
//! shapes below, chosen by the caller per endpoint:
//!
//! - a direct resource (any `T: DeserializeOwned`),
//! - a [`Bundle`]: `{resourceType, total, entry: [...]}` listing,
//! - a [`DataEnvelope`]: the Console `{data, status, error}` wrapper,
//! - a [`ListBody`]: either a bare JSON array or a bundle.
//!
//! Shapes are decoded once into typed structures; nothing walks the JSON
//! tree by path.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::{ErrorBody, Service};

/// Upper bound on raw body text included in error summaries.
const SUMMARY_BODY_LIMIT: usize = 256;

// ── Envelope ───────────────────────────────────────────────────────────

/// The decoded wrapper around one raw HTTP response.
///
/// Owned by a single dispatch and handed back to the caller, either inside
/// [`Dispatched`]/[`Outcome`] or attached to an [`crate::error::ApiError`].
#[derive(Debug, Clone)]
pub struct Response {
    /// Family the request was sent to; decides how `error` was parsed.
    pub service: Service,
    /// HTTP status as returned by the server.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body bytes, read once.
    pub body: Bytes,
    /// Structured error extracted with the family's error shape. Set only
    /// for failed calls: a non-2xx status, or a 2xx body whose in-body
    /// status reports a failure.
    pub error: Option<ErrorBody>,
}

impl Response {
    pub(crate) fn new(service: Service, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let shape = service.error_shape();
        let error = shape
            .parse(&body)
            .filter(|e| !status.is_success() || shape.in_body_status(e).is_some());
        Response {
            service,
            status,
            headers,
            body,
            error,
        }
    }

    /// Whether the HTTP status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Raw body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body into `T`. An empty body is treated as JSON `null`
    /// so that `()` and `Option<_>` targets accept 204 responses.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return serde_json::from_value(Value::Null);
        }
        serde_json::from_slice(&self.body)
    }

    /// One-line description used in error messages: status plus either the
    /// structured error or a truncated raw body.
    pub fn summary(&self) -> String {
        match &self.error {
            Some(error) => format!("{} {}: {error}", self.service, self.status),
            None if self.body.is_empty() => format!("{} {}", self.service, self.status),
            None => {
                let text = self.text();
                let text = match text.char_indices().nth(SUMMARY_BODY_LIMIT) {
                    Some((idx, _)) => format!("{}...", &text[..idx]),
                    None => text,
                };
                format!("{} {}: {text}", self.service, self.status)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(status: StatusCode, body: &str, error: Option<ErrorBody>) -> Self {
        Response {
            service: Service::Iam,
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_owned()),
            error,
        }
    }
}

/// A successfully decoded value together with its envelope.
#[derive(Debug, Clone)]
pub struct Dispatched<T> {
    /// The decoded target.
    pub value: T,
    /// The 2xx envelope it was decoded from.
    pub response: Response,
}

impl<T> Dispatched<T> {
    /// Transforms the decoded value, keeping the envelope.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Dispatched<U> {
        Dispatched {
            value: f(self.value),
            response: self.response,
        }
    }

    /// Drops the envelope.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Result of a call whose only payload is its status.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// `true` iff the status was one of the accepted codes.
    pub ok: bool,
    /// The envelope.
    pub response: Response,
}

// ── Body shapes ────────────────────────────────────────────────────────

/// A paginated listing: `{resourceType, total, entry: [...]}`.
///
/// Entries are opaque by default (`T = serde_json::Value`); use
/// [`Bundle::decode`] to turn them into a concrete resource type, or
/// dispatch with a typed `T` directly.
///
/// A body only decodes as a bundle when it looks like one: it has an
/// `entry` array, a `total`, or `resourceType: "Bundle"`. Any other object
/// is a decode error rather than an empty listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawBundle<T>")]
pub struct Bundle<T = Value> {
    /// Usually `"Bundle"` for FHIR-style services; absent elsewhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Total match count reported by the server. May exceed the number of
    /// entries on this page.
    pub total: Option<u64>,
    /// Entries in server order.
    pub entry: Vec<BundleEntry<T>>,
}

/// Wire form of [`Bundle`] before its shape is checked.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct RawBundle<T> {
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    entry: Option<Vec<BundleEntry<T>>>,
}

impl<T> TryFrom<RawBundle<T>> for Bundle<T> {
    type Error = String;

    fn try_from(raw: RawBundle<T>) -> Result<Self, Self::Error> {
        let tagged = raw.resource_type.as_deref() == Some("Bundle");
        if raw.entry.is_none() && raw.total.is_none() && !tagged {
            return Err("object is not a bundle: no entry, total or resourceType".to_string());
        }
        Ok(Bundle {
            resource_type: raw.resource_type,
            total: raw.total,
            entry: raw.entry.unwrap_or_default(),
        })
    }
}

/// One bundle entry: FHIR-wrapped (`{fullUrl, resource}`) or bare.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleEntry<T> {
    /// `{"fullUrl": "...", "resource": {...}}`
    Wrapped {
        /// Absolute URL of the resource, when provided.
        #[serde(rename = "fullUrl", default, skip_serializing_if = "Option::is_none")]
        full_url: Option<String>,
        /// The resource itself.
        resource: T,
    },
    /// The resource without wrapper.
    Bare(T),
}

impl<T> BundleEntry<T> {
    /// The resource, regardless of wrapping.
    pub fn into_resource(self) -> T {
        match self {
            BundleEntry::Wrapped { resource, .. } | BundleEntry::Bare(resource) => resource,
        }
    }
}

impl<T> Bundle<T> {
    /// Number of entries on this page.
    pub fn len(&self) -> usize {
        self.entry.len()
    }

    /// Whether this page has no entries.
    pub fn is_empty(&self) -> bool {
        self.entry.is_empty()
    }

    /// The resources in server order.
    pub fn into_resources(self) -> Vec<T> {
        self.entry.into_iter().map(BundleEntry::into_resource).collect()
    }
}

impl Bundle<Value> {
    /// Decodes every opaque entry into `U`, preserving order.
    ///
    /// Fails on the first entry that does not match `U`; entries are never
    /// silently dropped.
    pub fn decode<U: DeserializeOwned>(self) -> Result<Vec<U>, serde_json::Error> {
        self.entry
            .into_iter()
            .map(|e| serde_json::from_value(e.into_resource()))
            .collect()
    }
}

/// Console wrapper: `{"data": ..., "status": "...", "error": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    /// The payload.
    pub data: T,
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status: Option<String>,
    /// Error detail; usually absent or empty on success.
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// A listing that is either a bare array or a bundle.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListBody<T> {
    /// `[...]`
    Items(Vec<T>),
    /// `{"total": n, "entry": [...]}`
    Bundle(Bundle<T>),
}

impl<T> ListBody<T> {
    /// Flattens into the listed items, preserving order.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListBody::Items(items) => items,
            ListBody::Bundle(bundle) => bundle.into_resources(),
        }
    }
}
