//! Request descriptor and query options.
//!
//! A [`Request`] is built once per call, adjusted through header and option
//! calls, and consumed exactly once by the dispatcher. It holds everything
//! except credentials: the family, verb, base-relative path, the serialized
//! JSON body, ordered query parameters and headers.
//!
//! Query parameters are contributed by [`RequestOption`]s. Any
//! `Fn(&mut Query) -> Result<()>` closure is an option, and the helpers in
//! this module cover the common cases: single parameters, paging, and
//! typed search structs serialized through `serde_urlencoded`.

use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use url::Url;
use validator::Validate;

use crate::error::{ApiError, Result};
use crate::service::Service;

/// Name of the API version header.
pub const API_VERSION: HeaderName = HeaderName::from_static("api-version");

const JSON: &str = "application/json";

// ── Query options ──────────────────────────────────────────────────────

/// Ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Adds a parameter, keeping any existing values for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Replaces every value of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.pairs.retain(|(k, _)| *k != key);
        self.pairs.push((key, value.into()));
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Mutates the query string of a request.
pub trait RequestOption {
    /// Adds or replaces parameters in `query`.
    fn apply(&self, query: &mut Query) -> Result<()>;
}

impl<F> RequestOption for F
where
    F: Fn(&mut Query) -> Result<()>,
{
    fn apply(&self, query: &mut Query) -> Result<()> {
        self(query)
    }
}

/// Sets `key=value`.
pub fn query(key: impl Into<String>, value: impl Into<String>) -> impl RequestOption {
    let key = key.into();
    let value = value.into();
    move |q: &mut Query| -> Result<()> {
        q.set(key.clone(), value.clone());
        Ok(())
    }
}

/// Sets `pageSize`.
pub fn page_size(size: u32) -> impl RequestOption {
    query("pageSize", size.to_string())
}

/// Sets `pageNumber`.
pub fn page_number(number: u32) -> impl RequestOption {
    query("pageNumber", number.to_string())
}

/// Sets the FHIR `_count` parameter.
pub fn count(count: u32) -> impl RequestOption {
    query("_count", count.to_string())
}

/// Maps a typed search struct onto query parameters.
///
/// Field names follow the struct's serde attributes and `None` fields are
/// skipped. Serialization happens eagerly, so a struct that cannot be
/// expressed as a flat query string fails here rather than at dispatch.
pub fn options<T: Serialize + ?Sized>(opts: &T) -> Result<impl RequestOption + use<T>> {
    let encoded = serde_urlencoded::to_string(opts)
        .map_err(|e| ApiError::Config(format!("unable to encode query options: {e}")))?;
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(encoded.as_bytes())
        .into_owned()
        .collect();
    Ok(move |q: &mut Query| -> Result<()> {
        for (k, v) in &pairs {
            q.set(k.clone(), v.clone());
        }
        Ok(())
    })
}

// ── Request ────────────────────────────────────────────────────────────

/// One outbound call, minus credentials.
#[derive(Debug, Clone)]
pub struct Request {
    service: Service,
    method: Method,
    path: String,
    body: Option<Vec<u8>>,
    query: Query,
    headers: HeaderMap,
}

impl Request {
    /// Starts a request with the family's default headers:
    /// `Content-Type` and `Accept` set to JSON, plus `api-version` when the
    /// family has a default.
    pub fn new(service: Service, method: Method, path: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        if let Some(version) = service.default_api_version() {
            headers.insert(API_VERSION, HeaderValue::from_static(version));
        }
        Request {
            service,
            method,
            path: path.into(),
            body: None,
            query: Query::default(),
            headers,
        }
    }

    /// A `GET` request.
    pub fn get(service: Service, path: impl Into<String>) -> Self {
        Request::new(service, Method::GET, path)
    }

    /// A `POST` request.
    pub fn post(service: Service, path: impl Into<String>) -> Self {
        Request::new(service, Method::POST, path)
    }

    /// A `PUT` request.
    pub fn put(service: Service, path: impl Into<String>) -> Self {
        Request::new(service, Method::PUT, path)
    }

    /// A `PATCH` request.
    pub fn patch(service: Service, path: impl Into<String>) -> Self {
        Request::new(service, Method::PATCH, path)
    }

    /// A `DELETE` request.
    pub fn delete(service: Service, path: impl Into<String>) -> Self {
        Request::new(service, Method::DELETE, path)
    }

    /// Serializes `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::Config(format!("unable to serialize request body: {e}")))?;
        self.body = Some(bytes);
        Ok(self)
    }

    /// Validates `body`, then serializes it as the JSON payload.
    ///
    /// A body that fails validation never reaches the network.
    pub fn json_validated<B: Serialize + Validate>(self, body: &B) -> Result<Self> {
        body.validate()?;
        self.json(body)
    }

    /// Sets (replaces) a header.
    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        self.set_header(name, value)?;
        Ok(self)
    }

    /// In-place variant of [`Request::header`].
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<()> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::Config(format!("invalid value for header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Overrides the `api-version` header for this call.
    pub fn api_version(self, version: &str) -> Result<Self> {
        self.header(API_VERSION, version)
    }

    /// Applies one query option.
    pub fn option(mut self, option: impl RequestOption) -> Result<Self> {
        option.apply(&mut self.query)?;
        Ok(self)
    }

    /// Applies several query options in order.
    pub fn with_options<'a, I>(mut self, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a dyn RequestOption>,
    {
        for option in options {
            option.apply(&mut self.query)?;
        }
        Ok(self)
    }

    /// Target service family.
    pub fn service(&self) -> Service {
        self.service
    }

    /// HTTP verb.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the family base URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Serialized JSON body, if any.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Query parameters applied so far.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Headers to send, credentials excluded.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Resolves the absolute URL beneath `base`.
    ///
    /// A leading `/` is treated as relative to the base, not to the host
    /// root. Paths that would leave the base (absolute URLs,
    /// protocol-relative `//host` forms, or `..` escapes) are rejected.
    pub(crate) fn url(&self, base: &Url) -> Result<Url> {
        if self.path.starts_with("//") {
            return Err(ApiError::InvalidPath(self.path.clone()));
        }
        let relative = self.path.trim_start_matches('/');
        if Url::parse(relative).is_ok() {
            return Err(ApiError::InvalidPath(self.path.clone()));
        }
        let mut url = base.join(relative)?;
        if url.origin() != base.origin() || !url.path().starts_with(base.path()) {
            return Err(ApiError::InvalidPath(self.path.clone()));
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }

    pub(crate) fn into_parts(self) -> (Service, Method, Option<Vec<u8>>, HeaderMap) {
        (self.service, self.method, self.body, self.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Default)]
    #[serde(rename_all = "camelCase")]
    struct GetServiceOptions {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        application_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    }

    #[derive(Serialize, Validate)]
    struct Person {
        #[validate(length(min = 1))]
        login_id: String,
        #[validate(email)]
        email: String,
    }

    fn base() -> Url {
        Url::parse("https://idm.example.com/").unwrap()
    }

    #[test]
    fn new_sets_family_default_headers() {
        let req = Request::get(Service::Idm, "security/users");
        assert_eq!(req.headers()[CONTENT_TYPE], JSON);
        assert_eq!(req.headers()[API_VERSION], "1");

        let console = Request::get(Service::Console, "v3/metrics/rules");
        assert!(console.headers().get(API_VERSION).is_none());
    }

    #[test]
    fn api_version_overrides_default() {
        let req = Request::post(Service::Idm, "authorize/identity/User")
            .api_version("2")
            .unwrap();
        assert_eq!(req.headers()[API_VERSION], "2");
        assert_eq!(req.headers().get_all(API_VERSION).iter().count(), 1);
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let err = Request::get(Service::Iam, "x")
            .header(API_VERSION, "bad\nvalue")
            .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn options_struct_skips_none_fields() {
        let opts = GetServiceOptions {
            application_id: Some("app-1".to_string()),
            ..Default::default()
        };
        let req = Request::get(Service::Iam, "authorize/identity/Service")
            .option(options(&opts).unwrap())
            .unwrap();
        assert_eq!(req.query().get("applicationId"), Some("app-1"));
        assert!(req.query().get("_id").is_none());
        assert!(req.query().get("name").is_none());
    }

    #[test]
    fn later_options_replace_earlier_values() {
        let size = page_size(10);
        let size_again = page_size(50);
        let number = page_number(2);
        let req = Request::get(Service::Idm, "security/users")
            .with_options([&size as &dyn RequestOption, &number, &size_again])
            .unwrap();
        assert_eq!(req.query().get("pageSize"), Some("50"));
        assert_eq!(req.query().get("pageNumber"), Some("2"));
    }

    #[test]
    fn closure_is_an_option() {
        let req = Request::get(Service::Mdm, "StandardService")
            .option(|q: &mut Query| -> Result<()> {
                q.append("tag", "a");
                q.append("tag", "b");
                Ok(())
            })
            .unwrap();
        let tags: Vec<_> = req.query().iter().filter(|(k, _)| *k == "tag").collect();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn url_joins_below_base_and_encodes_query() {
        let base = Url::parse("https://mdm.example.com/connect/mdm/").unwrap();
        let req = Request::get(Service::Mdm, "/StandardService")
            .option(query("name", "a b&c"))
            .unwrap();
        let url = req.url(&base).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mdm.example.com/connect/mdm/StandardService?name=a+b%26c"
        );
    }

    #[test]
    fn url_keeps_inline_query() {
        let req = Request::get(Service::Idm, "security/users?loginId=foo%40bar.com");
        let url = req.url(&base()).unwrap();
        assert_eq!(url.query(), Some("loginId=foo%40bar.com"));
    }

    #[test]
    fn url_rejects_paths_leaving_base() {
        for path in ["https://evil.example.com/x", "//evil.example.com/x"] {
            let err = Request::get(Service::Idm, path).url(&base()).unwrap_err();
            assert!(matches!(err, ApiError::InvalidPath(_)), "{path} should be rejected");
        }
        let nested = Url::parse("https://mdm.example.com/connect/mdm/").unwrap();
        let err = Request::get(Service::Mdm, "../../admin").url(&nested).unwrap_err();
        assert!(matches!(err, ApiError::InvalidPath(_)));
    }

    #[test]
    fn json_validated_rejects_before_serializing() {
        let bad = Person {
            login_id: String::new(),
            email: "not-an-email".to_string(),
        };
        let err = Request::post(Service::Idm, "authorize/identity/User")
            .json_validated(&bad)
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let good = Person {
            login_id: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
        };
        let req = Request::post(Service::Idm, "authorize/identity/User")
            .json_validated(&good)
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(req.body().unwrap()).unwrap();
        assert_eq!(body["login_id"], "jdoe");
    }
}
