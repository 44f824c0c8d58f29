//! Client configuration.
//!
//! A [`Config`] names one base URL per service family plus the credentials
//! that form the immutable auth context. It can be built in code or loaded
//! from TOML:
//!
//! ```toml
//! idm_url = "https://idm-client-test.us-east.philips-healthsuite.com"
//! cartel_url = "https://cartel-na1.cloud.phsdp.com"
//! token = "bearer-token"
//!
//! [signing]
//! shared_key = "shared"
//! secret_key = "secret"
//! ```
//!
//! Every load path runs `validator` checks, so an invalid config never
//! reaches the client.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use validator::Validate;

use crate::error::{ApiError, Result};
use crate::service::Service;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_USER_AGENT: &str = concat!("hsdp-api/", env!("CARGO_PKG_VERSION"));

/// Shared/secret key pair for signed requests.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct SigningConfig {
    #[validate(length(min = 1))]
    /// Public key identifier sent with each signature.
    pub shared_key: String,
    #[validate(length(min = 1))]
    /// HMAC secret. Never sent or logged.
    pub secret_key: String,
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("shared_key", &self.shared_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Client configuration.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(url)]
    #[serde(default)]
    /// IAM base URL.
    pub iam_url: Option<String>,
    #[validate(url)]
    #[serde(default)]
    /// IDM base URL.
    pub idm_url: Option<String>,
    #[validate(url)]
    #[serde(default)]
    /// MDM base URL.
    pub mdm_url: Option<String>,
    #[validate(url)]
    #[serde(default)]
    /// Console base URL.
    pub console_url: Option<String>,
    #[validate(url)]
    #[serde(default)]
    /// Cartel base URL.
    pub cartel_url: Option<String>,

    /// Bearer token used by unsigned calls.
    #[serde(default)]
    pub token: Option<String>,

    /// Key pair used by signed calls.
    #[validate(nested)]
    #[serde(default)]
    pub signing: Option<SigningConfig>,

    /// TCP + TLS handshake budget.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole round-trip budget, body download included.
    #[validate(range(min = 1))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            iam_url: None,
            idm_url: None,
            mdm_url: None,
            console_url: None,
            cartel_url: None,
            token: None,
            signing: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("iam_url", &self.iam_url)
            .field("idm_url", &self.idm_url)
            .field("mdm_url", &self.mdm_url)
            .field("console_url", &self.console_url)
            .field("cartel_url", &self.cartel_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("signing", &self.signing)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Config {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("unable to read {}: {e}", path.display())))?;
        debug!(path = %path.display(), "config file read");
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML config text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ApiError::Config(format!("unable to parse config: {e}")))?;
        config.checked()
    }

    /// Runs validation, consuming and returning the config.
    pub fn checked(self) -> Result<Self> {
        self.validate()
            .map_err(|e| ApiError::Config(format!("invalid config: {e}")))?;
        Ok(self)
    }

    /// Sets the base URL for one family.
    pub fn with_base_url(mut self, service: Service, url: impl Into<String>) -> Self {
        *self.url_slot(service) = Some(url.into());
        self
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the signing key pair.
    pub fn with_signing(mut self, shared_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.signing = Some(SigningConfig {
            shared_key: shared_key.into(),
            secret_key: secret_key.into(),
        });
        self
    }

    fn url_slot(&mut self, service: Service) -> &mut Option<String> {
        match service {
            Service::Iam => &mut self.iam_url,
            Service::Idm => &mut self.idm_url,
            Service::Mdm => &mut self.mdm_url,
            Service::Console => &mut self.console_url,
            Service::Cartel => &mut self.cartel_url,
        }
    }

    fn url_for(&self, service: Service) -> Option<&str> {
        match service {
            Service::Iam => self.iam_url.as_deref(),
            Service::Idm => self.idm_url.as_deref(),
            Service::Mdm => self.mdm_url.as_deref(),
            Service::Console => self.console_url.as_deref(),
            Service::Cartel => self.cartel_url.as_deref(),
        }
    }

    /// Base URL of `service`, normalized to end in `/` so relative paths
    /// join beneath it rather than replacing its last segment.
    pub fn base_url(&self, service: Service) -> Result<Url> {
        let raw = self
            .url_for(service)
            .ok_or_else(|| ApiError::Config(format!("no base URL configured for {service}")))?;
        let normalized = format!("{}/", raw.trim_end_matches('/'));
        Ok(Url::parse(&normalized)?)
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_toml_with_defaults() {
        let config = Config::from_toml_str(r#"idm_url = "https://idm.example.com""#).unwrap();
        assert_eq!(config.idm_url.as_deref(), Some("https://idm.example.com"));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert!(config.user_agent.starts_with("hsdp-api/"));
        assert!(config.signing.is_none());
    }

    #[test]
    fn loads_signing_section() {
        let config = Config::from_toml_str(
            r#"
            cartel_url = "https://cartel.example.com"
            token = "tok"

            [signing]
            shared_key = "shared"
            secret_key = "secret"
            "#,
        )
        .unwrap();
        let signing = config.signing.as_ref().unwrap();
        assert_eq!(signing.shared_key, "shared");
        assert_eq!(config.token.as_deref(), Some("tok"));
    }

    #[test]
    fn rejects_invalid_url() {
        let err = Config::from_toml_str(r#"mdm_url = "not a url""#).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
        assert!(err.to_string().contains("mdm_url"), "got: {err}");
    }

    #[test]
    fn rejects_empty_signing_keys() {
        let err = Config::default()
            .with_signing("", "secret")
            .checked()
            .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)), "got: {err}");
    }

    #[test]
    fn rejects_zero_request_timeout() {
        let err = Config::from_toml_str("request_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Config::from_toml_str("idm_url = ").is_err());
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = Config::default().with_base_url(Service::Console, "https://console.example.com/api");
        let url = config.base_url(Service::Console).unwrap();
        assert_eq!(url.as_str(), "https://console.example.com/api/");
        assert_eq!(
            url.join("v3/metrics/rules").unwrap().as_str(),
            "https://console.example.com/api/v3/metrics/rules"
        );
    }

    #[test]
    fn missing_family_is_a_config_error() {
        let err = Config::default().base_url(Service::Mdm).unwrap_err();
        assert!(err.to_string().contains("mdm"), "got: {err}");
    }

    #[test]
    fn debug_redacts_credentials() {
        let config = Config::default()
            .with_token("bearer-secret")
            .with_signing("shared", "signing-secret");
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("bearer-secret"));
        assert!(!dbg.contains("signing-secret"));
    }
}
