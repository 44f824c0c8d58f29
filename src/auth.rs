//! Immutable authentication context.
//!
//! The auth context holds the bearer token and/or request signer used by
//! every dispatch. It is assembled once when the client is built and is
//! read-only afterwards: request handling never refreshes, rotates or
//! otherwise mutates it. That is what makes concurrent dispatches from a
//! shared [`crate::client::Client`] safe without locking.
//!
//! Consumers pick which credential a call uses through
//! [`crate::client::AuthStrategy`]; this module only answers "what is
//! available".

use std::sync::Arc;

use reqwest::header::HeaderValue;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::service::Service;
use crate::signer::{BodySigner, HmacSigner, RequestSigner};

/// Token and signer credentials, shared read-only across calls.
///
/// Invariants:
/// - Never mutated after construction (all builders consume `self`).
/// - `Clone` is cheap; signers are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct AuthContext {
    token: Option<String>,
    signer: Option<Arc<dyn RequestSigner>>,
    cartel_signer: Option<Arc<dyn RequestSigner>>,
}

impl AuthContext {
    /// Context with no credentials; only anonymous calls succeed.
    pub fn anonymous() -> Self {
        AuthContext::default()
    }

    /// Builds the context from the credentials in `config`.
    ///
    /// A `[signing]` section yields both the IAM/IDM [`HmacSigner`] and the
    /// Cartel [`BodySigner`] over the same key pair.
    pub fn from_config(config: &Config) -> Self {
        let mut ctx = AuthContext {
            token: config.token.clone().filter(|t| !t.is_empty()),
            ..AuthContext::default()
        };
        if let Some(signing) = &config.signing {
            ctx.signer = Some(Arc::new(HmacSigner::new(
                signing.shared_key.clone(),
                signing.secret_key.clone(),
            )));
            ctx.cartel_signer = Some(Arc::new(BodySigner::new(
                signing.shared_key.clone(),
                signing.secret_key.clone(),
            )));
        }
        ctx
    }

    /// Sets the bearer token. An empty token counts as no token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t| !t.is_empty());
        self
    }

    /// Sets the signer used for every family except Cartel.
    pub fn with_signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Sets the signer used for Cartel.
    pub fn with_cartel_signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.cartel_signer = Some(Arc::new(signer));
        self
    }

    /// The bearer token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `Authorization: Bearer <token>` value.
    pub(crate) fn bearer_header(&self) -> Result<HeaderValue> {
        let token = self
            .token()
            .ok_or_else(|| ApiError::Config("no bearer token configured".to_string()))?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ApiError::Config(format!("bearer token is not a valid header: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// The signer responsible for `service`, whether or not it is valid.
    pub fn signer_for(&self, service: Service) -> Option<&Arc<dyn RequestSigner>> {
        match service {
            Service::Cartel => self.cartel_signer.as_ref(),
            _ => self.signer.as_ref(),
        }
    }

    /// Whether `service` has a signer holding usable key material.
    pub fn has_valid_signer(&self, service: Service) -> bool {
        self.signer_for(service).is_some_and(|s| s.is_valid())
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("signer", &self.signer)
            .field("cartel_signer", &self.cartel_signer)
            .finish()
    }
}
