//! The request dispatcher.
//!
//! `Client` wraps a `reqwest::Client`, the validated [`Config`] and the
//! immutable [`AuthContext`]. Every endpoint call funnels through
//! [`Client::send`]:
//!
//! 1. Resolve the family base URL and join the request path beneath it.
//! 2. Attach credentials per the caller's [`AuthStrategy`]: a bearer
//!    token, signature headers from the family signer, or nothing.
//! 3. Submit, read the body exactly once, and wrap it in a [`Response`]
//!    envelope whose structured error is parsed with the family's shape.
//! 4. Classify: non-2xx statuses, and in-body failures for families that
//!    report them inside 2xx bodies, become typed [`ApiError`]s carrying
//!    the envelope.
//!
//! The typed helpers (`dispatch`, `dispatch_list`, `dispatch_bundle`,
//! `dispatch_data`, `dispatch_ok`) layer body decoding on top.
//!
//! Design decisions:
//! - No retries and no refresh: a call is one request/response cycle, and
//!   callers needing resilience wrap calls themselves.
//! - No interior mutability. The auth context is read-only, so a `Client`
//!   can be shared across tasks (`&Client` or `Arc<Client>`) without locks.
//! - Signed vs. unsigned is an explicit per-call [`AuthStrategy`] rather than
//!   a process-wide branch on whether a signer happens to be configured.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::AuthContext;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::request::Request;
use crate::response::{Bundle, DataEnvelope, Dispatched, ListBody, Outcome, Response};
use crate::signer::{CanonicalRequest, RequestSigner, signed_date_now};

/// Which credential a call presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// `Authorization: Bearer <token>`. Fails before dispatch when no token
    /// is configured.
    Bearer,
    /// Signature headers from the family signer. Fails with
    /// [`ApiError::InvalidSigner`] before dispatch when no valid signer is
    /// configured.
    Signed,
    /// Signed when the family has a valid signer, bearer otherwise.
    SignedIfAvailable,
    /// No credentials.
    Anonymous,
}

/// Strategy after checking what the auth context actually holds.
enum Credential<'a> {
    Bearer,
    Signed(&'a Arc<dyn RequestSigner>),
    Anonymous,
}

impl Credential<'_> {
    fn name(&self) -> &'static str {
        match self {
            Credential::Bearer => "bearer",
            Credential::Signed(_) => "signed",
            Credential::Anonymous => "anonymous",
        }
    }
}

/// Builds the underlying HTTP client with the configured timeouts.
fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))
}

/// Authenticated dispatcher for every HSDP service family.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: Config,
    auth: AuthContext,
}

impl Client {
    /// Validates `config` and derives the auth context from its
    /// credentials.
    pub fn new(config: Config) -> Result<Self> {
        let config = config.checked()?;
        let auth = AuthContext::from_config(&config);
        Client::with_auth(config, auth)
    }

    /// Validates `config` and uses an explicitly assembled auth context
    /// (custom signers, or a token obtained elsewhere).
    pub fn with_auth(config: Config, auth: AuthContext) -> Result<Self> {
        let config = config.checked()?;
        Ok(Client {
            http: build_http_client(&config)?,
            config,
            auth,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The credentials every call draws from.
    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    fn credential(&self, request: &Request, strategy: AuthStrategy) -> Result<Credential<'_>> {
        let service = request.service();
        let signer = self
            .auth
            .signer_for(service)
            .filter(|s| s.is_valid());
        match (strategy, signer) {
            (AuthStrategy::Anonymous, _) => Ok(Credential::Anonymous),
            (AuthStrategy::Signed | AuthStrategy::SignedIfAvailable, Some(signer)) => {
                Ok(Credential::Signed(signer))
            }
            (AuthStrategy::Signed, None) => Err(ApiError::InvalidSigner(format!(
                "no valid signer configured for {service}"
            ))),
            (AuthStrategy::Bearer | AuthStrategy::SignedIfAvailable, _) => {
                if self.auth.token().is_none() {
                    return Err(ApiError::Config(format!(
                        "no bearer token or signer configured for {service}"
                    )));
                }
                Ok(Credential::Bearer)
            }
        }
    }

    /// Sends `request` and classifies the outcome.
    ///
    /// Returns the envelope only for successful calls. Failures carry the
    /// envelope inside the error when the server answered; errors raised
    /// before the transport (bad path, missing credentials) carry none.
    pub async fn send(&self, request: Request, strategy: AuthStrategy) -> Result<Response> {
        let base = self.config.base_url(request.service())?;
        let url = request.url(&base)?;
        let credential = self.credential(&request, strategy)?;
        let (service, method, body, mut headers) = request.into_parts();

        match credential {
            Credential::Bearer => {
                headers.insert(AUTHORIZATION, self.auth.bearer_header()?);
            }
            Credential::Signed(signer) => {
                let signed_date = signed_date_now();
                let canonical = CanonicalRequest::new(
                    &method,
                    &url,
                    &signed_date,
                    body.as_deref().unwrap_or_default(),
                );
                for (name, value) in signer.sign(&canonical)? {
                    headers.insert(name, value);
                }
            }
            Credential::Anonymous => {}
        }

        debug!(
            %service,
            %method,
            path = url.path(),
            auth = credential.name(),
            "dispatching request"
        );

        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let resp = builder.send().await.inspect_err(|e| {
            warn!(%service, error = %e, "request did not reach the server");
        })?;

        let status = resp.status();
        let resp_headers = resp.headers().clone();
        let bytes = resp.bytes().await.inspect_err(|e| {
            warn!(%service, status = status.as_u16(), error = %e, "response body could not be read");
        })?;
        let response = Response::new(service, status, resp_headers, bytes);
        debug!(%service, status = status.as_u16(), bytes = response.body.len(), "response received");

        let failure = if status.is_success() {
            response
                .error
                .as_ref()
                .and_then(|e| service.error_shape().in_body_status(e))
        } else {
            Some(status)
        };
        match failure {
            None => Ok(response),
            Some(effective) => {
                let err = ApiError::classify(effective, response);
                warn!(%service, status = status.as_u16(), error = %err, "request failed");
                Err(err)
            }
        }
    }

    /// Sends `request` and decodes the body directly into `T`.
    ///
    /// An empty body decodes as JSON `null`, so `()` and `Option<_>` targets
    /// accept 204 responses.
    pub async fn dispatch<T: DeserializeOwned>(
        &self,
        request: Request,
        strategy: AuthStrategy,
    ) -> Result<Dispatched<T>> {
        let response = self.send(request, strategy).await?;
        decode(response)
    }

    /// Sends `request` and decodes a bare array or a bundle into `Vec<T>`,
    /// preserving server order.
    pub async fn dispatch_list<T: DeserializeOwned>(
        &self,
        request: Request,
        strategy: AuthStrategy,
    ) -> Result<Dispatched<Vec<T>>> {
        let list: Dispatched<ListBody<T>> = self.dispatch(request, strategy).await?;
        Ok(list.map(ListBody::into_vec))
    }

    /// Sends `request` and decodes a bundle, keeping its `total`.
    pub async fn dispatch_bundle<T: DeserializeOwned>(
        &self,
        request: Request,
        strategy: AuthStrategy,
    ) -> Result<Dispatched<Bundle<T>>> {
        self.dispatch(request, strategy).await
    }

    /// Sends `request` and unwraps the `data` member of a
    /// `{data, status, error}` envelope.
    pub async fn dispatch_data<T: DeserializeOwned>(
        &self,
        request: Request,
        strategy: AuthStrategy,
    ) -> Result<Dispatched<T>> {
        let envelope: Dispatched<DataEnvelope<T>> = self.dispatch(request, strategy).await?;
        Ok(envelope.map(|e| e.data))
    }

    /// Sends `request` for its status alone.
    ///
    /// `ok` is true iff the response status is one of `accepted`. The body is
    /// never decoded, so an empty 204 is not an error.
    pub async fn dispatch_ok(
        &self,
        request: Request,
        strategy: AuthStrategy,
        accepted: &[StatusCode],
    ) -> Result<Outcome> {
        let response = self.send(request, strategy).await?;
        Ok(Outcome {
            ok: accepted.contains(&response.status),
            response,
        })
    }
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<Dispatched<T>> {
    match response.json::<T>() {
        Ok(value) => Ok(Dispatched { value, response }),
        Err(source) => {
            warn!(service = %response.service, status = response.status.as_u16(), error = %source, "response body did not decode");
            Err(ApiError::Decode {
                source,
                response: Box::new(response),
            })
        }
    }
}
