//! Typed error taxonomy for the hsdp-api crate.
//!
//! Every failure of the dispatch pipeline is a returned [`ApiError`] value;
//! nothing panics and nothing is retried. Variants fall into three groups:
//!
//! - Raised before any network call: `Validation`, `Config`, `InvalidUrl`,
//!   `InvalidPath`, `InvalidSigner`, `Signing`. These never carry a response envelope.
//! - Classified HTTP failures: `Unauthorized`, `Forbidden`, `NotFound`,
//!   `Conflict`, `Rejected`, `Server`, `Status`. Each carries the full
//!   [`Response`] envelope so callers can inspect status, headers, raw body
//!   and the family-specific structured error.
//! - Post-transport failures: `Decode` (malformed JSON, envelope attached)
//!   and `Connection` (DNS, TCP, TLS, timeout, or a body cut off mid-read;
//!   no envelope).
//!
//! [`ApiError::response`] returning `None` therefore means no complete HTTP
//! response was received: either the request never reached the server, or
//! the connection failed before the body was fully read.

use reqwest::StatusCode;

use crate::response::Response;

/// Unified error type for all hsdp-api operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A caller-supplied object failed schema checks. Raised before the
    /// request is built, so no network call is attempted.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// The client configuration is invalid or lacks a required entry
    /// (e.g. no base URL for the requested service family).
    #[error("configuration error: {0}")]
    Config(String),

    /// The request path could not be joined onto the family base URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request path is not a relative path beneath the family base URL.
    #[error("invalid request path: {0}")]
    InvalidPath(String),

    /// A signed call was requested but no usable signer is configured.
    #[error("invalid signer: {0}")]
    InvalidSigner(String),

    /// The signer failed to produce signature headers.
    #[error("request signing failed: {0}")]
    Signing(String),

    /// 401, or an in-body authorization failure.
    #[error("unauthorized ({})", .response.summary())]
    Unauthorized {
        /// The response envelope.
        response: Box<Response>,
    },

    /// 403.
    #[error("forbidden ({})", .response.summary())]
    Forbidden {
        /// The response envelope.
        response: Box<Response>,
    },

    /// 404.
    #[error("not found ({})", .response.summary())]
    NotFound {
        /// The response envelope.
        response: Box<Response>,
    },

    /// 409: the resource already exists or is in a conflicting state.
    #[error("conflict ({})", .response.summary())]
    Conflict {
        /// The response envelope.
        response: Box<Response>,
    },

    /// 400 or 422: the server rejected the request payload.
    #[error("request rejected ({})", .response.summary())]
    Rejected {
        /// The response envelope.
        response: Box<Response>,
    },

    /// 5xx.
    #[error("server error ({})", .response.summary())]
    Server {
        /// The response envelope.
        response: Box<Response>,
    },

    /// Any other non-success status.
    #[error("unexpected status ({})", .response.summary())]
    Status {
        /// The response envelope.
        response: Box<Response>,
    },

    /// The response body was not valid JSON for the requested target.
    #[error("failed to decode response: {source}")]
    Decode {
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
        /// The response envelope, status included.
        response: Box<Response>,
    },

    /// Transport-level failure, including a body that could not be read
    /// after the status line arrived. No envelope is available.
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),
}

impl ApiError {
    /// Maps a failed response onto the taxonomy.
    ///
    /// `status` is the effective status: the HTTP status, or the in-body
    /// status for families that report errors inside 2xx bodies.
    pub(crate) fn classify(status: StatusCode, response: Response) -> Self {
        let response = Box::new(response);
        let in_body_unauthorized = response
            .error
            .as_ref()
            .is_some_and(|e| e.is_unauthorized());
        if status == StatusCode::UNAUTHORIZED || in_body_unauthorized {
            return ApiError::Unauthorized { response };
        }
        match status {
            StatusCode::FORBIDDEN => ApiError::Forbidden { response },
            StatusCode::NOT_FOUND => ApiError::NotFound { response },
            StatusCode::CONFLICT => ApiError::Conflict { response },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ApiError::Rejected { response }
            }
            s if s.is_server_error() => ApiError::Server { response },
            _ => ApiError::Status { response },
        }
    }

    /// The response envelope, when a complete response was received.
    pub fn response(&self) -> Option<&Response> {
        match self {
            ApiError::Unauthorized { response }
            | ApiError::Forbidden { response }
            | ApiError::NotFound { response }
            | ApiError::Conflict { response }
            | ApiError::Rejected { response }
            | ApiError::Server { response }
            | ApiError::Status { response }
            | ApiError::Decode { response, .. } => Some(response),
            _ => None,
        }
    }

    /// HTTP status of the envelope, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|r| r.status)
    }

    /// Whether this is an authorization failure (401, in-body
    /// unauthorized, or a missing/invalid signer).
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::InvalidSigner(_)
        )
    }

    /// Whether the server reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, ApiError>;
