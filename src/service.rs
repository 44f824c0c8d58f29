//! Service families and their error-body conventions.
//!
//! Every endpoint of the HSDP API belongs to one of a handful of service
//! families. Families differ in three ways that matter to the dispatcher:
//!
//! - where they live (a per-family base URL, see [`crate::config::Config`]),
//! - which `api-version` header value they expect by default,
//! - how they report errors in the response body ([`ErrorShape`]).
//!
//! The error-body shapes are deliberately kept per family. IDM reports
//! `{responseCode, responseMessage}` (sometimes inside a 200 response),
//! Console wraps `{code, message}` under `error`, and the FHIR-style services
//! answer with an `OperationOutcome`. Collapsing these into one parser would
//! lose the in-body status semantics IDM relies on.

use std::fmt;
use std::str::FromStr;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Message IDM uses for authorization failures regardless of HTTP status.
const IDM_UNAUTHORIZED_MESSAGE: &str = "Unauthorized Access";

/// A service family of the HSDP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Identity and access management (FHIR-style resources).
    Iam,
    /// Legacy identity endpoints (`security/users`, `authorize/identity`).
    Idm,
    /// Master data management.
    Mdm,
    /// Console: metrics, rules and autoscalers.
    Console,
    /// Cartel fleet management. Every call is signed.
    Cartel,
}

impl Service {
    /// All families, in configuration order.
    pub const ALL: [Service; 5] = [
        Service::Iam,
        Service::Idm,
        Service::Mdm,
        Service::Console,
        Service::Cartel,
    ];

    /// Lowercase identifier used in configuration and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Service::Iam => "iam",
            Service::Idm => "idm",
            Service::Mdm => "mdm",
            Service::Console => "console",
            Service::Cartel => "cartel",
        }
    }

    /// The `api-version` header value sent unless a call overrides it.
    pub fn default_api_version(self) -> Option<&'static str> {
        match self {
            Service::Iam | Service::Idm | Service::Mdm => Some("1"),
            Service::Console | Service::Cartel => None,
        }
    }

    /// How this family encodes errors in response bodies.
    pub fn error_shape(self) -> ErrorShape {
        match self {
            Service::Idm => ErrorShape::ResponseCode,
            Service::Iam | Service::Mdm => ErrorShape::OperationOutcome,
            Service::Console | Service::Cartel => ErrorShape::CodeMessage,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::ALL
            .into_iter()
            .find(|svc| svc.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown service family: {s}"))
    }
}

// ── Error bodies ───────────────────────────────────────────────────────

/// Normalized structured error extracted from a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Service-specific error code (`responseCode`, `code`, or the FHIR
    /// issue code).
    pub code: Option<String>,
    /// Human-readable message (`responseMessage`, `message`, or the FHIR
    /// issue diagnostics).
    pub message: Option<String>,
}

impl ErrorBody {
    /// Returns `true` when neither a code nor a message was found.
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.message.is_none()
    }

    /// Whether the body reports an authorization failure.
    ///
    /// Only IDM has an in-body marker for this; other families rely on the
    /// HTTP status alone.
    pub fn is_unauthorized(&self) -> bool {
        self.message.as_deref() == Some(IDM_UNAUTHORIZED_MESSAGE)
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(code), None) => f.write_str(code),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("no error detail"),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCodeBody {
    response_code: Option<String>,
    response_message: Option<String>,
}

#[derive(Deserialize)]
struct CodeMessage {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct CodeMessageBody {
    #[serde(flatten)]
    top: CodeMessage,
    error: Option<CodeMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationOutcome {
    resource_type: Option<String>,
    #[serde(default)]
    issue: Vec<Issue>,
}

#[derive(Deserialize)]
struct Issue {
    code: Option<String>,
    diagnostics: Option<String>,
}

/// Error-body layout used by a service family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorShape {
    /// `{"responseCode": "...", "responseMessage": "..."}` (IDM).
    ///
    /// IDM may answer 200 with a non-`"200"` `responseCode`; that is a
    /// failure and is surfaced through [`ErrorShape::in_body_status`].
    ResponseCode,
    /// `{"code": "...", "message": "..."}`, at the top level or nested
    /// under `"error"` (Console, Cartel).
    CodeMessage,
    /// FHIR `OperationOutcome` with an `issue` array (IAM, MDM).
    OperationOutcome,
}

impl ErrorShape {
    /// Extracts a structured error from `body`, if one is present.
    ///
    /// Bodies that are not JSON, or that carry none of the shape's fields,
    /// yield `None`.
    pub fn parse(self, body: &[u8]) -> Option<ErrorBody> {
        if body.is_empty() {
            return None;
        }
        let parsed = match self {
            ErrorShape::ResponseCode => {
                let raw: ResponseCodeBody = serde_json::from_slice(body).ok()?;
                ErrorBody {
                    code: raw.response_code,
                    message: raw.response_message,
                }
            }
            ErrorShape::CodeMessage => {
                let raw: CodeMessageBody = serde_json::from_slice(body).ok()?;
                match raw.error {
                    Some(nested) if nested.code.is_some() || nested.message.is_some() => {
                        ErrorBody {
                            code: nested.code,
                            message: nested.message,
                        }
                    }
                    _ => ErrorBody {
                        code: raw.top.code,
                        message: raw.top.message,
                    },
                }
            }
            ErrorShape::OperationOutcome => {
                let raw: OperationOutcome = serde_json::from_slice(body).ok()?;
                if raw.resource_type.as_deref() != Some("OperationOutcome") {
                    return None;
                }
                let first = raw.issue.into_iter().next()?;
                ErrorBody {
                    code: first.code,
                    message: first.diagnostics,
                }
            }
        };
        (!parsed.is_empty()).then_some(parsed)
    }

    /// Status implied by an error reported inside a 2xx body.
    ///
    /// Only [`ErrorShape::ResponseCode`] carries an in-body status. A
    /// `responseCode` other than `"200"` is a failure: the numeric code is
    /// used when it is a valid HTTP status, otherwise 400. An
    /// `"Unauthorized Access"` message always maps to 401.
    pub fn in_body_status(self, error: &ErrorBody) -> Option<StatusCode> {
        if self != ErrorShape::ResponseCode {
            return None;
        }
        if error.is_unauthorized() {
            return Some(StatusCode::UNAUTHORIZED);
        }
        let code = error.code.as_deref()?;
        if code == "200" {
            return None;
        }
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(|n| StatusCode::from_u16(n).ok())
            .filter(|s| !s.is_success())
            .unwrap_or(StatusCode::BAD_REQUEST);
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_round_trips_through_str() {
        for svc in Service::ALL {
            assert_eq!(svc.as_str().parse::<Service>().unwrap(), svc);
        }
        assert_eq!("CARTEL".parse::<Service>().unwrap(), Service::Cartel);
        assert!("nope".parse::<Service>().is_err());
    }

    #[test]
    fn families_keep_distinct_error_shapes() {
        assert_eq!(Service::Idm.error_shape(), ErrorShape::ResponseCode);
        assert_eq!(Service::Console.error_shape(), ErrorShape::CodeMessage);
        assert_eq!(Service::Mdm.error_shape(), ErrorShape::OperationOutcome);
        assert_eq!(Service::Console.default_api_version(), None);
        assert_eq!(Service::Mdm.default_api_version(), Some("1"));
    }

    #[test]
    fn response_code_shape_parses_idm_body() {
        let body = br#"{"responseCode":"4010","responseMessage":"Unauthorized Access"}"#;
        let err = ErrorShape::ResponseCode.parse(body).unwrap();
        assert_eq!(err.code.as_deref(), Some("4010"));
        assert!(err.is_unauthorized());
        assert_eq!(
            ErrorShape::ResponseCode.in_body_status(&err),
            Some(StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn response_code_200_is_not_an_error() {
        let body = br#"{"responseCode":"200","exchange":{"loginId":"a@b.c"}}"#;
        let err = ErrorShape::ResponseCode.parse(body).unwrap();
        assert_eq!(ErrorShape::ResponseCode.in_body_status(&err), None);
    }

    #[test]
    fn non_numeric_response_code_maps_to_bad_request() {
        let err = ErrorBody {
            code: Some("ERR_INVALID".to_string()),
            message: Some("bad input".to_string()),
        };
        assert_eq!(
            ErrorShape::ResponseCode.in_body_status(&err),
            Some(StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn code_message_shape_prefers_nested_error() {
        let body = br#"{"data":{},"status":"error","error":{"code":"E42","message":"no such rule"}}"#;
        let err = ErrorShape::CodeMessage.parse(body).unwrap();
        assert_eq!(err.code.as_deref(), Some("E42"));
        assert_eq!(err.message.as_deref(), Some("no such rule"));

        let flat = br#"{"code":"E1","message":"flat"}"#;
        let err = ErrorShape::CodeMessage.parse(flat).unwrap();
        assert_eq!(err.message.as_deref(), Some("flat"));
    }

    #[test]
    fn code_message_shape_ignores_empty_error_object() {
        let body = br#"{"data":{"instances":[]},"status":"success","error":{}}"#;
        assert!(ErrorShape::CodeMessage.parse(body).is_none());
    }

    #[test]
    fn operation_outcome_takes_first_issue() {
        let body = br#"{
            "resourceType": "OperationOutcome",
            "issue": [
                {"severity": "error", "code": "duplicate", "diagnostics": "already exists"},
                {"severity": "error", "code": "other"}
            ]
        }"#;
        let err = ErrorShape::OperationOutcome.parse(body).unwrap();
        assert_eq!(err.code.as_deref(), Some("duplicate"));
        assert_eq!(err.message.as_deref(), Some("already exists"));
    }

    #[test]
    fn operation_outcome_requires_resource_type() {
        let body = br#"{"issue":[{"code":"x"}]}"#;
        assert!(ErrorShape::OperationOutcome.parse(body).is_none());
        assert!(ErrorShape::OperationOutcome.parse(b"not json").is_none());
        assert!(ErrorShape::OperationOutcome.parse(b"").is_none());
    }
}
