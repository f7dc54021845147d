//! Error types for request orchestration.
//!
//! [`HttpError`] is the error carried by a Fail Finish event. It is the only
//! way a failed attempt is reported: the orchestrator never returns an error
//! to its caller for a single request.

use crate::transport::HttpResponse;
use serde::Serialize;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Underlying cause of a transport failure
pub type ErrorCause = Arc<dyn StdError + Send + Sync>;

/// Classified failure of one request attempt.
///
/// Serializes to the wire form used inside Fail events, e.g.
/// `{"name": "StatusError", "statusCode": 404}`. The full response of a
/// status error and the cause of a transport error are kept for inspection
/// but never serialized. Equality ignores the cause.
#[derive(Error, Debug, Clone, Serialize)]
#[serde(tag = "name")]
pub enum HttpError {
    /// The server answered with a status code of 400 or above
    #[error("Http Status Code Error: {status_code}")]
    #[serde(rename = "StatusError")]
    Status {
        /// HTTP status code of the response
        #[serde(rename = "statusCode")]
        status_code: u16,
        /// The full response
        #[serde(skip)]
        response: Arc<HttpResponse>,
    },

    /// The request never produced a response
    #[error("Transport error: {message}")]
    #[serde(rename = "TransportError")]
    Transport {
        /// Description of the underlying cause
        message: String,
        /// The underlying cause, when it is an error value
        #[serde(skip)]
        #[source]
        source: Option<ErrorCause>,
    },

    /// The hosting environment cancelled the request
    #[error("Request aborted")]
    #[serde(rename = "AbortError")]
    Abort,
}

impl HttpError {
    /// Build a status error from a response
    #[must_use]
    pub fn status(response: HttpResponse) -> Self {
        Self::Status {
            status_code: response.status,
            response: Arc::new(response),
        }
    }

    /// Build a transport error from any displayable cause
    #[must_use]
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: cause.to_string(),
            source: None,
        }
    }

    /// Build a transport error that keeps `error` as its source
    #[must_use]
    pub fn caused_by<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transport {
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    /// The underlying cause of a transport error, if one was kept
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Transport { source, .. } => source.as_deref(),
            _ => None,
        }
    }

    /// Status code for [`HttpError::Status`], `None` otherwise
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// The response for [`HttpError::Status`], `None` otherwise
    #[must_use]
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Self::Status { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Short label used for metrics and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Transport { .. } => "transport",
            Self::Abort => "abort",
        }
    }
}

impl PartialEq for HttpError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Status { status_code, response },
                Self::Status {
                    status_code: other_code,
                    response: other_response,
                },
            ) => status_code == other_code && response == other_response,
            (Self::Transport { message, .. }, Self::Transport { message: other, .. }) => message == other,
            (Self::Abort, Self::Abort) => true,
            _ => false,
        }
    }
}

/// Failure to turn a path template and parameters into an address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A placeholder has no matching key in the parameters
    #[error("Missing path parameter '{name}'")]
    MissingParameter {
        /// Placeholder name
        name: String,
    },

    /// The template has placeholders but the parameters are not an object
    #[error("Path parameters must be an object when the template has placeholders")]
    ParamsNotObject,

    /// The value for a placeholder is not a string, number or boolean
    #[error("Path parameter '{name}' must be a string, number or boolean")]
    NonPrimitive {
        /// Placeholder name
        name: String,
    },

    /// The parameters could not be serialized
    #[error("Path parameters could not be serialized: {0}")]
    Serialize(String),
}

impl From<TemplateError> for HttpError {
    fn from(error: TemplateError) -> Self {
        Self::caused_by(error)
    }
}

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network or protocol failure before a response was received
    #[error("{0}")]
    Failed(String),

    /// The request was cancelled before completing
    #[error("Request aborted")]
    Aborted,
}

impl From<TransportError> for HttpError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Failed(_) => Self::caused_by(error),
            TransportError::Aborted => Self::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_error_serializes_without_response() {
        let error = HttpError::status(HttpResponse::new(404).with_body("not here"));
        assert_eq!(
            serde_json::to_value(&error).ok(),
            Some(json!({"name": "StatusError", "statusCode": 404}))
        );
        assert_eq!(error.to_string(), "Http Status Code Error: 404");
        assert_eq!(error.response().map(HttpResponse::text), Some("not here".into()));
    }

    #[test]
    fn transport_errors_convert() {
        assert_eq!(
            HttpError::from(TransportError::Failed("connection refused".into())),
            HttpError::transport("connection refused")
        );
        assert_eq!(HttpError::from(TransportError::Aborted), HttpError::Abort);
        assert_eq!(
            serde_json::to_value(HttpError::Abort).ok(),
            Some(json!({"name": "AbortError"}))
        );
    }

    #[test]
    fn template_error_becomes_transport_error() {
        let error = HttpError::from(TemplateError::MissingParameter { name: "id".into() });
        assert_eq!(error.kind(), "transport");
        assert_eq!(error.status_code(), None);
        assert_eq!(error.to_string(), "Transport error: Missing path parameter 'id'");
        assert_eq!(
            error.cause().map(ToString::to_string),
            Some("Missing path parameter 'id'".to_string())
        );
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn decode_failure_keeps_its_cause() {
        let decode = serde_json::from_str::<u32>("not json").err();
        assert!(decode.is_some());
        let error = decode.map_or(HttpError::Abort, HttpError::caused_by);

        let cause = error.cause().and_then(|c| c.downcast_ref::<serde_json::Error>());
        assert!(cause.is_some_and(serde_json::Error::is_syntax));
        assert_eq!(error, HttpError::transport(cause.map(ToString::to_string).unwrap_or_default()));
        assert_eq!(serde_json::to_value(&error).ok().and_then(|v| v.get("source").cloned()), None);
        assert!(HttpError::transport("plain").cause().is_none());
    }
}
