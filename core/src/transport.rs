//! The Transport Capability and the request/response values it exchanges.
//!
//! The orchestrator never talks to the network itself; it builds an
//! [`HttpRequest`] and hands it to whatever [`Transport`] the environment
//! provides. [`classify_outcome`] is the single place where a transport
//! result is turned into success or an [`HttpError`].

use crate::error::{HttpError, TransportError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;

/// First status code classified as a failure.
pub const ERROR_STATUS_THRESHOLD: u16 = 400;

/// HTTP method of a configured request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `PUT`
    Put,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
    /// `PATCH`
    Patch,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for `Method` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported method: {0}")]
pub struct ParseMethodError(String);

impl FromStr for Method {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "PUT" => Ok(Self::Put),
            "POST" => Ok(Self::Post),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            _ => Err(ParseMethodError(s.to_string())),
        }
    }
}

/// A fully resolved request, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Concrete address, placeholders already substituted
    pub url: String,
    /// HTTP method
    pub method: Method,
    /// Header name/value pairs, in order
    pub headers: Vec<(String, String)>,
    /// JSON body, `None` when no body is sent
    pub body: Option<String>,
}

impl HttpRequest {
    /// Look up a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response received from the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Header name/value pairs, in order
    pub headers: Vec<(String, String)>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create an empty response with the given status
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the status code is classified as a failure
    #[must_use]
    pub const fn is_error_status(&self) -> bool {
        self.status >= ERROR_STATUS_THRESHOLD
    }

    /// Whether the status code is classified as a success
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !self.is_error_status()
    }

    /// Look up a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body as text, invalid UTF-8 replaced
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Future returned by [`Transport::perform`]
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Capability that performs network calls.
///
/// Implementations report failures that happen before a response exists as
/// [`TransportError`]; any response, whatever its status, is returned as
/// `Ok`. Timeouts are the implementation's concern and surface as
/// [`TransportError::Failed`].
///
/// # Implementations
///
/// - `ReqwestTransport` (composable-request-http) - production
/// - `MockTransport` (composable-request-testing) - scripted responses
pub trait Transport: Send + Sync {
    /// Send the request and wait for its response
    fn perform(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Classify a transport result.
///
/// - transport failure → [`HttpError::Transport`]
/// - cancellation → [`HttpError::Abort`]
/// - status code ≥ 400 → [`HttpError::Status`] carrying the response
/// - anything else → success
///
/// # Errors
///
/// Returns the classified [`HttpError`] for every non-success outcome.
pub fn classify_outcome(
    outcome: Result<HttpResponse, TransportError>,
) -> Result<HttpResponse, HttpError> {
    let response = outcome?;
    if response.is_error_status() {
        return Err(HttpError::status(response));
    }
    Ok(response)
}
