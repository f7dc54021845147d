//! `reqwest` implementation of the Transport Capability

use crate::config::{TransportConfig, TransportConfigError};
use composable_request_core::error::TransportError;
use composable_request_core::transport::{HttpRequest, HttpResponse, Method, Transport, TransportFuture};
use reqwest::Client;

/// Transport that sends requests over the network
///
/// Any response is returned as-is, whatever its status; classification is
/// left to the orchestrator. Connection failures, timeouts and body read
/// errors become [`TransportError::Failed`].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport from a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the client cannot
    /// be built.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportConfigError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportConfigError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// Create a transport configured from the environment
    ///
    /// # Errors
    ///
    /// See [`TransportConfig::from_env`] and [`ReqwestTransport::new`].
    pub fn from_env() -> Result<Self, TransportConfigError> {
        Self::new(&TransportConfig::from_env()?)
    }

    /// Wrap an existing client
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), request.url.as_str());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| failed(&request.url, &e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| failed(&request.url, &e))?
            .to_vec();

        tracing::debug!(url = %request.url, status, bytes = body.len(), "Response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn perform(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(self.send(request))
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
    }
}

fn failed(url: &str, error: &reqwest::Error) -> TransportError {
    let message = if error.is_timeout() {
        format!("request timed out: {error}")
    } else {
        error.to_string()
    };
    tracing::debug!(url, error = %message, "Transport failure");
    TransportError::Failed(message)
}
