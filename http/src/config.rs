//! Transport configuration.
//!
//! Values come from the environment with defaults for everything:
//!
//! | Variable             | Default                          |
//! |----------------------|----------------------------------|
//! | `REQUEST_TIMEOUT_MS` | `30000`                          |
//! | `REQUEST_USER_AGENT` | `composable-request/<version>`   |

use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the request timeout in milliseconds
pub const TIMEOUT_VAR: &str = "REQUEST_TIMEOUT_MS";

/// Environment variable holding the user agent
pub const USER_AGENT_VAR: &str = "REQUEST_USER_AGENT";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportConfigError {
    /// A value is present but unusable
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// Setting (or environment variable) name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Settings of a [`ReqwestTransport`](crate::ReqwestTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Deadline for one request, connect to last body byte
    pub timeout: Duration,
    /// `User-Agent` sent with every request
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("composable-request/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Load from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`TransportConfigError::Invalid`] if a variable is set to an
    /// unusable value.
    pub fn from_env() -> Result<Self, TransportConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from any variable source
    ///
    /// # Errors
    ///
    /// Returns [`TransportConfigError::Invalid`] if a variable is set to an
    /// unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TransportConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let millis: u64 = raw.trim().parse().map_err(|_| TransportConfigError::Invalid {
                name: TIMEOUT_VAR,
                reason: format!("'{raw}' is not a number of milliseconds"),
            })?;
            config.timeout = Duration::from_millis(millis);
        }
        if let Some(user_agent) = lookup(USER_AGENT_VAR) {
            config.user_agent = user_agent;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration
    ///
    /// # Errors
    ///
    /// Returns [`TransportConfigError::Invalid`] for a zero timeout or a blank
    /// user agent.
    pub fn validate(&self) -> Result<(), TransportConfigError> {
        if self.timeout.is_zero() {
            return Err(TransportConfigError::Invalid {
                name: TIMEOUT_VAR,
                reason: "timeout must be greater than zero".to_string(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(TransportConfigError::Invalid {
                name: USER_AGENT_VAR,
                reason: "user agent cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}
