//! # Composable Request HTTP
//!
//! The production [`Transport`](composable_request_core::transport::Transport)
//! for the request orchestrator, built on `reqwest`.
//!
//! ## Example
//!
//! ```no_run
//! use composable_request_core::environment::TransportEnvironment;
//! use composable_request_http::{ReqwestTransport, TransportConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::new(&TransportConfig::from_env()?)?;
//! let env = TransportEnvironment::new(Arc::new(transport));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;

pub use client::ReqwestTransport;
pub use config::{TransportConfig, TransportConfigError};
