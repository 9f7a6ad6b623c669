//! Serve a path over HTTP: files verbatim, directories as zip archives.
//!
//! This crate provides the handler, routes and delivery pipeline. It can be
//! used as a standalone binary or embedded in another application.

pub mod config;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod request_log;
pub mod resolver;
pub mod routes;
pub mod sink;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

pub use config::Config;
pub use error::ServeError;
pub use request_log::{FileRequestLog, NoopRequestLog, RequestLog};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Config>,
    /// Audit log for incoming requests
    pub request_log: Arc<dyn RequestLog>,
    /// Canonical form of `config.allowed_root`
    pub allowed_root: Option<PathBuf>,
}

impl AppState {
    /// Create state with the given config and request log.
    ///
    /// Fails when a configured `allowed_root` cannot be canonicalized.
    pub fn new(config: Config, request_log: Arc<dyn RequestLog>) -> io::Result<Self> {
        let allowed_root = config
            .allowed_root
            .as_ref()
            .map(|root| root.canonicalize())
            .transpose()?;

        Ok(Self {
            config: Arc::new(config),
            request_log,
            allowed_root,
        })
    }

    /// Default config, no request log.
    pub fn with_defaults() -> Self {
        Self {
            config: Arc::new(Config::default()),
            request_log: Arc::new(NoopRequestLog),
            allowed_root: None,
        }
    }
}
