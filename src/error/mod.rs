//! The unified error handling system for the gateway.

// 1. Core Types
pub use types::{MALFORMED_REQUEST_STATUS, ProxyError};

/// A unified `Result` type for the entire gateway.
pub type Result<T> = std::result::Result<T, ProxyError>;

// 2. Module declarations
pub mod cache;
pub mod config;
pub mod key_pool;
pub mod types;

pub use cache::CacheError;
pub use config::ConfigError;
pub use key_pool::CounterStoreError;

/// Context trait for attaching a human readable message to foreign errors.
pub trait Context<T> {
    #[track_caller]
    fn with_internal_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn with_internal_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        self.map_err(|error| ProxyError::internal_with_source(context().to_string(), error))
    }
}

/// Error Category for monitoring and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Errors caused by the client (bad route, bad model, wrong secret).
    Client,
    /// Errors caused by the gateway or its dependencies.
    Server,
}

impl ProxyError {
    /// Classify the error for alerting purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        if self.status_code().is_client_error() {
            ErrorCategory::Client
        } else {
            ErrorCategory::Server
        }
    }
}
