//! Error types for the stream transport core
//!
//! Construction-time errors are fatal to a Router instance and surface to the
//! host as a `CREATE_FAILURE` event. Runtime errors are recovered locally by
//! the state machine and only ever reach the host as failure events.

use crate::config::ConfigError;
use crate::router::RouterState;
use crate::transport::TransportError;
use thiserror::Error;

/// Reason string used in failure events when an operation exceeded its
/// deadline. Hosts distinguish this from transport-reported failures.
pub const REASON_TIMEOUT: &str = "timeout";

/// Reason string used when `destroy()` settles an operation that was still
/// in flight.
pub const REASON_CANCELLED: &str = "cancelled";

/// Main error type for Router operations
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to initialize {component}: {source}")]
    DependencyInit {
        component: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{op} rejected in state {state:?}")]
    InvalidState {
        op: &'static str,
        state: RouterState,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl RouterError {
    /// Create a dependency-init error preserving the underlying cause
    pub fn dependency_init<E>(component: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::DependencyInit {
            component,
            source: source.into(),
        }
    }
}

/// Result type for Router operations
pub type RouterResult<T> = Result<T, RouterError>;
