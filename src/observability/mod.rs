//! Observability infrastructure
//!
//! Structured logging via the tracing crate, plus the injected per-Router
//! logging capability handed in through configuration.

pub mod logging;

pub use logging::{
    init_default_logging, init_logging, LogFormat, Logger, LoggerFactory, TracingLogger,
    TracingLoggerFactory,
};
