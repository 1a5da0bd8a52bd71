//! Structured logging system using tracing crate
//!
//! Two layers live here:
//!
//! 1. Process-wide subscriber setup (`init_logging` / `init_default_logging`),
//!    controlled by environment variables:
//!    - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG, TRACE - defaults to INFO
//!    - `LOG_FORMAT`: json, pretty, compact - defaults to json
//!    - `LOG_SPANS`: include span events (true/false) - defaults to false
//!    - `RUST_LOG`: overrides filtering (env_logger format)
//!
//! 2. The per-Router logging capability: every Router receives a [`Logger`]
//!    built by the [`LoggerFactory`] in its configuration, so log output is
//!    injected rather than written to an ambient global. The default
//!    [`TracingLoggerFactory`] forwards to the process-wide subscriber and
//!    tags every line with the Router's `log_id`.

use std::env;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with colors but minimal spacing (terminal-friendly)
    Compact,
}

impl LogFormat {
    /// Parse log format from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json, // Default to JSON for production
        }
    }
}

/// Initialize logging with manual configuration
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) {
    let mut filter = EnvFilter::new(level.to_string())
        // Reduce noise from dependencies
        .add_directive("rumqttc=warn".parse().unwrap())
        .add_directive("tokio=warn".parse().unwrap());

    // Allow RUST_LOG to override
    if let Ok(rust_log) = env::var("RUST_LOG") {
        filter = EnvFilter::new(rust_log);
    }

    let span_events = if include_spans {
        fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE
    } else {
        fmt::format::FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_span_events(span_events);
            subscriber.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_ansi(true)
                .with_span_events(span_events);
            subscriber.with(fmt_layer).init();
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_ansi(true)
                .with_target(false)
                .with_span_events(span_events);
            subscriber.with(fmt_layer).init();
        }
    }
}

/// Initialize logging from environment variables
pub fn init_default_logging() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());

    let level = match log_level.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    };

    let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let log_format = LogFormat::parse(&format);

    let include_spans = env::var("LOG_SPANS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    init_logging(level, log_format, include_spans);
}

/// Per-Router logging capability.
///
/// Level names follow the host contract; `silly` is the most verbose and
/// maps to `tracing::trace!` in the default implementation.
pub trait Logger: Send + Sync {
    fn silly(&self, message: &str);
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Fallible factory for [`Logger`] instances.
///
/// Construction failure is a fatal dependency-init error for the Router
/// being built; the underlying cause is written to the diagnostic console
/// since the logger itself is unavailable to log it.
pub trait LoggerFactory: Send + Sync {
    fn create(&self, log_id: &str) -> Result<Box<dyn Logger>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Default logger: forwards to the process-wide tracing subscriber with the
/// owning Router's `log_id` attached to every line.
pub struct TracingLogger {
    log_id: String,
}

impl TracingLogger {
    pub fn new(log_id: impl Into<String>) -> Self {
        Self {
            log_id: log_id.into(),
        }
    }
}

impl Logger for TracingLogger {
    fn silly(&self, message: &str) {
        tracing::trace!(log_id = %self.log_id, "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(log_id = %self.log_id, "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(log_id = %self.log_id, "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(log_id = %self.log_id, "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(log_id = %self.log_id, "{message}");
    }
}

/// Default factory producing [`TracingLogger`] instances. Infallible.
pub struct TracingLoggerFactory;

impl LoggerFactory for TracingLoggerFactory {
    fn create(
        &self,
        log_id: &str,
    ) -> Result<Box<dyn Logger>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Box::new(TracingLogger::new(log_id)))
    }
}
