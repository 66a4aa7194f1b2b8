//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with optional
//! rolling JSON log files through tracing-appender.

pub mod logger;

pub use logger::{LoggerImpl, LOG_FILE_NAME};
