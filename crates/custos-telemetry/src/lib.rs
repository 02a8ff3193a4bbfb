//! Custos Telemetry - structured logging and operation correlation.
//!
//! This crate provides:
//! - Configurable `tracing` subscriber setup (compact, pretty, JSON)
//!   writing to stdout, stderr or rolling files
//! - [`OperationContext`] for correlating the log lines of one
//!   administrative operation or scheduler sweep
//!
//! # Example
//!
//! ```rust,no_run
//! use custos_telemetry::{LogConfig, LogFormat, OperationContext, setup_logging};
//!
//! # fn main() -> Result<(), custos_telemetry::TelemetryError> {
//! let _guard = setup_logging(
//!     &LogConfig::new("info")
//!         .with_format(LogFormat::Json)
//!         .with_directive("custos_audit=debug"),
//! )?;
//!
//! let ctx = OperationContext::new("admin", "rotate_key").with_actor("actor:ops-1");
//! let op = ctx.enter();
//! tracing::info!("rotating data key");
//! op.succeed();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{OperationContext, OperationGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, LoggingGuard,
    setup_default_logging, setup_logging,
};
