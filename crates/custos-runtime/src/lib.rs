//! Custos Runtime - Wiring, background sweeps and the audited admin surface.
//!
//! This crate provides:
//! - [`Custos`]: opens storage, resolves secrets and assembles the key
//!   manager and ledger from a [`custos_config::Config`]
//! - [`RotationScheduler`] and [`IntegritySweep`]: periodic tasks run by the
//!   [`TaskScheduler`] on tokio's blocking pool
//! - [`AdminService`]: key and ledger administration where every call is
//!   recorded in the ledger
//! - [`AuditedCipher`]: field encryption that records failed
//!   authentication on decrypt
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use custos_audit::TracingNotifier;
//! use custos_config::Config;
//! use custos_core::{ActorId, KeyPurpose};
//! use custos_runtime::Custos;
//!
//! let custos = Custos::open_with(Config::default(), |_| None, Arc::new(TracingNotifier)).unwrap();
//! let payload = custos
//!     .cipher()
//!     .encrypt_str("session notes", KeyPurpose::Data, Some("client:7"))
//!     .unwrap();
//! let coach = ActorId::new("coach-3").unwrap();
//! assert_eq!(custos.cipher().decrypt_to_string(&payload, &coach).unwrap(), "session notes");
//! custos.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod actions;
pub mod bridge;
pub mod prelude;

mod admin;
mod bootstrap;
mod cipher;
mod error;
mod integrity;
mod rotation;
mod scheduler;

#[cfg(test)]
mod testing;

pub use admin::AdminService;
pub use bootstrap::{Custos, SecretSources, init_logging};
pub use cipher::AuditedCipher;
pub use error::{RuntimeError, RuntimeResult};
pub use integrity::IntegritySweep;
pub use rotation::{RotatedKey, RotationScheduler, RotationSweepReport};
pub use scheduler::{ScheduledTask, TaskOutcome, TaskScheduler, run_once};
