//! Custos Core - Foundation types for the audit and key-lifecycle subsystem.
//!
//! This crate provides:
//! - Actor identity and timestamps shared by every ledger entry
//! - The closed set of key purposes (`data`, `backup`, `transit`)
//! - Risk level classification used for scoring and alerting
//! - Event category, data classification and outcome tags for audited events

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod classification;
pub mod error;
pub mod types;

pub use classification::{DataClassification, EventCategory, Outcome};
pub use error::{CoreError, CoreResult};
pub use types::{ActorId, KeyPurpose, RiskLevel, Timestamp};
