//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custos_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Common types
pub use crate::{ActorId, KeyPurpose, RiskLevel, Timestamp};

// Event classification
pub use crate::{DataClassification, EventCategory, Outcome};
