//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custos_runtime::prelude::*;` to import all essential types.

// Errors
pub use crate::{RuntimeError, RuntimeResult};

// Assembly
pub use crate::{Custos, init_logging};

// Surfaces
pub use crate::{AdminService, AuditedCipher};

// Background work
pub use crate::{IntegritySweep, RotationScheduler, ScheduledTask, TaskScheduler};
