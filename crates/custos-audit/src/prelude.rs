//! Prelude module - commonly used types for convenient import.
//!
//! Use `use custos_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Ledger
pub use crate::{AuditEntry, AuditEvent, AuditFilter, AuditLedger, LedgerSettings, QueryPage};

// Verification
pub use crate::{ChainVerificationReport, IntegrityVerifier};

// Storage & alerting
pub use crate::{AuditStorage, BaselineStore, KvAuditStorage, SecurityNotifier};
