//! Operation context for correlating log lines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one administrative operation or background sweep.
///
/// Every log line emitted inside [`OperationContext::span`] carries the
/// operation and correlation ids, so a rotation sweep and the key events
/// it triggers can be followed across crates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Unique id of this operation.
    pub operation_id: Uuid,
    /// Shared by an operation and all of its children.
    pub correlation_id: Uuid,
    /// Parent operation, for nested work.
    pub parent_id: Option<Uuid>,
    /// Component that started the operation (`admin`, `scheduler`).
    pub component: String,
    /// Operation name (`rotate_key`, `integrity_sweep`).
    pub operation: String,
    /// Acting principal, if known.
    pub actor: Option<String>,
    /// When the operation started.
    pub started_at: DateTime<Utc>,
    /// Extra key/value pairs.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl OperationContext {
    /// Start a new root operation.
    #[must_use]
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            operation_id: id,
            correlation_id: id,
            parent_id: None,
            component: component.into(),
            operation: operation.into(),
            actor: None,
            started_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Start a child operation that shares this correlation id and actor.
    #[must_use]
    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            correlation_id: self.correlation_id,
            parent_id: Some(self.operation_id),
            component: self.component.clone(),
            operation: operation.into(),
            actor: self.actor.clone(),
            started_at: Utc::now(),
            metadata: self.metadata.clone(),
        }
    }

    /// Set the acting principal.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Add metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Milliseconds since the operation started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// A span carrying this context's identifiers.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            operation_id = %self.operation_id,
            correlation_id = %self.correlation_id,
            component = %self.component,
            operation = %self.operation,
            actor = self.actor.as_deref(),
        )
    }

    /// Enter the span and return a guard that logs the outcome.
    #[must_use]
    pub fn enter(self) -> OperationGuard {
        OperationGuard::new(self)
    }
}

/// Keeps an operation's span entered and logs how it ended.
///
/// Dropping the guard without calling [`succeed`](Self::succeed) or
/// [`fail`](Self::fail) logs the operation as abandoned.
pub struct OperationGuard {
    context: OperationContext,
    outcome: Option<Result<(), String>>,
    /// Held so the span stays entered until the guard drops.
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl std::fmt::Debug for OperationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationGuard")
            .field("context", &self.context)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl OperationGuard {
    fn new(context: OperationContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("operation started");
        Self {
            context,
            outcome: None,
            span,
        }
    }

    /// The operation's context.
    #[must_use]
    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    /// Mark the operation as successful.
    pub fn succeed(mut self) {
        self.outcome = Some(Ok(()));
    }

    /// Mark the operation as failed.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.outcome = Some(Err(reason.into()));
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.context.elapsed_ms();
        match &self.outcome {
            Some(Ok(())) => tracing::debug!(elapsed_ms, "operation completed"),
            Some(Err(reason)) => tracing::warn!(elapsed_ms, %reason, "operation failed"),
            None => tracing::warn!(elapsed_ms, "operation abandoned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_its_own_correlation() {
        let ctx = OperationContext::new("admin", "rotate_key");
        assert_eq!(ctx.operation_id, ctx.correlation_id);
        assert!(ctx.parent_id.is_none());
        assert!(ctx.actor.is_none());
    }

    #[test]
    fn test_child_inherits_correlation_and_actor() {
        let parent = OperationContext::new("scheduler", "rotation_sweep")
            .with_actor("actor:system")
            .with_metadata("purpose", "data");
        let child = parent.child("rotate_key");

        assert_ne!(child.operation_id, parent.operation_id);
        assert_eq!(child.correlation_id, parent.correlation_id);
        assert_eq!(child.parent_id, Some(parent.operation_id));
        assert_eq!(child.actor.as_deref(), Some("actor:system"));
        assert_eq!(child.metadata.get("purpose").map(String::as_str), Some("data"));
        assert_eq!(child.component, "scheduler");
    }

    #[test]
    fn test_guard_outcomes() {
        let guard = OperationContext::new("admin", "export_key").enter();
        assert_eq!(guard.context().operation, "export_key");
        guard.fail("wrong password");

        OperationContext::new("admin", "metrics").enter().succeed();
    }

    #[test]
    fn test_serialization() {
        let ctx = OperationContext::new("admin", "verify_range").with_metadata("from", "1");
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"operation\":\"verify_range\""));
        let back: OperationContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
