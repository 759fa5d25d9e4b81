//! Reconcile outcomes

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a reconcile pass did to the remote entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Created a new remote entity
    Create,
    /// Converged a drifted remote entity
    Update,
    /// Deleted (or orphaned) the remote entity and removed the managed resource
    Delete,
    /// Already in sync
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of one successful reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub action: ActionType,

    /// When to look at the resource again. `None` means the managed
    /// resource is gone and must not be scheduled any more.
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    pub fn requeue(action: ActionType, after: Duration) -> Self {
        Self {
            action,
            requeue_after: Some(after),
        }
    }

    pub fn removed(action: ActionType) -> Self {
        Self {
            action,
            requeue_after: None,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.requeue_after.is_none()
    }
}

/// Result of reconciling a set of managed resources once
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,

    /// (resource name, error message)
    pub failed: Vec<(String, String)>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl PassSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record(&mut self, name: &str, result: &crate::Result<ReconcileOutcome>) {
        match result {
            Ok(outcome) => match outcome.action {
                ActionType::Create => self.create += 1,
                ActionType::Update => self.update += 1,
                ActionType::Delete => self.delete += 1,
                ActionType::NoOp => self.no_change += 1,
            },
            Err(e) => self.failed.push((name.to_string(), e.to_string())),
        }
    }

    pub fn merge(&mut self, other: PassSummary) {
        self.create += other.create;
        self.update += other.update;
        self.delete += other.delete;
        self.no_change += other.no_change;
        self.failed.extend(other.failed);
        self.duration_ms = self.duration_ms.max(other.duration_ms);
    }
}

impl std::fmt::Display for PassSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged, {} failed",
            self.create,
            self.update,
            self.delete,
            self.no_change,
            self.failed.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CloudError;

    #[test]
    fn test_summary_counts() {
        let mut summary = PassSummary::new();
        summary.record(
            "a",
            &Ok(ReconcileOutcome::requeue(ActionType::Create, Duration::from_secs(1))),
        );
        summary.record(
            "b",
            &Ok(ReconcileOutcome::requeue(ActionType::NoOp, Duration::from_secs(1))),
        );
        summary.record("c", &Err(CloudError::Timeout("deadline".into())));

        assert_eq!(summary.create, 1);
        assert_eq!(summary.no_change, 1);
        assert!(!summary.is_success());
        assert_eq!(
            summary.to_string(),
            "1 created, 0 updated, 0 deleted, 1 unchanged, 1 failed"
        );
    }
}
