// Workflow status - the closed set of lifecycle states for one project's contribution

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a contribution workflow.
///
/// Documented transitions:
///
/// ```text
/// Initializing     -> ReadyToCreatePr | ReadyToUpdatePr | (invalidated)
/// ReadyToCreatePr  -> CreatingPr
/// CreatingPr       -> ReadyToUpdatePr | ReadyToCreatePr (on failure)
/// ReadyToUpdatePr  -> UpdatingPr
/// UpdatingPr       -> ReadyToUpdatePr (on failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Initializing,
    ReadyToCreatePr,
    CreatingPr,
    ReadyToUpdatePr,
    UpdatingPr,
}

/// What a step failure does to the status it interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureRollback {
    /// Move back to the given ready state
    Revert(WorkflowStatus),
    /// Drop the whole context
    Invalidate,
    /// Leave the status untouched
    Keep,
}

impl WorkflowStatus {
    /// Whether `next` is one of the documented successors of `self`.
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Initializing, ReadyToCreatePr)
                | (Initializing, ReadyToUpdatePr)
                | (ReadyToCreatePr, CreatingPr)
                | (CreatingPr, ReadyToUpdatePr)
                | (CreatingPr, ReadyToCreatePr)
                | (ReadyToUpdatePr, UpdatingPr)
                | (UpdatingPr, ReadyToUpdatePr)
        )
    }

    /// Rollback applied when a step fails while the workflow is in this status.
    ///
    /// The ready states have no entry: a failure there leaves the status as is.
    pub fn failure_rollback(self) -> FailureRollback {
        match self {
            WorkflowStatus::CreatingPr => FailureRollback::Revert(WorkflowStatus::ReadyToCreatePr),
            WorkflowStatus::UpdatingPr => FailureRollback::Revert(WorkflowStatus::ReadyToUpdatePr),
            WorkflowStatus::Initializing => FailureRollback::Invalidate,
            WorkflowStatus::ReadyToCreatePr | WorkflowStatus::ReadyToUpdatePr => FailureRollback::Keep,
        }
    }

    /// An existing pull request is being tracked.
    pub fn is_update_mode(self) -> bool {
        matches!(self, WorkflowStatus::ReadyToUpdatePr | WorkflowStatus::UpdatingPr)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Initializing => "INITIALIZING",
            WorkflowStatus::ReadyToCreatePr => "READY_TO_CREATE_PR",
            WorkflowStatus::CreatingPr => "CREATING_PR",
            WorkflowStatus::ReadyToUpdatePr => "READY_TO_UPDATE_PR",
            WorkflowStatus::UpdatingPr => "UPDATING_PR",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
