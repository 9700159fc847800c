//! Error types for the workflow editor

use thiserror::Error;

use crate::backend::BackendError;
use crate::types::{EntityId, EntityKind, StepId, WorkflowId};
use crate::validation::ValidationReport;

/// Result type alias using EditorError
pub type Result<T> = std::result::Result<T, EditorError>;

/// Errors that can occur while editing or saving a workflow graph
#[derive(Debug, Error)]
pub enum EditorError {
    /// An operation referenced an id the model does not know
    #[error("Unknown {kind} '{id}'")]
    NotFound { kind: EntityKind, id: EntityId },

    /// A transition endpoint is missing or soft-deleted
    #[error("Transition endpoint '{step_id}' is missing or deleted")]
    DanglingEndpoint { step_id: StepId },

    /// Blocking validation rules failed; nothing was saved
    #[error("Validation failed: {}", .0.error_messages().join("; "))]
    Validation(ValidationReport),

    /// A save for this workflow is already outstanding
    #[error("A save is already in progress for workflow {0}")]
    SaveInProgress(WorkflowId),

    /// The backend round trip failed; local edits are preserved
    #[error("Save failed: {0}")]
    Sync(#[from] BackendError),

    /// A finished save was handed to a session editing another workflow
    #[error("Save for workflow {actual} cannot be applied to workflow {expected}")]
    WorkflowMismatch {
        expected: WorkflowId,
        actual: WorkflowId,
    },

    /// The backend payload cannot be loaded as a workflow graph
    #[error("Invalid workflow graph: {0}")]
    Load(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot compression error
    #[error("Compression error: {0}")]
    Compression(String),
}

impl EditorError {
    pub fn step_not_found(id: StepId) -> Self {
        Self::NotFound {
            kind: EntityKind::Step,
            id,
        }
    }

    pub fn transition_not_found(id: EntityId) -> Self {
        Self::NotFound {
            kind: EntityKind::Transition,
            id,
        }
    }

    /// Whether the error is something the user can act on (retry, fix, confirm)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DanglingEndpoint { .. }
                | Self::Validation(_)
                | Self::SaveInProgress(_)
                | Self::Sync(_)
        )
    }
}
