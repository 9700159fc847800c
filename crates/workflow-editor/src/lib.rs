//! Workflow Editor - Graph editing core for process workflows
//!
//! This crate holds everything a workflow editor needs below the rendering
//! layer. It supports:
//!
//! - Editing steps and transitions with soft deletion
//! - Temporary ids for unsaved entities, replaced on save
//! - Deterministic layered layout for unplaced steps
//! - Pre-save validation with blocking errors and confirmable warnings
//! - Compressed snapshot-based undo/redo
//! - Save round trips with id reconciliation and one save per workflow at a time
//!
//! # Architecture
//!
//! - `GraphModel`: the only owner of the live graph
//! - `LayoutEngine`: positions for steps that have none
//! - `validate_graph`: pure check of a graph against the role set
//! - `UndoStack`: compressed immutable snapshots for undo/redo
//! - `SyncReconciler`: save slots and folding backend ids back into the model
//! - `EditorSession`: gesture-level façade used by the rendering surface
//! - `EventSink`: generic event streaming (not tied to any UI toolkit)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use workflow_editor::{Anchors, EditorConfig, EditorSession, InMemoryBackend, StepDraft};
//!
//! # async fn demo() -> workflow_editor::Result<()> {
//! let backend = Arc::new(InMemoryBackend::new());
//! let mut session = EditorSession::new(1, backend, &EditorConfig::default())?;
//!
//! let draft = session.on_add_step(StepDraft::named("Draft").start())?;
//! let publish = session.on_add_step(StepDraft::named("Publish").end())?;
//! session.on_connect(draft, publish, Anchors::default())?;
//!
//! session.save(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod builder;
pub mod config;
pub mod error;
pub mod events;
pub mod gesture;
pub mod layout;
pub mod model;
pub mod projection;
pub mod session;
pub mod sync;
pub mod types;
pub mod undo;
pub mod validation;

#[cfg(test)]
pub(crate) mod strategies;

// Re-export key types
pub use backend::{BackendError, GraphPatch, InMemoryBackend, SaveResponse, WorkflowBackend};
pub use builder::GraphBuilder;
pub use config::{ConfigError, EditorConfig, LayoutConfig};
pub use error::{EditorError, Result};
pub use events::{
    ChannelEventSink, EditorEvent, EventError, EventSink, NullEventSink, VecEventSink,
};
pub use gesture::{Gesture, Selection};
pub use layout::LayoutEngine;
pub use model::{GraphModel, LoadReport};
pub use projection::{project, RenderProjection};
pub use session::{EditorSession, SaveOutcome, SaveStart, SaveSummary};
pub use sync::{PendingSave, Reconciliation, SubmittedSave, SyncReconciler};
pub use types::{
    AnchorSide, Anchors, EntityId, EntityKind, Position, RoleName, Step, StepChanges, StepDraft,
    StepId, TempId, Transition, TransitionChanges, TransitionDraft, TransitionId, WorkflowGraph,
    WorkflowId,
};
pub use undo::UndoStack;
pub use validation::{validate_graph, Severity, ValidationIssue, ValidationReport};
