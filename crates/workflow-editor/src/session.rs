//! Editor session: the single entry point for the rendering surface
//!
//! An `EditorSession` owns one workflow's graph model, its undo history and
//! its layout engine, and turns canvas gestures into model mutations. Every
//! recorded gesture produces exactly one history entry; drags are coalesced
//! so that only the final position is recorded.
//!
//! Saves go through the shared [`SyncReconciler`]. The split form
//! (`begin_save`, [`PendingSave::submit`], `complete_save`) lets the caller
//! keep editing while the request is in flight; [`EditorSession::save`] runs
//! all three in one call.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::WorkflowBackend;
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::events::{EditorEvent, EventSink, NullEventSink};
use crate::gesture::{Gesture, Selection};
use crate::layout::LayoutEngine;
use crate::model::GraphModel;
use crate::projection::{project, RenderProjection};
use crate::sync::{PendingSave, SubmittedSave, SyncReconciler};
use crate::types::{
    Anchors, Position, RoleName, StepChanges, StepDraft, StepId, TempId, TransitionChanges,
    TransitionDraft, TransitionId, WorkflowGraph, WorkflowId,
};
use crate::undo::UndoStack;
use crate::validation::{validate_graph, ValidationReport};

/// An in-progress drag of one step
#[derive(Debug, Clone, Copy)]
struct DragState {
    step_id: StepId,
    /// Position when the drag started
    origin: Option<Position>,
}

/// First phase of a save
#[derive(Debug)]
pub enum SaveStart {
    /// Validation passed and the save slot is claimed; submit it next
    Ready(PendingSave),
    /// Only warnings were found and they were not confirmed
    NeedsConfirmation(ValidationReport),
}

/// Result of a completed save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSummary {
    /// Temporary ids replaced by permanent ones
    pub id_mapping: HashMap<TempId, u64>,
    /// Whether edits made while the save was in flight were kept
    pub merged_local_edits: bool,
    /// Problems found in the graph the backend returned
    pub load_warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(SaveSummary),
    /// Nothing was sent; call `save(true)` to save despite the warnings
    NeedsConfirmation(ValidationReport),
}

/// Editing session for one workflow
pub struct EditorSession {
    workflow_id: WorkflowId,
    model: GraphModel,
    layout: LayoutEngine,
    history: UndoStack<WorkflowGraph>,
    reconciler: SyncReconciler,
    backend: Arc<dyn WorkflowBackend>,
    events: Arc<dyn EventSink>,
    known_roles: Vec<RoleName>,
    selection: Option<Selection>,
    drag: Option<DragState>,
}

impl EditorSession {
    /// Create a session over an empty graph
    pub fn new(
        workflow_id: WorkflowId,
        backend: Arc<dyn WorkflowBackend>,
        config: &EditorConfig,
    ) -> Result<Self> {
        let mut session = Self {
            workflow_id,
            model: GraphModel::new(),
            layout: LayoutEngine::new(config.layout.clone()),
            history: UndoStack::new(config.history_capacity),
            reconciler: SyncReconciler::new(),
            backend,
            events: Arc::new(NullEventSink),
            known_roles: Vec::new(),
            selection: None,
            drag: None,
        };
        session.reset_history(&session.model.snapshot())?;
        Ok(session)
    }

    /// Open a persisted workflow: fetch graph and roles, lay out unplaced steps
    ///
    /// A failed role fetch does not stop the session from opening; it starts
    /// with no known roles and [`EditorSession::refresh_roles`] can retry.
    pub async fn open(
        workflow_id: WorkflowId,
        backend: Arc<dyn WorkflowBackend>,
        config: &EditorConfig,
    ) -> Result<Self> {
        let graph = backend.fetch_workflow_graph(workflow_id).await?;
        let roles = match backend.fetch_roles().await {
            Ok(roles) => roles,
            Err(e) => {
                log::warn!(
                    "Opening workflow {} without roles, fetch failed: {}",
                    workflow_id,
                    e
                );
                Vec::new()
            }
        };

        let mut session = Self::new(workflow_id, backend, config)?;
        session.known_roles = roles;
        session.model.load(graph)?;
        session.layout.apply(&mut session.model)?;
        session.reset_history(&session.model.snapshot())?;

        log::info!(
            "Opened workflow {} ({} steps, {} roles)",
            workflow_id,
            session.model.graph().steps.len(),
            session.known_roles.len()
        );
        Ok(session)
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Share a reconciler with other sessions so they cannot save the same workflow at once
    pub fn with_reconciler(mut self, reconciler: SyncReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_known_roles(mut self, roles: Vec<RoleName>) -> Self {
        self.known_roles = roles;
        self
    }

    /// Re-fetch the role set from the backend
    pub async fn refresh_roles(&mut self) -> Result<()> {
        self.known_roles = self.backend.fetch_roles().await?;
        log::debug!("Refreshed roles: {} known", self.known_roles.len());
        Ok(())
    }

    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    pub fn graph(&self) -> &WorkflowGraph {
        self.model.graph()
    }

    pub fn known_roles(&self) -> &[RoleName] {
        &self.known_roles
    }

    pub fn backend(&self) -> Arc<dyn WorkflowBackend> {
        Arc::clone(&self.backend)
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    // =========================================================================
    // Gestures
    // =========================================================================

    /// Add a step; a step dropped without a position is placed by the layout
    pub fn on_add_step(&mut self, draft: StepDraft) -> Result<StepId> {
        self.finish_drag()?;

        let id = self.model.add_step(draft);
        let placed = self
            .layout
            .fill_missing(self.model.graph())
            .into_iter()
            .find(|(step_id, _)| *step_id == id);
        if let Some((_, position)) = placed {
            self.model.update_step(&id, StepChanges::position(position))?;
        }

        self.commit()?;
        Ok(id)
    }

    /// Draw a transition
    ///
    /// Connecting to a missing or deleted step creates nothing; the user gets
    /// a notice and `None` is returned.
    pub fn on_connect(
        &mut self,
        from: StepId,
        to: StepId,
        anchors: Anchors,
    ) -> Result<Option<TransitionId>> {
        self.finish_drag()?;

        let draft = TransitionDraft::new(from, to).with_anchors(anchors);
        match self.model.add_transition(draft) {
            Ok(id) => {
                self.commit()?;
                Ok(Some(id))
            }
            Err(EditorError::DanglingEndpoint { step_id }) => {
                log::info!(
                    "Connection {} -> {} ignored: '{}' is not a live step",
                    from,
                    to,
                    step_id
                );
                self.emit(EditorEvent::notice(format!(
                    "Cannot connect: step '{}' no longer exists",
                    step_id
                )));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Soft-delete a step and its transitions
    pub fn on_delete_step(&mut self, step_id: &StepId) -> Result<()> {
        self.finish_drag()?;
        let revision = self.model.revision();
        self.model.mark_step_deleted(step_id).map_err(warn_not_found)?;
        self.commit_if_changed(revision)
    }

    pub fn on_delete_transition(&mut self, transition_id: &TransitionId) -> Result<()> {
        self.finish_drag()?;
        let revision = self.model.revision();
        self.model
            .mark_transition_deleted(transition_id)
            .map_err(warn_not_found)?;
        self.commit_if_changed(revision)
    }

    /// Edit step fields from the properties panel
    pub fn on_update_step(&mut self, step_id: &StepId, changes: StepChanges) -> Result<()> {
        self.finish_drag()?;
        let revision = self.model.revision();
        self.model.update_step(step_id, changes).map_err(warn_not_found)?;
        self.commit_if_changed(revision)
    }

    pub fn on_update_transition(
        &mut self,
        transition_id: &TransitionId,
        changes: TransitionChanges,
    ) -> Result<()> {
        self.finish_drag()?;
        let revision = self.model.revision();
        self.model
            .update_transition(transition_id, changes)
            .map_err(warn_not_found)?;
        self.commit_if_changed(revision)
    }

    /// Move a step in one go
    pub fn on_move(&mut self, step_id: &StepId, position: Position) -> Result<()> {
        self.on_update_step(step_id, StepChanges::position(position))
    }

    /// Start dragging a step; closes any drag still open
    pub fn begin_drag(&mut self, step_id: &StepId) -> Result<()> {
        self.finish_drag()?;
        let step = self
            .model
            .graph()
            .find_step(step_id)
            .ok_or(EditorError::step_not_found(*step_id))
            .map_err(warn_not_found)?;
        self.drag = Some(DragState {
            step_id: *step_id,
            origin: step.position,
        });
        Ok(())
    }

    /// Intermediate drag position; applied to the model, not recorded
    pub fn drag_to(&mut self, step_id: &StepId, position: Position) -> Result<()> {
        if self.drag.map(|d| d.step_id) != Some(*step_id) {
            self.begin_drag(step_id)?;
        }
        self.model
            .update_step(step_id, StepChanges::position(position))
            .map_err(warn_not_found)?;
        self.emit(EditorEvent::GraphChanged {
            revision: self.model.revision(),
        });
        Ok(())
    }

    /// Finish the active drag
    ///
    /// Returns whether a history entry was recorded, which only happens if
    /// the step actually moved.
    pub fn end_drag(&mut self) -> Result<bool> {
        self.finish_drag()
    }

    /// Change the selection; not part of the undo history
    pub fn on_select(&mut self, target: Option<Selection>) -> Result<()> {
        if let Some(selection) = &target {
            let graph = self.model.graph();
            let exists = match selection {
                Selection::Step(id) => graph.find_step(id).is_some(),
                Selection::Transition(id) => graph.find_transition(id).is_some(),
            };
            if !exists {
                let error = match selection {
                    Selection::Step(id) => EditorError::step_not_found(*id),
                    Selection::Transition(id) => EditorError::transition_not_found(*id),
                };
                return Err(warn_not_found(error));
            }
        }
        self.selection = target;
        Ok(())
    }

    /// Route a gesture from the rendering surface
    pub fn dispatch(&mut self, gesture: Gesture) -> Result<()> {
        match gesture {
            Gesture::Add { draft } => self.on_add_step(draft).map(|_| ()),
            Gesture::Move { step_id, position } => self.on_move(&step_id, position),
            Gesture::DragStart { step_id } => self.begin_drag(&step_id),
            Gesture::Drag { step_id, position } => self.drag_to(&step_id, position),
            Gesture::DragEnd => self.end_drag().map(|_| ()),
            Gesture::Connect { from, to, anchors } => {
                self.on_connect(from, to, anchors).map(|_| ())
            }
            Gesture::Select { target } => self.on_select(target),
            Gesture::DeleteStep { step_id } => self.on_delete_step(&step_id),
            Gesture::DeleteTransition { transition_id } => {
                self.on_delete_transition(&transition_id)
            }
        }
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Step back one history entry; returns false at the oldest entry
    pub fn undo(&mut self) -> Result<bool> {
        self.finish_drag()?;
        match self.history.undo() {
            Some(snapshot) => {
                self.restore(snapshot?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Step forward one history entry; returns false at the newest entry
    pub fn redo(&mut self) -> Result<bool> {
        self.finish_drag()?;
        match self.history.redo() {
            Some(snapshot) => {
                self.restore(snapshot?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.history.has_unsaved_changes()
    }

    // =========================================================================
    // Validation and saving
    // =========================================================================

    pub fn validate(&self) -> ValidationReport {
        validate_graph(self.model.graph(), &self.known_roles)
    }

    /// Validate and claim the save slot
    ///
    /// Blocking errors fail with [`EditorError::Validation`]. Warnings stop
    /// the save unless `confirm_warnings` is set.
    pub fn begin_save(&mut self, confirm_warnings: bool) -> Result<SaveStart> {
        self.finish_drag()?;

        let report = self.validate();
        if !report.is_valid {
            log::warn!(
                "Save of workflow {} blocked: {}",
                self.workflow_id,
                report.error_messages().join("; ")
            );
            return Err(EditorError::Validation(report));
        }
        if report.has_warnings() && !confirm_warnings {
            log::debug!(
                "Save of workflow {} needs confirmation of {} warnings",
                self.workflow_id,
                report.warnings.len()
            );
            return Ok(SaveStart::NeedsConfirmation(report));
        }

        let pending = self.reconciler.prepare(self.workflow_id, &self.model)?;
        self.emit(EditorEvent::SaveStarted {
            workflow_id: self.workflow_id,
        });
        Ok(SaveStart::Ready(pending))
    }

    /// Fold a finished save into the session
    ///
    /// On success the history restarts at the persisted graph. On failure
    /// nothing changes and the error is returned. A save begun for another
    /// workflow is refused with [`EditorError::WorkflowMismatch`].
    pub fn complete_save(&mut self, submitted: SubmittedSave) -> Result<SaveSummary> {
        if submitted.workflow_id() != self.workflow_id {
            log::warn!(
                "Refusing to apply save of workflow {} to workflow {}",
                submitted.workflow_id(),
                self.workflow_id
            );
            return Err(EditorError::WorkflowMismatch {
                expected: self.workflow_id,
                actual: submitted.workflow_id(),
            });
        }

        let reconciliation = match self.reconciler.reconcile(&mut self.model, submitted) {
            Ok(reconciliation) => reconciliation,
            Err(e) => {
                self.emit(EditorEvent::SaveFailed {
                    workflow_id: self.workflow_id,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        self.reset_history(&reconciliation.baseline)?;
        if reconciliation.merged_local_edits {
            self.history.record(&self.model.snapshot())?;
        }

        let mapping = &reconciliation.id_mapping;
        self.selection = self.selection.map(|selection| match selection {
            Selection::Step(id) => Selection::Step(id.resolve(mapping)),
            Selection::Transition(id) => Selection::Transition(id.resolve(mapping)),
        });
        if let Some(drag) = &mut self.drag {
            drag.step_id = drag.step_id.resolve(mapping);
        }
        self.prune_selection();

        self.emit(EditorEvent::GraphChanged {
            revision: self.model.revision(),
        });
        self.emit(EditorEvent::SaveCompleted {
            workflow_id: self.workflow_id,
            assigned_ids: mapping.len(),
        });
        self.emit_history();

        Ok(SaveSummary {
            id_mapping: reconciliation.id_mapping.clone(),
            merged_local_edits: reconciliation.merged_local_edits,
            load_warnings: reconciliation.report.warnings(),
        })
    }

    /// Validate, submit and reconcile in one call
    pub async fn save(&mut self, confirm_warnings: bool) -> Result<SaveOutcome> {
        let pending = match self.begin_save(confirm_warnings)? {
            SaveStart::Ready(pending) => pending,
            SaveStart::NeedsConfirmation(report) => {
                return Ok(SaveOutcome::NeedsConfirmation(report))
            }
        };

        let backend = Arc::clone(&self.backend);
        let submitted = pending.submit(backend.as_ref()).await;
        self.complete_save(submitted).map(SaveOutcome::Saved)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    pub fn projection(&self) -> RenderProjection {
        project(self.model.graph(), &self.layout, self.selection.as_ref())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Close the active drag, recording it if the step moved
    fn finish_drag(&mut self) -> Result<bool> {
        let Some(drag) = self.drag.take() else {
            return Ok(false);
        };
        let moved = self
            .model
            .graph()
            .find_step(&drag.step_id)
            .is_some_and(|step| step.position != drag.origin);
        if moved {
            self.commit()?;
        }
        Ok(moved)
    }

    fn commit_if_changed(&mut self, revision: u64) -> Result<()> {
        if self.model.revision() != revision {
            self.commit()?;
        }
        Ok(())
    }

    /// Record the current graph as one history entry
    fn commit(&mut self) -> Result<()> {
        self.history.record(&self.model.snapshot())?;
        self.emit(EditorEvent::GraphChanged {
            revision: self.model.revision(),
        });
        self.emit_history();
        Ok(())
    }

    fn restore(&mut self, snapshot: WorkflowGraph) {
        self.model.restore(snapshot);
        self.prune_selection();
        self.emit(EditorEvent::GraphChanged {
            revision: self.model.revision(),
        });
        self.emit_history();
    }

    /// Restart history with a single entry marked as saved
    fn reset_history(&mut self, baseline: &WorkflowGraph) -> Result<()> {
        self.history.clear();
        self.history.record(baseline)?;
        self.history.mark_saved_baseline();
        Ok(())
    }

    /// Drop a selection whose entity no longer exists
    fn prune_selection(&mut self) {
        let graph = self.model.graph();
        let exists = match &self.selection {
            Some(Selection::Step(id)) => graph.find_step(id).is_some(),
            Some(Selection::Transition(id)) => graph.find_transition(id).is_some(),
            None => true,
        };
        if !exists {
            self.selection = None;
        }
    }

    fn emit_history(&self) {
        self.emit(EditorEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            unsaved: self.history.has_unsaved_changes(),
        });
    }

    fn emit(&self, event: EditorEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to deliver editor event: {}", e);
        }
    }
}

fn warn_not_found(error: EditorError) -> EditorError {
    if let EditorError::NotFound { kind, id } = &error {
        log::warn!("Gesture referenced unknown {} '{}'", kind, id);
    }
    error
}
