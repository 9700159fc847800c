//! Save round trips and id reconciliation
//!
//! A save runs in three phases so the session stays editable while the
//! request is in flight:
//!
//! 1. [`SyncReconciler::prepare`] builds the patch from the current graph and
//!    claims the workflow's save slot.
//! 2. [`PendingSave::submit`] sends the patch. It owns everything it needs and
//!    borrows nothing from the session.
//! 3. [`SyncReconciler::reconcile`] folds the response back into the model.
//!
//! The slot is released when the save is dropped, so a failed or abandoned
//! save never blocks the next one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{BackendError, GraphPatch, SaveResponse, WorkflowBackend};
use crate::error::{EditorError, Result};
use crate::model::{GraphModel, LoadReport};
use crate::types::{StepId, TempId, TransitionId, WorkflowGraph, WorkflowId};

/// Coordinates saves across sessions
///
/// Clones share the same in-flight set, so sessions editing the same
/// workflow through one reconciler cannot save concurrently.
#[derive(Debug, Clone, Default)]
pub struct SyncReconciler {
    in_flight: Arc<Mutex<HashSet<WorkflowId>>>,
}

/// Claim on a workflow's save slot, released on drop
#[derive(Debug)]
struct SaveSlot {
    workflow_id: WorkflowId,
    in_flight: Arc<Mutex<HashSet<WorkflowId>>>,
}

impl Drop for SaveSlot {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.workflow_id);
    }
}

/// A save that has claimed its slot but not been submitted yet
#[derive(Debug)]
pub struct PendingSave {
    workflow_id: WorkflowId,
    patch: GraphPatch,
    /// Graph as it was when the patch was built
    base: WorkflowGraph,
    base_revision: u64,
    _slot: SaveSlot,
}

/// A save whose backend call has finished, successfully or not
#[derive(Debug)]
pub struct SubmittedSave {
    pending: PendingSave,
    result: std::result::Result<SaveResponse, BackendError>,
}

/// What reconciling a successful save did to the model
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Temporary ids replaced by permanent ones
    pub id_mapping: HashMap<TempId, u64>,
    /// Whether edits made during the save were kept on top of the server graph
    pub merged_local_edits: bool,
    /// Rows the server graph carried that could not be loaded
    pub report: LoadReport,
    /// The graph as persisted by the backend
    pub baseline: WorkflowGraph,
}

impl SyncReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a save for the workflow is outstanding
    pub fn is_in_flight(&self, workflow_id: WorkflowId) -> bool {
        self.in_flight.lock().contains(&workflow_id)
    }

    /// Build the save patch and claim the workflow's save slot
    ///
    /// Fails fast with [`EditorError::SaveInProgress`] if another save for the
    /// same workflow has not finished.
    pub fn prepare(&self, workflow_id: WorkflowId, model: &GraphModel) -> Result<PendingSave> {
        if !self.in_flight.lock().insert(workflow_id) {
            log::warn!("Save for workflow {} rejected: already in progress", workflow_id);
            return Err(EditorError::SaveInProgress(workflow_id));
        }
        let slot = SaveSlot {
            workflow_id,
            in_flight: Arc::clone(&self.in_flight),
        };

        let base = model.snapshot();
        let patch = GraphPatch::from_graph(&base);
        log::debug!(
            "Prepared save for workflow {}: {} steps, {} transitions",
            workflow_id,
            patch.steps.len(),
            patch.transitions.len()
        );

        Ok(PendingSave {
            workflow_id,
            patch,
            base,
            base_revision: model.revision(),
            _slot: slot,
        })
    }

    /// Apply a finished save to the model
    ///
    /// On failure the model is left exactly as it was. On success the model
    /// either becomes the server graph, or, if it was edited after the patch
    /// was built, keeps those edits with ids renamed and submitted deletions
    /// purged.
    pub fn reconcile(
        &self,
        model: &mut GraphModel,
        submitted: SubmittedSave,
    ) -> Result<Reconciliation> {
        let SubmittedSave { pending, result } = submitted;
        let workflow_id = pending.workflow_id;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Save for workflow {} failed: {}", workflow_id, e);
                return Err(e.into());
            }
        };

        let id_mapping = parse_id_mapping(&response)?;
        let unmapped: Vec<String> = pending
            .patch
            .pending_creations()
            .into_iter()
            .filter(|temp| !id_mapping.contains_key(temp))
            .map(|temp| temp.to_string())
            .collect();
        if !unmapped.is_empty() {
            log::warn!(
                "Save response for workflow {} has no id for {}",
                workflow_id,
                unmapped.join(", ")
            );
            return Err(BackendError::InvalidResponse(format!(
                "missing id mapping for {}",
                unmapped.join(", ")
            ))
            .into());
        }

        let reconciliation = if model.revision() == pending.base_revision {
            let report = model.load(response.graph).map_err(invalid_response)?;
            Reconciliation {
                id_mapping,
                merged_local_edits: false,
                report,
                baseline: model.snapshot(),
            }
        } else {
            let mut scratch = GraphModel::new();
            let report = scratch.load(response.graph).map_err(invalid_response)?;
            let server = scratch.snapshot();
            let merged = merge_local_edits(&pending, &server, model.snapshot(), &id_mapping);
            model.restore(merged);
            Reconciliation {
                id_mapping,
                merged_local_edits: true,
                report,
                baseline: server,
            }
        };

        log::info!(
            "Saved workflow {}: {} ids assigned{}",
            workflow_id,
            reconciliation.id_mapping.len(),
            if reconciliation.merged_local_edits {
                ", local edits kept"
            } else {
                ""
            }
        );
        Ok(reconciliation)
    }
}

impl PendingSave {
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    pub fn patch(&self) -> &GraphPatch {
        &self.patch
    }

    /// Send the patch to the backend
    ///
    /// Never fails by itself; the backend result travels in the returned
    /// value and is surfaced by [`SyncReconciler::reconcile`].
    pub async fn submit(self, backend: &dyn WorkflowBackend) -> SubmittedSave {
        log::info!("Submitting save for workflow {}", self.workflow_id);
        let result = backend.save_workflow_graph(self.workflow_id, &self.patch).await;
        SubmittedSave {
            pending: self,
            result,
        }
    }
}

impl SubmittedSave {
    pub fn workflow_id(&self) -> WorkflowId {
        self.pending.workflow_id
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

fn parse_id_mapping(response: &SaveResponse) -> Result<HashMap<TempId, u64>> {
    response
        .id_mapping
        .iter()
        .map(|(key, &id)| {
            key.parse::<TempId>()
                .map(|temp| (temp, id))
                .map_err(|e| EditorError::from(BackendError::InvalidResponse(e.to_string())))
        })
        .collect()
}

fn invalid_response(error: EditorError) -> EditorError {
    match error {
        EditorError::Load(message) => BackendError::InvalidResponse(message).into(),
        other => other,
    }
}

/// Keep edits made during the save on top of the server graph
///
/// Entities the user left alone since the patch was built take the server's
/// values; everything else keeps the local values.
fn merge_local_edits(
    pending: &PendingSave,
    server: &WorkflowGraph,
    mut local: WorkflowGraph,
    mapping: &HashMap<TempId, u64>,
) -> WorkflowGraph {
    let mut base = pending.base.clone();
    base.rename_ids(mapping);
    local.rename_ids(mapping);

    let deleted_steps: HashSet<StepId> = pending
        .patch
        .deleted_steps()
        .into_iter()
        .map(|id| id.resolve(mapping))
        .collect();
    let deleted_transitions: HashSet<TransitionId> = pending
        .patch
        .deleted_transitions()
        .into_iter()
        .map(|id| id.resolve(mapping))
        .collect();
    local.purge(&deleted_steps, &deleted_transitions);

    for step in &mut local.steps {
        if base.find_step(&step.id) != Some(&*step) {
            continue;
        }
        if let Some(persisted) = server.find_step(&step.id) {
            *step = persisted.clone();
        }
    }
    for transition in &mut local.transitions {
        if base.find_transition(&transition.id) != Some(&*transition) {
            continue;
        }
        if let Some(persisted) = server.find_transition(&transition.id) {
            *transition = persisted.clone();
        }
    }

    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    use crate::backend::InMemoryBackend;
    use crate::builder::GraphBuilder;
    use crate::types::{EntityId, RoleName, StepChanges, StepDraft, TransitionDraft};

    /// Backend that answers every save with the same response
    struct FixedResponse(SaveResponse);

    #[async_trait]
    impl WorkflowBackend for FixedResponse {
        async fn fetch_workflow_graph(
            &self,
            _workflow_id: WorkflowId,
        ) -> std::result::Result<WorkflowGraph, BackendError> {
            Ok(self.0.graph.clone())
        }

        async fn save_workflow_graph(
            &self,
            _workflow_id: WorkflowId,
            _patch: &GraphPatch,
        ) -> std::result::Result<SaveResponse, BackendError> {
            Ok(self.0.clone())
        }

        async fn fetch_roles(&self) -> std::result::Result<Vec<RoleName>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn temp(sequence: u64) -> EntityId {
        EntityId::Temporary(TempId::new(sequence))
    }

    /// t1 (start) -> t2 joined by t3
    fn scenario_model() -> GraphModel {
        let mut model = GraphModel::new();
        let a = model.add_step(StepDraft::named("Draft").start());
        let b = model.add_step(StepDraft::named("Review"));
        model.add_transition(TransitionDraft::new(a, b)).unwrap();
        model
    }

    #[test]
    fn test_second_prepare_fails_fast() {
        let reconciler = SyncReconciler::new();
        let model = GraphModel::new();

        let pending = reconciler.prepare(1, &model).unwrap();
        assert!(reconciler.is_in_flight(1));
        assert!(matches!(
            reconciler.prepare(1, &model),
            Err(EditorError::SaveInProgress(1))
        ));

        // Other workflows are independent
        assert!(reconciler.prepare(2, &model).is_ok());

        drop(pending);
        assert!(!reconciler.is_in_flight(1));
        assert!(reconciler.prepare(1, &model).is_ok());
    }

    #[test]
    fn test_clones_share_slots() {
        let reconciler = SyncReconciler::new();
        let other = reconciler.clone();
        let model = GraphModel::new();

        let _pending = reconciler.prepare(9, &model).unwrap();
        assert!(matches!(
            other.prepare(9, &model),
            Err(EditorError::SaveInProgress(9))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_replaces_temporary_ids() {
        let backend = InMemoryBackend::with_id_seeds(101, 501);
        let reconciler = SyncReconciler::new();
        let mut model = scenario_model();

        let pending = reconciler.prepare(1, &model).unwrap();
        let submitted = pending.submit(&backend).await;
        assert!(reconciler.is_in_flight(1));

        let outcome = reconciler.reconcile(&mut model, submitted).unwrap();

        assert!(!reconciler.is_in_flight(1));
        assert!(!outcome.merged_local_edits);
        assert_eq!(
            outcome.id_mapping,
            HashMap::from([(TempId::new(1), 101), (TempId::new(2), 102), (TempId::new(3), 501)])
        );

        let graph = model.graph();
        assert!(graph.temporary_ids().is_empty());
        let transition = graph.find_transition(&EntityId::Permanent(501)).unwrap();
        assert_eq!(transition.from_step_id, EntityId::Permanent(101));
        assert_eq!(transition.to_step_id, EntityId::Permanent(102));
        assert!(graph.transitions.iter().all(|t| {
            graph.find_step(&t.from_step_id).is_some() && graph.find_step(&t.to_step_id).is_some()
        }));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_model_untouched() {
        let backend = InMemoryBackend::new();
        backend.fail_next_save(BackendError::Transport("connection reset".to_string()));
        let reconciler = SyncReconciler::new();
        let mut model = scenario_model();
        let before = model.snapshot();

        let submitted = reconciler.prepare(1, &model).unwrap().submit(&backend).await;
        assert!(!submitted.is_success());
        let err = reconciler.reconcile(&mut model, submitted).unwrap_err();

        assert!(matches!(err, EditorError::Sync(BackendError::Transport(_))));
        assert_eq!(model.snapshot(), before);
        assert!(!reconciler.is_in_flight(1));
    }

    #[tokio::test]
    async fn test_missing_mapping_is_invalid_response() {
        let backend = FixedResponse(SaveResponse {
            graph: GraphBuilder::new().start_step(101, "Draft").build(),
            id_mapping: BTreeMap::from([("t1".to_string(), 101)]),
        });
        let reconciler = SyncReconciler::new();
        let mut model = scenario_model();
        let before = model.snapshot();

        let submitted = reconciler.prepare(1, &model).unwrap().submit(&backend).await;
        let err = reconciler.reconcile(&mut model, submitted).unwrap_err();

        assert!(matches!(err, EditorError::Sync(BackendError::InvalidResponse(_))));
        assert_eq!(model.snapshot(), before);
    }

    #[tokio::test]
    async fn test_malformed_mapping_key_is_invalid_response() {
        let backend = FixedResponse(SaveResponse {
            graph: WorkflowGraph::new(),
            id_mapping: BTreeMap::from([("step-1".to_string(), 101)]),
        });
        let reconciler = SyncReconciler::new();
        let mut model = GraphModel::new();

        let submitted = reconciler.prepare(1, &model).unwrap().submit(&backend).await;
        assert!(matches!(
            reconciler.reconcile(&mut model, submitted),
            Err(EditorError::Sync(BackendError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn test_edits_during_save_are_kept() {
        let backend = InMemoryBackend::with_id_seeds(101, 501);
        let reconciler = SyncReconciler::new();
        let mut model = scenario_model();
        let doomed = model.add_step(StepDraft::named("Scratch"));
        model.mark_step_deleted(&doomed).unwrap();

        let submitted = reconciler.prepare(1, &model).unwrap().submit(&backend).await;

        // Edits made while the request was in flight
        model
            .update_step(
                &temp(2),
                StepChanges {
                    name: Some("Final review".to_string()),
                    ..StepChanges::default()
                },
            )
            .unwrap();
        let late = model.add_step(StepDraft::named("Publish").end());
        model.add_transition(TransitionDraft::new(temp(2), late)).unwrap();

        let outcome = reconciler.reconcile(&mut model, submitted).unwrap();
        assert!(outcome.merged_local_edits);

        let graph = model.graph();
        assert!(graph.find_step(&doomed).is_none());
        assert_eq!(
            graph.find_step(&EntityId::Permanent(102)).unwrap().name,
            "Final review"
        );
        assert_eq!(graph.find_step(&EntityId::Permanent(101)).unwrap().name, "Draft");

        // Entities created during the save stay temporary until the next save
        assert!(graph.find_step(&late).is_some());
        let pending_transition = graph
            .transitions
            .iter()
            .find(|t| t.to_step_id == late)
            .unwrap();
        assert!(pending_transition.id.is_temporary());
        assert_eq!(pending_transition.from_step_id, EntityId::Permanent(102));

        assert_eq!(outcome.baseline.steps.len(), 2);
        assert!(outcome.baseline.temporary_ids().is_empty());
    }
}
