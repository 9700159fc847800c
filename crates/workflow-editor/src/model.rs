//! The live, mutable workflow graph
//!
//! `GraphModel` is the only owner of the graph being edited. Every other
//! component reads it or goes through its mutation API. Deletion is always
//! soft: entities are flagged and stay visible as ghosts until the next
//! reconciled save drops them.

use std::collections::HashSet;

use crate::error::{EditorError, Result};
use crate::types::{
    EntityId, StepChanges, StepDraft, StepId, TempId, TransitionChanges, TransitionDraft,
    TransitionId, WorkflowGraph,
};

/// Outcome of loading a backend graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Transitions dropped because an endpoint step was not in the payload
    pub dropped_transitions: Vec<TransitionId>,
}

impl LoadReport {
    pub fn warnings(&self) -> Vec<String> {
        self.dropped_transitions
            .iter()
            .map(|id| format!("Transition '{}' references a missing step and was dropped", id))
            .collect()
    }
}

/// Owner of the in-memory workflow graph
#[derive(Debug, Default)]
pub struct GraphModel {
    graph: WorkflowGraph,
    /// Last temporary id sequence handed out; never reset within a session
    next_temp: u64,
    /// Bumped by every effective change to the graph
    revision: u64,
}

impl GraphModel {
    /// Create a model over an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the live graph
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the model with a graph fetched from the backend
    ///
    /// Every entity must carry a unique permanent id. Transitions whose
    /// endpoints are not in the payload are dropped and reported.
    pub fn load(&mut self, graph: WorkflowGraph) -> Result<LoadReport> {
        let mut step_ids = HashSet::new();
        for step in &graph.steps {
            if step.id.is_temporary() {
                return Err(EditorError::Load(format!(
                    "step '{}' has a temporary id",
                    step.id
                )));
            }
            if !step_ids.insert(step.id) {
                return Err(EditorError::Load(format!("duplicate step id '{}'", step.id)));
            }
        }

        let mut transition_ids = HashSet::new();
        for transition in &graph.transitions {
            if transition.id.is_temporary() {
                return Err(EditorError::Load(format!(
                    "transition '{}' has a temporary id",
                    transition.id
                )));
            }
            if !transition_ids.insert(transition.id) {
                return Err(EditorError::Load(format!(
                    "duplicate transition id '{}'",
                    transition.id
                )));
            }
        }

        let mut report = LoadReport::default();
        let WorkflowGraph { mut steps, transitions } = graph;
        for step in &mut steps {
            step.marked_for_deletion = false;
        }

        let transitions = transitions
            .into_iter()
            .filter_map(|mut transition| {
                if step_ids.contains(&transition.from_step_id)
                    && step_ids.contains(&transition.to_step_id)
                {
                    transition.marked_for_deletion = false;
                    Some(transition)
                } else {
                    log::warn!(
                        "Dropping transition '{}' ({} -> {}): endpoint step not found",
                        transition.id,
                        transition.from_step_id,
                        transition.to_step_id
                    );
                    report.dropped_transitions.push(transition.id);
                    None
                }
            })
            .collect();

        self.graph = WorkflowGraph { steps, transitions };
        self.bump();
        log::info!(
            "Loaded workflow graph with {} steps and {} transitions",
            self.graph.steps.len(),
            self.graph.transitions.len()
        );
        Ok(report)
    }

    /// Add a step under a fresh temporary id
    pub fn add_step(&mut self, draft: StepDraft) -> StepId {
        let id = self.allocate_temp_id();
        self.graph.steps.push(draft.into_step(id));
        self.bump();
        log::debug!("Added step '{}'", id);
        id
    }

    /// Merge field changes into an existing step
    pub fn update_step(&mut self, id: &StepId, changes: StepChanges) -> Result<()> {
        let step = self
            .graph
            .find_step_mut(id)
            .ok_or(EditorError::step_not_found(*id))?;

        let before = step.clone();
        changes.apply_to(step);
        if *step != before {
            self.bump();
        }
        Ok(())
    }

    /// Soft-delete a step and every transition touching it
    ///
    /// Idempotent: deleting an already deleted step changes nothing.
    pub fn mark_step_deleted(&mut self, id: &StepId) -> Result<()> {
        let step = self
            .graph
            .find_step_mut(id)
            .ok_or(EditorError::step_not_found(*id))?;

        let mut changed = !step.marked_for_deletion;
        step.marked_for_deletion = true;

        for transition in self.graph.transitions.iter_mut() {
            if transition.touches(id) && !transition.marked_for_deletion {
                transition.marked_for_deletion = true;
                changed = true;
            }
        }

        if changed {
            self.bump();
            log::debug!("Marked step '{}' and its transitions for deletion", id);
        }
        Ok(())
    }

    /// Clear the deletion flag on a step
    ///
    /// Transitions deleted by the cascade stay deleted.
    pub fn restore_step(&mut self, id: &StepId) -> Result<()> {
        let step = self
            .graph
            .find_step_mut(id)
            .ok_or(EditorError::step_not_found(*id))?;

        if step.marked_for_deletion {
            step.marked_for_deletion = false;
            self.bump();
        }
        Ok(())
    }

    /// Add a transition under a fresh temporary id
    ///
    /// Both endpoints must exist and be live.
    pub fn add_transition(&mut self, draft: TransitionDraft) -> Result<TransitionId> {
        self.ensure_live_endpoint(&draft.from_step_id)?;
        self.ensure_live_endpoint(&draft.to_step_id)?;

        let id = self.allocate_temp_id();
        let transition = draft.into_transition(id);
        log::debug!(
            "Added transition '{}' ({} -> {})",
            id,
            transition.from_step_id,
            transition.to_step_id
        );
        self.graph.transitions.push(transition);
        self.bump();
        Ok(id)
    }

    /// Merge field changes into an existing transition
    ///
    /// Re-pointed endpoints must be live steps.
    pub fn update_transition(
        &mut self,
        id: &TransitionId,
        changes: TransitionChanges,
    ) -> Result<()> {
        if self.graph.find_transition(id).is_none() {
            return Err(EditorError::transition_not_found(*id));
        }
        if let Some(from) = &changes.from_step_id {
            self.ensure_live_endpoint(from)?;
        }
        if let Some(to) = &changes.to_step_id {
            self.ensure_live_endpoint(to)?;
        }

        let transition = self
            .graph
            .find_transition_mut(id)
            .ok_or(EditorError::transition_not_found(*id))?;
        let before = transition.clone();
        changes.apply_to(transition);
        if *transition != before {
            self.bump();
        }
        Ok(())
    }

    /// Soft-delete a transition. Idempotent.
    pub fn mark_transition_deleted(&mut self, id: &TransitionId) -> Result<()> {
        let transition = self
            .graph
            .find_transition_mut(id)
            .ok_or(EditorError::transition_not_found(*id))?;

        if !transition.marked_for_deletion {
            transition.marked_for_deletion = true;
            self.bump();
            log::debug!("Marked transition '{}' for deletion", id);
        }
        Ok(())
    }

    /// Clear the deletion flag on a transition whose endpoints are both live
    pub fn restore_transition(&mut self, id: &TransitionId) -> Result<()> {
        let transition = self
            .graph
            .find_transition(id)
            .ok_or(EditorError::transition_not_found(*id))?;
        if !transition.marked_for_deletion {
            return Ok(());
        }

        let (from, to) = (transition.from_step_id, transition.to_step_id);
        self.ensure_live_endpoint(&from)?;
        self.ensure_live_endpoint(&to)?;

        if let Some(transition) = self.graph.find_transition_mut(id) {
            transition.marked_for_deletion = false;
        }
        self.bump();
        Ok(())
    }

    /// Deep copy of the current graph
    pub fn snapshot(&self) -> WorkflowGraph {
        self.graph.clone()
    }

    /// Replace the live graph with an earlier snapshot
    ///
    /// The temporary id counter is left alone so ids are never reused.
    pub fn restore(&mut self, snapshot: WorkflowGraph) {
        self.graph = snapshot;
        self.bump();
    }

    fn ensure_live_endpoint(&self, step_id: &StepId) -> Result<()> {
        if self.graph.is_live_step(step_id) {
            Ok(())
        } else {
            Err(EditorError::DanglingEndpoint { step_id: *step_id })
        }
    }

    fn allocate_temp_id(&mut self) -> EntityId {
        self.next_temp += 1;
        EntityId::Temporary(TempId::new(self.next_temp))
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}
