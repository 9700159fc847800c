//! In-memory workflow backend
//!
//! Behaves like the real service for the parts the editor depends on:
//! deleted entities are dropped, temporary ids get sequential permanent ids,
//! and the response carries the id mapping. Failures can be injected for
//! the next save. Used by tests, demos and offline editing.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BackendError, GraphPatch, SaveResponse, WorkflowBackend};
use crate::types::{EntityId, RoleName, WorkflowGraph, WorkflowId};

#[derive(Debug)]
struct MemoryState {
    graphs: HashMap<WorkflowId, WorkflowGraph>,
    roles: Vec<RoleName>,
    next_step_id: u64,
    next_transition_id: u64,
    fail_next_save: Option<BackendError>,
    fail_next_roles: Option<BackendError>,
    saves: Vec<(WorkflowId, GraphPatch)>,
}

/// Workflow backend that keeps graphs in memory
#[derive(Debug)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl InMemoryBackend {
    /// Create an empty backend; new steps get ids from 1, transitions from 1
    pub fn new() -> Self {
        Self::with_id_seeds(1, 1)
    }

    /// Create a backend whose next assigned step/transition ids start at the given values
    pub fn with_id_seeds(next_step_id: u64, next_transition_id: u64) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                graphs: HashMap::new(),
                roles: Vec::new(),
                next_step_id,
                next_transition_id,
                fail_next_save: None,
                fail_next_roles: None,
                saves: Vec::new(),
            }),
        }
    }

    /// Seed a persisted graph
    pub fn with_graph(self, workflow_id: WorkflowId, graph: WorkflowGraph) -> Self {
        self.state.lock().graphs.insert(workflow_id, graph);
        self
    }

    pub fn with_roles<I, R>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleName>,
    {
        self.set_roles(roles);
        self
    }

    pub fn set_roles<I, R>(&self, roles: I)
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleName>,
    {
        self.state.lock().roles = roles.into_iter().map(Into::into).collect();
    }

    /// Make the next save fail with the given error
    pub fn fail_next_save(&self, error: BackendError) {
        self.state.lock().fail_next_save = Some(error);
    }

    /// Make the next role fetch fail with the given error
    pub fn fail_next_roles_fetch(&self, error: BackendError) {
        self.state.lock().fail_next_roles = Some(error);
    }

    /// The persisted graph of a workflow, if any
    pub fn stored_graph(&self, workflow_id: WorkflowId) -> Option<WorkflowGraph> {
        self.state.lock().graphs.get(&workflow_id).cloned()
    }

    /// Every patch received so far, in order
    pub fn received_patches(&self) -> Vec<(WorkflowId, GraphPatch)> {
        self.state.lock().saves.clone()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    fn apply_patch(&mut self, patch: &GraphPatch) -> Result<SaveResponse, BackendError> {
        let mut mapping: HashMap<EntityId, u64> = HashMap::new();
        let mut graph = WorkflowGraph::new();

        for step in patch.steps.iter().filter(|s| s.is_live()) {
            let id = match step.id {
                EntityId::Permanent(id) => id,
                EntityId::Temporary(_) => {
                    let id = self.next_step_id;
                    self.next_step_id += 1;
                    mapping.insert(step.id, id);
                    id
                }
            };
            let mut stored = step.clone();
            stored.id = EntityId::Permanent(id);
            graph.steps.push(stored);
        }

        for transition in patch.transitions.iter().filter(|t| t.is_live()) {
            let mut stored = transition.clone();
            for endpoint in [&mut stored.from_step_id, &mut stored.to_step_id] {
                if let Some(&id) = mapping.get(endpoint) {
                    *endpoint = EntityId::Permanent(id);
                }
                if graph.find_step(endpoint).is_none() {
                    return Err(BackendError::Rejected {
                        status: 422,
                        message: format!(
                            "transition '{}' references unknown step '{}'",
                            transition.id, endpoint
                        ),
                    });
                }
            }

            let id = match transition.id {
                EntityId::Permanent(id) => id,
                EntityId::Temporary(_) => {
                    let id = self.next_transition_id;
                    self.next_transition_id += 1;
                    mapping.insert(transition.id, id);
                    id
                }
            };
            stored.id = EntityId::Permanent(id);
            graph.transitions.push(stored);
        }

        let id_mapping: BTreeMap<String, u64> = mapping
            .into_iter()
            .map(|(temp, id)| (temp.to_string(), id))
            .collect();
        Ok(SaveResponse { graph, id_mapping })
    }
}

#[async_trait]
impl WorkflowBackend for InMemoryBackend {
    async fn fetch_workflow_graph(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<WorkflowGraph, BackendError> {
        self.state
            .lock()
            .graphs
            .get(&workflow_id)
            .cloned()
            .ok_or_else(|| BackendError::Rejected {
                status: 404,
                message: format!("workflow {} not found", workflow_id),
            })
    }

    async fn save_workflow_graph(
        &self,
        workflow_id: WorkflowId,
        patch: &GraphPatch,
    ) -> Result<SaveResponse, BackendError> {
        let mut state = self.state.lock();
        state.saves.push((workflow_id, patch.clone()));

        if let Some(error) = state.fail_next_save.take() {
            return Err(error);
        }

        let response = state.apply_patch(patch)?;
        state.graphs.insert(workflow_id, response.graph.clone());
        log::debug!(
            "Stored workflow {} with {} new ids",
            workflow_id,
            response.id_mapping.len()
        );
        Ok(response)
    }

    async fn fetch_roles(&self) -> Result<Vec<RoleName>, BackendError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_roles.take() {
            return Err(error);
        }
        Ok(state.roles.clone())
    }
}
