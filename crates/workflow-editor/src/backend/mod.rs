//! Backend workflow service interface
//!
//! The editor talks to the backend through [`WorkflowBackend`] only. The
//! save payload is authoritative: it carries every step and transition,
//! not a diff, each tagged with its (possibly temporary) id and its
//! deletion flag.

pub mod memory;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{
    RoleName, Step, StepId, TempId, Transition, TransitionId, WorkflowGraph, WorkflowId,
};

pub use memory::InMemoryBackend;

/// Errors reported by a backend implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Network failure, timeout or closed connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered but refused the request
    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend answered with something that is not a valid response
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

/// Whole-graph save payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphPatch {
    pub steps: Vec<Step>,
    pub transitions: Vec<Transition>,
}

impl GraphPatch {
    /// Build a patch carrying every entity in the graph, deleted ones included
    pub fn from_graph(graph: &WorkflowGraph) -> Self {
        Self {
            steps: graph.steps.clone(),
            transitions: graph.transitions.clone(),
        }
    }

    /// Temporary ids of entities the backend is expected to create
    pub fn pending_creations(&self) -> HashSet<TempId> {
        let steps = self
            .steps
            .iter()
            .filter(|s| s.is_live())
            .filter_map(|s| s.id.as_temporary());
        let transitions = self
            .transitions
            .iter()
            .filter(|t| t.is_live())
            .filter_map(|t| t.id.as_temporary());
        steps.chain(transitions).collect()
    }

    pub fn deleted_steps(&self) -> HashSet<StepId> {
        self.steps
            .iter()
            .filter(|s| s.marked_for_deletion)
            .map(|s| s.id)
            .collect()
    }

    pub fn deleted_transitions(&self) -> HashSet<TransitionId> {
        self.transitions
            .iter()
            .filter(|t| t.marked_for_deletion)
            .map(|t| t.id)
            .collect()
    }
}

/// Successful save response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    /// The graph as persisted; every id is permanent
    pub graph: WorkflowGraph,
    /// Temporary id (string form, e.g. `"t3"`) to assigned permanent id
    #[serde(default)]
    pub id_mapping: BTreeMap<String, u64>,
}

/// The backend workflow service
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// Fetch the persisted graph of a workflow
    async fn fetch_workflow_graph(&self, workflow_id: WorkflowId)
        -> Result<WorkflowGraph, BackendError>;

    /// Persist a whole-graph patch, returning the reconciled graph and id mapping
    async fn save_workflow_graph(
        &self,
        workflow_id: WorkflowId,
        patch: &GraphPatch,
    ) -> Result<SaveResponse, BackendError>;

    /// Fetch the set of roles steps may be assigned to
    async fn fetch_roles(&self) -> Result<Vec<RoleName>, BackendError>;
}
