//! Render-ready view of the graph
//!
//! The renderer only ever sees this projection. Soft-deleted entities are
//! included and flagged as ghosts; steps without a stored position get the
//! position the layout engine would give them.

use std::collections::HashMap;

use serde::Serialize;

use crate::gesture::Selection;
use crate::layout::LayoutEngine;
use crate::types::{AnchorSide, Position, RoleName, StepId, TransitionId, WorkflowGraph};

/// Fields the renderer shows on a step box
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayFields {
    pub name: String,
    pub role: Option<RoleName>,
    pub is_start: bool,
    pub is_end: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedNode {
    pub id: StepId,
    pub position: Position,
    pub display: DisplayFields,
    /// Soft-deleted; drawn faded until the next save
    pub ghost: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedEdge {
    pub id: TransitionId,
    pub from: StepId,
    pub to: StepId,
    pub label: String,
    pub source_anchor: AnchorSide,
    pub target_anchor: AnchorSide,
    pub ghost: bool,
    pub selected: bool,
}

/// Everything the renderer needs to draw the canvas
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderProjection {
    pub nodes: Vec<ProjectedNode>,
    pub edges: Vec<ProjectedEdge>,
}

impl RenderProjection {
    pub fn node(&self, id: &StepId) -> Option<&ProjectedNode> {
        self.nodes.iter().find(|n| n.id == *id)
    }

    pub fn edge(&self, id: &TransitionId) -> Option<&ProjectedEdge> {
        self.edges.iter().find(|e| e.id == *id)
    }
}

/// Project a graph for rendering
pub fn project(
    graph: &WorkflowGraph,
    layout: &LayoutEngine,
    selection: Option<&Selection>,
) -> RenderProjection {
    let filled: HashMap<StepId, Position> = layout.fill_missing(graph).into_iter().collect();

    let nodes = graph
        .steps
        .iter()
        .map(|step| ProjectedNode {
            id: step.id,
            position: step
                .position
                .or_else(|| filled.get(&step.id).copied())
                .unwrap_or_default(),
            display: DisplayFields {
                name: step.name.clone(),
                role: step.role.clone(),
                is_start: step.is_start,
                is_end: step.is_end,
            },
            ghost: step.marked_for_deletion,
            selected: selection == Some(&Selection::Step(step.id)),
        })
        .collect();

    let edges = graph
        .transitions
        .iter()
        .map(|transition| ProjectedEdge {
            id: transition.id,
            from: transition.from_step_id,
            to: transition.to_step_id,
            label: transition.label.clone(),
            source_anchor: transition.source_anchor,
            target_anchor: transition.target_anchor,
            ghost: transition.marked_for_deletion,
            selected: selection == Some(&Selection::Transition(transition.id)),
        })
        .collect();

    RenderProjection { nodes, edges }
}
