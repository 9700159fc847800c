//! Fluent builder for workflow graphs
//!
//! Builds graphs with permanent ids, the shape the backend returns. Mostly
//! used by tests and the in-memory backend fixtures.

use crate::types::{
    AnchorSide, EntityId, Position, RoleName, Step, Transition, WorkflowGraph,
};

/// Fluent builder for constructing backend-shaped workflow graphs
///
/// # Example
///
/// ```
/// use workflow_editor::GraphBuilder;
///
/// let graph = GraphBuilder::new()
///     .start_step(1, "Draft")
///     .with_role("author")
///     .end_step(2, "Publish")
///     .transition(10, 1, 2)
///     .with_label("approve")
///     .build();
/// assert_eq!(graph.steps.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    steps: Vec<Step>,
    transitions: Vec<Transition>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain step
    pub fn step(mut self, id: u64, name: impl Into<String>) -> Self {
        self.steps.push(Step {
            id: EntityId::Permanent(id),
            name: name.into(),
            role: None,
            description: String::new(),
            instruction: String::new(),
            is_start: false,
            is_end: false,
            position: None,
            marked_for_deletion: false,
        });
        self
    }

    /// Add a step flagged as the start step
    pub fn start_step(self, id: u64, name: impl Into<String>) -> Self {
        let mut builder = self.step(id, name);
        if let Some(step) = builder.steps.last_mut() {
            step.is_start = true;
        }
        builder
    }

    /// Add a step flagged as an end step
    pub fn end_step(self, id: u64, name: impl Into<String>) -> Self {
        let mut builder = self.step(id, name);
        if let Some(step) = builder.steps.last_mut() {
            step.is_end = true;
        }
        builder
    }

    /// Set the role on the most recently added step
    pub fn with_role(mut self, role: impl Into<RoleName>) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.role = Some(role.into());
        }
        self
    }

    /// Set the position of the most recently added step
    pub fn at(mut self, x: f64, y: f64) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.position = Some(Position::new(x, y));
        }
        self
    }

    /// Add a transition between two steps
    pub fn transition(mut self, id: u64, from: u64, to: u64) -> Self {
        self.transitions.push(Transition {
            id: EntityId::Permanent(id),
            from_step_id: EntityId::Permanent(from),
            to_step_id: EntityId::Permanent(to),
            label: String::new(),
            source_anchor: AnchorSide::Right,
            target_anchor: AnchorSide::Left,
            marked_for_deletion: false,
        });
        self
    }

    /// Set the label of the most recently added transition
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(transition) = self.transitions.last_mut() {
            transition.label = label.into();
        }
        self
    }

    pub fn build(self) -> WorkflowGraph {
        WorkflowGraph {
            steps: self.steps,
            transitions: self.transitions,
        }
    }
}
