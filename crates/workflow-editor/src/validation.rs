//! Pre-save validation for workflow graphs
//!
//! Validation is a pure function of the graph and the known role set.
//! Soft-deleted entities are ignored. Issues come in two tiers:
//! errors block the save outright, warnings need explicit confirmation.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::types::{RoleName, StepId, TransitionId, WorkflowGraph};

/// How severe a validation issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Save refused
    Error,
    /// Save allowed after confirmation
    Warning,
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationIssue {
    /// More than one live step is flagged as start
    #[serde(rename_all = "camelCase")]
    MultipleStartSteps { step_ids: Vec<StepId> },
    /// A live transition points at a missing or deleted step
    #[serde(rename_all = "camelCase")]
    DanglingTransition {
        transition_id: TransitionId,
        step_id: StepId,
    },
    /// A step's role is not in the current role set
    #[serde(rename_all = "camelCase")]
    UnknownRole { step_id: StepId, role: RoleName },
    /// The graph has steps but none is flagged as start
    MissingStartStep,
    /// The graph has steps but none is flagged as end
    MissingEndStep,
    /// A step cannot be reached from the start step
    #[serde(rename_all = "camelCase")]
    UnreachableStep { step_id: StepId },
    /// A step has no role assigned
    #[serde(rename_all = "camelCase")]
    UnassignedRole { step_id: StepId },
}

impl ValidationIssue {
    pub fn severity(&self) -> Severity {
        match self {
            Self::MultipleStartSteps { .. }
            | Self::DanglingTransition { .. }
            | Self::UnknownRole { .. } => Severity::Error,
            Self::MissingStartStep
            | Self::MissingEndStep
            | Self::UnreachableStep { .. }
            | Self::UnassignedRole { .. } => Severity::Warning,
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultipleStartSteps { step_ids } => {
                let ids: Vec<String> = step_ids.iter().map(ToString::to_string).collect();
                write!(f, "Multiple start steps: {}", ids.join(", "))
            }
            Self::DanglingTransition {
                transition_id,
                step_id,
            } => write!(
                f,
                "Transition '{}' references missing or deleted step '{}'",
                transition_id, step_id
            ),
            Self::UnknownRole { step_id, role } => {
                write!(f, "Step '{}' has unknown role '{}'", step_id, role)
            }
            Self::MissingStartStep => write!(f, "Workflow has no start step"),
            Self::MissingEndStep => write!(f, "Workflow has no end step"),
            Self::UnreachableStep { step_id } => {
                write!(f, "Step '{}' is not reachable from the start step", step_id)
            }
            Self::UnassignedRole { step_id } => {
                write!(f, "Step '{}' has no role assigned", step_id)
            }
        }
    }
}

/// Result of validating a graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = issues
            .into_iter()
            .partition(|issue| issue.severity() == Severity::Error);
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Valid and without warnings
    pub fn is_clean(&self) -> bool {
        self.is_valid && self.warnings.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

/// Validate a workflow graph against the known role set
///
/// Returns every issue found, not just the first.
pub fn validate_graph(graph: &WorkflowGraph, known_roles: &[RoleName]) -> ValidationReport {
    let mut issues = Vec::new();

    validate_start_steps(graph, &mut issues);
    validate_transition_endpoints(graph, &mut issues);
    validate_roles(graph, known_roles, &mut issues);
    validate_end_steps(graph, &mut issues);
    detect_unreachable_steps(graph, &mut issues);

    ValidationReport::from_issues(issues)
}

/// Exactly one live start step, reported once however many extra there are
fn validate_start_steps(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    let starts: Vec<StepId> = graph
        .live_steps()
        .filter(|s| s.is_start)
        .map(|s| s.id)
        .collect();

    if starts.len() > 1 {
        issues.push(ValidationIssue::MultipleStartSteps { step_ids: starts });
    } else if starts.is_empty() && graph.live_steps().next().is_some() {
        issues.push(ValidationIssue::MissingStartStep);
    }
}

/// Live transitions must point at live steps
fn validate_transition_endpoints(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    for transition in graph.live_transitions() {
        for endpoint in [transition.from_step_id, transition.to_step_id] {
            if !graph.is_live_step(&endpoint) {
                issues.push(ValidationIssue::DanglingTransition {
                    transition_id: transition.id,
                    step_id: endpoint,
                });
            }
        }
    }
}

/// Assigned roles must be known; unassigned roles only warn
fn validate_roles(
    graph: &WorkflowGraph,
    known_roles: &[RoleName],
    issues: &mut Vec<ValidationIssue>,
) {
    let known: HashSet<&str> = known_roles.iter().map(String::as_str).collect();

    for step in graph.live_steps() {
        match step.role.as_deref() {
            Some(role) if !role.is_empty() => {
                if !known.contains(role) {
                    issues.push(ValidationIssue::UnknownRole {
                        step_id: step.id,
                        role: role.to_string(),
                    });
                }
            }
            _ => issues.push(ValidationIssue::UnassignedRole { step_id: step.id }),
        }
    }
}

fn validate_end_steps(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    let mut live = graph.live_steps().peekable();
    if live.peek().is_some() && !live.any(|s| s.is_end) {
        issues.push(ValidationIssue::MissingEndStep);
    }
}

/// Breadth-first reachability from the start step(s) over live transitions
fn detect_unreachable_steps(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    let mut reached: HashSet<StepId> = HashSet::new();
    let mut queue: VecDeque<StepId> = VecDeque::new();
    for start in graph.live_steps().filter(|s| s.is_start) {
        reached.insert(start.id);
        queue.push_back(start.id);
    }
    if queue.is_empty() {
        return;
    }

    while let Some(step_id) = queue.pop_front() {
        for transition in graph.outgoing(&step_id) {
            let next = transition.to_step_id;
            if graph.is_live_step(&next) && reached.insert(next) {
                queue.push_back(next);
            }
        }
    }

    for step in graph.live_steps() {
        if !reached.contains(&step.id) {
            issues.push(ValidationIssue::UnreachableStep { step_id: step.id });
        }
    }
}
