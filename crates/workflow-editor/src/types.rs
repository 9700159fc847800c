//! Core types for workflow graphs
//!
//! A workflow is a directed graph of steps (nodes) joined by transitions
//! (edges). Every entity carries an [`EntityId`] that is either temporary
//! (created in the editor, never seen by the backend) or permanent
//! (assigned by the backend on save).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Backend identifier of a workflow
pub type WorkflowId = u64;

/// Name of a role a step can be assigned to
pub type RoleName = String;

/// Unique identifier for a step
pub type StepId = EntityId;

/// Unique identifier for a transition
pub type TransitionId = EntityId;

/// Client-generated identifier for an entity that has not been saved yet
///
/// Rendered as `t<sequence>` (e.g. `t3`) on the wire and in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TempId(u64);

impl TempId {
    /// Prefix that marks a temporary id in its string form
    pub const PREFIX: char = 't';

    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

/// Error parsing a temporary id from a string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid temporary id '{0}'")]
pub struct InvalidTempId(pub String);

impl FromStr for TempId {
    type Err = InvalidTempId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(Self::PREFIX)
            .and_then(|digits| digits.parse::<u64>().ok())
            .map(TempId)
            .ok_or_else(|| InvalidTempId(s.to_string()))
    }
}

impl TryFrom<String> for TempId {
    type Error = InvalidTempId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TempId> for String {
    fn from(id: TempId) -> Self {
        id.to_string()
    }
}

/// Identifier of a step or transition
///
/// Permanent ids serialize as JSON numbers, temporary ids as strings.
/// Permanent ids sort before temporary ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Assigned by the backend; never changes once issued
    Permanent(u64),
    /// Assigned by the editor; replaced on the next successful save
    Temporary(TempId),
}

impl EntityId {
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    pub fn as_temporary(&self) -> Option<TempId> {
        match self {
            Self::Temporary(id) => Some(*id),
            Self::Permanent(_) => None,
        }
    }

    pub fn as_permanent(&self) -> Option<u64> {
        match self {
            Self::Permanent(id) => Some(*id),
            Self::Temporary(_) => None,
        }
    }

    /// Resolve a temporary id through a save mapping
    ///
    /// Permanent ids and unmapped temporary ids are returned unchanged.
    pub fn resolve(self, mapping: &HashMap<TempId, u64>) -> Self {
        match self {
            Self::Temporary(temp) => mapping
                .get(&temp)
                .map(|&id| Self::Permanent(id))
                .unwrap_or(self),
            Self::Permanent(_) => self,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent(id) => write!(f, "{}", id),
            Self::Temporary(id) => write!(f, "{}", id),
        }
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self::Permanent(id)
    }
}

impl From<TempId> for EntityId {
    fn from(id: TempId) -> Self {
        Self::Temporary(id)
    }
}

/// Kind of graph entity, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Step,
    Transition,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step => write!(f, "step"),
            Self::Transition => write!(f, "transition"),
        }
    }
}

/// Canvas coordinates of a step
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Side of a step box a transition attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSide {
    Top,
    Right,
    Bottom,
    Left,
}

fn default_source_anchor() -> AnchorSide {
    AnchorSide::Right
}

fn default_target_anchor() -> AnchorSide {
    AnchorSide::Left
}

/// Source and target anchor pair of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchors {
    #[serde(default = "default_source_anchor")]
    pub source: AnchorSide,
    #[serde(default = "default_target_anchor")]
    pub target: AnchorSide,
}

impl Default for Anchors {
    fn default() -> Self {
        Self {
            source: default_source_anchor(),
            target: default_target_anchor(),
        }
    }
}

/// A step (node) in a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,
    pub name: String,
    /// Role responsible for this step, if one has been assigned
    #[serde(default)]
    pub role: Option<RoleName>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub is_start: bool,
    #[serde(default)]
    pub is_end: bool,
    /// Canvas position; `None` until placed by the user or the layout engine
    #[serde(default)]
    pub position: Option<Position>,
    /// Soft-deletion flag; the step stays in the graph until the next save
    #[serde(default)]
    pub marked_for_deletion: bool,
}

impl Step {
    /// Whether the step is part of the effective graph (not soft-deleted)
    pub fn is_live(&self) -> bool {
        !self.marked_for_deletion
    }
}

/// A directed transition (edge) between two steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub id: TransitionId,
    pub from_step_id: StepId,
    pub to_step_id: StepId,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_source_anchor")]
    pub source_anchor: AnchorSide,
    #[serde(default = "default_target_anchor")]
    pub target_anchor: AnchorSide,
    #[serde(default)]
    pub marked_for_deletion: bool,
}

impl Transition {
    pub fn is_live(&self) -> bool {
        !self.marked_for_deletion
    }

    /// Whether either endpoint is the given step
    pub fn touches(&self, step_id: &StepId) -> bool {
        self.from_step_id == *step_id || self.to_step_id == *step_id
    }
}

/// A complete workflow graph
///
/// Steps and transitions are kept in insertion order; layout and patch
/// building depend on that order being stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.transitions.is_empty()
    }

    /// Find a step by ID
    pub fn find_step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == *id)
    }

    /// Find a step by ID (mutable)
    pub fn find_step_mut(&mut self, id: &StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == *id)
    }

    /// Find a transition by ID
    pub fn find_transition(&self, id: &TransitionId) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == *id)
    }

    /// Find a transition by ID (mutable)
    pub fn find_transition_mut(&mut self, id: &TransitionId) -> Option<&mut Transition> {
        self.transitions.iter_mut().find(|t| t.id == *id)
    }

    /// Steps that are not soft-deleted
    pub fn live_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_live())
    }

    /// Transitions that are not soft-deleted
    pub fn live_transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(|t| t.is_live())
    }

    /// Whether the step exists and is not soft-deleted
    pub fn is_live_step(&self, id: &StepId) -> bool {
        self.find_step(id).is_some_and(Step::is_live)
    }

    /// Live transitions leaving a step
    pub fn outgoing<'a>(
        &'a self,
        step_id: &'a StepId,
    ) -> impl Iterator<Item = &'a Transition> + 'a {
        self.live_transitions().filter(move |t| t.from_step_id == *step_id)
    }

    /// Live transitions entering a step
    pub fn incoming<'a>(
        &'a self,
        step_id: &'a StepId,
    ) -> impl Iterator<Item = &'a Transition> + 'a {
        self.live_transitions().filter(move |t| t.to_step_id == *step_id)
    }

    /// Every id in the graph that is still temporary, including transition endpoints
    pub fn temporary_ids(&self) -> HashSet<TempId> {
        let step_ids = self.steps.iter().map(|s| s.id);
        let transition_ids = self
            .transitions
            .iter()
            .flat_map(|t| [t.id, t.from_step_id, t.to_step_id]);
        step_ids
            .chain(transition_ids)
            .filter_map(|id| id.as_temporary())
            .collect()
    }

    /// Rewrite temporary ids (entities and transition endpoints) through a save mapping
    ///
    /// Returns the number of ids rewritten.
    pub fn rename_ids(&mut self, mapping: &HashMap<TempId, u64>) -> usize {
        let mut renamed = 0;
        let mut rename = |id: &mut EntityId| {
            let resolved = id.resolve(mapping);
            if resolved != *id {
                *id = resolved;
                renamed += 1;
            }
        };

        for step in &mut self.steps {
            rename(&mut step.id);
        }
        for transition in &mut self.transitions {
            rename(&mut transition.id);
            rename(&mut transition.from_step_id);
            rename(&mut transition.to_step_id);
        }
        renamed
    }

    /// Physically remove the given steps and transitions
    ///
    /// Transitions touching a removed step are removed with it.
    pub fn purge(&mut self, steps: &HashSet<StepId>, transitions: &HashSet<TransitionId>) {
        self.steps.retain(|s| !steps.contains(&s.id));
        self.transitions.retain(|t| {
            !transitions.contains(&t.id)
                && !steps.contains(&t.from_step_id)
                && !steps.contains(&t.to_step_id)
        });
    }
}

/// Caller-supplied fields for a new step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepDraft {
    pub name: String,
    pub role: Option<RoleName>,
    pub description: String,
    pub instruction: String,
    pub is_start: bool,
    pub is_end: bool,
    pub position: Option<Position>,
}

impl StepDraft {
    /// Create a draft with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Mark the draft as the start step
    pub fn start(mut self) -> Self {
        self.is_start = true;
        self
    }

    /// Mark the draft as an end step
    pub fn end(mut self) -> Self {
        self.is_end = true;
        self
    }

    pub fn with_role(mut self, role: impl Into<RoleName>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    pub(crate) fn into_step(self, id: StepId) -> Step {
        Step {
            id,
            name: self.name,
            role: self.role,
            description: self.description,
            instruction: self.instruction,
            is_start: self.is_start,
            is_end: self.is_end,
            position: self.position,
            marked_for_deletion: false,
        }
    }
}

/// Caller-supplied fields for a new transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDraft {
    pub from_step_id: StepId,
    pub to_step_id: StepId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub anchors: Anchors,
}

impl TransitionDraft {
    pub fn new(from: impl Into<StepId>, to: impl Into<StepId>) -> Self {
        Self {
            from_step_id: from.into(),
            to_step_id: to.into(),
            label: String::new(),
            anchors: Anchors::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_anchors(mut self, anchors: Anchors) -> Self {
        self.anchors = anchors;
        self
    }

    pub(crate) fn into_transition(self, id: TransitionId) -> Transition {
        Transition {
            id,
            from_step_id: self.from_step_id,
            to_step_id: self.to_step_id,
            label: self.label,
            source_anchor: self.anchors.source,
            target_anchor: self.anchors.target,
            marked_for_deletion: false,
        }
    }
}

/// Field changes merged into an existing step; `None` leaves a field alone
///
/// `role` and `position` can also be cleared: `Some(None)` on the Rust side,
/// an explicit `null` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepChanges {
    pub name: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_clearable"
    )]
    pub role: Option<Option<RoleName>>,
    pub description: Option<String>,
    pub instruction: Option<String>,
    pub is_start: Option<bool>,
    pub is_end: Option<bool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_clearable"
    )]
    pub position: Option<Option<Position>>,
}

/// Present-but-null becomes `Some(None)`; an absent field stays `None` via `default`
fn deserialize_clearable<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl StepChanges {
    /// Change set that only moves the step
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(Some(position)),
            ..Self::default()
        }
    }

    /// Change set that assigns or unassigns the role
    pub fn role(role: Option<RoleName>) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    pub(crate) fn apply_to(self, step: &mut Step) {
        if let Some(name) = self.name {
            step.name = name;
        }
        if let Some(role) = self.role {
            step.role = role;
        }
        if let Some(description) = self.description {
            step.description = description;
        }
        if let Some(instruction) = self.instruction {
            step.instruction = instruction;
        }
        if let Some(is_start) = self.is_start {
            step.is_start = is_start;
        }
        if let Some(is_end) = self.is_end {
            step.is_end = is_end;
        }
        if let Some(position) = self.position {
            step.position = position;
        }
    }
}

/// Field changes merged into an existing transition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransitionChanges {
    pub from_step_id: Option<StepId>,
    pub to_step_id: Option<StepId>,
    pub label: Option<String>,
    pub source_anchor: Option<AnchorSide>,
    pub target_anchor: Option<AnchorSide>,
}

impl TransitionChanges {
    pub(crate) fn apply_to(self, transition: &mut Transition) {
        if let Some(from) = self.from_step_id {
            transition.from_step_id = from;
        }
        if let Some(to) = self.to_step_id {
            transition.to_step_id = to;
        }
        if let Some(label) = self.label {
            transition.label = label;
        }
        if let Some(side) = self.source_anchor {
            transition.source_anchor = side;
        }
        if let Some(side) = self.target_anchor {
            transition.target_anchor = side;
        }
    }
}
