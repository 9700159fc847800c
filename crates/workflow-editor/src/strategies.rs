//! Random graphs and gesture sequences for property tests

use proptest::prelude::*;

use crate::builder::GraphBuilder;
use crate::error::Result;
use crate::session::EditorSession;
use crate::types::{
    Anchors, EntityId, Position, StepChanges, StepDraft, TransitionId, WorkflowGraph,
};

/// Backend-shaped graph: steps `1..=n`, transitions from `100` up
///
/// Step 1 is the start step. Transitions join arbitrary steps, so cycles,
/// self loops and parallel edges all show up.
pub(crate) fn graph_strategy() -> impl Strategy<Value = WorkflowGraph> {
    (1usize..10)
        .prop_flat_map(|steps| {
            (
                prop::collection::vec(
                    (any::<bool>(), prop::option::of((0i16..1000, 0i16..1000))),
                    steps,
                ),
                prop::collection::vec((0..steps, 0..steps), 0..steps * 2),
            )
        })
        .prop_map(|(steps, edges)| {
            let mut builder = GraphBuilder::new();
            for (index, (is_end, position)) in steps.into_iter().enumerate() {
                let id = index as u64 + 1;
                let name = format!("Step {}", id);
                builder = match (index, is_end) {
                    (0, _) => builder.start_step(id, name),
                    (_, true) => builder.end_step(id, name),
                    _ => builder.step(id, name),
                };
                if let Some((x, y)) = position {
                    builder = builder.at(f64::from(x), f64::from(y));
                }
            }
            for (index, (from, to)) in edges.into_iter().enumerate() {
                builder = builder.transition(100 + index as u64, from as u64 + 1, to as u64 + 1);
            }
            builder.build()
        })
}

/// One recorded canvas gesture
///
/// Steps and transitions are picked by index modulo the current count, so
/// every generated sequence applies to whatever graph it finds.
#[derive(Debug, Clone)]
pub(crate) enum EditOp {
    Add { placed: Option<(i16, i16)> },
    Connect { from: usize, to: usize },
    DeleteStep(usize),
    DeleteTransition(usize),
    Move { step: usize, to: (i16, i16) },
    Drag { step: usize, path: Vec<(i16, i16)> },
    Rename { step: usize, name: String },
}

fn point() -> impl Strategy<Value = (i16, i16)> + Clone {
    (0i16..2000, 0i16..2000)
}

pub(crate) fn edit_op() -> impl Strategy<Value = EditOp> {
    prop_oneof![
        3 => prop::option::of(point()).prop_map(|placed| EditOp::Add { placed }),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(from, to)| EditOp::Connect { from, to }),
        1 => any::<usize>().prop_map(EditOp::DeleteStep),
        1 => any::<usize>().prop_map(EditOp::DeleteTransition),
        2 => (any::<usize>(), point()).prop_map(|(step, to)| EditOp::Move { step, to }),
        2 => (any::<usize>(), prop::collection::vec(point(), 1..5))
            .prop_map(|(step, path)| EditOp::Drag { step, path }),
        1 => (any::<usize>(), "[A-Za-z ]{1,12}")
            .prop_map(|(step, name)| EditOp::Rename { step, name }),
    ]
}

/// Between one and `max` gestures
pub(crate) fn edit_ops(max: usize) -> impl Strategy<Value = Vec<EditOp>> {
    prop::collection::vec(edit_op(), 1..max)
}

fn pick(ids: &[EntityId], index: usize) -> Option<EntityId> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

fn position((x, y): (i16, i16)) -> Position {
    Position::new(f64::from(x), f64::from(y))
}

/// Replay one gesture on a session
///
/// Drafts never carry a role or a start flag, so the resulting graph can
/// only ever produce warnings.
pub(crate) fn apply_edit(session: &mut EditorSession, op: &EditOp) -> Result<()> {
    let steps: Vec<EntityId> = session.graph().steps.iter().map(|s| s.id).collect();
    let transitions: Vec<TransitionId> =
        session.graph().transitions.iter().map(|t| t.id).collect();

    match op {
        EditOp::Add { placed } => {
            let draft = StepDraft::named(format!("Step {}", steps.len() + 1));
            let draft = match placed {
                Some((x, y)) => draft.at(f64::from(*x), f64::from(*y)),
                None => draft,
            };
            session.on_add_step(draft)?;
        }
        EditOp::Connect { from, to } => {
            if let (Some(from), Some(to)) = (pick(&steps, *from), pick(&steps, *to)) {
                session.on_connect(from, to, Anchors::default())?;
            }
        }
        EditOp::DeleteStep(index) => {
            if let Some(id) = pick(&steps, *index) {
                session.on_delete_step(&id)?;
            }
        }
        EditOp::DeleteTransition(index) => {
            if let Some(id) = pick(&transitions, *index) {
                session.on_delete_transition(&id)?;
            }
        }
        EditOp::Move { step, to } => {
            if let Some(id) = pick(&steps, *step) {
                session.on_move(&id, position(*to))?;
            }
        }
        EditOp::Drag { step, path } => {
            if let Some(id) = pick(&steps, *step) {
                session.begin_drag(&id)?;
                for point in path {
                    session.drag_to(&id, position(*point))?;
                }
                session.end_drag()?;
            }
        }
        EditOp::Rename { step, name } => {
            if let Some(id) = pick(&steps, *step) {
                let changes = StepChanges {
                    name: Some(name.clone()),
                    ..StepChanges::default()
                };
                session.on_update_step(&id, changes)?;
            }
        }
    }
    Ok(())
}
