//! Gestures emitted by the rendering surface

use serde::{Deserialize, Serialize};

use crate::types::{Anchors, Position, StepDraft, StepId, TransitionId};

/// The selected entity on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum Selection {
    Step(StepId),
    Transition(TransitionId),
}

/// A user interaction on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Gesture {
    /// Drop a new step onto the canvas
    Add { draft: StepDraft },

    /// Move a step in one go (keyboard nudge, programmatic placement)
    #[serde(rename_all = "camelCase")]
    Move { step_id: StepId, position: Position },

    #[serde(rename_all = "camelCase")]
    DragStart { step_id: StepId },

    /// Intermediate drag position; never recorded in history
    #[serde(rename_all = "camelCase")]
    Drag { step_id: StepId, position: Position },

    DragEnd,

    /// Draw a transition between two steps
    Connect {
        from: StepId,
        to: StepId,
        #[serde(default)]
        anchors: Anchors,
    },

    /// Select an entity, or clear the selection with `None`
    Select { target: Option<Selection> },

    #[serde(rename_all = "camelCase")]
    DeleteStep { step_id: StepId },

    #[serde(rename_all = "camelCase")]
    DeleteTransition { transition_id: TransitionId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityId, TempId};

    #[test]
    fn test_gesture_wire_format() {
        let gesture: Gesture = serde_json::from_value(serde_json::json!({
            "type": "connect",
            "from": 4,
            "to": "t2"
        }))
        .unwrap();

        assert_eq!(
            gesture,
            Gesture::Connect {
                from: EntityId::Permanent(4),
                to: EntityId::Temporary(TempId::new(2)),
                anchors: Anchors::default(),
            }
        );

        let json = serde_json::to_value(Gesture::DragEnd).unwrap();
        assert_eq!(json, serde_json::json!({"type": "dragEnd"}));
    }

    #[test]
    fn test_selection_wire_format() {
        let selection = Selection::Transition(EntityId::Permanent(12));
        let json = serde_json::to_value(selection).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "transition", "id": 12}));
    }
}
