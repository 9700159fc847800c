//! Events emitted by an editor session
//!
//! The rendering surface subscribes to these to refresh its projection,
//! update undo/redo buttons and show non-fatal notices (for example a
//! connection dropped because its target step was deleted).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::WorkflowId;

/// Receiver of editor events
///
/// Implemented per transport: UI channel, tokio channel, test collector.
pub trait EventSink: Send + Sync {
    /// Deliver one event; fails if the receiving side is gone
    fn send(&self, event: EditorEvent) -> Result<(), EventError>;
}

/// An event could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted while editing and saving a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorEvent {
    /// Non-fatal message for the user
    #[serde(rename_all = "camelCase")]
    Notice { message: String },

    /// The graph changed; the projection should be refreshed
    #[serde(rename_all = "camelCase")]
    GraphChanged { revision: u64 },

    /// Undo/redo availability or the unsaved flag changed
    #[serde(rename_all = "camelCase")]
    HistoryChanged {
        can_undo: bool,
        can_redo: bool,
        unsaved: bool,
    },

    /// A save was submitted
    #[serde(rename_all = "camelCase")]
    SaveStarted { workflow_id: WorkflowId },

    /// A save was reconciled into the model
    #[serde(rename_all = "camelCase")]
    SaveCompleted {
        workflow_id: WorkflowId,
        assigned_ids: usize,
    },

    /// A save failed; local edits are preserved
    #[serde(rename_all = "camelCase")]
    SaveFailed {
        workflow_id: WorkflowId,
        error: String,
    },
}

impl EditorEvent {
    pub fn notice(message: impl Into<String>) -> Self {
        Self::Notice {
            message: message.into(),
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: EditorEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: Mutex<Vec<EditorEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<EditorEvent> {
        self.events.lock().clone()
    }

    /// Messages of all collected notices
    pub fn notices(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                EditorEvent::Notice { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: EditorEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events into a tokio channel, for UIs running their own event loop
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<EditorEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver the UI drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EditorEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: EditorEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map_err(|_| EventError::channel_closed())
    }
}
