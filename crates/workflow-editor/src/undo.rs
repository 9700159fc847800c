//! Undo/redo history using compressed snapshots
//!
//! The stack stores whole-graph snapshots rather than inverse commands, so any
//! mutation is undoable without extra bookkeeping. Snapshots are serialized
//! to JSON and zstd-compressed; the stack never looks inside them.
//!
//! The stack also remembers which entry matches the last successful save, so
//! the editor can tell whether there are unsaved changes.

use std::collections::VecDeque;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::DEFAULT_HISTORY_CAPACITY;
use crate::error::{EditorError, Result};

/// zstd level used for snapshots
const COMPRESSION_LEVEL: i32 = 3;

/// Bounded undo/redo stack of opaque snapshots
pub struct UndoStack<T> {
    /// Compressed states (zstd)
    snapshots: VecDeque<Vec<u8>>,
    /// Index of the entry the model currently reflects
    cursor: usize,
    /// Oldest entries are evicted beyond this
    capacity: usize,
    /// Index of the entry matching the last save, if still in the stack
    saved_baseline: Option<usize>,
    _snapshot: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> UndoStack<T> {
    /// Create a stack holding at most `capacity` snapshots (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
            saved_baseline: None,
            _snapshot: PhantomData,
        }
    }

    /// Record a new snapshot
    ///
    /// Drops any redo history past the cursor, then evicts the oldest
    /// entries beyond capacity.
    pub fn record(&mut self, snapshot: &T) -> Result<()> {
        let json = serde_json::to_vec(snapshot)?;
        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map_err(|e| EditorError::Compression(e.to_string()))?;

        if !self.snapshots.is_empty() {
            self.snapshots.truncate(self.cursor + 1);
            if self.saved_baseline.is_some_and(|baseline| baseline > self.cursor) {
                self.saved_baseline = None;
            }
        }

        self.snapshots.push_back(compressed);
        self.cursor = self.snapshots.len() - 1;

        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
            self.saved_baseline = self.saved_baseline.and_then(|b| b.checked_sub(1));
        }

        Ok(())
    }

    /// Move the cursor back and return that snapshot; `None` at the oldest entry
    pub fn undo(&mut self) -> Option<Result<T>> {
        if self.cursor > 0 {
            self.cursor -= 1;
            Some(self.decompress(self.cursor))
        } else {
            None
        }
    }

    /// Move the cursor forward and return that snapshot; `None` at the newest entry
    pub fn redo(&mut self) -> Option<Result<T>> {
        if self.cursor + 1 < self.snapshots.len() {
            self.cursor += 1;
            Some(self.decompress(self.cursor))
        } else {
            None
        }
    }

    /// Get the current state without moving the cursor
    pub fn current(&self) -> Option<Result<T>> {
        if self.snapshots.is_empty() {
            None
        } else {
            Some(self.decompress(self.cursor))
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Remember the current entry as the saved state
    pub fn mark_saved_baseline(&mut self) {
        if !self.snapshots.is_empty() {
            self.saved_baseline = Some(self.cursor);
        }
    }

    /// Whether the cursor has moved away from the saved entry
    pub fn has_unsaved_changes(&self) -> bool {
        !self.snapshots.is_empty() && self.saved_baseline != Some(self.cursor)
    }

    pub fn saved_baseline(&self) -> Option<usize> {
        self.saved_baseline
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Drop all snapshots and the saved baseline
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = 0;
        self.saved_baseline = None;
    }

    /// Total compressed size of all snapshots
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(|s| s.len()).sum()
    }

    fn decompress(&self, index: usize) -> Result<T> {
        let compressed = &self.snapshots[index];
        let json = zstd::decode_all(&compressed[..])
            .map_err(|e| EditorError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl<T: Serialize + DeserializeOwned> Default for UndoStack<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
