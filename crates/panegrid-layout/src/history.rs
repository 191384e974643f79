//! Bounded undo/redo history.
//!
//! Each entry is a full labeled snapshot of the tree shape and content map.
//! The cursor sits one past the entry that matches the live tree, so a
//! freshly recorded history has `cursor == entries.len()` and nothing to
//! redo.

use std::collections::BTreeMap;

use crate::snapshot::TreeData;
use crate::tree::NodeId;

/// One recorded state with the action label that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub label: String,
    pub tree: TreeData,
    pub content: BTreeMap<NodeId, String>,
}

/// Availability of undo/redo, for host UI affordances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Linear snapshot history with a capacity bound.
#[derive(Debug, Clone)]
pub struct History {
    limit: usize,
    entries: Vec<HistorySnapshot>,
    cursor: usize,
}

impl History {
    /// Create an empty history holding at most `limit` entries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: Vec::new(),
            cursor: 0,
        }
    }

    /// Record a new state, discarding any redo branch and evicting the
    /// oldest entry once the capacity bound is hit.
    pub fn record(&mut self, snapshot: HistorySnapshot) {
        self.entries.truncate(self.cursor);
        self.entries.push(snapshot);
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
        self.cursor = self.entries.len();
    }

    /// Step back one entry, returning the state to restore.
    pub fn undo(&mut self) -> Option<&HistorySnapshot> {
        if self.cursor <= 1 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor - 1)
    }

    /// Step forward one entry, returning the state to restore.
    pub fn redo(&mut self) -> Option<&HistorySnapshot> {
        if self.cursor >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor - 1)
    }

    /// Entry the live tree currently matches.
    #[must_use]
    pub fn current(&self) -> Option<&HistorySnapshot> {
        self.cursor.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Drop every entry and reset the cursor.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Undo/redo availability.
    #[must_use]
    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            can_undo: self.cursor > 1,
            can_redo: self.cursor < self.entries.len(),
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
