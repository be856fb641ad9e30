//! Undo/redo history for local edits.
//!
//! Each committed store transaction reports the [`Change`]s it made; the
//! history keeps those (plus recorded selection changes) as undo entries.
//! Undo applies the inverse mutations against the *current* store, so an
//! entry whose layers were since deleted by a peer degrades to a partial
//! or complete no-op instead of failing.

use crate::layer::LayerId;
use crate::presence::PresenceChannel;
use crate::store::{Change, LayerStore, Mutation, StoreResult};

/// Whether a commit creates an undo step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordHistory {
    Yes,
    No,
}

/// One recorded change.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryChange {
    Store(Change),
    Selection { before: Vec<LayerId>, after: Vec<LayerId> },
}

impl From<Change> for HistoryChange {
    fn from(change: Change) -> Self {
        HistoryChange::Store(change)
    }
}

/// A single undo step: everything committed between two checkpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEntry {
    changes: Vec<HistoryChange>,
}

impl HistoryEntry {
    pub fn changes(&self) -> &[HistoryChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Undo this entry against the current store and presence.
    pub fn revert(&self, store: &mut LayerStore, presence: &mut PresenceChannel) -> StoreResult<()> {
        let mutations: Vec<Mutation> = self
            .changes
            .iter()
            .rev()
            .filter_map(|change| match change {
                HistoryChange::Store(change) => Some(change.inverse()),
                HistoryChange::Selection { .. } => None,
            })
            .collect();
        store.apply(&mutations)?;

        let selection = self.changes.iter().find_map(|change| match change {
            HistoryChange::Selection { before, .. } => Some(before),
            HistoryChange::Store(_) => None,
        });
        if let Some(selection) = selection {
            restore_selection(selection, store, presence);
        }
        Ok(())
    }

    /// Redo this entry against the current store and presence.
    pub fn reapply(&self, store: &mut LayerStore, presence: &mut PresenceChannel) -> StoreResult<()> {
        let mutations: Vec<Mutation> = self
            .changes
            .iter()
            .filter_map(|change| match change {
                HistoryChange::Store(change) => Some(change.forward()),
                HistoryChange::Selection { .. } => None,
            })
            .collect();
        store.apply(&mutations)?;

        let selection = self.changes.iter().rev().find_map(|change| match change {
            HistoryChange::Selection { after, .. } => Some(after),
            HistoryChange::Store(_) => None,
        });
        if let Some(selection) = selection {
            restore_selection(selection, store, presence);
        }
        Ok(())
    }
}

fn restore_selection(selection: &[LayerId], store: &LayerStore, presence: &mut PresenceChannel) {
    let live = selection.iter().filter(|id| store.contains(id)).cloned().collect();
    presence.set_selection(live);
}

/// Undo/redo stacks with pause/resume coalescing.
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    /// Changes recorded while paused, pushed as one entry on the final resume.
    pending: HistoryEntry,
    pause_depth: usize,
    max_steps: usize,
}

impl History {
    pub fn new(max_steps: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            pending: HistoryEntry::default(),
            pause_depth: 0,
            max_steps,
        }
    }

    /// Start grouping subsequent changes into one undo step.
    ///
    /// Pauses nest; the step is closed when every pause has been resumed.
    pub fn pause(&mut self) {
        self.pause_depth += 1;
    }

    /// Close one pause. A resume without a matching pause is ignored.
    pub fn resume(&mut self) {
        if self.pause_depth == 0 {
            return;
        }
        self.pause_depth -= 1;
        if self.pause_depth == 0 && !self.pending.is_empty() {
            let entry = std::mem::take(&mut self.pending);
            self.push_entry(entry);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_depth > 0
    }

    /// Record changes from a commit.
    pub fn record<I>(&mut self, changes: I, record: RecordHistory)
    where
        I: IntoIterator,
        I::Item: Into<HistoryChange>,
    {
        if record == RecordHistory::No {
            return;
        }
        let changes: Vec<HistoryChange> = changes.into_iter().map(Into::into).collect();
        if changes.is_empty() {
            return;
        }
        if self.is_paused() {
            self.pending.changes.extend(changes);
        } else {
            self.push_entry(HistoryEntry { changes });
        }
    }

    fn push_entry(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_steps {
            self.undo_stack.remove(0);
        }
    }

    /// Undo the last step. Returns false if nothing was undone.
    pub fn undo(&mut self, store: &mut LayerStore, presence: &mut PresenceChannel) -> bool {
        if self.is_paused() {
            log::debug!("Ignoring undo while a gesture is in progress");
            return false;
        }
        let Some(entry) = self.undo_stack.pop() else {
            return false;
        };
        if let Err(err) = entry.revert(store, presence) {
            log::error!("Failed to undo: {err}");
        }
        self.redo_stack.push(entry);
        true
    }

    /// Redo the last undone step. Returns false if nothing was redone.
    pub fn redo(&mut self, store: &mut LayerStore, presence: &mut PresenceChannel) -> bool {
        if self.is_paused() {
            log::debug!("Ignoring redo while a gesture is in progress");
            return false;
        }
        let Some(entry) = self.redo_stack.pop() else {
            return false;
        };
        if let Err(err) = entry.reapply(store, presence) {
            log::error!("Failed to redo: {err}");
        }
        self.undo_stack.push(entry);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Drop all history, including any open group.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.pending = HistoryEntry::default();
        self.pause_depth = 0;
    }
}
