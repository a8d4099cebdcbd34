use crate::view_model::{ItemRow, QueueView};
use crate::{EventType, ItemId, ItemSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Queued,
    InFlight,
    Succeeded,
    Failed,
    /// Discarded by teardown before it started.
    Dropped,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::Dropped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ItemEntry {
    pub(crate) id: ItemId,
    pub(crate) event_type: EventType,
    pub(crate) reference: String,
    pub(crate) phase: Phase,
    pub(crate) percent: Option<u8>,
}

/// Bookkeeping for one batch of queued items.
///
/// A batch starts with the first enqueue after the queue was idle and ends
/// when its last item settles; entries are then cleared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueState {
    entries: Vec<ItemEntry>,
    batch_total: usize,
    batch_failed: usize,
    closed: bool,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> QueueView {
        QueueView {
            queue_length: self.count(Phase::Queued),
            is_processing: self.count(Phase::InFlight) > 0,
            rows: self
                .entries
                .iter()
                .map(|entry| ItemRow {
                    id: entry.id,
                    event_type: entry.event_type,
                    reference: entry.reference.clone(),
                    phase: entry.phase,
                    percent: entry.percent,
                })
                .collect(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True while any item is queued or in flight.
    pub fn is_busy(&self) -> bool {
        self.entries.iter().any(|entry| !entry.phase.is_terminal())
    }

    pub fn phase_of(&self, id: ItemId) -> Option<Phase> {
        self.entry(id).map(|entry| entry.phase)
    }

    pub(crate) fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    pub(crate) fn ids_in(&self, phase: Phase) -> Vec<ItemId> {
        self.entries
            .iter()
            .filter(|entry| entry.phase == phase)
            .map(|entry| entry.id)
            .collect()
    }

    pub(crate) fn count(&self, phase: Phase) -> usize {
        self.entries.iter().filter(|entry| entry.phase == phase).count()
    }

    pub(crate) fn entry(&self, id: ItemId) -> Option<&ItemEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub(crate) fn entry_mut(&mut self, id: ItemId) -> Option<&mut ItemEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    pub(crate) fn push_queued(&mut self, summary: ItemSummary) {
        self.entries.push(ItemEntry {
            id: summary.id,
            event_type: summary.event_type,
            reference: summary.reference,
            phase: Phase::Queued,
            percent: None,
        });
        self.batch_total += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.batch_failed += 1;
    }

    pub(crate) fn batch_totals(&self) -> (usize, usize) {
        (self.batch_failed, self.batch_total)
    }

    /// Forgets the settled batch.
    pub(crate) fn reset_batch(&mut self) {
        self.entries.clear();
        self.batch_total = 0;
        self.batch_failed = 0;
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }
}
