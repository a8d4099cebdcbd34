use crate::{EventType, ItemId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Hand the item to the lane for its kind.
    Dispatch { id: ItemId, event_type: EventType },
    NotifySuccess { id: ItemId, message: String },
    NotifyFailure { id: ItemId, message: String },
    /// Every item of the batch has settled and at least one failed.
    BatchFailed { failed: usize, total: usize },
    /// Every item of the batch has settled.
    Drained { failed: usize, total: usize },
    /// Queued items discarded by teardown; they must never start.
    DropPending { ids: Vec<ItemId> },
    TeardownWarning { pending: usize, in_flight: usize },
}
