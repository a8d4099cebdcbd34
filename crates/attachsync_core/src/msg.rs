use crate::{EventType, ItemId};

/// What the queue learns about its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Items accepted for processing, in submission order.
    Enqueued(Vec<ItemSummary>),
    /// A lane took the item and is about to run its handler.
    Started { id: ItemId },
    /// Handler progress, 0..=100.
    Progress { id: ItemId, percent: u8 },
    /// The handler finished, one way or the other.
    Settled { id: ItemId, result: ItemResult },
    /// The owning editor is going away.
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub id: ItemId,
    pub event_type: EventType,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    /// The remote side succeeded. `reconciled` is false when the document
    /// could not be rewritten (target or marker no longer present).
    Succeeded { reconciled: bool },
    Failed { error: String },
}
