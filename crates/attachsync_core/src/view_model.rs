use crate::{EventType, ItemId, Phase};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueView {
    /// Items accepted but not yet started.
    pub queue_length: usize,
    /// True while at least one item is in flight.
    pub is_processing: bool,
    pub rows: Vec<ItemRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRow {
    pub id: ItemId,
    pub event_type: EventType,
    pub reference: String,
    pub phase: Phase,
    pub percent: Option<u8>,
}
