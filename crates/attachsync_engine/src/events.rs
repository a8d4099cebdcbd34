use std::sync::{mpsc, Mutex};

use crate::{Notice, SyncEvent};

/// Receives progress and notices from the queue and its handlers.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);

    fn notice(&self, notice: Notice) {
        self.emit(SyncEvent::Notice(notice));
    }
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<SyncEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<SyncEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event; used by tests and by callers that print a summary at the end.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SyncEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Per-transfer progress callback, in percent.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8) {}
}

/// Percent of `done` over `total`, or `None` when the total is unknown.
pub(crate) fn percent_of(done: u64, total: Option<u64>) -> Option<u8> {
    let total = total.filter(|total| *total > 0)?;
    Some(((done.min(total) * 100) / total) as u8)
}

#[cfg(test)]
mod tests {
    use super::percent_of;

    #[test]
    fn percent_is_clamped_and_needs_a_total() {
        assert_eq!(percent_of(50, Some(200)), Some(25));
        assert_eq!(percent_of(300, Some(200)), Some(100));
        assert_eq!(percent_of(10, None), None);
        assert_eq!(percent_of(10, Some(0)), None);
    }
}
