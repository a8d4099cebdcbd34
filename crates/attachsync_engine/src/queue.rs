//! Processing queue: per-kind lanes over the pure core state machine.
//!
//! Every state change goes through `attachsync_core::update`; this module only
//! owns the async plumbing. Items start in enqueue order within a lane, and a
//! lane never has more in flight than its concurrency limit.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use attachsync_core::{
    update, Effect, EventType, ItemId, ItemResult, Msg, Phase, ProcessItem, QueueState, QueueView,
};
use attachsync_logging::{sync_debug, sync_info, sync_warn};
use tokio::sync::{mpsc, Notify, Semaphore};

use crate::config::ConcurrencySettings;
use crate::events::{EventSink, ProgressSink};
use crate::{Notice, NoticeLevel, SyncEvent};

/// Performs one item's remote work and document rewrite.
#[async_trait::async_trait]
pub trait ItemHandler: Send + Sync + 'static {
    async fn handle(&self, item: &ProcessItem, progress: &ProgressReporter) -> ItemResult;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub pending: usize,
    pub in_flight: usize,
}

#[derive(Clone)]
pub struct ProcessingQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    items: Mutex<HashMap<ItemId, ProcessItem>>,
    lanes: HashMap<EventType, mpsc::UnboundedSender<ItemId>>,
    sink: Arc<dyn EventSink>,
    idle: Notify,
}

impl ProcessingQueue {
    /// Starts one dispatcher task per event type. Must be called inside a tokio runtime.
    pub fn new(
        handler: Arc<dyn ItemHandler>,
        concurrency: ConcurrencySettings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let mut lanes = HashMap::new();
        let mut receivers = Vec::new();
        for event_type in EventType::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.insert(event_type, tx);
            receivers.push((event_type, rx));
        }
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState::new()),
            items: Mutex::new(HashMap::new()),
            lanes,
            sink,
            idle: Notify::new(),
        });
        for (event_type, rx) in receivers {
            let limit = concurrency.for_kind(event_type);
            sync_debug!("{} lane runs {} at a time", event_type, limit);
            tokio::spawn(run_lane(
                rx,
                limit,
                Arc::downgrade(&inner),
                handler.clone(),
            ));
        }
        Self { inner }
    }

    /// Appends items in order; returns how many were accepted.
    ///
    /// Nothing is accepted after teardown.
    pub fn enqueue(&self, items: Vec<ProcessItem>) -> usize {
        if items.is_empty() {
            return 0;
        }
        let summaries = items.iter().map(ProcessItem::summary).collect();
        let ids: Vec<ItemId> = items.iter().map(ProcessItem::id).collect();
        {
            let mut stored = self.inner.items();
            for item in items {
                stored.insert(item.id(), item);
            }
        }
        let effects = self.inner.apply(Msg::Enqueued(summaries));
        let accepted = effects
            .iter()
            .filter(|effect| matches!(effect, Effect::Dispatch { .. }))
            .count();
        if accepted < ids.len() {
            let mut stored = self.inner.items();
            let state = self.inner.state();
            for id in &ids {
                if state.phase_of(*id).is_none() {
                    stored.remove(id);
                }
            }
        }
        accepted
    }

    pub fn status(&self) -> QueueView {
        self.inner.state().view()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.state().is_busy()
    }

    pub fn phase_of(&self, id: ItemId) -> Option<Phase> {
        self.inner.state().phase_of(id)
    }

    /// Resolves once no item is queued or in flight.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }

    /// Closes the queue and drops queued items. In-flight items run to completion.
    pub fn teardown(&self) -> TeardownReport {
        self.inner
            .apply(Msg::Teardown)
            .into_iter()
            .find_map(|effect| match effect {
                Effect::TeardownWarning { pending, in_flight } => {
                    Some(TeardownReport { pending, in_flight })
                }
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl QueueInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn items(&self) -> MutexGuard<'_, HashMap<ItemId, ProcessItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `msg` through the state machine, then executes the effects.
    fn apply(&self, msg: Msg) -> Vec<Effect> {
        let effects = {
            let mut guard = self.state();
            let state = std::mem::take(&mut *guard);
            let (next, effects) = update(state, msg);
            *guard = next;
            effects
        };
        for effect in &effects {
            self.run_effect(effect);
        }
        effects
    }

    /// Moves a queued item to in flight and hands it out, once.
    fn start(&self, id: ItemId) -> Option<ProcessItem> {
        {
            let mut guard = self.state();
            if guard.phase_of(id) != Some(Phase::Queued) {
                return None;
            }
            let state = std::mem::take(&mut *guard);
            let (next, _) = update(state, Msg::Started { id });
            *guard = next;
        }
        self.items().remove(&id)
    }

    fn progress(&self, id: ItemId, percent: u8) {
        if self.state().phase_of(id) != Some(Phase::InFlight) {
            return;
        }
        self.apply(Msg::Progress { id, percent });
        self.sink.emit(SyncEvent::Progress {
            id,
            percent: percent.min(100),
        });
    }

    fn run_effect(&self, effect: &Effect) {
        match effect {
            Effect::Dispatch { id, event_type } => {
                let sent = self
                    .lanes
                    .get(event_type)
                    .map(|lane| lane.send(*id).is_ok())
                    .unwrap_or(false);
                if !sent {
                    sync_warn!("{} lane is gone; failing item {}", event_type, id);
                    self.apply(Msg::Settled {
                        id: *id,
                        result: ItemResult::Failed {
                            error: "queue is shutting down".to_string(),
                        },
                    });
                }
            }
            Effect::NotifySuccess { message, .. } => {
                sync_info!("{}", message);
                self.sink.notice(Notice::new(NoticeLevel::Success, message.clone()));
            }
            Effect::NotifyFailure { message, .. } => {
                sync_warn!("{}", message);
                self.sink.notice(Notice::new(NoticeLevel::Error, message.clone()));
            }
            Effect::BatchFailed { failed, total } => {
                self.sink.notice(Notice::new(
                    NoticeLevel::Warning,
                    format!("{failed} of {total} item(s) failed"),
                ));
            }
            Effect::Drained { failed, total } => {
                sync_info!("batch finished: {} item(s), {} failed", total, failed);
                self.sink.emit(SyncEvent::Drained {
                    failed: *failed,
                    total: *total,
                });
                self.idle.notify_waiters();
            }
            Effect::DropPending { ids } => {
                let mut items = self.items();
                for id in ids {
                    items.remove(id);
                }
            }
            Effect::TeardownWarning { pending, in_flight } => {
                sync_warn!(
                    "closing with {} queued and {} running item(s)",
                    pending,
                    in_flight
                );
                self.sink.notice(Notice::new(
                    NoticeLevel::Warning,
                    format!(
                        "Closing with {pending} queued and {in_flight} running item(s); queued items were dropped"
                    ),
                ));
            }
        }
    }
}

async fn run_lane(
    mut rx: mpsc::UnboundedReceiver<ItemId>,
    limit: usize,
    inner: Weak<QueueInner>,
    handler: Arc<dyn ItemHandler>,
) {
    let permits = Arc::new(Semaphore::new(limit));
    while let Some(id) = rx.recv().await {
        // Taking the permit before looking at the item keeps start order FIFO.
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let Some(queue) = inner.upgrade() else {
            break;
        };
        let Some(item) = queue.start(id) else {
            sync_debug!("item {} is no longer queued", id);
            continue;
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            let reporter = ProgressReporter {
                id,
                queue: Arc::downgrade(&queue),
            };
            let worker = tokio::spawn(async move { handler.handle(&item, &reporter).await });
            let result = match worker.await {
                Ok(result) => result,
                Err(err) => ItemResult::Failed {
                    error: format!("worker stopped: {err}"),
                },
            };
            queue.apply(Msg::Settled { id, result });
            drop(permit);
        });
    }
}

/// Progress callback bound to one item.
pub struct ProgressReporter {
    id: ItemId,
    queue: Weak<QueueInner>,
}

impl ProgressSink for ProgressReporter {
    fn report(&self, percent: u8) {
        if let Some(queue) = self.queue.upgrade() {
            queue.progress(self.id, percent);
        }
    }
}
