use attachsync_logging::{sync_debug, sync_warn};

use crate::{Effect, EventType, ItemId, ItemResult, Msg, Phase, QueueState};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: QueueState, msg: Msg) -> (QueueState, Vec<Effect>) {
    let effects = match msg {
        Msg::Enqueued(items) => {
            if state.is_closed() {
                sync_warn!("queue is closed; ignoring {} new item(s)", items.len());
                return (state, Vec::new());
            }
            let mut effects = Vec::with_capacity(items.len());
            for summary in items {
                if state.entry(summary.id).is_some() {
                    sync_debug!("item {} already queued", summary.id);
                    continue;
                }
                effects.push(Effect::Dispatch {
                    id: summary.id,
                    event_type: summary.event_type,
                });
                state.push_queued(summary);
            }
            effects
        }
        Msg::Started { id } => {
            if let Some(entry) = state.entry_mut(id) {
                if entry.phase == Phase::Queued {
                    entry.phase = Phase::InFlight;
                    entry.percent = Some(0);
                }
            }
            Vec::new()
        }
        Msg::Progress { id, percent } => {
            if let Some(entry) = state.entry_mut(id) {
                if entry.phase == Phase::InFlight {
                    entry.percent = Some(percent.min(100));
                }
            }
            Vec::new()
        }
        Msg::Settled { id, result } => settle(&mut state, id, result),
        Msg::Teardown => teardown(&mut state),
    };

    (state, effects)
}

fn settle(state: &mut QueueState, id: ItemId, result: ItemResult) -> Vec<Effect> {
    let Some(entry) = state.entry_mut(id) else {
        sync_debug!("settled unknown item {}", id);
        return Vec::new();
    };
    if entry.phase.is_terminal() {
        return Vec::new();
    }
    let event_type = entry.event_type;
    let reference = entry.reference.clone();

    let mut effects = Vec::new();
    match result {
        ItemResult::Succeeded { reconciled } => {
            entry.phase = Phase::Succeeded;
            entry.percent = Some(100);
            if !reconciled {
                sync_warn!("{} of {} succeeded but the document was not updated", event_type, reference);
            }
            effects.push(Effect::NotifySuccess {
                id,
                message: success_message(event_type, &reference),
            });
        }
        ItemResult::Failed { error } => {
            entry.phase = Phase::Failed;
            effects.push(Effect::NotifyFailure {
                id,
                message: format!("Failed to {event_type} {reference}: {error}"),
            });
            state.record_failure();
        }
    }

    finish_batch_if_idle(state, &mut effects);
    effects
}

fn teardown(state: &mut QueueState) -> Vec<Effect> {
    if state.is_closed() {
        return Vec::new();
    }
    let pending = state.ids_in(Phase::Queued);
    let in_flight = state.count(Phase::InFlight);

    for id in &pending {
        if let Some(entry) = state.entry_mut(*id) {
            entry.phase = Phase::Dropped;
        }
    }
    state.close();

    let mut effects = Vec::new();
    if !pending.is_empty() || in_flight > 0 {
        effects.push(Effect::TeardownWarning {
            pending: pending.len(),
            in_flight,
        });
    }
    if !pending.is_empty() {
        effects.push(Effect::DropPending { ids: pending });
    }
    finish_batch_if_idle(state, &mut effects);
    effects
}

fn finish_batch_if_idle(state: &mut QueueState, effects: &mut Vec<Effect>) {
    if state.is_busy() || !state.has_entries() {
        return;
    }
    let (failed, total) = state.batch_totals();
    if failed > 0 {
        effects.push(Effect::BatchFailed { failed, total });
    }
    effects.push(Effect::Drained { failed, total });
    state.reset_batch();
}

fn success_message(event_type: EventType, reference: &str) -> String {
    match event_type {
        EventType::Upload => format!("Uploaded {reference}"),
        EventType::Download => format!("Downloaded {reference}"),
        EventType::Delete => format!("Deleted {reference}"),
    }
}
