use std::sync::Once;

use attachsync_core::{
    update, Effect, EventType, FilePayload, ItemResult, Msg, Phase, ProcessItem, QueueState,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(attachsync_logging::initialize_for_tests);
}

fn enqueue(state: QueueState, items: &[ProcessItem]) -> (QueueState, Vec<Effect>) {
    update(
        state,
        Msg::Enqueued(items.iter().map(ProcessItem::summary).collect()),
    )
}

fn downloads(n: usize) -> Vec<ProcessItem> {
    (0..n)
        .map(|i| ProcessItem::download(format!("https://cdn.example.com/{i}.png")))
        .collect()
}

#[test]
fn enqueue_dispatches_in_submission_order() {
    init_logging();
    let items = downloads(3);
    let (state, effects) = enqueue(QueueState::new(), &items);

    assert_eq!(
        effects,
        items
            .iter()
            .map(|item| Effect::Dispatch {
                id: item.id(),
                event_type: EventType::Download
            })
            .collect::<Vec<_>>()
    );
    let view = state.view();
    assert_eq!(view.queue_length, 3);
    assert!(!view.is_processing);
}

#[test]
fn started_items_count_as_processing() {
    init_logging();
    let items = downloads(2);
    let (state, _) = enqueue(QueueState::new(), &items);
    let (state, effects) = update(state, Msg::Started { id: items[0].id() });

    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.queue_length, 1);
    assert!(view.is_processing);
    assert_eq!(view.rows[0].phase, Phase::InFlight);
}

#[test]
fn progress_is_clamped_and_only_tracked_in_flight() {
    init_logging();
    let items = downloads(1);
    let id = items[0].id();
    let (state, _) = enqueue(QueueState::new(), &items);
    let (state, _) = update(state, Msg::Progress { id, percent: 50 });
    assert_eq!(state.view().rows[0].percent, None);

    let (state, _) = update(state, Msg::Started { id });
    let (state, _) = update(state, Msg::Progress { id, percent: 250 });
    assert_eq!(state.view().rows[0].percent, Some(100));
}

#[test]
fn happy_path_batch_drains_without_summary() {
    init_logging();
    let items = downloads(2);
    let (mut state, _) = enqueue(QueueState::new(), &items);
    let mut all_effects = Vec::new();
    for item in &items {
        let (next, _) = update(state, Msg::Started { id: item.id() });
        let (next, effects) = update(
            next,
            Msg::Settled {
                id: item.id(),
                result: ItemResult::Succeeded { reconciled: true },
            },
        );
        all_effects.extend(effects);
        state = next;
    }

    assert!(!all_effects
        .iter()
        .any(|effect| matches!(effect, Effect::BatchFailed { .. })));
    assert_eq!(
        all_effects.last(),
        Some(&Effect::Drained {
            failed: 0,
            total: 2
        })
    );
    assert!(!state.is_busy());
    assert!(state.view().rows.is_empty());
}

#[test]
fn failure_is_isolated_and_summarized_once_drained() {
    init_logging();
    let items = downloads(2);
    let (state, _) = enqueue(QueueState::new(), &items);
    let (state, _) = update(state, Msg::Started { id: items[0].id() });
    let (state, _) = update(state, Msg::Started { id: items[1].id() });

    let (state, effects) = update(
        state,
        Msg::Settled {
            id: items[0].id(),
            result: ItemResult::Failed {
                error: "http status 500".to_string(),
            },
        },
    );
    assert_eq!(
        effects,
        vec![Effect::NotifyFailure {
            id: items[0].id(),
            message: "Failed to download https://cdn.example.com/0.png: http status 500"
                .to_string()
        }]
    );
    assert_eq!(state.phase_of(items[1].id()), Some(Phase::InFlight));

    let (_state, effects) = update(
        state,
        Msg::Settled {
            id: items[1].id(),
            result: ItemResult::Succeeded { reconciled: false },
        },
    );
    assert_eq!(
        effects,
        vec![
            Effect::NotifySuccess {
                id: items[1].id(),
                message: "Downloaded https://cdn.example.com/1.png".to_string()
            },
            Effect::BatchFailed {
                failed: 1,
                total: 2
            },
            Effect::Drained {
                failed: 1,
                total: 2
            },
        ]
    );
}

#[test]
fn items_settle_exactly_once() {
    init_logging();
    let items = downloads(2);
    let id = items[0].id();
    let (state, _) = enqueue(QueueState::new(), &items);
    let (state, _) = update(state, Msg::Started { id });
    let settled = Msg::Settled {
        id,
        result: ItemResult::Succeeded { reconciled: true },
    };
    let (state, first) = update(state, settled.clone());
    let (_state, second) = update(state, settled);

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
}

#[test]
fn teardown_drops_pending_and_reports_counts() {
    init_logging();
    let upload = ProcessItem::upload(
        FilePayload::new("a.png", "image/png", vec![1]),
        "a.png",
        None,
    );
    let mut items = downloads(2);
    items.push(upload);
    let (state, _) = enqueue(QueueState::new(), &items);
    let (state, _) = update(state, Msg::Started { id: items[0].id() });

    let (state, effects) = update(state, Msg::Teardown);
    assert_eq!(
        effects,
        vec![
            Effect::TeardownWarning {
                pending: 2,
                in_flight: 1
            },
            Effect::DropPending {
                ids: vec![items[1].id(), items[2].id()]
            },
        ]
    );
    assert!(state.is_closed());
    assert_eq!(state.phase_of(items[1].id()), Some(Phase::Dropped));

    let (state, effects) = enqueue(state, &downloads(1));
    assert!(effects.is_empty());

    let (state, effects) = update(state, Msg::Teardown);
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::Settled {
            id: items[0].id(),
            result: ItemResult::Succeeded { reconciled: false },
        },
    );
    assert!(effects.contains(&Effect::Drained {
        failed: 0,
        total: 3
    }));
    assert!(!state.is_busy());
}

#[test]
fn teardown_of_idle_queue_is_silent() {
    init_logging();
    let (state, effects) = update(QueueState::new(), Msg::Teardown);
    assert!(effects.is_empty());
    assert!(state.is_closed());
}
