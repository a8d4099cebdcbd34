use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use attachsync_core::{EventType, ItemResult, Phase, ProcessItem};
use attachsync_engine::{
    ConcurrencySettings, ItemHandler, NoticeLevel, ProcessingQueue, ProgressReporter,
    ProgressSink, RecordingEventSink, SyncEvent,
};
use tokio::sync::Semaphore;

#[derive(Default)]
struct CountingHandler {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<String>>,
    fail_reference: Option<String>,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait::async_trait]
impl ItemHandler for CountingHandler {
    async fn handle(&self, item: &ProcessItem, progress: &ProgressReporter) -> ItemResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started.lock().unwrap().push(item.reference().to_string());

        progress.report(50);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        } else {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_reference.as_deref() == Some(item.reference()) {
            ItemResult::Failed {
                error: "boom".to_string(),
            }
        } else {
            ItemResult::Succeeded { reconciled: true }
        }
    }
}

fn downloads(count: usize) -> Vec<ProcessItem> {
    (0..count)
        .map(|n| ProcessItem::download(format!("https://cdn.example.com/{n}.png")))
        .collect()
}

fn concurrency(download: usize) -> ConcurrencySettings {
    ConcurrencySettings {
        download,
        ..ConcurrencySettings::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn five_downloads_never_exceed_three_in_flight() {
    let handler = Arc::new(CountingHandler::default());
    let sink = Arc::new(RecordingEventSink::new());
    let queue = ProcessingQueue::new(handler.clone(), concurrency(3), sink.clone());

    assert_eq!(queue.enqueue(downloads(5)), 5);
    queue.wait_idle().await;

    assert!(handler.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(handler.started.lock().unwrap().len(), 5);

    let successes = sink
        .notices()
        .into_iter()
        .filter(|notice| notice.level == NoticeLevel::Success)
        .count();
    assert_eq!(successes, 5);

    let drained: Vec<SyncEvent> = sink
        .events()
        .into_iter()
        .filter(|event| matches!(event, SyncEvent::Drained { .. }))
        .collect();
    assert_eq!(drained, vec![SyncEvent::Drained { failed: 0, total: 5 }]);

    let status = queue.status();
    assert_eq!(status.queue_length, 0);
    assert!(!status.is_processing);
}

#[tokio::test]
async fn sequential_lane_starts_items_in_enqueue_order() {
    let handler = Arc::new(CountingHandler::default());
    let sink = Arc::new(RecordingEventSink::new());
    let queue = ProcessingQueue::new(handler.clone(), concurrency(1), sink);

    let items = downloads(4);
    let expected: Vec<String> = items.iter().map(|item| item.reference().to_string()).collect();
    queue.enqueue(items);
    queue.wait_idle().await;

    assert_eq!(*handler.started.lock().unwrap(), expected);
    assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_failure_does_not_stop_siblings_and_is_summarized() {
    let handler = Arc::new(CountingHandler {
        fail_reference: Some("https://cdn.example.com/1.png".to_string()),
        ..CountingHandler::default()
    });
    let sink = Arc::new(RecordingEventSink::new());
    let queue = ProcessingQueue::new(handler.clone(), concurrency(3), sink.clone());

    queue.enqueue(downloads(3));
    queue.wait_idle().await;

    let notices = sink.notices();
    let errors: Vec<&str> = notices
        .iter()
        .filter(|notice| notice.level == NoticeLevel::Error)
        .map(|notice| notice.message.as_str())
        .collect();
    assert_eq!(
        errors,
        vec!["Failed to download https://cdn.example.com/1.png: boom"]
    );
    assert!(notices
        .iter()
        .any(|notice| notice.level == NoticeLevel::Warning && notice.message == "1 of 3 item(s) failed"));
    assert_eq!(
        notices
            .iter()
            .filter(|notice| notice.level == NoticeLevel::Success)
            .count(),
        2
    );
}

#[tokio::test]
async fn clean_batch_has_no_summary_notice() {
    let sink = Arc::new(RecordingEventSink::new());
    let queue = ProcessingQueue::new(
        Arc::new(CountingHandler::default()),
        concurrency(2),
        sink.clone(),
    );
    queue.enqueue(downloads(2));
    queue.wait_idle().await;

    assert!(sink
        .notices()
        .iter()
        .all(|notice| notice.level == NoticeLevel::Success));
}

#[tokio::test]
async fn progress_is_forwarded_for_in_flight_items() {
    let sink = Arc::new(RecordingEventSink::new());
    let queue = ProcessingQueue::new(
        Arc::new(CountingHandler::default()),
        concurrency(1),
        sink.clone(),
    );
    let items = downloads(1);
    let id = items[0].id();
    queue.enqueue(items);
    queue.wait_idle().await;

    assert!(sink
        .events()
        .contains(&SyncEvent::Progress { id, percent: 50 }));
}

#[tokio::test]
async fn teardown_drops_pending_and_lets_in_flight_finish() {
    let gate = Arc::new(Semaphore::new(0));
    let handler = Arc::new(CountingHandler {
        gate: Some(gate.clone()),
        ..CountingHandler::default()
    });
    let sink = Arc::new(RecordingEventSink::new());
    let queue = ProcessingQueue::new(handler.clone(), concurrency(1), sink.clone());

    let items = downloads(3);
    let first = items[0].id();
    let dropped = items[2].id();
    queue.enqueue(items);
    wait_until(|| queue.phase_of(first) == Some(Phase::InFlight)).await;

    let report = queue.teardown();
    assert_eq!(report.pending, 2);
    assert_eq!(report.in_flight, 1);
    assert_eq!(queue.phase_of(dropped), Some(Phase::Dropped));
    assert_eq!(queue.enqueue(downloads(1)), 0);

    gate.add_permits(1);
    queue.wait_idle().await;

    assert_eq!(handler.started.lock().unwrap().len(), 1);
    assert!(sink.notices().iter().any(|notice| notice.level == NoticeLevel::Warning
        && notice.message.starts_with("Closing with 2 queued and 1 running")));
}

#[tokio::test]
async fn lanes_are_independent_per_event_type() {
    let gate = Arc::new(Semaphore::new(0));
    let handler = Arc::new(CountingHandler {
        gate: Some(gate.clone()),
        ..CountingHandler::default()
    });
    let sink = Arc::new(RecordingEventSink::new());
    let queue = ProcessingQueue::new(handler.clone(), ConcurrencySettings::default(), sink);

    let delete = ProcessItem::delete("https://cdn.example.com/x.png", "x.png", None);
    let download = ProcessItem::download("https://cdn.example.com/y.png");
    let (delete_id, download_id) = (delete.id(), download.id());
    assert_eq!(delete.event_type(), EventType::Delete);
    queue.enqueue(vec![delete, download]);

    wait_until(|| {
        queue.phase_of(delete_id) == Some(Phase::InFlight)
            && queue.phase_of(download_id) == Some(Phase::InFlight)
    })
    .await;

    gate.add_permits(2);
    queue.wait_idle().await;
    assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 2);
}
