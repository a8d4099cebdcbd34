//! Prints engine events to stderr from a background thread.

use std::sync::mpsc;
use std::thread;

use attachsync_engine::{Notice, NoticeLevel, SyncEvent};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) errors: usize,
    pub(crate) settled: usize,
}

/// Runs until every sender is gone, then returns what it saw.
pub(crate) fn spawn_printer(rx: mpsc::Receiver<SyncEvent>, show_progress: bool) -> thread::JoinHandle<Summary> {
    thread::spawn(move || {
        let mut summary = Summary::default();
        for event in rx {
            if let Some(line) = render(&event, show_progress) {
                eprintln!("{line}");
            }
            match event {
                SyncEvent::Notice(Notice {
                    level: NoticeLevel::Error,
                    ..
                }) => summary.errors += 1,
                SyncEvent::Drained { total, .. } => summary.settled += total,
                _ => {}
            }
        }
        summary
    })
}

pub(crate) fn render(event: &SyncEvent, show_progress: bool) -> Option<String> {
    match event {
        SyncEvent::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Success => "ok",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Error => "error",
            };
            Some(format!("[{tag}] {}", notice.message))
        }
        SyncEvent::Progress { id, percent } if show_progress => {
            let short = id.simple().to_string();
            Some(format!("[{}] {percent:>3}%", &short[..8]))
        }
        SyncEvent::Progress { .. } => None,
        SyncEvent::Drained { failed, total } => {
            Some(format!("done: {} of {total} succeeded", total - failed))
        }
    }
}
