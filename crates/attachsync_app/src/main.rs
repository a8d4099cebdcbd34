mod cli;
mod logging;
mod persistence;
mod report;

use std::path::Path;
use std::process::ExitCode;
use std::sync::{mpsc, Arc, Mutex};

use anyhow::{Context, Result};
use attachsync_core::FilePayload;
use attachsync_engine::{
    create_uploader, payload_for, ChannelEventSink, Document, EventSink, SyncService,
    SyncSettings, TextDocument,
};
use attachsync_logging::{level_for_verbosity, sync_info};
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::logging::LogDestination;
use crate::persistence::{document_root, load_document, load_settings, save_document_if_changed};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let destination = if cli.log_file {
        LogDestination::Both
    } else {
        LogDestination::Terminal
    };
    logging::initialize(destination, level_for_verbosity(cli.verbose));

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let Cli {
        command,
        config,
        verbose,
        ..
    } = cli;
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;

    let doc_path = match &command {
        Commands::Check { probe } => {
            let settings = load_settings(config.as_deref(), None)?;
            return runtime.block_on(check(&settings, *probe));
        }
        Commands::Upload { doc }
        | Commands::Paste { doc, .. }
        | Commands::Download { doc }
        | Commands::Delete { doc, .. } => doc.clone(),
    };
    let settings = load_settings(config.as_deref(), Some(&doc_path))?;
    let original = load_document(&doc_path)?;
    let document = Arc::new(Mutex::new(TextDocument::new(original.clone())));

    let (tx, rx) = mpsc::channel();
    let printer = report::spawn_printer(rx, verbose > 0);
    let sink: Arc<dyn EventSink> = Arc::new(ChannelEventSink::new(tx));
    let shared = document.clone();
    let root = document_root(&doc_path);

    let outcome = runtime.block_on(async move {
        let service = SyncService::new(
            settings,
            shared.clone(),
            root,
            sink,
        );
        let queued = dispatch(&service, &shared, command)?;
        sync_info!("queued {} item(s)", queued);
        service.wait_idle().await;
        service.teardown();
        anyhow::Ok(queued)
    });
    // Dropping the runtime drops every task, and with them the last event senders.
    drop(runtime);
    let summary = printer.join().unwrap_or_default();
    outcome?;

    let text = document
        .lock()
        .map(|doc| doc.text())
        .unwrap_or_else(|poisoned| poisoned.into_inner().text());
    if save_document_if_changed(&doc_path, &original, &text)? {
        eprintln!("updated {}", doc_path.display());
    }

    Ok(if summary.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Starts the command's work on the service; returns how many items were queued.
fn dispatch(
    service: &SyncService,
    document: &Arc<Mutex<TextDocument>>,
    command: Commands,
) -> Result<usize> {
    let queued = match command {
        Commands::Upload { .. } => service.upload_document_attachments(),
        Commands::Download { .. } => service.download_remote_attachments(),
        Commands::Paste { files, .. } => {
            let payloads = files
                .iter()
                .map(|path| read_payload(path))
                .collect::<Result<Vec<_>>>()?;
            let mut doc = document
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let text = doc.text();
            if !text.is_empty() && !text.ends_with('\n') {
                doc.replace_range("\n", text.len(), text.len());
            }
            let end = doc.text().len();
            doc.set_cursor(end);
            drop(doc);
            service.paste_files(payloads)?
        }
        Commands::Delete {
            urls, selection, ..
        } => match selection {
            Some((from, to)) => {
                document
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .select(from, to);
                service.delete_selected_attachments()
            }
            None => service.delete_links(&urls),
        },
        Commands::Check { .. } => 0,
    };
    Ok(queued)
}

fn read_payload(path: &Path) -> Result<FilePayload> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(payload_for(path, bytes))
}

async fn check(settings: &SyncSettings, probe: bool) -> Result<ExitCode> {
    let uploader = create_uploader(&settings.storage).context("storage settings")?;
    uploader
        .check_connection_config()
        .context("storage settings")?;
    eprintln!("settings look valid for {:?}", uploader.provider());
    if probe {
        uploader
            .test_connection()
            .await
            .context("connection test")?;
        eprintln!("connection test passed");
    }
    Ok(ExitCode::SUCCESS)
}
