use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "attachsync")]
#[command(author, version)]
#[command(about = "Move markdown attachments between local files and remote object storage")]
#[command(after_help = "\
EXAMPLES:

    # Upload every local attachment a note links to, and relink it
    attachsync upload notes/trip.md

    # Save screenshots next to the note, link them and upload them
    attachsync paste notes/trip.md ~/Desktop/shot.png

    # Pull remote attachments back into ./attachments
    attachsync download notes/trip.md

    # Delete stored files and drop their links
    attachsync delete notes/trip.md https://cdn.example.com/img/a.png

    # Validate settings, then round-trip a probe object
    attachsync check --probe

CONFIGURATION:

Settings are read from --config, else attachsync.ron next to the document,
else attachsync.ron in the current directory. Secrets may come from
ATTACHSYNC_ACCESS_KEY_ID, ATTACHSYNC_SECRET_ACCESS_KEY and
ATTACHSYNC_WEBDAV_PASSWORD.")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a RON settings file
    #[arg(long, global = true, env = "ATTACHSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log more; repeat for more detail
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write the log to ./attachsync.log
    #[arg(long, global = true)]
    pub log_file: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload local attachments linked from a document and relink them
    Upload {
        /// Markdown document to process
        doc: PathBuf,
    },

    /// Copy files into the attachment folder, link them at the end of the document, upload them
    Paste {
        /// Markdown document to link the files from
        doc: PathBuf,
        /// Files to paste
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Download attachments served from the configured public domain
    Download {
        /// Markdown document to process
        doc: PathBuf,
    },

    /// Delete stored attachments and remove their links
    Delete {
        /// Markdown document to edit
        doc: PathBuf,
        /// Public URLs to delete
        urls: Vec<String>,
        /// Byte range `FROM:TO` of the document to treat as the selection
        #[arg(long, value_parser = parse_range, conflicts_with = "urls")]
        selection: Option<(usize, usize)>,
    },

    /// Validate storage settings without uploading anything
    Check {
        /// Also upload and delete a small probe object
        #[arg(long)]
        probe: bool,
    },
}

fn parse_range(value: &str) -> Result<(usize, usize), String> {
    let (from, to) = value
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got {value}"))?;
    let from = from.trim().parse::<usize>().map_err(|e| e.to_string())?;
    let to = to.trim().parse::<usize>().map_err(|e| e.to_string())?;
    if from > to {
        return Err(format!("range start {from} is after its end {to}"));
    }
    Ok((from, to))
}
