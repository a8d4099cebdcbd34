use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use attachsync_engine::{write_atomic, SyncSettings};
use attachsync_logging::{sync_info, sync_warn};

pub(crate) const SETTINGS_FILENAME: &str = "attachsync.ron";

/// Picks the settings file: explicit path, then beside the document, then the working directory.
pub(crate) fn settings_path(explicit: Option<&Path>, doc: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let beside_doc = doc
        .and_then(Path::parent)
        .map(|dir| dir.join(SETTINGS_FILENAME));
    beside_doc
        .into_iter()
        .chain(std::iter::once(PathBuf::from(SETTINGS_FILENAME)))
        .find(|candidate| candidate.is_file())
}

pub(crate) fn load_settings(explicit: Option<&Path>, doc: Option<&Path>) -> Result<SyncSettings> {
    match settings_path(explicit, doc) {
        Some(path) => {
            let settings = SyncSettings::load(&path)
                .with_context(|| format!("loading settings from {}", path.display()))?;
            sync_info!("loaded settings from {}", path.display());
            Ok(settings)
        }
        None => {
            sync_warn!("no {} found; using defaults", SETTINGS_FILENAME);
            let mut settings = SyncSettings::default();
            settings.apply_overrides(|name| std::env::var(name).ok());
            Ok(settings)
        }
    }
}

pub(crate) fn load_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Writes `text` back only when it differs from what was loaded.
pub(crate) fn save_document_if_changed(path: &Path, original: &str, text: &str) -> Result<bool> {
    if original == text {
        return Ok(false);
    }
    write_atomic(path, text.as_bytes()).with_context(|| format!("writing {}", path.display()))?;
    sync_info!("updated {}", path.display());
    Ok(true)
}

/// Folder that relative links in `doc` resolve against.
pub(crate) fn document_root(doc: &Path) -> PathBuf {
    match doc.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
