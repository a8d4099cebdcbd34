use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use attachsync_core::decode_or_raw;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("directory missing or not writable: {0}")]
    Dir(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Ensure a directory exists; create if missing.
pub fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| StoreError::Dir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(StoreError::Dir(format!("{} is not a directory", dir.display())));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| StoreError::Dir(e.to_string()))?;
    }
    Ok(())
}

/// Write to a temp file beside `target`, then rename over it.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(dir)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(content).map_err(|e| StoreError::io(target, e))?;
    tmp.flush().map_err(|e| StoreError::io(target, e))?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| StoreError::io(target, e))?;
    tmp.persist(target)
        .map_err(|e| StoreError::io(target, e.error))?;
    Ok(())
}

/// Files next to the document: attachments to upload, and downloads.
///
/// Link targets in the document are relative to `root`.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem path for a link target as written in the document.
    pub fn resolve_link(&self, target: &str) -> PathBuf {
        let decoded = decode_or_raw(target.trim());
        let relative = decoded.trim_start_matches("./");
        let path = Path::new(relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Link target for a path relative to `root`, as markdown wants it.
    pub fn link_for(&self, relative: &Path) -> String {
        let joined: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                Component::ParentDir => Some("..".to_string()),
                _ => None,
            })
            .collect();
        joined
            .join("/")
            .replace('%', "%25")
            .replace(' ', "%20")
            .replace('(', "%28")
            .replace(')', "%29")
    }

    pub fn read_binary(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        fs::read(path).map_err(|e| StoreError::io(path, e))
    }

    /// Writes `bytes` at `relative` under `root`; returns the absolute path.
    pub fn write_binary(&self, relative: &Path, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let target = self.root.join(relative);
        write_atomic(&target, bytes)?;
        Ok(target)
    }

    pub fn remove(&self, path: &Path) -> Result<(), StoreError> {
        fs::remove_file(path).map_err(|e| StoreError::io(path, e))
    }

    /// First free `folder/name`, then `folder/stem 1.ext`, `folder/stem 2.ext`, ...
    pub fn available_path(&self, folder: &str, preferred_name: &str) -> PathBuf {
        let folder = Path::new(folder.trim_matches('/'));
        let (stem, ext) = match preferred_name.rfind('.') {
            Some(dot) if dot > 0 => (&preferred_name[..dot], Some(&preferred_name[dot + 1..])),
            _ => (preferred_name, None),
        };
        let candidate = |n: usize| -> PathBuf {
            let name = match (n, ext) {
                (0, _) => preferred_name.to_string(),
                (n, Some(ext)) => format!("{stem} {n}.{ext}"),
                (n, None) => format!("{stem} {n}"),
            };
            folder.join(name)
        };
        (0..)
            .map(candidate)
            .find(|relative| !self.root.join(relative).exists())
            .unwrap_or_else(|| folder.join(preferred_name))
    }
}
