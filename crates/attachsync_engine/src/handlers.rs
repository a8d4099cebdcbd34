use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use attachsync_core::{
    insert_placeholder, relink, remove_link, remove_link_in_region, resolve_placeholder,
    restore_placeholder,
    DeleteItem, DownloadItem, ItemResult, ProcessItem, ReconcileError, UploadItem,
};
use attachsync_logging::{sync_debug, sync_info, sync_warn};

use crate::config::{ConfigError, SyncSettings};
use crate::document::{Document, DocumentHandle};
use crate::fetch::RemoteFetcher;
use crate::filename::file_name_from_url;
use crate::providers::UploaderCache;
use crate::queue::{ItemHandler, ProgressReporter};
use crate::store::{AttachmentStore, StoreError};
use crate::uploader::UploadError;
use crate::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no document is open")]
    DocumentClosed,
}

/// Runs queued items against remote storage, the local store and the document.
pub struct SyncHandlers {
    pub(crate) document: DocumentHandle,
    pub(crate) uploaders: Arc<UploaderCache>,
    pub(crate) fetcher: Arc<dyn RemoteFetcher>,
    pub(crate) store: AttachmentStore,
    pub(crate) settings: Arc<RwLock<SyncSettings>>,
}

#[async_trait::async_trait]
impl ItemHandler for SyncHandlers {
    async fn handle(&self, item: &ProcessItem, progress: &ProgressReporter) -> ItemResult {
        let outcome = match item {
            ProcessItem::Upload(upload) => self.upload(upload, progress).await,
            ProcessItem::Download(download) => self.download(download, progress).await,
            ProcessItem::Delete(delete) => self.delete(delete).await,
        };
        match outcome {
            Ok(reconciled) => ItemResult::Succeeded { reconciled },
            Err(err) => ItemResult::Failed {
                error: err.to_string(),
            },
        }
    }
}

impl SyncHandlers {
    fn settings(&self) -> SyncSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn upload(&self, item: &UploadItem, progress: &ProgressReporter) -> Result<bool, SyncError> {
        let settings = self.settings();
        let uploader = self.uploaders.get(&settings.storage)?;
        let uploaded = uploader
            .upload_file(item.file(), item.key(), progress)
            .await?;

        let reconciled = self.rewrite(|text| relink(text, item.local_path(), &uploaded.url));
        if reconciled && settings.delete_local_after_upload {
            let local = self.store.resolve_link(item.local_path());
            match self.store.remove(&local) {
                Ok(()) => sync_info!("removed local copy {}", local.display()),
                Err(err) => sync_warn!("could not remove local copy: {}", err),
            }
        }
        Ok(reconciled)
    }

    async fn download(&self, item: &DownloadItem, progress: &ProgressReporter) -> Result<bool, SyncError> {
        let id = item.id();
        let mut originals = Vec::new();
        let marked = self.rewrite(|text| {
            insert_placeholder(text, item.url(), id).map(|placeholder| {
                originals = placeholder.originals;
                placeholder.text
            })
        });
        if !marked {
            sync_debug!("no occurrence of {} to mark; downloading anyway", item.url());
        }

        let saved = self.fetch_and_save(item, progress).await;
        match saved {
            Ok(relative) => {
                let link = self.store.link_for(&relative);
                Ok(self.rewrite(|text| resolve_placeholder(text, id, &link)))
            }
            Err(err) => {
                if marked {
                    self.rewrite(|text| restore_placeholder(text, id, &originals));
                }
                Err(err)
            }
        }
    }

    async fn fetch_and_save(
        &self,
        item: &DownloadItem,
        progress: &ProgressReporter,
    ) -> Result<PathBuf, SyncError> {
        let output = self.fetcher.fetch(item.url(), progress).await?;
        let name = file_name_from_url(
            &output.metadata.final_url,
            output.metadata.content_type.as_deref(),
        );
        let folder = self.settings().attachment_folder;
        let relative = self.store.available_path(&folder, &name);
        let written = self.store.write_binary(&relative, &output.bytes)?;
        sync_info!("saved {} to {}", item.url(), written.display());
        Ok(relative)
    }

    async fn delete(&self, item: &DeleteItem) -> Result<bool, SyncError> {
        let settings = self.settings();
        let uploader = self.uploaders.get(&settings.storage)?;
        uploader.delete_file(item.file_key()).await?;

        let reconciled = self
            .document
            .with(|doc| remove_in_scope(doc, item.file_link(), item.original_selection()))
            .unwrap_or(false);
        if !reconciled {
            sync_warn!("deleted {} but found no link to remove", item.file_link());
        }
        Ok(reconciled)
    }

    /// Applies `edit` to the current text. A miss or a closed document is logged, not raised.
    fn rewrite(&self, edit: impl FnOnce(&str) -> Result<String, ReconcileError>) -> bool {
        let applied = self.document.with(|doc| {
            let before = doc.text();
            match edit(&before) {
                Ok(after) => {
                    replace_changed_span(doc, &before, &after);
                    true
                }
                Err(err) => {
                    sync_warn!("{}", err);
                    false
                }
            }
        });
        applied.unwrap_or_else(|| {
            sync_warn!("document closed before it could be updated");
            false
        })
    }
}

/// Removes `target` from the narrowest scope that still holds it: the live
/// selection, then the selection captured at enqueue time, then the whole text.
///
/// The captured selection only counts when it occurs exactly once in the
/// current text; an ambiguous copy is never guessed at.
fn remove_in_scope(doc: &mut dyn Document, target: &str, snapshot: Option<&str>) -> bool {
    if let Some(selection) = doc.selection() {
        if let Ok(region) = remove_link_in_region(&selection.text, target) {
            doc.replace_range(&region, selection.from, selection.to);
            return true;
        }
    }
    let text = doc.text();
    if let Some(snapshot) = snapshot.filter(|s| !s.is_empty()) {
        let mut found = text.match_indices(snapshot).map(|(from, _)| from);
        match (found.next(), found.next()) {
            (Some(from), None) => {
                if let Ok(region) = remove_link_in_region(snapshot, target) {
                    doc.replace_range(&region, from, from + snapshot.len());
                    return true;
                }
            }
            (Some(_), Some(_)) => {
                sync_debug!("captured selection appears more than once; widening to the document");
            }
            _ => {}
        }
    }
    match remove_link(&text, target) {
        Ok(after) => {
            replace_changed_span(doc, &text, &after);
            true
        }
        Err(_) => false,
    }
}

/// Writes `after` over `before` as one replace of the differing middle span.
pub(crate) fn replace_changed_span(doc: &mut dyn Document, before: &str, after: &str) {
    if before == after {
        return;
    }
    let mut prefix = before
        .bytes()
        .zip(after.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    while !before.is_char_boundary(prefix) || !after.is_char_boundary(prefix) {
        prefix -= 1;
    }
    let max_suffix = before.len().min(after.len()) - prefix;
    let mut suffix = before
        .bytes()
        .rev()
        .zip(after.bytes().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();
    while !before.is_char_boundary(before.len() - suffix)
        || !after.is_char_boundary(after.len() - suffix)
    {
        suffix -= 1;
    }
    doc.replace_range(
        &after[prefix..after.len() - suffix],
        prefix,
        before.len() - suffix,
    );
}
