//! Attachsync core: link scanning, URL/key mapping, reconciliation and the
//! pure queue state machine. No IO happens in this crate.
mod effect;
mod item;
mod keys;
mod links;
mod msg;
mod reconcile;
mod references;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use item::{DeleteItem, DownloadItem, EventType, FilePayload, ItemId, ProcessItem, UploadItem};
pub use keys::{decode_or_raw, encode_key_path, extract_key, is_own_link, to_public_url};
pub use links::{scan_links, LinkKind, LinkScanner, MarkdownLink};
pub use msg::{ItemResult, ItemSummary, Msg};
pub use reconcile::{
    insert_placeholder, placeholder_url, relink, remove_link, remove_link_in_region,
    replace_link, resolve_placeholder, restore_placeholder, targets_match, Placeholder,
    ReconcileError,
};
pub use references::{
    find_bare_urls, find_download_candidates, find_upload_candidates, has_allowed_extension,
    is_remote, LocatedUrl, DEFAULT_ALLOWED_EXTENSIONS,
};
pub use state::{Phase, QueueState};
pub use update::update;
pub use view_model::{ItemRow, QueueView};
