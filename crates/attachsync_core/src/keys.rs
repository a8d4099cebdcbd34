//! Mapping between public URLs and storage keys.
//!
//! Keys travel in URLs percent-encoded one path segment at a time, so a key
//! containing spaces, `%`, `#` or non-ASCII text survives the round trip
//! `extract_key(to_public_url(k, d), d) == k`.

use std::borrow::Cow;

use attachsync_logging::sync_debug;
use url::Url;

/// Derives the storage key a public URL points at.
///
/// A URL under `public_domain` yields everything after the domain; any other
/// URL yields its path. Query and fragment are never part of the key. The
/// result is percent-decoded when that is possible and left as-is otherwise.
pub fn extract_key(url: &str, public_domain: &str) -> String {
    let url = url.trim();
    let domain = public_domain.trim().trim_end_matches('/');

    if !domain.is_empty() {
        if let Some(rest) = url.strip_prefix(domain) {
            if rest.is_empty() || rest.starts_with('/') {
                let rest = strip_query_and_fragment(rest);
                return decode_or_raw(rest.trim_start_matches('/')).into_owned();
            }
        }
    }

    match Url::parse(url) {
        Ok(parsed) => decode_or_raw(parsed.path().trim_start_matches('/')).into_owned(),
        Err(err) => {
            sync_debug!("extract_key: '{}' is not an absolute url ({})", url, err);
            let path = strip_query_and_fragment(url);
            decode_or_raw(path.trim_start_matches('/')).into_owned()
        }
    }
}

/// Public URL for `key` under `public_domain`.
pub fn to_public_url(key: &str, public_domain: &str) -> String {
    let domain = public_domain.trim().trim_end_matches('/');
    format!("{domain}/{}", encode_key_path(key))
}

/// Percent-encodes each `/`-separated segment of a key.
pub fn encode_key_path(key: &str) -> String {
    key.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-decodes `raw`, falling back to the raw text when the bytes are not UTF-8.
pub fn decode_or_raw(raw: &str) -> Cow<'_, str> {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded,
        Err(err) => {
            sync_debug!("keeping '{}' percent-encoded: {}", raw, err);
            Cow::Borrowed(raw)
        }
    }
}

/// True when `url` is served from the same host as `public_domain`.
///
/// Only hostnames are compared: one CDN host may front several path prefixes.
pub fn is_own_link(url: &str, public_domain: &str) -> bool {
    let Some(domain_host) = host_of(public_domain) else {
        return false;
    };
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    parsed
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case(&domain_host))
}

fn host_of(public_domain: &str) -> Option<String> {
    let domain = public_domain.trim();
    if domain.is_empty() {
        return None;
    }
    let parsed = if domain.contains("://") {
        Url::parse(domain)
    } else {
        Url::parse(&format!("https://{domain}"))
    };
    parsed.ok()?.host_str().map(str::to_string)
}

fn strip_query_and_fragment(value: &str) -> &str {
    let end = value.find(['?', '#']).unwrap_or(value.len());
    &value[..end]
}
