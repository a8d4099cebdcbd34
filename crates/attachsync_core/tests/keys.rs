use attachsync_core::{encode_key_path, extract_key, is_own_link, to_public_url};
use pretty_assertions::assert_eq;

const DOMAIN: &str = "https://cdn.example.com/";

#[test]
fn public_url_round_trips_keys_with_slashes_and_spaces() {
    let keys = [
        "notes/2024/my photo.png",
        "a b/c d/e f.jpg",
        "plain.png",
        "weird/100% sure #1?.png",
        "unicode/图片 一.png",
    ];
    for key in keys {
        let url = to_public_url(key, DOMAIN);
        assert_eq!(extract_key(&url, DOMAIN), key, "url was {url}");
    }
}

#[test]
fn domain_with_path_prefix_round_trips() {
    let domain = "https://cdn.example.com/bucket";
    let url = to_public_url("folder/a b.png", domain);
    assert_eq!(url, "https://cdn.example.com/bucket/folder/a%20b.png");
    assert_eq!(extract_key(&url, domain), "folder/a b.png");
}

#[test]
fn foreign_urls_fall_back_to_their_path() {
    let key = extract_key(
        "https://other.example.org/x/y%20z.png?sig=abc",
        DOMAIN,
    );
    assert_eq!(key, "x/y z.png");
}

#[test]
fn undecodable_sequences_are_kept_raw() {
    let url = "https://cdn.example.com/bad%FFname.png";
    assert_eq!(extract_key(url, DOMAIN), "bad%FFname.png");
}

#[test]
fn extraction_is_total_for_relative_input() {
    assert_eq!(extract_key("/just/a%20path.png", DOMAIN), "just/a path.png");
}

#[test]
fn similar_domain_prefix_is_not_mistaken_for_ours() {
    let key = extract_key("https://cdn.example.com.evil.net/a.png", "https://cdn.example.com");
    assert_eq!(key, "a.png");
    assert!(!is_own_link("https://cdn.example.com.evil.net/a.png", "https://cdn.example.com"));
}

#[test]
fn ownership_compares_hostnames_only() {
    assert!(is_own_link("https://cdn.example.com/other/prefix/a.png", "https://cdn.example.com/bucket"));
    assert!(is_own_link("http://CDN.example.com/a.png", "cdn.example.com"));
    assert!(!is_own_link("https://example.com/a.png", "https://cdn.example.com"));
    assert!(!is_own_link("./local.png", "https://cdn.example.com"));
    assert!(!is_own_link("https://cdn.example.com/a.png", ""));
}

#[test]
fn key_paths_encode_per_segment() {
    assert_eq!(encode_key_path("/a b/c#d.png"), "a%20b/c%23d.png");
}
