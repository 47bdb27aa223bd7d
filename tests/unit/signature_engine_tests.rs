//! Unit tests for `SignatureEngine` matching against the embedded dataset
//! and small purpose-built datasets.

use fingerprint_worker::fingerprint::{
    Fingerprinter, SignatureDataset, SignatureEngine, TechnologySet,
};
use fingerprint_worker::protocol::HeaderMap;

fn embedded() -> SignatureEngine {
    SignatureEngine::embedded().expect("embedded dataset must compile")
}

fn engine_from(json: &str) -> SignatureEngine {
    let dataset = SignatureDataset::from_json_str(json).expect("test dataset parses");
    SignatureEngine::from_dataset(&dataset).expect("test dataset compiles")
}

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.entry((*name).to_owned())
            .or_default()
            .push((*value).to_owned());
    }
    map
}

fn set(names: &[&str]) -> TechnologySet {
    names.iter().map(|name| (*name).to_owned()).collect()
}

#[test]
fn embedded_engine_is_not_empty() {
    let engine = embedded();
    assert!(!engine.is_empty());
    assert_eq!(
        engine.len(),
        SignatureDataset::embedded().expect("embedded").len(),
        "every embedded technology must be compiled"
    );
}

#[test]
fn wordpress_script_detects_platform_and_library() {
    let body = br#"<script src="/wp-includes/js/jquery.js"></script>"#;

    let detected = embedded().fingerprint(&HeaderMap::new(), body);

    assert_eq!(detected, set(&["MySQL", "PHP", "WordPress", "jQuery"]));
}

#[test]
fn server_header_reports_version() {
    let detected = embedded().fingerprint(&headers(&[("Server", "nginx/1.25.3")]), b"");

    assert_eq!(detected, set(&["Nginx:1.25.3"]));
}

#[test]
fn header_names_are_case_insensitive() {
    let detected = embedded().fingerprint(&headers(&[("SERVER", "nginx")]), b"");

    assert_eq!(detected, set(&["Nginx"]));
}

#[test]
fn multiple_header_values_are_joined() {
    let detected = embedded().fingerprint(
        &headers(&[
            ("Via", "1.1 varnish"),
            ("Via", "1.1 abc123.cloudfront.net (CloudFront)"),
        ]),
        b"",
    );

    assert_eq!(
        detected,
        set(&["Amazon CloudFront", "Amazon Web Services", "Varnish"])
    );
}

#[test]
fn cookies_are_read_from_set_cookie() {
    let detected = embedded().fingerprint(
        &headers(&[("Set-Cookie", "PHPSESSID=abc123; path=/; HttpOnly")]),
        b"",
    );

    assert_eq!(detected, set(&["PHP"]));
}

#[test]
fn meta_generator_reports_version() {
    let body = br#"<html><head><meta name="generator" content="WordPress 6.4.2"></head></html>"#;

    let detected = embedded().fingerprint(&HeaderMap::new(), body);

    assert_eq!(detected, set(&["MySQL", "PHP", "WordPress:6.4.2"]));
}

#[test]
fn implied_technologies_are_added_transitively() {
    let detected = embedded().fingerprint(&headers(&[("Server", "openresty/1.21.4.1")]), b"");

    assert_eq!(detected, set(&["Lua", "Nginx", "OpenResty:1.21.4.1"]));
}

#[test]
fn nothing_is_detected_for_empty_input() {
    assert!(embedded().fingerprint(&HeaderMap::new(), b"").is_empty());
}

#[test]
fn repeated_calls_return_the_same_set() {
    let engine = embedded();
    let request_headers = headers(&[("X-Powered-By", "Express"), ("Server", "cloudflare")]);
    let body = br#"<div id="__nuxt"></div><script src="/_nuxt/app.js"></script>"#;

    let first = engine.fingerprint(&request_headers, body);
    let second = engine.fingerprint(&request_headers, body);

    assert_eq!(first, second);
    assert!(first.contains("Nuxt.js"));
    assert!(first.contains("Cloudflare"));
}

#[test]
fn non_utf8_body_is_matched_lossily() {
    let mut body = vec![0xff, 0xfe];
    body.extend_from_slice(br#"<script src="https://cdn.shopify.com/s/app.js"></script>"#);

    let detected = embedded().fingerprint(&HeaderMap::new(), &body);

    assert!(detected.contains("Shopify"), "got: {detected:?}");
}

#[test]
fn version_ternary_picks_branch_from_capture() {
    let engine = engine_from(
        r#"{"apps":{"Edition":{"html":"edition-(pro)?\\;version:\\1?Pro:Free"}}}"#,
    );

    assert_eq!(
        engine.fingerprint(&HeaderMap::new(), b"edition-pro"),
        set(&["Edition:Pro"])
    );
    assert_eq!(
        engine.fingerprint(&HeaderMap::new(), b"edition-"),
        set(&["Edition:Free"])
    );
}

#[test]
fn unknown_directives_are_ignored() {
    let engine = engine_from(
        r#"{"apps":{"Acme":{"html":["acme-widget\\;confidence:50"],"implies":"Acme Runtime\\;confidence:25"}}}"#,
    );

    let detected = engine.fingerprint(&HeaderMap::new(), b"<div class=acme-widget>");

    assert_eq!(detected, set(&["Acme", "Acme Runtime"]));
}

#[test]
fn empty_header_pattern_matches_presence() {
    let engine = engine_from(r#"{"apps":{"Acme":{"headers":{"X-Acme":""}}}}"#);

    assert_eq!(
        engine.fingerprint(&headers(&[("x-acme", "")]), b""),
        set(&["Acme"])
    );
    assert!(engine.fingerprint(&HeaderMap::new(), b"").is_empty());
}

#[test]
fn invalid_patterns_are_skipped_without_disabling_the_technology() {
    let engine = engine_from(
        r#"{"apps":{"Acme":{"html":["(unclosed"],"headers":{"X-Acme":"^yes$"}}}}"#,
    );

    assert_eq!(engine.len(), 1);
    assert_eq!(
        engine.fingerprint(&headers(&[("X-Acme", "yes")]), b"(unclosed"),
        set(&["Acme"])
    );
}

#[test]
fn cookie_header_pairs_are_all_considered() {
    let engine = engine_from(r#"{"apps":{"Acme":{"cookies":{"acme_session":""}}}}"#);

    let detected = engine.fingerprint(&headers(&[("Cookie", "theme=dark; acme_session=42")]), b"");

    assert_eq!(detected, set(&["Acme"]));
}
