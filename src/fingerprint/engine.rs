//! Regex signature engine.
//!
//! [`SignatureEngine`] compiles a [`SignatureDataset`] once at startup and
//! then answers [`Fingerprinter::fingerprint`] calls without mutation, so a
//! single instance serves every record.
//!
//! # Pattern syntax
//!
//! Patterns are case-insensitive regular expressions optionally followed by
//! `\;`-separated directives. Only `version:` is evaluated; `\1`-style
//! references are replaced with capture groups and `\1?a:b` picks `a` when
//! group 1 matched something and `b` otherwise. Other directives such as
//! `confidence:` are accepted and ignored.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::{Captures, Regex, RegexBuilder};
use tracing::{info, warn};

use super::signatures::{AppSignature, SignatureDataset};
use super::{Fingerprinter, TechnologySet};
use crate::protocol::HeaderMap;
use crate::{AppError, Result};

const DIRECTIVE_SEPARATOR: &str = "\\;";

/// Upper bound on the compiled size of a single signature pattern.
const PATTERN_SIZE_LIMIT: usize = 1 << 21;

#[derive(Debug)]
struct Pattern {
    regex: Regex,
    version: Option<String>,
}

impl Pattern {
    fn compile(raw: &str) -> std::result::Result<Self, regex::Error> {
        let mut parts = raw.split(DIRECTIVE_SEPARATOR);
        let expression = parts.next().unwrap_or_default();
        let version = parts
            .find_map(|directive| directive.strip_prefix("version:"))
            .map(str::to_owned);
        let regex = RegexBuilder::new(expression)
            .case_insensitive(true)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()?;
        Ok(Self { regex, version })
    }

    /// `None` when the pattern does not match, otherwise the extracted
    /// version (if the pattern has one and it rendered non-empty).
    fn evaluate(&self, haystack: &str) -> Option<Option<String>> {
        let Some(template) = self.version.as_deref() else {
            return self.regex.is_match(haystack).then_some(None);
        };
        let captures = self.regex.captures(haystack)?;
        Some(render_version(template, &captures))
    }
}

fn render_version(template: &str, captures: &Captures<'_>) -> Option<String> {
    let rendered = match template.split_once('?') {
        Some((condition, branches)) => {
            let (present, absent) = branches.split_once(':').unwrap_or((branches, ""));
            if substitute(condition, captures).is_empty() {
                substitute(absent, captures)
            } else {
                substitute(present, captures)
            }
        }
        None => substitute(template, captures),
    };
    let trimmed = rendered.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn substitute(template: &str, captures: &Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(group) = chars.peek().and_then(|next| next.to_digit(10)) {
                chars.next();
                if let Some(capture) = captures.get(group as usize) {
                    out.push_str(capture.as_str());
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// HTML fragments the signatures are matched against.
#[derive(Debug)]
struct Extractors {
    script_src: Regex,
    meta_tag: Regex,
    meta_name: Regex,
    meta_content: Regex,
}

impl Extractors {
    fn new() -> Result<Self> {
        let build = |expression: &str| {
            Regex::new(expression)
                .map_err(|err| AppError::Signature(format!("invalid extractor pattern: {err}")))
        };
        Ok(Self {
            script_src: build(r#"(?is)<script\b[^>]*?\bsrc\s*=\s*["']?([^"'\s>]+)"#)?,
            meta_tag: build(r"(?is)<meta\b[^>]*>")?,
            meta_name: build(r#"(?is)\b(?:name|property)\s*=\s*["']?([^"'\s>]+)"#)?,
            meta_content: build(r#"(?is)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)'|([^"'\s>]+))"#)?,
        })
    }
}

/// Everything a request exposes to the signatures.
struct Evidence<'a> {
    /// Lowercased header name → values joined with `", "`.
    headers: BTreeMap<String, String>,
    /// Lowercased cookie name → value.
    cookies: BTreeMap<String, String>,
    html: &'a str,
    script_sources: Vec<&'a str>,
    /// Lowercased meta name → content.
    meta: Vec<(String, &'a str)>,
}

impl<'a> Evidence<'a> {
    fn collect(extractors: &Extractors, raw_headers: &HeaderMap, html: &'a str) -> Self {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        let mut cookies = BTreeMap::new();

        for (name, values) in raw_headers {
            let name = name.to_ascii_lowercase();
            match name.as_str() {
                "set-cookie" => {
                    for value in values {
                        if let Some(pair) = value.split(';').next() {
                            insert_cookie(&mut cookies, pair);
                        }
                    }
                }
                "cookie" => {
                    for pair in values.iter().flat_map(|value| value.split(';')) {
                        insert_cookie(&mut cookies, pair);
                    }
                }
                _ => {}
            }

            let joined = headers.entry(name).or_default();
            for value in values {
                if !joined.is_empty() {
                    joined.push_str(", ");
                }
                joined.push_str(value);
            }
        }

        let script_sources = extractors
            .script_src
            .captures_iter(html)
            .filter_map(|caps| caps.get(1).map(|src| src.as_str()))
            .collect();

        let meta = extractors
            .meta_tag
            .find_iter(html)
            .filter_map(|tag| {
                let tag = tag.as_str();
                let name = extractors.meta_name.captures(tag)?.get(1)?;
                let content = extractors.meta_content.captures(tag)?;
                let content = content.get(1).or(content.get(2)).or(content.get(3))?;
                Some((name.as_str().to_ascii_lowercase(), content.as_str()))
            })
            .collect();

        Self {
            headers,
            cookies,
            html,
            script_sources,
            meta,
        }
    }
}

fn insert_cookie(cookies: &mut BTreeMap<String, String>, pair: &str) {
    if let Some((name, value)) = pair.split_once('=') {
        cookies.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
    }
}

#[derive(Debug)]
struct CompiledApp {
    name: String,
    headers: Vec<(String, Pattern)>,
    cookies: Vec<(String, Pattern)>,
    html: Vec<Pattern>,
    script_src: Vec<Pattern>,
    meta: Vec<(String, Pattern)>,
    implies: Vec<String>,
}

impl CompiledApp {
    fn compile(name: &str, app: &AppSignature) -> Self {
        let keyed = |field: &str, entries: &BTreeMap<String, String>| -> Vec<(String, Pattern)> {
            entries
                .iter()
                .filter_map(|(key, raw)| {
                    compile_logged(name, field, raw).map(|p| (key.to_ascii_lowercase(), p))
                })
                .collect()
        };

        let listed = |field: &str, raws: &[String]| -> Vec<Pattern> {
            raws.iter()
                .filter_map(|raw| compile_logged(name, field, raw))
                .collect()
        };

        let meta = app
            .meta
            .iter()
            .flat_map(|(key, raws)| raws.0.iter().map(move |raw| (key, raw)))
            .filter_map(|(key, raw)| {
                compile_logged(name, "meta", raw).map(|p| (key.to_ascii_lowercase(), p))
            })
            .collect();

        let implies = app
            .implies
            .0
            .iter()
            .filter_map(|implied| implied.split(DIRECTIVE_SEPARATOR).next())
            .map(str::trim)
            .filter(|implied| !implied.is_empty())
            .map(str::to_owned)
            .collect();

        Self {
            name: name.to_owned(),
            headers: keyed("headers", &app.headers),
            cookies: keyed("cookies", &app.cookies),
            html: listed("html", &app.html.0),
            script_src: listed("scriptSrc", &app.script_src.0),
            meta,
            implies,
        }
    }

    /// `None` when nothing matched, otherwise the first non-empty version
    /// found (or `Some(None)` when every match was versionless).
    fn detect(&self, evidence: &Evidence<'_>) -> Option<Option<String>> {
        let header_hits = self.headers.iter().filter_map(|(name, pattern)| {
            evidence
                .headers
                .get(name)
                .and_then(|value| pattern.evaluate(value))
        });
        let cookie_hits = self.cookies.iter().filter_map(|(name, pattern)| {
            evidence
                .cookies
                .get(name)
                .and_then(|value| pattern.evaluate(value))
        });
        let html_hits = self
            .html
            .iter()
            .filter_map(|pattern| pattern.evaluate(evidence.html));
        let script_hits = self.script_src.iter().flat_map(|pattern| {
            evidence
                .script_sources
                .iter()
                .filter_map(move |src| pattern.evaluate(src))
        });
        let meta_hits = self.meta.iter().flat_map(|(name, pattern)| {
            evidence
                .meta
                .iter()
                .filter(move |(meta_name, _)| meta_name == name)
                .filter_map(move |(_, content)| pattern.evaluate(content))
        });

        let mut detection = None;
        for version in header_hits
            .chain(cookie_hits)
            .chain(html_hits)
            .chain(script_hits)
            .chain(meta_hits)
        {
            if version.is_some() {
                return Some(version);
            }
            detection = Some(None);
        }
        detection
    }
}

fn compile_logged(app: &str, field: &str, raw: &str) -> Option<Pattern> {
    match Pattern::compile(raw) {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            warn!(app, field, pattern = raw, %err, "invalid signature pattern, skipping");
            None
        }
    }
}

/// Compiled, read-only signature matcher.
#[derive(Debug)]
pub struct SignatureEngine {
    apps: Vec<CompiledApp>,
    index: HashMap<String, usize>,
    extractors: Extractors,
}

impl SignatureEngine {
    /// Compile every signature in `dataset`.
    ///
    /// Patterns the regex engine rejects are skipped with a warning; the
    /// rest of the technology's signatures still apply.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signature`] if the HTML extractors fail to compile.
    pub fn from_dataset(dataset: &SignatureDataset) -> Result<Self> {
        let apps: Vec<CompiledApp> = dataset
            .apps
            .iter()
            .map(|(name, app)| CompiledApp::compile(name, app))
            .collect();
        let index = apps
            .iter()
            .enumerate()
            .map(|(position, app)| (app.name.clone(), position))
            .collect();

        Ok(Self {
            apps,
            index,
            extractors: Extractors::new()?,
        })
    }

    /// Engine built from the embedded dataset only.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signature`] if the embedded dataset is unusable.
    pub fn embedded() -> Result<Self> {
        Self::from_dataset(&SignatureDataset::embedded()?)
    }

    /// Engine built from the embedded dataset, superseded by `fingerprints`
    /// when a path is given.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signature`] if a dataset cannot be read or parsed.
    pub fn load(fingerprints: Option<&Path>) -> Result<Self> {
        let dataset = SignatureDataset::resolve(fingerprints)?;
        let engine = Self::from_dataset(&dataset)?;
        info!(technologies = engine.len(), "signature engine ready");
        Ok(engine)
    }

    /// Number of compiled technologies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether the engine knows no technologies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    fn implied_by(&self, name: &str) -> impl Iterator<Item = &str> + '_ {
        self.index
            .get(name)
            .and_then(|position| self.apps.get(*position))
            .into_iter()
            .flat_map(|app| app.implies.iter().map(String::as_str))
    }
}

impl Fingerprinter for SignatureEngine {
    fn fingerprint(&self, headers: &HeaderMap, body: &[u8]) -> TechnologySet {
        let html = String::from_utf8_lossy(body);
        let evidence = Evidence::collect(&self.extractors, headers, &html);

        let mut detected: BTreeMap<String, Option<String>> = self
            .apps
            .iter()
            .filter_map(|app| app.detect(&evidence).map(|version| (app.name.clone(), version)))
            .collect();

        let mut pending: Vec<&str> = detected
            .keys()
            .flat_map(|name| self.implied_by(name))
            .collect();
        while let Some(name) = pending.pop() {
            if !detected.contains_key(name) {
                detected.insert(name.to_owned(), None);
                pending.extend(self.implied_by(name));
            }
        }

        detected
            .into_iter()
            .map(|(name, version)| match version {
                Some(version) => format!("{name}:{version}"),
                None => name,
            })
            .collect()
    }
}
