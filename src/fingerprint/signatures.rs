//! Signature dataset model and loading.
//!
//! Parses the Wappalyzer `fingerprints_data.json` layout:
//!
//! ```json
//! {"apps": {"WordPress": {"cats": [1], "scriptSrc": "/wp-(?:content|includes)/", "implies": ["PHP"]}}}
//! ```
//!
//! Fields this engine does not evaluate (`cats`, `js`, `dom`, `icon`, …) are
//! ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::{AppError, Result};

/// Signature dataset compiled into the binary.
pub const EMBEDDED_FINGERPRINTS: &str = include_str!("../../data/fingerprints.json");

/// A field that may be written as one string or as a list of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OneOrMany(pub Vec<String>);

impl<'de> Deserialize<'de> for OneOrMany {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(value) => Self(vec![value]),
            Raw::Many(values) => Self(values),
        })
    }
}

/// Detection rules for a single technology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSignature {
    /// Header name → value pattern. An empty pattern matches presence.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Cookie name → value pattern.
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    /// Patterns matched against the whole body.
    #[serde(default)]
    pub html: OneOrMany,
    /// Patterns matched against `<script src>` URLs.
    #[serde(default)]
    pub script_src: OneOrMany,
    /// `<meta>` name → content pattern(s).
    #[serde(default)]
    pub meta: BTreeMap<String, OneOrMany>,
    /// Technologies implied by this one.
    #[serde(default)]
    pub implies: OneOrMany,
}

/// A complete signature dataset keyed by technology name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignatureDataset {
    /// Technology name → detection rules.
    #[serde(default)]
    pub apps: BTreeMap<String, AppSignature>,
}

impl SignatureDataset {
    /// Parse the dataset embedded at build time.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signature`] if the embedded JSON is malformed.
    pub fn embedded() -> Result<Self> {
        Self::from_json_str(EMBEDDED_FINGERPRINTS)
    }

    /// Parse a dataset from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signature`] if the JSON is malformed.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| AppError::Signature(format!("malformed signature dataset: {err}")))
    }

    /// Read and parse a dataset file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signature`] if the file cannot be read or parsed.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Signature(format!(
                "failed to read signature dataset {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    /// Replace or add every entry of `other`, keyed by technology name.
    ///
    /// Returns the number of existing entries that were replaced.
    pub fn supersede(&mut self, other: Self) -> usize {
        let mut replaced = 0;
        for (name, app) in other.apps {
            if self.apps.insert(name, app).is_some() {
                replaced += 1;
            }
        }
        replaced
    }

    /// Embedded dataset, superseded by the file at `path` when given.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Signature`] if either dataset cannot be loaded.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut dataset = Self::embedded()?;
        if let Some(path) = path {
            let overrides = Self::load_from_path(path)?;
            let provided = overrides.apps.len();
            let replaced = dataset.supersede(overrides);
            info!(
                path = %path.display(),
                provided,
                replaced,
                "signature dataset override applied"
            );
        }
        Ok(dataset)
    }

    /// Number of technologies in the dataset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether the dataset has no technologies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
