//! Indexer configuration.
//!
//! The classification heuristics that vary between BIDS datasets in the
//! wild are policy, not hardcoded law: the dataset-root rule, the list of
//! suffixes that are data despite a `.json` extension, and the directory
//! names that may contain nested datasets. [`IndexerConfig`] carries them,
//! with defaults layered under an optional `bidsindex.toml` file and
//! `BIDSINDEX_*` environment variables.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// What makes a directory a dataset root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetRootRule {
    /// Only a dataset description file marks a root.
    DescriptionOnly,
    /// A description file or at least one subject sub-directory marks a
    /// root. It's common to forget the description file, so this is the
    /// default.
    DescriptionOrSubjectDirs,
}

/// Classification policy knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub dataset_root_rule: DatasetRootRule,
    /// Suffixes of files that are data despite a plain `.json` extension.
    pub sidecar_exception_suffixes: Vec<String>,
    /// Additionally require a same-suffix non-JSON sibling before treating
    /// a JSON file as a sidecar.
    pub require_sibling_match: bool,
    /// Dataset sub-directories that may contain nested datasets.
    pub nested_parent_dirnames: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            dataset_root_rule: DatasetRootRule::DescriptionOrSubjectDirs,
            sidecar_exception_suffixes: vec!["coordsystem".to_string()],
            require_sibling_match: false,
            nested_parent_dirnames: vec!["derivatives".to_string()],
        }
    }
}

impl Policy {
    pub fn is_sidecar_exception(&self, suffix: &str) -> bool {
        self.sidecar_exception_suffixes.iter().any(|s| s == suffix)
    }

    pub fn is_nested_parent(&self, dirname: &str) -> bool {
        self.nested_parent_dirnames.iter().any(|d| d == dirname)
    }
}

/// Defaults for the indexing run itself.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexDefaults {
    /// Worker threads; 0 runs in the calling thread.
    pub workers: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub policy: Policy,
    pub index: IndexDefaults,
}

impl IndexerConfig {
    /// Load the configuration.
    ///
    /// Defaults are layered under `path` (or a `bidsindex.toml` in the
    /// working directory when no path is given) and `BIDSINDEX_*`
    /// environment variables. A malformed file is a hard error.
    pub fn load(path: Option<&Path>) -> Result<IndexerConfig> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("bidsindex").required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix("BIDSINDEX").separator("__"),
        );
        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }
}
