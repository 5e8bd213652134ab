//! Locating and discovering BIDS datasets.
//!
//! A dataset root is recognized purely from filesystem structure, not from
//! the contents of its description file. Nested derivative datasets are
//! supported: a file under `ds000001/derivatives/fmriprep/...` belongs to
//! the dataset named `ds000001/derivatives/fmriprep`, rooted at the
//! innermost matching directory.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::config::Policy;
use crate::error::{IndexError, Result};

/// Name of the description file found at a dataset root.
pub const DATASET_DESCRIPTION: &str = "dataset_description.json";

lazy_static! {
    static ref SUBJECT_DIR_PATTERN: Regex = Regex::new(r"^sub-[a-zA-Z0-9]+$").unwrap();
}

/// The identity of a dataset: composite name plus root path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    /// `/`-joined directory names from the outermost recognized root down
    /// to the innermost, e.g. `ds000001/derivatives/fmriprep`.
    pub name: String,
    /// The innermost root directory.
    pub root: PathBuf,
}

/// Test if a path is a dataset root directory.
pub fn is_dataset_root(path: &Path, policy: &Policy) -> bool {
    use crate::config::DatasetRootRule::*;
    let description_exists = path.join(DATASET_DESCRIPTION).exists();
    match policy.dataset_root_rule {
        DescriptionOnly => description_exists,
        DescriptionOrSubjectDirs => description_exists || contains_subject_dirs(path),
    }
}

/// Check if a path contains one or more subject directories.
///
/// Short-circuits on the first matching name. Entries are not stat'ed; a
/// stray file matching the subject pattern is harmless since the later
/// recursive visit of a non-directory comes up empty.
pub fn contains_subject_dirs(path: &Path) -> bool {
    let Ok(entries) = fs::read_dir(path) else {
        return false;
    };
    entries.flatten().any(|entry| {
        SUBJECT_DIR_PATTERN.is_match(&entry.file_name().to_string_lossy())
    })
}

/// Get the dataset that `path` belongs to, if any.
///
/// Walks upward from `path` (or its parent when `path` is a file). The
/// innermost matching directory becomes the root; the walk keeps scanning
/// upward so that nested derivative datasets compose the full name, with
/// only directories chaining contiguously up from the innermost match
/// included. Returns `None` when no ancestor qualifies.
///
/// Note that the name comes from the path, not the dataset description.
pub fn locate_dataset(path: &Path, policy: &Policy) -> Option<DatasetInfo> {
    let start = if path.is_dir() { path } else { path.parent()? };

    let mut parts: Vec<String> = Vec::new();
    let mut scanning = false;
    let mut top_idx = 0;
    let mut root: Option<&Path> = None;

    for dir in start.ancestors() {
        let Some(name) = dir.file_name() else { break };
        if is_dataset_root(dir, policy) {
            scanning = true;
            top_idx = parts.len();
            if root.is_none() {
                root = Some(dir);
            }
        }
        if scanning {
            parts.push(name.to_string_lossy().into_owned());
        }
    }

    let root = root?;
    parts.truncate(top_idx + 1);
    parts.reverse();
    Some(DatasetInfo {
        name: parts.join("/"),
        root: root.to_path_buf(),
    })
}

/// Load the JSON description of a dataset root as an opaque value.
///
/// The contents are passed through without interpretation. A missing or
/// malformed file yields `None`.
pub fn dataset_description(root: &Path) -> Option<serde_json::Value> {
    let path = root.join(DATASET_DESCRIPTION);
    let text = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed dataset description");
            None
        }
    }
}

/// Find the subject directories directly under a dataset root.
///
/// Only looks one level down; nested subject directories (e.g. inside
/// derivative datasets) are not found. `include` patterns restrict the
/// result to matching names.
pub fn find_subject_dirs(root: &Path, include: &[String]) -> Result<Vec<PathBuf>> {
    let include = build_globset(include)?;
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !SUBJECT_DIR_PATTERN.is_match(&name) {
            continue;
        }
        if !include.is_empty() && !include.is_match(&name) {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    Ok(dirs)
}

// ------------- Recursive dataset search -------------

/// Options for [`find_datasets`].
#[derive(Debug, Clone)]
pub struct FindOptions {
    /// Directory name patterns to exclude from the search.
    pub exclude: Vec<String>,
    /// Search into symlinks that point to directories.
    pub follow_symlinks: bool,
    /// Maximum search depth below the root.
    pub max_depth: Option<usize>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            follow_symlinks: true,
            max_depth: None,
        }
    }
}

/// Find all dataset roots under a directory.
///
/// Once a dataset root is found, the search only descends into its
/// sub-directories that may contain nested datasets (the policy's nested
/// parent names, `derivatives` by default). Directories matching an exclude
/// pattern are pruned without comment. A missing root is a hard error;
/// unreadable entries encountered mid-walk are skipped with a warning.
pub fn find_datasets(root: &Path, policy: &Policy, options: &FindOptions) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(IndexError::NotFound(root.display().to_string()));
    }
    let exclude = build_globset(&options.exclude)?;

    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(options.follow_symlinks)
        .max_depth(options.max_depth);

    let filter_policy = policy.clone();
    builder.filter_entry(move |entry| {
        if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if exclude.is_match(name.as_ref()) {
            return false;
        }
        // Once inside a dataset, only nested-parent directories can lead to
        // further datasets.
        if let Some(parent) = entry.path().parent() {
            if is_dataset_root(parent, &filter_policy) && !filter_policy.is_nested_parent(&name) {
                return false;
            }
        }
        true
    });

    let mut datasets = Vec::new();
    let mut dir_count: u64 = 0;
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }
        dir_count += 1;
        if is_dataset_root(entry.path(), policy) {
            datasets.push(entry.path().to_path_buf());
        }
    }
    info!(directories = dir_count, datasets = datasets.len(), "dataset search complete");
    Ok(datasets)
}

/// Compile a list of glob patterns into a single matcher.
pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IndexError::Config(format!("invalid glob pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IndexError::Config(e.to_string()))
}
