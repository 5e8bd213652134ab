//! Resolving JSON sidecar metadata via the inheritance principle.
//!
//! A sidecar applies to a data file when its entities, ignoring datatype,
//! are a subset of the file's entities with equal values. Candidates are
//! searched upward from the file's directory to the enclosing dataset root
//! and merged root-to-leaf, so sidecars closer to the file override
//! broader ones.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

use crate::config::Policy;
use crate::dataset::is_dataset_root;
use crate::entities::{RawEntities, parse_entities};

/// Searches and merges sidecar metadata for data files.
///
/// Directory listings are cached per (directory, pattern) for the lifetime
/// of the resolver, which is scoped to a single indexing task. Paths are
/// treated as immutable within a run, so entries never need invalidation.
pub struct MetadataResolver<'a> {
    policy: &'a Policy,
    listing_cache: HashMap<(PathBuf, String), Vec<PathBuf>>,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        Self {
            policy,
            listing_cache: HashMap::new(),
        }
    }

    /// Resolve the full sidecar metadata for a data file.
    ///
    /// Returns the merged mapping, or `None` when no sidecar matched at
    /// any level. Malformed sidecar JSON is skipped with a warning.
    pub fn resolve(&mut self, path: &Path) -> Option<Map<String, Value>> {
        self.resolve_with(path, true)
    }

    /// Resolve only the nearest matching sidecar, without inheritance.
    pub fn resolve_nearest(&mut self, path: &Path) -> Option<Map<String, Value>> {
        self.resolve_with(path, false)
    }

    fn resolve_with(&mut self, path: &Path, inherit: bool) -> Option<Map<String, Value>> {
        let mut query = parse_entities(path);
        query.insert("ext".to_string(), ".json".to_string());

        let matches = self.find_parents(path.parent()?, &query, inherit);
        if matches.is_empty() {
            return None;
        }

        // Merge in root-to-leaf order, the reverse of discovery order, so
        // more specific sidecars win on conflicting keys.
        let mut merged = Map::new();
        for sidecar in matches.iter().rev() {
            match read_json(sidecar) {
                Ok(Value::Object(object)) => merged.extend(object),
                Ok(_) => warn!(path = %sidecar.display(), "sidecar is not a JSON object"),
                Err(e) => warn!(path = %sidecar.display(), error = %e, "bad sidecar JSON"),
            }
        }
        if merged.is_empty() { None } else { Some(merged) }
    }

    // Find sidecar files satisfying the inheritance principle for `query`,
    // in bottom-up discovery order. The search is inclusive of the dataset
    // root level and never crosses the dataset boundary.
    fn find_parents(&mut self, start: &Path, query: &RawEntities, all: bool) -> Vec<PathBuf> {
        let suffix = query.get("suffix").filter(|s| !s.is_empty());
        let pattern = match suffix {
            Some(suffix) => format!("{suffix}.json"),
            None => ".json".to_string(),
        };

        let mut found = Vec::new();
        for dir in start.ancestors() {
            if dir.file_name().is_none() {
                break;
            }
            for candidate in self.candidates(dir, &pattern) {
                let entities = parse_entities(&candidate);
                if is_inheritance_match(query, &entities) {
                    found.push(candidate);
                    if !all {
                        return found;
                    }
                }
            }
            if is_dataset_root(dir, self.policy) {
                break;
            }
        }
        found
    }

    fn candidates(&mut self, dir: &Path, pattern: &str) -> Vec<PathBuf> {
        let key = (dir.to_path_buf(), pattern.to_string());
        self.listing_cache
            .entry(key)
            .or_insert_with(|| {
                let Ok(entries) = fs::read_dir(dir) else {
                    return Vec::new();
                };
                entries
                    .flatten()
                    .filter(|entry| entry.file_name().to_string_lossy().ends_with(pattern))
                    .map(|entry| entry.path())
                    .collect()
            })
            .clone()
    }
}

fn read_json(path: &Path) -> std::result::Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

/// Test if `candidate` satisfies the inheritance principle for `query`:
/// its entities minus datatype must be a subset of the query with equal
/// values.
pub fn is_inheritance_match(query: &RawEntities, candidate: &RawEntities) -> bool {
    candidate
        .iter()
        .filter(|(key, _)| key.as_str() != "datatype")
        .all(|(key, value)| query.get(key) == Some(value))
}
