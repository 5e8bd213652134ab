//! Classifying paths in a dataset tree.
//!
//! A path is only indexed when it is a genuine data file: not a JSON
//! sidecar, and not a child of a directory that is itself treated as a
//! single data file. Both predicates are pure functions of the path string
//! and the classification [`Policy`].

use std::fs;
use std::path::Path;

use crate::config::Policy;
use crate::entities::parse_entities;

/// Check if a path is a data file belonging to the dataset.
pub fn is_data_file(path: &Path, policy: &Policy) -> bool {
    // initial fast checks for a missing extension or a name that doesn't
    // start with the subject prefix
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    if !name.starts_with("sub-") {
        return false;
    }
    if path.extension().is_none_or(|e| e.is_empty()) {
        return false;
    }

    let entities = parse_entities(path);
    let has = |key: &str| entities.get(key).is_some_and(|v| !v.is_empty());
    if !(has("suffix") && has("ext")) {
        return false;
    }

    if is_json_sidecar(path, policy) {
        return false;
    }

    // special case for directories treated as single data files, e.g.
    // microscopy .ome.zarr or MEG .ds directories; their contents must not
    // be counted again
    if let Some(parent) = path.parent() {
        if is_data_file(parent, policy) {
            return false;
        }
    }
    true
}

/// Check if a file is a JSON sidecar rather than a data file.
pub fn is_json_sidecar(path: &Path, policy: &Policy) -> bool {
    // quick check on the last extension segment
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return false;
    }

    let entities = parse_entities(path);

    // second pass on the full compound extension, for data files whose
    // extension merely ends in .json (e.g. .surf.json)
    if entities.get("ext").map(String::as_str) != Some(".json") {
        return false;
    }

    // JSON above the per-datatype level is presumed inheritable
    if !entities.contains_key("datatype") {
        return true;
    }

    // sidecars at the datatype level must carry a suffix, and a few
    // suffixes are data despite the plain .json extension
    let Some(suffix) = entities.get("suffix") else {
        return false;
    };
    if policy.is_sidecar_exception(suffix) {
        return false;
    }

    if policy.require_sibling_match {
        return has_matching_sibling(path, suffix);
    }
    true
}

// A sidecar under the stricter policy must sit next to at least one file
// with the same suffix and a non-JSON extension.
fn has_matching_sibling(path: &Path, suffix: &str) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    let Ok(entries) = fs::read_dir(parent) else {
        return false;
    };
    let needle = format!("_{suffix}");
    entries.flatten().any(|entry| {
        let name = entry.file_name().to_string_lossy().into_owned();
        name.match_indices(&needle)
            .any(|(idx, _)| !name[idx + needle.len()..].starts_with(".json"))
    })
}
