//! Parsing and validation of BIDS file name entities.
//!
//! [`parse_entities`] is the pure file name grammar: it maps a path to a raw
//! string map without any semantic checks. [`validate_entities`] then splits
//! the raw map against a [`SchemaRegistry`](crate::schema::SchemaRegistry)
//! into typed, schema-valid entities and opaque extras.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::BuildHasherDefault;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use seahash::SeaHasher;
use tracing::warn;

use crate::schema::{EntityKind, SchemaRegistry};

pub type EntityHasher = BuildHasherDefault<SeaHasher>;

/// Raw `key -> value` entity map parsed from a file name. Not validated.
pub type RawEntities = HashMap<String, String, EntityHasher>;

/// Entities that passed schema validation, keyed by short name.
pub type ValidEntities = BTreeMap<String, EntityValue>;

/// Entities the schema does not recognize, or whose values failed
/// coercion or an allowed-values check.
pub type ExtraEntities = BTreeMap<String, String>;

lazy_static! {
    // Matches the sub-directory after the subject ('sub-abc') and optionally
    // session ('ses-01') directories. Must be all lowercase.
    static ref DATATYPE_PATTERN: Regex =
        Regex::new(r"sub-[a-zA-Z0-9]+(?:[/\\]ses-[a-zA-Z0-9]+)?[/\\]([a-z]+)[/\\]").unwrap();
}

// ------------- Entity values -------------

/// A typed entity value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityValue {
    Label(String),
    Index(i32),
}

impl EntityValue {
    pub fn as_label(&self) -> Option<&str> {
        match self {
            EntityValue::Label(s) => Some(s),
            EntityValue::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<i32> {
        match self {
            EntityValue::Label(_) => None,
            EntityValue::Index(i) => Some(*i),
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EntityValue::Label(s) => write!(f, "{}", s),
            EntityValue::Index(i) => write!(f, "{}", i),
        }
    }
}

// ------------- Parsing -------------

/// Parse entities from a BIDS file path.
///
/// Parses all file name `{key}-{value}` entities as well as the special
/// entities datatype, suffix and ext (extension). Does not validate entities
/// or cast to types. Pure and deterministic; re-parsing is cheap enough that
/// results are not memoized.
pub fn parse_entities(path: &Path) -> RawEntities {
    let mut entities = RawEntities::default();

    let filename = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return entities,
    };
    let mut parts: Vec<&str> = filename.split('_').collect();

    let datatype = parse_datatype(path);

    // Split the trailing segment at its first '.' into suffix and extension,
    // so that compound extensions like '.nii.gz' are captured whole.
    let suffix_ext = parts.pop().unwrap_or("");
    let (mut suffix, ext) = match suffix_ext.find('.') {
        Some(idx) => (Some(&suffix_ext[..idx]), Some(&suffix_ext[idx..])),
        None => (Some(suffix_ext), None),
    };

    // A suffix containing '-' is actually a trailing entity, put it back.
    if let Some(s) = suffix {
        if s.contains('-') {
            parts.push(s);
            suffix = None;
        }
    }

    // Split entities, skipping any segment that doesn't contain a '-'.
    for part in parts {
        if let Some((key, value)) = part.split_once('-') {
            entities.insert(key.to_string(), value.to_string());
        }
    }

    if let Some(datatype) = datatype {
        entities.insert("datatype".to_string(), datatype);
    }
    if let Some(suffix) = suffix {
        entities.insert("suffix".to_string(), suffix.to_string());
    }
    if let Some(ext) = ext {
        entities.insert("ext".to_string(), ext.to_string());
    }
    entities
}

/// Parse the datatype from the directory structure of a file path.
///
/// The datatype is assumed to be the name of the sub-directory after the
/// subject and (optionally) session directories. Returns `None` if there is
/// no match.
fn parse_datatype(path: &Path) -> Option<String> {
    let path = path.to_string_lossy();
    DATATYPE_PATTERN
        .captures(&path)
        .map(|captures| captures[1].to_string())
}

// ------------- Validation -------------

/// Validate raw entities against a schema registry.
///
/// Coerces each known entity value to its declared kind and checks it
/// against the allowed values, if any. Returns the schema-valid entities
/// plus any leftover extras that don't match. A failing entity is moved to
/// the extras with a warning; validation itself never fails.
pub fn validate_entities(
    raw: &RawEntities,
    schema: &SchemaRegistry,
) -> (ValidEntities, ExtraEntities) {
    let mut valid = ValidEntities::new();
    let mut extra = ExtraEntities::new();

    for (key, value) in raw {
        let Some(spec) = schema.lookup(key) else {
            extra.insert(key.clone(), value.clone());
            continue;
        };

        let typed = match spec.kind {
            EntityKind::Index => match value.parse::<i32>() {
                Ok(index) => EntityValue::Index(index),
                Err(_) => {
                    warn!(entity = %key, value = %value, "unable to coerce value to an index");
                    extra.insert(key.clone(), value.clone());
                    continue;
                }
            },
            EntityKind::Label | EntityKind::Special => EntityValue::Label(value.clone()),
        };

        if let Some(allowed) = &spec.allowed {
            if !allowed.iter().any(|a| a == value) {
                warn!(
                    entity = %key, value = %value,
                    "value is not one of the allowed values"
                );
                extra.insert(key.clone(), value.clone());
                continue;
            }
        }

        valid.insert(key.clone(), typed);
    }

    (valid, extra)
}

// ------------- Formatting -------------

/// Construct a BIDS path from validated entities, the inverse of
/// [`parse_entities`] followed by [`validate_entities`].
///
/// Key-value entities are emitted in specification order, the suffix after
/// a final `_`, the extension verbatim, prefixed by the datatype, session
/// and subject directories where present.
pub fn format_entities(entities: &ValidEntities, schema: &SchemaRegistry) -> PathBuf {
    let mut segments: Vec<String> = Vec::new();
    for spec in schema.entries() {
        if spec.kind == EntityKind::Special {
            continue;
        }
        if let Some(value) = entities.get(&spec.key) {
            segments.push(format!("{}-{}", spec.key, value));
        }
    }
    // Keys unknown to the schema still format as key-value segments.
    for (key, value) in entities {
        if schema.lookup(key).is_none() {
            segments.push(format!("{}-{}", key, value));
        }
    }
    let mut name = segments.join("_");

    if let Some(suffix) = entities.get("suffix") {
        name.push('_');
        name.push_str(&suffix.to_string());
    }
    if let Some(ext) = entities.get("ext") {
        name.push_str(&ext.to_string());
    }

    let mut path = PathBuf::new();
    if let Some(sub) = entities.get("sub") {
        path.push(format!("sub-{}", sub));
    }
    if let Some(ses) = entities.get("ses") {
        path.push(format!("ses-{}", ses));
    }
    if let Some(datatype) = entities.get("datatype") {
        path.push(datatype.to_string());
    }
    path.push(name);
    path
}
