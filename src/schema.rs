//! The entity schema registry.
//!
//! Entities are the typed key-value attributes encoded in BIDS file names
//! (e.g. `sub-01`). Which keys exist, what value kind they carry and which
//! values they allow is defined by a versioned specification document. The
//! [`SchemaRegistry`] owns the loaded specification and derives everything
//! the other modules need from it: key and long-name lookups and the
//! columnar [`Schema`] of the dataset index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arrow::datatypes::{DataType, Field, Fields, Schema, TimeUnit};
use bimap::BiMap;
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::entities::EntityHasher;
use crate::error::{IndexError, Result};

/// The default entity specification document, embedded at build time.
const DEFAULT_SPEC: &str = include_str!("entity_spec.json");

// ------------- Entity specification -------------

/// The value kind of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// An alphanumeric label, kept as a string.
    Label,
    /// A non-negative integer index.
    Index,
    /// Part of the file name spec but not of the `{key}-{value}` grammar
    /// (datatype, suffix, extension).
    Special,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Label => "label",
            EntityKind::Index => "index",
            EntityKind::Special => "special",
        }
    }
}

/// The specification of a single entity. Immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitySpec {
    /// Short key as it appears in file names (e.g. `sub`).
    pub key: String,
    /// Long entity name (e.g. `subject`).
    pub entity: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub kind: EntityKind,
    /// Restriction to an enumerated set of values, if any.
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct SpecDocument {
    spec_version: String,
    entities: Vec<EntitySpec>,
}

// The three special entries don't follow the `{key}-{value}` grammar and are
// built in rather than read from the specification document.
fn special_entries() -> Vec<EntitySpec> {
    vec![
        EntitySpec {
            key: "datatype".into(),
            entity: "datatype".into(),
            display_name: "Data type".into(),
            description: "A functional group of different types of data.".into(),
            kind: EntityKind::Special,
            allowed: None,
        },
        EntitySpec {
            key: "suffix".into(),
            entity: "suffix".into(),
            display_name: "Suffix".into(),
            description: "Final part of the file name after the final '_' and before the extension.".into(),
            kind: EntityKind::Special,
            allowed: None,
        },
        EntitySpec {
            key: "ext".into(),
            entity: "extension".into(),
            display_name: "File extension".into(),
            description: "Full file extension after the left-most period.".into(),
            kind: EntityKind::Special,
            allowed: None,
        },
    ]
}

// ------------- Registry -------------

/// The loaded entity specification plus lookup indexes.
///
/// Entries keep specification order, which fixes the column order of the
/// derived [`columnar_schema`](SchemaRegistry::columnar_schema).
#[derive(Debug)]
pub struct SchemaRegistry {
    spec_version: String,
    entries: Vec<EntitySpec>,
    by_key: HashMap<String, usize, EntityHasher>,
    // short key <-> long entity name
    names: BiMap<String, String>,
}

impl SchemaRegistry {
    /// Parse a specification document into a registry.
    ///
    /// The three special entries (datatype, suffix, extension) are appended
    /// after the entities from the document.
    pub fn load(source: &str) -> Result<SchemaRegistry> {
        let document: SpecDocument = serde_json::from_str(source)
            .map_err(|e| IndexError::Schema(e.to_string()))?;

        let mut entries = document.entities;
        entries.extend(special_entries());

        let mut by_key = HashMap::default();
        let mut names = BiMap::new();
        for (idx, spec) in entries.iter().enumerate() {
            if spec.key.is_empty() || spec.entity.is_empty() {
                return Err(IndexError::Schema(format!(
                    "entity at position {idx} is missing a key or name"
                )));
            }
            if by_key.insert(spec.key.clone(), idx).is_some() {
                return Err(IndexError::Schema(format!("duplicate entity key '{}'", spec.key)));
            }
            if names.contains_right(&spec.entity) {
                return Err(IndexError::Schema(format!("duplicate entity name '{}'", spec.entity)));
            }
            names.insert(spec.key.clone(), spec.entity.clone());
        }

        Ok(SchemaRegistry {
            spec_version: document.spec_version,
            entries,
            by_key,
            names,
        })
    }

    /// Load the embedded default specification.
    pub fn default_spec() -> SchemaRegistry {
        SchemaRegistry::load(DEFAULT_SPEC).expect("embedded entity specification is valid")
    }

    pub fn spec_version(&self) -> &str {
        &self.spec_version
    }

    /// All entries in specification order, special entries last.
    pub fn entries(&self) -> &[EntitySpec] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entity by its short key (e.g. `sub`).
    pub fn lookup(&self, key: &str) -> Option<&EntitySpec> {
        self.by_key.get(key).map(|idx| &self.entries[*idx])
    }

    /// Short key for a long entity name (e.g. `subject` -> `sub`).
    pub fn key_for_entity(&self, entity: &str) -> Option<&str> {
        self.names.get_by_right(entity).map(String::as_str)
    }

    /// Long entity name for a short key (e.g. `sub` -> `subject`).
    pub fn entity_for_key(&self, key: &str) -> Option<&str> {
        self.names.get_by_left(key).map(String::as_str)
    }

    /// The columnar schema of the dataset index.
    ///
    /// Column order is a compatibility contract for persisted tables:
    /// `dataset`, all entities in specification order, `extra_entities`,
    /// `root`, `path`, then the file info columns `sidecar`, `size`, `mtime`.
    /// Schema metadata carries the specification version and this crate's
    /// version so consumers can check compatibility before reading.
    pub fn columnar_schema(&self) -> Schema {
        let mut fields: Vec<Field> = Vec::with_capacity(self.entries.len() + 7);

        fields.push(index_field(
            "dataset",
            DataType::Utf8,
            "Dataset name",
            "BIDS dataset name. Nested datasets are represented as a partial \
             path like 'ds000001/derivatives/fmriprep'.",
        ));

        for spec in &self.entries {
            let dtype = match spec.kind {
                EntityKind::Index => DataType::Int32,
                EntityKind::Label | EntityKind::Special => DataType::Utf8,
            };
            let mut metadata = HashMap::from([
                ("entity".to_string(), spec.entity.clone()),
                ("display_name".to_string(), spec.display_name.clone()),
                ("description".to_string(), spec.description.clone()),
                ("kind".to_string(), spec.kind.as_str().to_string()),
            ]);
            if let Some(allowed) = &spec.allowed {
                metadata.insert(
                    "allowed".to_string(),
                    serde_json::to_string(allowed).unwrap_or_default(),
                );
            }
            fields.push(Field::new(&spec.key, dtype, true).with_metadata(metadata));
        }

        fields.push(index_field(
            "extra_entities",
            extra_entities_datatype(),
            "Extra entities",
            "Map of extra entities not matching the current schema.",
        ));
        // Dictionary encoding saves memory on the repeated long root strings.
        fields.push(index_field(
            "root",
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
            "Dataset root path",
            "Absolute root path of the dataset.",
        ));
        fields.push(index_field(
            "path",
            DataType::Utf8,
            "File path",
            "File path relative to the dataset root.",
        ));
        fields.push(index_field(
            "sidecar",
            DataType::Utf8,
            "Sidecar metadata",
            "Resolved JSON sidecar metadata, merged per the inheritance principle.",
        ));
        fields.push(index_field(
            "size",
            DataType::Int64,
            "File size",
            "File size in bytes.",
        ));
        fields.push(index_field(
            "mtime",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            "Modification time",
            "File modification time.",
        ));

        let metadata = HashMap::from([
            ("spec_version".to_string(), self.spec_version.clone()),
            ("bidsindex_version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ]);
        Schema::new_with_metadata(fields, metadata)
    }
}

/// Arrow type of the `extra_entities` map column.
pub(crate) fn extra_entities_datatype() -> DataType {
    let entries = Field::new(
        "entries",
        DataType::Struct(Fields::from(vec![
            Field::new("keys", DataType::Utf8, false),
            Field::new("values", DataType::Utf8, true),
        ])),
        false,
    );
    DataType::Map(Arc::new(entries), false)
}

fn index_field(name: &str, dtype: DataType, display_name: &str, description: &str) -> Field {
    let metadata = HashMap::from([
        ("entity".to_string(), name.to_string()),
        ("display_name".to_string(), display_name.to_string()),
        ("description".to_string(), description.to_string()),
    ]);
    Field::new(name, dtype, true).with_metadata(metadata)
}

// ------------- Process-wide active schema -------------
//
// Components take the registry by reference; this is only a convenient
// holder for callers that want the shared default. Replacing the active
// schema leaves outstanding references valid, since entries are immutable.

lazy_static! {
    static ref ACTIVE_SCHEMA: RwLock<Arc<SchemaRegistry>> =
        RwLock::new(Arc::new(SchemaRegistry::default_spec()));
}

/// Get the active schema registry.
pub fn active() -> Arc<SchemaRegistry> {
    Arc::clone(&ACTIVE_SCHEMA.read().unwrap())
}

/// Replace the active schema registry.
pub fn install(registry: SchemaRegistry) {
    *ACTIVE_SCHEMA.write().unwrap() = Arc::new(registry);
}

/// Parse a specification document and install it as the active registry.
pub fn reload_from(source: &str) -> Result<()> {
    let registry = SchemaRegistry::load(source)?;
    install(registry);
    Ok(())
}
