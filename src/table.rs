//! Assembling file records into Arrow record batches and persisting them
//! as Parquet.
//!
//! Column order is fixed by [`SchemaRegistry::columnar_schema`]; this
//! module only fills it in.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Int32Array, Int64Array, MapBuilder, RecordBatch, StringArray, StringBuilder,
    StringDictionaryBuilder, TimestampMicrosecondArray,
};
use arrow::datatypes::{Int32Type, SchemaRef};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde_json::{Map, Value};

use crate::entities::{EntityValue, ExtraEntities, ValidEntities};
use crate::error::Result;
use crate::schema::{EntityKind, SchemaRegistry};

/// One row of the dataset index. Created once during indexing and consumed
/// as a persisted row; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Composite dataset name.
    pub dataset: String,
    /// Schema-valid entities, keyed by short name.
    pub entities: ValidEntities,
    /// Entities the schema did not accept.
    pub extra_entities: ExtraEntities,
    /// Absolute dataset root path.
    pub root: String,
    /// File path relative to the dataset root.
    pub path: String,
    /// Merged sidecar metadata, if any matched.
    pub sidecar: Option<Map<String, Value>>,
    /// File size in bytes.
    pub size: i64,
    /// File modification time.
    pub mtime: Option<DateTime<Utc>>,
}

/// Build one record batch from file records, in the fixed column order.
pub fn build_record_batch(schema: &SchemaRegistry, records: &[FileRecord]) -> Result<RecordBatch> {
    let arrow_schema = Arc::new(schema.columnar_schema());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(arrow_schema.fields().len());

    let datasets: Vec<&str> = records.iter().map(|r| r.dataset.as_str()).collect();
    columns.push(Arc::new(StringArray::from(datasets)));

    for spec in schema.entries() {
        let column: ArrayRef = match spec.kind {
            EntityKind::Index => {
                let values: Vec<Option<i32>> = records
                    .iter()
                    .map(|r| r.entities.get(&spec.key).and_then(EntityValue::as_index))
                    .collect();
                Arc::new(Int32Array::from(values))
            }
            EntityKind::Label | EntityKind::Special => {
                let values: Vec<Option<&str>> = records
                    .iter()
                    .map(|r| r.entities.get(&spec.key).and_then(EntityValue::as_label))
                    .collect();
                Arc::new(StringArray::from(values))
            }
        };
        columns.push(column);
    }

    columns.push(build_extra_entities(records)?);

    let mut roots = StringDictionaryBuilder::<Int32Type>::new();
    for record in records {
        roots.append_value(&record.root);
    }
    columns.push(Arc::new(roots.finish()));

    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    columns.push(Arc::new(StringArray::from(paths)));

    let sidecars: Vec<Option<String>> = records
        .iter()
        .map(|r| r.sidecar.as_ref().map(|m| Value::Object(m.clone()).to_string()))
        .collect();
    columns.push(Arc::new(StringArray::from(sidecars)));

    let sizes: Vec<i64> = records.iter().map(|r| r.size).collect();
    columns.push(Arc::new(Int64Array::from(sizes)));

    let mtimes: Vec<Option<i64>> = records
        .iter()
        .map(|r| r.mtime.map(|t| t.timestamp_micros()))
        .collect();
    columns.push(Arc::new(
        TimestampMicrosecondArray::from(mtimes).with_timezone("UTC"),
    ));

    Ok(RecordBatch::try_new(arrow_schema, columns)?)
}

fn build_extra_entities(records: &[FileRecord]) -> Result<ArrayRef> {
    let mut builder = MapBuilder::new(None, StringBuilder::new(), StringBuilder::new());
    for record in records {
        for (key, value) in &record.extra_entities {
            builder.keys().append_value(key);
            builder.values().append_value(value);
        }
        builder.append(true)?;
    }
    Ok(Arc::new(builder.finish()))
}

/// An empty batch carrying the full columnar schema.
pub fn empty_batch(schema: &SchemaRegistry) -> RecordBatch {
    RecordBatch::new_empty(Arc::new(schema.columnar_schema()))
}

/// Write record batches to a single Parquet file.
pub fn write_parquet<I>(path: &Path, schema: SchemaRef, batches: I) -> Result<()>
where
    I: IntoIterator<Item = RecordBatch>,
{
    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    for batch in batches {
        writer.write(&batch)?;
    }
    writer.close()?;
    Ok(())
}
