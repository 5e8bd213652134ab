//! Indexing orchestration.
//!
//! Ties the other modules together: locate the dataset, enumerate its
//! subject directories, visit candidate files, validate their entities,
//! resolve sidecar metadata and emit one [`FileRecord`] per accepted file.
//! Subject directories are independent of each other, so they map cleanly
//! onto a pool of worker threads with no shared mutable state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use arrow::array::RecordBatch;
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::classify::is_data_file;
use crate::config::IndexerConfig;
use crate::dataset::{self, DatasetInfo};
use crate::entities::{parse_entities, validate_entities};
use crate::error::{IndexError, Result};
use crate::metadata::MetadataResolver;
use crate::schema::SchemaRegistry;
use crate::table::{self, FileRecord};

/// Options for a single indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Glob patterns of subject directory names to include. Empty means all.
    pub include_subjects: Vec<String>,
    /// Worker threads; 0 processes subject directories in the calling
    /// thread.
    pub workers: usize,
}

/// Index one dataset into a record batch.
///
/// A missing root is a hard error. A root that is not a dataset, or one
/// without matching subject directories, degrades to a warning plus an
/// empty batch.
pub fn index_dataset(
    root: &Path,
    schema: &Arc<SchemaRegistry>,
    config: &IndexerConfig,
    options: &IndexOptions,
) -> Result<RecordBatch> {
    if !root.exists() {
        return Err(IndexError::NotFound(root.display().to_string()));
    }

    let Some(dataset) = dataset::locate_dataset(root, &config.policy) else {
        warn!(path = %root.display(), "path is not a valid dataset directory");
        return Ok(table::empty_batch(schema));
    };

    let subject_dirs = dataset::find_subject_dirs(root, &options.include_subjects)?;
    if subject_dirs.is_empty() {
        warn!(path = %root.display(), "no matching subject directories");
        return Ok(table::empty_batch(schema));
    }

    let records = if options.workers == 0 {
        let mut records = Vec::new();
        for dir in &subject_dirs {
            records.extend(index_subject_dir(dir, &dataset, schema, config));
        }
        records
    } else {
        index_subjects_pooled(options.workers, subject_dirs, &dataset, schema, config)
    };

    info!(dataset = %dataset.name, files = records.len(), "dataset indexed");
    table::build_record_batch(schema, &records)
}

/// Index a batch of datasets, one record batch per root.
pub fn index_all(
    roots: &[PathBuf],
    schema: &Arc<SchemaRegistry>,
    config: &IndexerConfig,
    options: &IndexOptions,
) -> Result<Vec<RecordBatch>> {
    roots
        .iter()
        .map(|root| index_dataset(root, schema, config, options))
        .collect()
}

// Index one subject directory. Failures on individual files are downgraded
// to a warning plus a skip; an empty result is not an error.
fn index_subject_dir(
    dir: &Path,
    dataset: &DatasetInfo,
    schema: &SchemaRegistry,
    config: &IndexerConfig,
) -> Vec<FileRecord> {
    let root_fmt = std::path::absolute(&dataset.root)
        .unwrap_or_else(|_| dataset.root.clone())
        .display()
        .to_string();
    let mut resolver = MetadataResolver::new(&config.policy);
    let mut records = Vec::new();

    let mut walker = WalkBuilder::new(dir);
    walker.standard_filters(false).follow_links(true);
    for result in walker.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        if !entry.file_name().to_string_lossy().starts_with("sub-") {
            continue;
        }
        let path = entry.path();
        if !is_data_file(path, &config.policy) {
            continue;
        }

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat file, skipping");
                continue;
            }
        };

        let raw = parse_entities(path);
        let (entities, extra_entities) = validate_entities(&raw, schema);
        let sidecar = resolver.resolve(path);
        let relative = path.strip_prefix(&dataset.root).unwrap_or(path);

        records.push(FileRecord {
            dataset: dataset.name.clone(),
            entities,
            extra_entities,
            root: root_fmt.clone(),
            path: relative.to_string_lossy().into_owned(),
            sidecar,
            size: meta.len() as i64,
            mtime: meta.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    if records.is_empty() {
        warn!(path = %dir.display(), "subject directory yielded no files");
    } else {
        debug!(path = %dir.display(), files = records.len(), "subject directory indexed");
    }
    records
}

// A fixed pool of worker threads fed from a shared job channel. Workers
// hold no shared mutable state; partial results arrive in completion
// order, which is fine since concatenation does not depend on row order.
fn index_subjects_pooled(
    workers: usize,
    subject_dirs: Vec<PathBuf>,
    dataset: &DatasetInfo,
    schema: &Arc<SchemaRegistry>,
    config: &IndexerConfig,
) -> Vec<FileRecord> {
    let (job_tx, job_rx) = mpsc::channel::<PathBuf>();
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (result_tx, result_rx) = mpsc::channel::<Vec<FileRecord>>();

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let dataset = dataset.clone();
        let schema = Arc::clone(schema);
        let config = config.clone();
        handles.push(thread::spawn(move || {
            loop {
                let job = job_rx.lock().unwrap().recv();
                let Ok(dir) = job else { break };
                let partial = index_subject_dir(&dir, &dataset, &schema, &config);
                if result_tx.send(partial).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    for dir in subject_dirs {
        let _ = job_tx.send(dir);
    }
    drop(job_tx);

    let mut records = Vec::new();
    for partial in result_rx {
        records.extend(partial);
    }
    for handle in handles {
        let _ = handle.join();
    }
    records
}
