use std::fs;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{Array, Int32Array, MapArray, RecordBatch, StringArray};
use bidsindex::config::IndexerConfig;
use bidsindex::error::IndexError;
use bidsindex::index::{IndexOptions, index_dataset};
use bidsindex::schema::SchemaRegistry;
use bidsindex::table;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

// ds/
//   dataset_description.json
//   task-rest_bold.json                 {"RepetitionTime": 2.0}
//   sub-01/func/sub-01_task-rest_run-1_bold.nii.gz
//               sub-01_task-rest_run-1_bold.json   {"EchoTime": 0.03}
//               sub-01_task-rest_events.tsv
//   sub-01/anat/sub-01_T1w.nii.gz
//   sub-02/func/sub-02_task-rest_run-1_bold.nii.gz
//               sub-02_task-rest_blah-x_bold.nii.gz
fn setup() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let ds = tmp.path().join("ds");
    let func1 = ds.join("sub-01").join("func");
    let anat1 = ds.join("sub-01").join("anat");
    let func2 = ds.join("sub-02").join("func");
    for dir in [&func1, &anat1, &func2] {
        fs::create_dir_all(dir).unwrap();
    }
    fs::write(ds.join("dataset_description.json"), "{}").unwrap();
    fs::write(ds.join("task-rest_bold.json"), r#"{"RepetitionTime": 2.0}"#).unwrap();

    fs::write(func1.join("sub-01_task-rest_run-1_bold.nii.gz"), "x").unwrap();
    fs::write(
        func1.join("sub-01_task-rest_run-1_bold.json"),
        r#"{"EchoTime": 0.03}"#,
    )
    .unwrap();
    fs::write(func1.join("sub-01_task-rest_events.tsv"), "onset\n").unwrap();
    fs::write(anat1.join("sub-01_T1w.nii.gz"), "x").unwrap();
    fs::write(func2.join("sub-02_task-rest_run-1_bold.nii.gz"), "x").unwrap();
    fs::write(func2.join("sub-02_task-rest_blah-x_bold.nii.gz"), "x").unwrap();

    (tmp, ds)
}

fn index(root: &PathBuf, options: &IndexOptions) -> RecordBatch {
    let schema = Arc::new(SchemaRegistry::default_spec());
    let config = IndexerConfig::default();
    index_dataset(root, &schema, &config, options).unwrap()
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
    batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
}

fn sorted_paths(batch: &RecordBatch) -> Vec<String> {
    let paths = string_column(batch, "path");
    let mut values: Vec<String> = (0..paths.len()).map(|i| paths.value(i).to_string()).collect();
    values.sort();
    values
}

#[test]
fn indexes_data_files_and_skips_sidecars() {
    let (_tmp, ds) = setup();
    let batch = index(&ds, &IndexOptions::default());

    assert_eq!(batch.num_rows(), 5);
    assert_eq!(
        sorted_paths(&batch),
        vec![
            "sub-01/anat/sub-01_T1w.nii.gz",
            "sub-01/func/sub-01_task-rest_events.tsv",
            "sub-01/func/sub-01_task-rest_run-1_bold.nii.gz",
            "sub-02/func/sub-02_task-rest_blah-x_bold.nii.gz",
            "sub-02/func/sub-02_task-rest_run-1_bold.nii.gz",
        ]
    );

    let datasets = string_column(&batch, "dataset");
    for i in 0..batch.num_rows() {
        assert_eq!(datasets.value(i), "ds");
    }
}

#[test]
fn entities_are_typed_and_extras_are_mapped() {
    let (_tmp, ds) = setup();
    let batch = index(&ds, &IndexOptions::default());

    let paths = string_column(&batch, "path");
    let runs = batch
        .column_by_name("run")
        .unwrap()
        .as_any()
        .downcast_ref::<Int32Array>()
        .unwrap();
    let extras = batch
        .column_by_name("extra_entities")
        .unwrap()
        .as_any()
        .downcast_ref::<MapArray>()
        .unwrap();

    for i in 0..batch.num_rows() {
        let path = paths.value(i);
        if path.ends_with("run-1_bold.nii.gz") {
            assert_eq!(runs.value(i), 1);
        } else {
            assert!(runs.is_null(i));
        }

        let entry = extras.value(i);
        if path.contains("blah-x") {
            // The unknown key lands in the extras map.
            assert_eq!(entry.len(), 1);
            let keys = entry
                .column(0)
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap();
            let values = entry
                .column(1)
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap();
            assert_eq!(keys.value(0), "blah");
            assert_eq!(values.value(0), "x");
        } else {
            assert_eq!(entry.len(), 0);
        }
    }
}

#[test]
fn sidecar_metadata_is_inherited_and_merged() {
    let (_tmp, ds) = setup();
    let batch = index(&ds, &IndexOptions::default());

    let paths = string_column(&batch, "path");
    let sidecars = string_column(&batch, "sidecar");

    for i in 0..batch.num_rows() {
        let path = paths.value(i);
        if path.ends_with("sub-01_task-rest_run-1_bold.nii.gz") {
            let metadata: serde_json::Value = serde_json::from_str(sidecars.value(i)).unwrap();
            assert_eq!(metadata["RepetitionTime"], 2.0);
            assert_eq!(metadata["EchoTime"], 0.03);
        } else if path.ends_with("events.tsv") || path.ends_with("T1w.nii.gz") {
            assert!(sidecars.is_null(i));
        }
    }
}

#[test]
fn worker_pool_matches_synchronous_indexing() {
    let (_tmp, ds) = setup();
    let sync = index(&ds, &IndexOptions::default());
    let pooled = index(
        &ds,
        &IndexOptions {
            workers: 2,
            ..IndexOptions::default()
        },
    );

    assert_eq!(pooled.num_rows(), sync.num_rows());
    assert_eq!(sorted_paths(&pooled), sorted_paths(&sync));
}

#[test]
fn subject_include_patterns_restrict_the_index() {
    let (_tmp, ds) = setup();
    let batch = index(
        &ds,
        &IndexOptions {
            include_subjects: vec!["sub-01".to_string()],
            ..IndexOptions::default()
        },
    );
    assert_eq!(batch.num_rows(), 3);
}

#[test]
fn non_dataset_root_yields_an_empty_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let plain = tmp.path().join("plain");
    fs::create_dir_all(&plain).unwrap();

    let batch = index(&plain, &IndexOptions::default());
    assert_eq!(batch.num_rows(), 0);
    assert_eq!(batch.schema().fields().len(), 39);
}

#[test]
fn missing_root_is_a_hard_error() {
    let schema = Arc::new(SchemaRegistry::default_spec());
    let config = IndexerConfig::default();
    let err = index_dataset(
        &PathBuf::from("/no/such/dataset"),
        &schema,
        &config,
        &IndexOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IndexError::NotFound(_)));
}

#[test]
fn parquet_round_trip_preserves_rows_and_schema() {
    let (tmp, ds) = setup();
    let batch = index(&ds, &IndexOptions::default());
    let output = tmp.path().join("index.parquet");

    table::write_parquet(&output, batch.schema(), [batch.clone()]).unwrap();

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&output).unwrap()).unwrap();
    assert_eq!(reader.schema().field(0).name(), "dataset");
    let rows: usize = reader
        .build()
        .unwrap()
        .map(|b| b.unwrap().num_rows())
        .sum();
    assert_eq!(rows, batch.num_rows());
}
