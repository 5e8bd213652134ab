use std::fs;
use std::path::{Path, PathBuf};

use bidsindex::config::Policy;
use bidsindex::entities::parse_entities;
use bidsindex::metadata::{MetadataResolver, is_inheritance_match};

// ds/                      task-rest_bold.json   {"Level": "dataset", "C": true}
//   sub-01/
//     ses-1/               sub-01_ses-1_task-rest_bold.json   {"Level": "session", "B": true}
//       func/              sub-01_ses-1_task-rest_run-1_bold.json  {"Level": "local", "A": true}
//                          sub-01_ses-1_task-rest_run-1_bold.nii.gz
fn setup() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let ds = tmp.path().join("ds");
    let func = ds.join("sub-01").join("ses-1").join("func");
    fs::create_dir_all(&func).unwrap();
    fs::write(ds.join("dataset_description.json"), "{}").unwrap();

    fs::write(
        ds.join("task-rest_bold.json"),
        r#"{"Level": "dataset", "C": true}"#,
    )
    .unwrap();
    fs::write(
        ds.join("sub-01").join("ses-1").join("sub-01_ses-1_task-rest_bold.json"),
        r#"{"Level": "session", "B": true}"#,
    )
    .unwrap();
    fs::write(
        func.join("sub-01_ses-1_task-rest_run-1_bold.json"),
        r#"{"Level": "local", "A": true}"#,
    )
    .unwrap();

    let data = func.join("sub-01_ses-1_task-rest_run-1_bold.nii.gz");
    fs::write(&data, "x").unwrap();
    (tmp, data)
}

#[test]
fn sidecars_merge_bottom_up_with_local_values_winning() {
    let (_tmp, data) = setup();
    let policy = Policy::default();
    let metadata = MetadataResolver::new(&policy).resolve(&data).unwrap();

    assert_eq!(metadata["A"], true);
    assert_eq!(metadata["B"], true);
    assert_eq!(metadata["C"], true);
    // All three sidecars define Level; the one closest to the file wins.
    assert_eq!(metadata["Level"], "local");
}

#[test]
fn nearest_only_mode_takes_the_most_specific_sidecar() {
    let (_tmp, data) = setup();
    let policy = Policy::default();
    let metadata = MetadataResolver::new(&policy).resolve_nearest(&data).unwrap();

    assert_eq!(metadata["A"], true);
    assert_eq!(metadata["Level"], "local");
    assert!(!metadata.contains_key("B"));
    assert!(!metadata.contains_key("C"));
}

#[test]
fn non_matching_sidecars_are_ignored() {
    let (tmp, data) = setup();
    let policy = Policy::default();

    // Same level, different task: entities are not a subset of the query.
    fs::write(
        tmp.path()
            .join("ds/sub-01/ses-1/func/sub-01_ses-1_task-other_run-1_bold.json"),
        r#"{"Other": true}"#,
    )
    .unwrap();

    let metadata = MetadataResolver::new(&policy).resolve(&data).unwrap();
    assert!(!metadata.contains_key("Other"));
}

#[test]
fn malformed_sidecar_is_skipped_not_fatal() {
    let (tmp, data) = setup();
    let policy = Policy::default();

    fs::write(
        tmp.path().join("ds/sub-01/ses-1/sub-01_ses-1_task-rest_bold.json"),
        "{broken",
    )
    .unwrap();

    let metadata = MetadataResolver::new(&policy).resolve(&data).unwrap();
    // The session-level contribution is gone, the rest still merged.
    assert!(!metadata.contains_key("B"));
    assert_eq!(metadata["A"], true);
    assert_eq!(metadata["C"], true);
}

#[test]
fn search_stops_at_the_dataset_root() {
    let (tmp, data) = setup();
    let policy = Policy::default();

    // A sidecar above the dataset root must never be inherited.
    fs::write(
        tmp.path().join("task-rest_bold.json"),
        r#"{"Outside": true}"#,
    )
    .unwrap();

    let metadata = MetadataResolver::new(&policy).resolve(&data).unwrap();
    assert!(!metadata.contains_key("Outside"));
}

#[test]
fn no_matching_sidecars_yields_no_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let func = tmp.path().join("ds").join("sub-02").join("func");
    fs::create_dir_all(&func).unwrap();
    fs::write(tmp.path().join("ds/dataset_description.json"), "{}").unwrap();
    let data = func.join("sub-02_task-rest_bold.nii.gz");
    fs::write(&data, "x").unwrap();

    let policy = Policy::default();
    assert!(MetadataResolver::new(&policy).resolve(&data).is_none());
}

#[test]
fn inheritance_subset_rule() {
    let query = parse_entities(Path::new(
        "ds/sub-01/func/sub-01_task-rest_run-1_bold.json",
    ));

    // Fewer entities with equal values: a match.
    let broad = parse_entities(Path::new("task-rest_bold.json"));
    assert!(is_inheritance_match(&query, &broad));

    // Datatype on the candidate is ignored, even when it differs.
    let with_datatype = parse_entities(Path::new("ds/sub-01/anat/sub-01_bold.json"));
    assert!(is_inheritance_match(&query, &with_datatype));

    // A key absent from the query is not a match.
    let stranger = parse_entities(Path::new("ses-1_task-rest_bold.json"));
    assert!(!is_inheritance_match(&query, &stranger));

    // A shared key with a different value is not a match.
    let conflicting = parse_entities(Path::new("task-other_bold.json"));
    assert!(!is_inheritance_match(&query, &conflicting));
}
