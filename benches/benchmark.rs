use std::hint::black_box;
use std::path::Path;

use criterion::{Criterion, criterion_group, criterion_main};

use bidsindex::entities::{parse_entities, validate_entities};
use bidsindex::schema::SchemaRegistry;

fn bench_parse_entities(c: &mut Criterion) {
    let path = Path::new(
        "ds000001/sub-A01/ses-B02/func/sub-A01_ses-B02_task-rest_acq-highres_run-1_echo-2_bold.nii.gz",
    );
    c.bench_function("parse_entities", |b| {
        b.iter(|| parse_entities(black_box(path)))
    });
}

fn bench_validate_entities(c: &mut Criterion) {
    let schema = SchemaRegistry::default_spec();
    let raw = parse_entities(Path::new(
        "ds000001/sub-A01/ses-B02/func/sub-A01_ses-B02_task-rest_acq-highres_run-1_echo-2_bold.nii.gz",
    ));
    c.bench_function("validate_entities", |b| {
        b.iter(|| validate_entities(black_box(&raw), &schema))
    });
}

criterion_group!(benches, bench_parse_entities, bench_validate_entities);
criterion_main!(benches);
