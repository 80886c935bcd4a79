use criterion::{criterion_group, criterion_main, Criterion};
use reconcile_core::{
    build_status_collection, compare, CollectionNames, MemoryStore, Record,
};
use serde_json::json;

fn mk_file(index: usize, repo_org: &str, donor_id: Option<&str>) -> Record {
    let document = json!({
        "_id": { "$oid": format!("{index:024x}") },
        "id": format!("FI{index}"),
        "object_id": format!("obj-{index}"),
        "study": ["PCAWG"],
        "access": "controlled",
        "data_bundle": { "data_bundle_id": format!("EGAZ{index:08}") },
        "analysis_method": { "analysis_type": "Reference alignment", "software": "BWA MEM" },
        "data_categorization": { "data_type": "Aligned Reads", "experimental_strategy": "WGS" },
        "reference_genome": { "genome_build": "GRCh37", "reference_name": "hs37d5" },
        "file_copies": [{
            "file_name": format!("{index}.bam"),
            "file_format": "BAM",
            "file_size": index * 1024,
            "file_md5sum": "d41d8cd98f00b204e9800998ecf8427e",
            "repo_org": repo_org,
            "repo_code": repo_org,
            "index_file": { "file_name": format!("{index}.bam.bai"), "file_format": "BAI" }
        }],
        "donors": [{
            "project_code": "BRCA-UK",
            "primary_site": "Breast",
            "donor_id": donor_id,
            "submitted_donor_id": "PD4120",
            "specimen_type": ["Primary tumour - solid tissue"]
        }]
    });
    match Record::from_json(document) {
        Ok(record) => record,
        Err(err) => panic!("bench fixture should be a JSON object: {err}"),
    }
}

fn bench_compare(c: &mut Criterion) {
    let candidate = mk_file(7, "song", None);
    let reference = mk_file(7, "collaboratory", Some("DO7"));

    c.bench_function("compare_single_record", |b| {
        b.iter(|| compare(&candidate, Some(&reference)));
    });
}

fn bench_status_build(c: &mut Criterion) {
    let size = 1_000;
    let store = MemoryStore::new()
        .with_collection("SONG", (0..size).map(|i| mk_file(i, "song", None)).collect())
        .with_collection("PCAWGFile", (0..size).map(|i| mk_file(i, "pcawg", Some("DO1"))).collect())
        .with_collection(
            "CollabFile",
            (0..size).map(|i| mk_file(i, "collaboratory", Some("DO1"))).collect(),
        );
    let names = CollectionNames::default();

    c.bench_function("build_status_collection_1k", |b| {
        b.iter(|| {
            let mut run = store.clone();
            build_status_collection(&mut run, &names)
        });
    });
}

criterion_group!(benches, bench_compare, bench_status_build);
criterion_main!(benches);
