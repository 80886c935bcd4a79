use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};

use crate::numeric::Numeric;
use crate::value::{Record, Value, OBJECT_ID_FIELD};
use crate::ReconcileError;

pub const FILE_COPIES_FIELD: &str = "file_copies";
pub const DONORS_FIELD: &str = "donors";

/// Field names skipped within one comparison context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusionSet<'a>(&'a [&'a str]);

impl<'a> ExclusionSet<'a> {
    #[must_use]
    pub const fn new(fields: &'a [&'a str]) -> Self {
        Self(fields)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(&field)
    }
}

pub const NO_EXCLUSIONS: ExclusionSet<'static> = ExclusionSet::new(&[]);

/// Whole-record context. Store-generated ids never agree, and the two nested sequences are
/// compared on their own with their own exclusions.
pub const RECORD_EXCLUSIONS: ExclusionSet<'static> =
    ExclusionSet::new(&["_id", "id", FILE_COPIES_FIELD, DONORS_FIELD]);

/// Per file copy. The pipeline sets no modification time or metadata path, and it reports
/// itself as the originating repository.
pub const FILE_COPY_EXCLUSIONS: ExclusionSet<'static> =
    ExclusionSet::new(&["last_modified", "repo_org", "repo_code", "repo_metadata_path"]);

/// Per donor. Donor, specimen and sample ids are assigned independently by each source.
pub const DONOR_EXCLUSIONS: ExclusionSet<'static> =
    ExclusionSet::new(&["donor_id", "specimen_id", "sample_id"]);

/// Deep structural equality over two document values.
///
/// Two absent values are equal and one absent value never is. An [`Value::Ignorable`] on
/// either side compares equal to anything. Objects are compared over the keys of `a` only,
/// so keys that exist only in `b` are never inspected. Values of different kinds are unequal.
///
/// # Errors
/// Returns [`ReconcileError::Shape`] when an [`Value::Unsupported`] value is reached.
pub fn equal(a: &Value, b: &Value) -> Result<bool, ReconcileError> {
    match (a, b) {
        (Value::Absent, Value::Absent) => Ok(true),
        (Value::Absent, _) | (_, Value::Absent) => Ok(false),
        (Value::Ignorable(_), _) | (_, Value::Ignorable(_)) => Ok(true),
        (Value::Unsupported { kind, .. }, _) | (_, Value::Unsupported { kind, .. }) => {
            Err(ReconcileError::Shape(format!("unsupported value type `{kind}`")))
        }
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Number(x), Value::Number(y)) => Ok(x == y),
        (Value::Text(x), Value::Text(y)) => Ok(x == y),
        (Value::Array(xs), Value::Array(ys)) => {
            if xs.len() != ys.len() {
                return Ok(false);
            }
            for (x, y) in xs.iter().zip(ys) {
                if !equal(x, y)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Object(x), Value::Object(y)) => {
            for (key, value) in x.iter() {
                if !equal(value, y.get(key))? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// One reason a candidate diverged from its reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mismatch {
    /// The candidate has no legacy counterpart.
    NoMatch,
    Field { field: String },
    /// Two sequences differ in length; their items were not compared.
    Length { field: String },
    Item { field: String, index: usize, fields: Vec<String> },
}

impl Mismatch {
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field { field: name.into() }
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        match self {
            Self::NoMatch => {
                record.insert("kind", Value::from("no_match"));
            }
            Self::Field { field } => {
                record.insert("kind", Value::from("field"));
                record.insert("field", Value::from(field.as_str()));
            }
            Self::Length { field } => {
                record.insert("kind", Value::from("length"));
                record.insert("field", Value::from(field.as_str()));
            }
            Self::Item { field, index, fields } => {
                record.insert("kind", Value::from("item"));
                record.insert("field", Value::from(field.as_str()));
                record.insert(
                    "index",
                    i128::try_from(*index).map_or(Value::Absent, |i| Value::Number(Numeric::Int(i))),
                );
                record.insert(
                    "fields",
                    Value::Array(fields.iter().map(|name| Value::from(name.as_str())).collect()),
                );
            }
        }
        record
    }
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatch => write!(f, "no match"),
            Self::Field { field } => write!(f, "{field}"),
            Self::Length { field } => write!(f, "{field}(length)"),
            Self::Item { field, index, fields } => {
                write!(f, "{field}[{index}]: {}", fields.join(","))
            }
        }
    }
}

/// Outcome of reconciling one candidate. `ok` is derived from the mismatch list and cannot be
/// set on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    id: Value,
    bad: Vec<Mismatch>,
}

impl Verdict {
    #[must_use]
    pub fn new(id: Value, bad: Vec<Mismatch>) -> Self {
        Self { id, bad }
    }

    #[must_use]
    pub fn no_match(candidate: &Record) -> Self {
        Self::new(candidate.get(OBJECT_ID_FIELD).clone(), vec![Mismatch::NoMatch])
    }

    #[must_use]
    pub fn id(&self) -> &Value {
        &self.id
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.bad.is_empty()
    }

    #[must_use]
    pub fn mismatches(&self) -> &[Mismatch] {
        &self.bad
    }

    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.bad.iter().map(ToString::to_string).collect()
    }

    fn extend(&mut self, mismatches: Vec<Mismatch>) {
        self.bad.extend(mismatches);
    }

    /// The persisted form: `{id, ok, bad, mismatches}` where `bad` holds display labels.
    #[must_use]
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id", self.id.clone());
        record.insert("ok", Value::Bool(self.is_ok()));
        record.insert(
            "bad",
            Value::Array(self.bad.iter().map(|m| Value::Text(m.to_string())).collect()),
        );
        record.insert(
            "mismatches",
            Value::Array(self.bad.iter().map(|m| Value::Object(m.to_record())).collect()),
        );
        record
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

/// Mismatches found in one nested sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayStatus {
    pub bad: Vec<Mismatch>,
}

impl ArrayStatus {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.bad.is_empty()
    }
}

/// Compare the reference's fields, minus `excluded`, against the candidate.
///
/// Only keys of `reference` are enumerated; fields present only on the candidate are never
/// reported. Failing keys are listed in reference field order.
///
/// # Errors
/// Returns [`ReconcileError::Shape`] when a compared value has an unsupported type.
pub fn compare_objects(
    candidate: &Record,
    reference: &Record,
    excluded: ExclusionSet<'_>,
) -> Result<Verdict, ReconcileError> {
    let mut bad = Vec::new();
    for (key, expected) in reference.iter().filter(|(key, _)| !excluded.contains(key)) {
        if !equal(candidate.get(key), expected)? {
            bad.push(Mismatch::field(key));
        }
    }
    Ok(Verdict::new(candidate.get(OBJECT_ID_FIELD).clone(), bad))
}

/// Compare the sequences stored under `field` item by item.
///
/// A length difference yields the single mismatch `<field>(length)` and no item is compared.
/// An absent field counts as an empty sequence.
///
/// # Errors
/// Returns [`ReconcileError::Shape`] when `field` holds something other than a sequence of
/// records, or an item holds an unsupported value.
pub fn compare_array(
    candidate: &Record,
    reference: &Record,
    field: &str,
    excluded: ExclusionSet<'_>,
) -> Result<ArrayStatus, ReconcileError> {
    let actual = sequence(candidate, field)?;
    let expected = sequence(reference, field)?;

    if actual.len() != expected.len() {
        return Ok(ArrayStatus { bad: vec![Mismatch::Length { field: field.to_string() }] });
    }

    let mut status = ArrayStatus::default();
    for (index, (item, expected_item)) in actual.iter().zip(expected).enumerate() {
        let item_verdict = compare_objects(
            item_record(item, field, index)?,
            item_record(expected_item, field, index)?,
            excluded,
        )?;
        if !item_verdict.is_ok() {
            status.bad.push(Mismatch::Item {
                field: field.to_string(),
                index,
                fields: item_verdict.labels(),
            });
        }
    }
    Ok(status)
}

/// Reconcile one candidate against its composite reference.
///
/// Without a reference the verdict is the single mismatch `no match`. Otherwise top-level
/// fields, `file_copies` and `donors` are compared with their own exclusion sets and all
/// mismatches are merged in that order.
///
/// # Errors
/// Returns [`ReconcileError::Shape`] when either record contains an unsupported data shape.
pub fn compare(candidate: &Record, reference: Option<&Record>) -> Result<Verdict, ReconcileError> {
    let Some(reference) = reference else {
        return Ok(Verdict::no_match(candidate));
    };

    let mut verdict = compare_objects(candidate, reference, RECORD_EXCLUSIONS)?;
    let file_status = compare_array(candidate, reference, FILE_COPIES_FIELD, FILE_COPY_EXCLUSIONS)?;
    verdict.extend(file_status.bad);
    let donor_status = compare_array(candidate, reference, DONORS_FIELD, DONOR_EXCLUSIONS)?;
    verdict.extend(donor_status.bad);
    Ok(verdict)
}

fn sequence<'r>(record: &'r Record, field: &str) -> Result<&'r [Value], ReconcileError> {
    match record.get(field) {
        Value::Absent => Ok(&[]),
        Value::Array(items) => Ok(items.as_slice()),
        other => Err(ReconcileError::Shape(format!(
            "field `{field}` must be a sequence, found {}",
            other.kind()
        ))),
    }
}

fn item_record<'v>(item: &'v Value, field: &str, index: usize) -> Result<&'v Record, ReconcileError> {
    item.as_record().ok_or_else(|| {
        ReconcileError::Shape(format!("{field}[{index}] must be an object, found {}", item.kind()))
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn record(document: serde_json::Value) -> Record {
        match Record::from_json(document) {
            Ok(record) => record,
            Err(err) => panic!("fixture should be a JSON object: {err}"),
        }
    }

    fn value(document: serde_json::Value) -> Value {
        Value::from(document)
    }

    fn is_equal(a: &Value, b: &Value) -> bool {
        match equal(a, b) {
            Ok(result) => result,
            Err(err) => panic!("comparison should not fail: {err}"),
        }
    }

    fn file_copy(name: &str, size: u64, last_modified: &str, repo_org: &str) -> serde_json::Value {
        json!({
            "file_name": name,
            "file_format": "BAM",
            "file_size": size,
            "file_md5sum": "9a1b7e3c5d",
            "last_modified": last_modified,
            "repo_data_bundle_id": "EGAZ00001",
            "repo_file_id": "f0a1",
            "repo_type": "S3",
            "repo_org": repo_org,
            "repo_name": "Collaboratory - Toronto",
            "repo_code": repo_org,
            "repo_country": "CA",
            "repo_base_url": "https://www.cancercollaboratory.org:9080",
            "repo_data_path": "/oicr.icgc/data",
            "repo_metadata_path": null,
            "index_file": { "file_name": "a.bam.bai", "file_format": "BAI" }
        })
    }

    fn donor(donor_id: &str, submitted: &str) -> serde_json::Value {
        json!({
            "study": "PCAWG",
            "project_code": "BRCA-UK",
            "primary_site": "Breast",
            "donor_id": donor_id,
            "specimen_id": [format!("SP-{donor_id}")],
            "specimen_type": ["Primary tumour - solid tissue"],
            "sample_id": [format!("SA-{donor_id}")],
            "submitted_donor_id": submitted,
            "submitted_specimen_id": ["PD4120a"],
            "submitted_sample_id": ["PD4120a"]
        })
    }

    #[test]
    fn absent_values_compare_by_presence() {
        assert!(is_equal(&Value::Absent, &Value::Absent));
        assert!(!is_equal(&Value::Absent, &Value::from("x")));
        assert!(!is_equal(&Value::from("x"), &Value::Absent));
    }

    #[test]
    fn ignorable_values_equal_anything_present() {
        let code = value(json!({ "$code": "function () {}" }));
        assert!(is_equal(&code, &Value::Number(Numeric::Int(3))));
        assert!(is_equal(&value(json!([1, 2])), &code));
        assert!(!is_equal(&code, &Value::Absent));
    }

    #[test]
    fn scalars_require_exact_equality() {
        assert!(is_equal(&Value::Number(Numeric::Float(5.0)), &value(json!(5))));
        assert!(!is_equal(&value(json!(5.0)), &value(json!(5.000_001))));
        assert!(!is_equal(&Value::from("BAM"), &Value::from("bam")));
        assert!(!is_equal(&value(json!(5)), &Value::from("5")));
        assert!(is_equal(&Value::Bool(true), &Value::Bool(true)));
    }

    #[test]
    fn numbers_compare_exactly_without_tolerance() {
        let long = |text: &str| value(json!({ "$numberLong": text }));
        let decimal = |text: &str| value(json!({ "$numberDecimal": text }));
        assert!(!is_equal(&long("9007199254740993"), &long("9007199254740992")));
        assert!(!is_equal(&decimal("0.1"), &decimal("0.10000000000000000001")));
        assert!(is_equal(&decimal("42.00"), &value(json!(42))));
    }

    #[test]
    fn nan_fields_match_themselves() -> Result<(), ReconcileError> {
        let candidate = record(json!({ "object_id": "f1", "ratio": { "$numberDouble": "NaN" } }));
        assert!(is_equal(candidate.get("ratio"), candidate.get("ratio")));
        assert!(compare(&candidate, Some(&candidate))?.is_ok());
        Ok(())
    }

    #[test]
    fn arrays_compare_itemwise_in_order() {
        assert!(is_equal(&value(json!([1, "a"])), &value(json!([1, "a"]))));
        assert!(!is_equal(&value(json!([1, "a"])), &value(json!(["a", 1]))));
        assert!(!is_equal(&value(json!([1])), &value(json!([1, 1]))));
    }

    #[test]
    fn object_equality_is_driven_by_left_keys() {
        let narrow = value(json!({ "a": 1 }));
        let wide = value(json!({ "a": 1, "b": 2 }));
        assert!(is_equal(&narrow, &wide));
        assert!(!is_equal(&wide, &narrow));
    }

    #[test]
    fn unsupported_values_abort_comparison() {
        let blob = value(json!({ "$binary": { "base64": "AA==", "subType": "00" } }));
        let Err(err) = equal(&blob, &Value::from("AA==")) else {
            panic!("unsupported values must not compare");
        };
        assert!(err.to_string().contains("unsupported value type `binary`"));

        let nested = value(json!({ "checksum": { "$timestamp": { "t": 1, "i": 1 } } }));
        assert!(equal(&nested, &value(json!({ "checksum": 1 }))).is_err());
    }

    #[test]
    fn compare_objects_reports_equal_records_as_ok() {
        let candidate = record(json!({ "object_id": 1, "a": 5 }));
        let reference = record(json!({ "object_id": 1, "a": 5 }));

        let verdict = match compare_objects(&candidate, &reference, NO_EXCLUSIONS) {
            Ok(verdict) => verdict,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert_eq!(verdict.id(), &Value::Number(Numeric::Int(1)));
        assert!(verdict.is_ok());
        assert!(verdict.mismatches().is_empty());
    }

    #[test]
    fn compare_objects_names_the_diverging_field() {
        let candidate = record(json!({ "object_id": 1, "a": 5 }));
        let reference = record(json!({ "object_id": 1, "a": 6 }));

        let verdict = match compare_objects(&candidate, &reference, NO_EXCLUSIONS) {
            Ok(verdict) => verdict,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert_eq!(verdict.id(), &Value::Number(Numeric::Int(1)));
        assert!(!verdict.is_ok());
        assert_eq!(verdict.mismatches(), &[Mismatch::field("a")]);
    }

    #[test]
    fn compare_objects_lists_failures_in_reference_order_and_skips_exclusions() {
        let candidate = record(json!({ "object_id": "x", "c": 0, "b": 0, "a": 0, "skip": 1 }));
        let reference = record(json!({ "object_id": "x", "a": 1, "skip": 2, "b": 0, "c": 1 }));

        let verdict = match compare_objects(&candidate, &reference, ExclusionSet::new(&["skip"])) {
            Ok(verdict) => verdict,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert_eq!(verdict.labels(), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn candidate_only_fields_never_mismatch() {
        let candidate = record(json!({ "object_id": 1, "a": 5, "extra": "only here" }));
        let reference = record(json!({ "object_id": 1, "a": 5 }));

        let verdict = match compare_objects(&candidate, &reference, NO_EXCLUSIONS) {
            Ok(verdict) => verdict,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert!(verdict.is_ok());
    }

    #[test]
    fn reference_only_fields_mismatch_as_absent() {
        let candidate = record(json!({ "object_id": 1 }));
        let reference = record(json!({ "object_id": 1, "access": "controlled" }));

        let verdict = match compare_objects(&candidate, &reference, NO_EXCLUSIONS) {
            Ok(verdict) => verdict,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert_eq!(verdict.labels(), vec!["access".to_string()]);
    }

    #[test]
    fn compare_array_length_mismatch_stops_itemwise_checks() {
        let candidate = record(json!({
            "file_copies": [file_copy("a.bam", 1, "", "song"), file_copy("b.bam", 2, "", "song")]
        }));
        let reference = record(json!({
            "file_copies": [
                file_copy("a.bam", 9, "", "collab"),
                file_copy("b.bam", 9, "", "collab"),
                file_copy("c.bam", 9, "", "collab")
            ]
        }));

        let status =
            match compare_array(&candidate, &reference, FILE_COPIES_FIELD, FILE_COPY_EXCLUSIONS) {
                Ok(status) => status,
                Err(err) => panic!("comparison failed: {err}"),
            };
        assert_eq!(status.bad, vec![Mismatch::Length { field: "file_copies".to_string() }]);
        assert_eq!(status.bad[0].to_string(), "file_copies(length)");
    }

    #[test]
    fn compare_array_labels_each_failing_index() {
        let candidate = record(json!({
            "file_copies": [
                file_copy("a.bam", 1, "", "song"),
                file_copy("b.bam", 2, "", "song"),
                file_copy("c.bam", 3, "", "song")
            ]
        }));
        let reference = record(json!({
            "file_copies": [
                file_copy("a.bam", 1, "2017-01-01", "collab"),
                file_copy("b.bam", 2, "2017-01-01", "collab"),
                file_copy("z.bam", 4, "2017-01-01", "collab")
            ]
        }));

        let status =
            match compare_array(&candidate, &reference, FILE_COPIES_FIELD, FILE_COPY_EXCLUSIONS) {
                Ok(status) => status,
                Err(err) => panic!("comparison failed: {err}"),
            };
        assert_eq!(
            status.bad,
            vec![Mismatch::Item {
                field: "file_copies".to_string(),
                index: 2,
                fields: vec!["file_name".to_string(), "file_size".to_string()],
            }]
        );
        assert_eq!(status.bad[0].to_string(), "file_copies[2]: file_name,file_size");
    }

    #[test]
    fn compare_array_treats_absent_sequence_as_empty() {
        let candidate = record(json!({ "object_id": 1 }));
        let reference = record(json!({ "object_id": 1, "donors": [] }));

        let status = match compare_array(&candidate, &reference, DONORS_FIELD, DONOR_EXCLUSIONS) {
            Ok(status) => status,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert!(status.is_ok());
    }

    #[test]
    fn compare_array_rejects_non_sequence_fields_and_items() {
        let candidate = record(json!({ "donors": "DO1" }));
        let reference = record(json!({ "donors": [] }));
        let Err(err) = compare_array(&candidate, &reference, DONORS_FIELD, DONOR_EXCLUSIONS) else {
            panic!("a text donors field is not a sequence");
        };
        assert!(err.to_string().contains("field `donors` must be a sequence"));

        let candidate = record(json!({ "donors": [1] }));
        let reference = record(json!({ "donors": [{ "study": "PCAWG" }] }));
        let Err(err) = compare_array(&candidate, &reference, DONORS_FIELD, DONOR_EXCLUSIONS) else {
            panic!("a numeric donor item is not a record");
        };
        assert!(err.to_string().contains("donors[0] must be an object"));
    }

    #[test]
    fn compare_without_reference_is_no_match() {
        let candidate = record(json!({ "object_id": "a1", "access": "controlled" }));
        let verdict = match compare(&candidate, None) {
            Ok(verdict) => verdict,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert_eq!(verdict.id(), &Value::from("a1"));
        assert!(!verdict.is_ok());
        assert_eq!(verdict.labels(), vec!["no match".to_string()]);
    }

    #[test]
    fn compare_ignores_excluded_fields_in_every_context() {
        let candidate = record(json!({
            "_id": { "$oid": "000000000000000000000001" },
            "id": "FI100",
            "object_id": "f1",
            "access": "controlled",
            "file_copies": [file_copy("a.bam", 10, "", "song")],
            "donors": [donor("", "PD4120")]
        }));
        let reference = record(json!({
            "_id": { "$oid": "000000000000000000000002" },
            "id": "FI200",
            "object_id": "f1",
            "access": "controlled",
            "file_copies": [file_copy("a.bam", 10, "2016-10-11T12:00:00", "collab")],
            "donors": [donor("DO1", "PD4120")]
        }));

        let verdict = match compare(&candidate, Some(&reference)) {
            Ok(verdict) => verdict,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert!(verdict.is_ok(), "unexpected mismatches: {:?}", verdict.labels());
    }

    #[test]
    fn compare_merges_mismatches_from_all_three_contexts() {
        let candidate = record(json!({
            "object_id": "f1",
            "access": "open",
            "file_copies": [file_copy("a.bam", 10, "", "song")],
            "donors": [donor("", "PD4120"), donor("", "PD4121")]
        }));
        let reference = record(json!({
            "object_id": "f1",
            "access": "controlled",
            "file_copies": [file_copy("a.bam", 11, "", "collab")],
            "donors": [donor("DO1", "PD4120")]
        }));

        let verdict = match compare(&candidate, Some(&reference)) {
            Ok(verdict) => verdict,
            Err(err) => panic!("comparison failed: {err}"),
        };
        assert_eq!(
            verdict.mismatches(),
            &[
                Mismatch::field("access"),
                Mismatch::Item {
                    field: "file_copies".to_string(),
                    index: 0,
                    fields: vec!["file_size".to_string()],
                },
                Mismatch::Length { field: "donors".to_string() },
            ]
        );
    }

    #[test]
    fn verdict_record_derives_ok_from_mismatches() {
        let verdict = Verdict::new(
            Value::from("f1"),
            vec![Mismatch::Item {
                field: "donors".to_string(),
                index: 1,
                fields: vec!["primary_site".to_string()],
            }],
        );
        let json = verdict.to_record().to_json();
        assert_eq!(
            json,
            json!({
                "id": "f1",
                "ok": false,
                "bad": ["donors[1]: primary_site"],
                "mismatches": [{
                    "kind": "item",
                    "field": "donors",
                    "index": 1,
                    "fields": ["primary_site"]
                }]
            })
        );

        let passing = Verdict::new(Value::from("f2"), Vec::new()).to_record();
        assert_eq!(passing.get("ok"), &Value::Bool(true));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Absent),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| Value::Number(Numeric::Int(i128::from(n)))),
            any::<f64>().prop_map(|f| Value::Number(Numeric::Float(f))),
            Just(Value::Number(Numeric::Float(f64::NAN))),
            "-?[0-9]{1,30}\\.[0-9]{0,30}"
                .prop_filter_map("decimal literal", |text| Numeric::decimal(&text).map(Value::Number)),
            "[a-z]{0,6}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-e]", inner), 0..4)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn property_equality_is_reflexive(v in arb_value()) {
            prop_assert!(is_equal(&v, &v));
        }

        #[test]
        fn property_length_mismatch_reports_only_length(a in 0_usize..5, b in 0_usize..5) {
            prop_assume!(a != b);
            let item = json!({ "file_name": "x" });
            let actual = vec![item.clone(); a];
            let expected = vec![item; b];
            let candidate = record(json!({ "file_copies": actual }));
            let reference = record(json!({ "file_copies": expected }));
            let status = compare_array(&candidate, &reference, FILE_COPIES_FIELD, NO_EXCLUSIONS);
            prop_assert!(status.is_ok());
            let labels: Vec<String> =
                status.unwrap_or_default().bad.iter().map(ToString::to_string).collect();
            prop_assert_eq!(labels, vec!["file_copies(length)".to_string()]);
        }

        #[test]
        fn property_excluded_field_changes_never_fail(
            last_modified in "[0-9]{4}-[0-9]{2}-[0-9]{2}",
            repo_org in "[a-z]{1,8}",
            donor_id in "DO[0-9]{1,5}",
        ) {
            let candidate = record(json!({
                "object_id": "f1",
                "access": "controlled",
                "file_copies": [file_copy("a.bam", 10, "", "song")],
                "donors": [donor("", "PD4120")]
            }));
            let reference = record(json!({
                "object_id": "f1",
                "access": "controlled",
                "file_copies": [file_copy("a.bam", 10, &last_modified, &repo_org)],
                "donors": [donor(&donor_id, "PD4120")]
            }));
            let verdict = compare(&candidate, Some(&reference));
            prop_assert!(verdict.is_ok());
            prop_assert!(verdict.map(|v| v.is_ok()).unwrap_or(false));
        }
    }
}
