use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compare::{compare, Mismatch, Verdict, FILE_COPIES_FIELD};
use crate::report::ErrorReport;
use crate::store::RecordStore;
use crate::value::{ObjectId, Record, Value, OBJECT_ID_FIELD};
use crate::ReconcileError;

/// Names of the collections a reconciliation run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNames {
    /// Records produced by the new pipeline.
    pub candidates: String,
    /// Legacy records every candidate is checked against.
    pub primary: String,
    /// Legacy records that supply the file copies.
    pub secondary: String,
    /// Where verdicts are written.
    pub status: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            candidates: "SONG".to_string(),
            primary: "PCAWGFile".to_string(),
            secondary: "CollabFile".to_string(),
            status: "status".to_string(),
        }
    }
}

impl CollectionNames {
    /// Collections looked up by `object_id` during a run.
    #[must_use]
    pub fn sources(&self) -> [&str; 3] {
        [&self.candidates, &self.primary, &self.secondary]
    }

    /// Reject a status collection that is also a source, since a run drops it first.
    ///
    /// # Errors
    /// Returns [`ReconcileError::InvalidConfig`] naming the clashing collection.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.sources().contains(&self.status.as_str()) {
            return Err(ReconcileError::InvalidConfig(format!(
                "status collection `{}` is also a source collection",
                self.status
            )));
        }
        Ok(())
    }
}

/// Pass/fail totals of one status build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTally {
    pub candidates: usize,
    pub passed: usize,
    pub failed: usize,
}

impl RunTally {
    fn record(&mut self, verdict: &Verdict) {
        self.candidates += 1;
        if verdict.is_ok() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Build the reference a candidate is compared against.
///
/// The primary legacy record is taken as-is, except that its `file_copies` are replaced with
/// those of the secondary legacy record, or with an empty sequence when the secondary source
/// has no counterpart. Without a primary record, or without a candidate `object_id`, there is
/// no reference.
///
/// # Errors
/// Returns [`ReconcileError::Store`] when a lookup fails.
pub fn compose_reference<S: RecordStore + ?Sized>(
    store: &S,
    names: &CollectionNames,
    candidate: &Record,
) -> Result<Option<Record>, ReconcileError> {
    let Some(object_id) = candidate.object_id() else {
        return Ok(None);
    };
    let Some(mut reference) = first(store.find_by_object_id(&names.primary, &object_id)?) else {
        return Ok(None);
    };

    let file_copies = match first(store.find_by_object_id(&names.secondary, &object_id)?) {
        Some(secondary) => secondary.get(FILE_COPIES_FIELD).clone(),
        None => Value::Array(Vec::new()),
    };
    reference.insert(FILE_COPIES_FIELD, file_copies);
    Ok(Some(reference))
}

/// Look up the composite reference for one candidate and reconcile it.
///
/// # Errors
/// Returns [`ReconcileError::Store`] when a lookup fails, or [`ReconcileError::Shape`] when
/// either side holds an unsupported data shape.
pub fn check_document<S: RecordStore + ?Sized>(
    store: &S,
    names: &CollectionNames,
    candidate: &Record,
) -> Result<Verdict, ReconcileError> {
    let reference = compose_reference(store, names, candidate)?;
    compare(candidate, reference.as_ref())
}

/// Reconcile the candidate with `object_id` without persisting anything.
///
/// # Errors
/// Returns [`ReconcileError::NotFound`] when no candidate carries `object_id`, and otherwise
/// the errors of [`check_document`].
pub fn check_one<S: RecordStore + ?Sized>(
    store: &S,
    names: &CollectionNames,
    object_id: &ObjectId,
) -> Result<Verdict, ReconcileError> {
    let Some(candidate) = first(store.find_by_object_id(&names.candidates, object_id)?) else {
        return Err(ReconcileError::NotFound(format!(
            "no record with {OBJECT_ID_FIELD} {object_id} in {}",
            names.candidates
        )));
    };
    check_document(store, names, &candidate)
}

/// Index `object_id` in every source collection.
///
/// # Errors
/// Returns [`ReconcileError::Store`] when an index cannot be created.
pub fn create_indexes<S: RecordStore + ?Sized>(
    store: &mut S,
    names: &CollectionNames,
) -> Result<(), ReconcileError> {
    for collection in names.sources() {
        store.create_index(collection, OBJECT_ID_FIELD)?;
        debug!(collection, field = OBJECT_ID_FIELD, "index ready");
    }
    Ok(())
}

/// Recreate the status collection and fill it with one verdict per candidate, in scan order.
///
/// The first store or data-shape error aborts the run; verdicts written before it stay.
///
/// # Errors
/// Returns [`ReconcileError::InvalidConfig`] before touching the store when the status
/// collection is one of the sources, and otherwise [`ReconcileError::Store`] or
/// [`ReconcileError::Shape`] as described above.
pub fn build_status_collection<S: RecordStore + ?Sized>(
    store: &mut S,
    names: &CollectionNames,
) -> Result<RunTally, ReconcileError> {
    names.validate()?;
    store.drop_collection(&names.status)?;
    store.create_collection(&names.status)?;

    let mut tally = RunTally::default();
    for candidate in store.scan(&names.candidates)? {
        let verdict = check_document(store, names, &candidate)?;
        if verdict.mismatches().contains(&Mismatch::NoMatch) {
            warn!(object_id = ?candidate.object_id(), "no legacy record for candidate");
        }
        debug!(
            object_id = ?candidate.object_id(),
            ok = verdict.is_ok(),
            bad = ?verdict.labels(),
            "candidate reconciled"
        );
        store.insert(&names.status, &verdict.to_record())?;
        tally.record(&verdict);
    }

    info!(
        candidates = tally.candidates,
        passed = tally.passed,
        failed = tally.failed,
        status = %names.status,
        "status collection built"
    );
    Ok(tally)
}

/// Aggregate the persisted verdicts by failure label.
///
/// # Errors
/// Returns [`ReconcileError::Store`] when the status collection cannot be read, or
/// [`ReconcileError::Shape`] when a stored verdict has no list of text labels under `bad`.
pub fn summarize_errors<S: RecordStore + ?Sized>(
    store: &S,
    names: &CollectionNames,
) -> Result<ErrorReport, ReconcileError> {
    let verdicts = store.scan(&names.status)?;
    let mut lists = Vec::with_capacity(verdicts.len());
    for verdict in &verdicts {
        lists.push(stored_labels(verdict)?);
    }
    Ok(ErrorReport::from_label_lists(lists))
}

fn stored_labels(verdict: &Record) -> Result<Vec<String>, ReconcileError> {
    let Some(labels) = verdict.get("bad").as_array() else {
        return Err(ReconcileError::Shape(format!(
            "stored verdict {} has no `bad` list",
            verdict.get("id").to_json()
        )));
    };
    labels
        .iter()
        .map(|label| {
            label.as_text().map(str::to_string).ok_or_else(|| {
                ReconcileError::Shape(format!(
                    "stored verdict {} has a non-text label",
                    verdict.get("id").to_json()
                ))
            })
        })
        .collect()
}

fn first(records: Vec<Record>) -> Option<Record> {
    records.into_iter().next()
}
