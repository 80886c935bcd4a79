//! Reconciliation of pipeline-produced file records against their legacy counterparts.
//!
//! A candidate record is compared with a composite reference built from two legacy
//! collections. The result is a [`Verdict`] listing every diverging field, and verdicts are
//! aggregated into an [`ErrorReport`] of failure-label frequencies.

mod batch;
mod compare;
mod numeric;
mod report;
mod store;
mod value;

pub use batch::{
    build_status_collection, check_document, check_one, compose_reference, create_indexes,
    summarize_errors, CollectionNames, RunTally,
};
pub use compare::{
    compare, compare_array, compare_objects, equal, ArrayStatus, ExclusionSet, Mismatch, Verdict,
    DONORS_FIELD, DONOR_EXCLUSIONS, FILE_COPIES_FIELD, FILE_COPY_EXCLUSIONS, NO_EXCLUSIONS,
    RECORD_EXCLUSIONS,
};
pub use numeric::Numeric;
pub use report::{ErrorCount, ErrorReport};
pub use store::{MemoryStore, RecordStore};
pub use value::{ObjectId, Record, Value, OBJECT_ID_FIELD};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ReconcileError {
    /// A value outside the supported document model. Never masked; it aborts the run.
    #[error("data shape error: {0}")]
    Shape(String),
    #[error("record store error: {0}")]
    Store(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Collection names that would make a run destroy its own inputs.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
