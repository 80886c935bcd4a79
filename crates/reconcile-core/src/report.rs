use std::collections::{BTreeMap, BTreeSet};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::compare::Verdict;

/// Number of verdicts carrying one failure label. Serializes as `{"<label>": <count>}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCount {
    pub label: String,
    pub count: usize,
}

impl Serialize for ErrorCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.label, &self.count)?;
        map.end()
    }
}

/// Failure-label frequencies across a set of verdicts, one entry per distinct label in
/// lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorReport {
    entries: Vec<ErrorCount>,
}

impl ErrorReport {
    /// Count, per label, how many lists contain it. A label repeated inside one list counts once.
    pub fn from_label_lists<I, L, S>(lists: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for labels in lists {
            let distinct: BTreeSet<String> =
                labels.into_iter().map(|label| label.as_ref().to_string()).collect();
            for label in distinct {
                *counts.entry(label).or_insert(0) += 1;
            }
        }

        Self {
            entries: counts.into_iter().map(|(label, count)| ErrorCount { label, count }).collect(),
        }
    }

    #[must_use]
    pub fn from_verdicts(verdicts: &[Verdict]) -> Self {
        Self::from_label_lists(verdicts.iter().map(Verdict::labels))
    }

    #[must_use]
    pub fn entries(&self) -> &[ErrorCount] {
        &self.entries
    }

    /// Occurrences of `label`, zero when it never appeared.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.entries.iter().find(|entry| entry.label == label).map_or(0, |entry| entry.count)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
