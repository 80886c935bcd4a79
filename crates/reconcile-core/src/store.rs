use std::collections::{BTreeMap, BTreeSet};

use crate::value::{ObjectId, Record};
use crate::ReconcileError;

/// The document store the reconciliation reads candidates and legacy records from and writes
/// verdicts to.
///
/// Inserting into a collection that does not exist creates it, and scanning a missing
/// collection yields nothing.
pub trait RecordStore {
    /// # Errors
    /// Returns [`ReconcileError::Store`] when the store rejects the operation.
    fn create_collection(&mut self, name: &str) -> Result<(), ReconcileError>;

    /// Remove a collection and everything in it. Dropping a missing collection is a no-op.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Store`] when the store rejects the operation.
    fn drop_collection(&mut self, name: &str) -> Result<(), ReconcileError>;

    /// # Errors
    /// Returns [`ReconcileError::Store`] when the index cannot be created.
    fn create_index(&mut self, collection: &str, field: &str) -> Result<(), ReconcileError>;

    /// # Errors
    /// Returns [`ReconcileError::Store`] when the record cannot be written.
    fn insert(&mut self, collection: &str, record: &Record) -> Result<(), ReconcileError>;

    /// Every record of `collection` whose `object_id` matches, in insertion order.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Store`] when the lookup fails.
    fn find_by_object_id(
        &self,
        collection: &str,
        object_id: &ObjectId,
    ) -> Result<Vec<Record>, ReconcileError>;

    /// # Errors
    /// Returns [`ReconcileError::Store`] when the collection cannot be read.
    fn scan(&self, collection: &str) -> Result<Vec<Record>, ReconcileError>;
}

/// In-process store with the same collection semantics as the persistent one.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: BTreeMap<String, Vec<Record>>,
    indexes: BTreeSet<(String, String)>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_collection(mut self, name: &str, records: Vec<Record>) -> Self {
        self.collections.entry(name.to_string()).or_default().extend(records);
        self
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> &[Record] {
        self.collections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    #[must_use]
    pub fn has_index(&self, collection: &str, field: &str) -> bool {
        self.indexes.contains(&(collection.to_string(), field.to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn create_collection(&mut self, name: &str) -> Result<(), ReconcileError> {
        self.collections.entry(name.to_string()).or_default();
        Ok(())
    }

    fn drop_collection(&mut self, name: &str) -> Result<(), ReconcileError> {
        self.collections.remove(name);
        self.indexes.retain(|(collection, _)| collection != name);
        Ok(())
    }

    fn create_index(&mut self, collection: &str, field: &str) -> Result<(), ReconcileError> {
        self.indexes.insert((collection.to_string(), field.to_string()));
        Ok(())
    }

    fn insert(&mut self, collection: &str, record: &Record) -> Result<(), ReconcileError> {
        self.collections.entry(collection.to_string()).or_default().push(record.clone());
        Ok(())
    }

    fn find_by_object_id(
        &self,
        collection: &str,
        object_id: &ObjectId,
    ) -> Result<Vec<Record>, ReconcileError> {
        Ok(self
            .collection(collection)
            .iter()
            .filter(|record| record.object_id().as_ref() == Some(object_id))
            .cloned()
            .collect())
    }

    fn scan(&self, collection: &str) -> Result<Vec<Record>, ReconcileError> {
        Ok(self.collection(collection).to_vec())
    }
}
