//! EntityStore trait definition.
//!
//! The store exchanges JSON documents so that the mirror maintainer can work
//! on any collection through the same few calls. `TypedEntityStore` layers
//! serde conversions on top for callers that know the record type.

use super::models::{Document, EntityKind};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} violates a unique constraint: {detail}")]
    UniqueViolation { kind: EntityKind, detail: String },

    #[error("Invalid {kind} document: {reason}")]
    InvalidDocument { kind: EntityKind, reason: String },

    #[error("Invalid field name '{0}'")]
    InvalidField(String),

    #[error("Store backend unavailable: {0}")]
    Unavailable(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<rusqlite::Error> for StoreError {
    /// A busy or locked database is reported as `Unavailable`.
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Top-level field equals the value. `Null` matches a missing field.
    Eq(String, Value),
    /// Top-level array field contains the value.
    Contains(String, Value),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SortOrder {
    #[default]
    Insertion,
    NewestFirst,
    Field { field: String, descending: bool },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.into(), value.into()));
        self
    }

    pub fn contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Contains(field.into(), value.into()));
        self
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// A single-field change applied atomically by [`EntityStore::patch`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDelta {
    Set(String, Value),
    /// Adds the value to an array field unless already present.
    AddToSet(String, Value),
    /// Removes every occurrence of the value from an array field.
    Pull(String, Value),
}

impl FieldDelta {
    pub fn field(&self) -> &str {
        match self {
            FieldDelta::Set(field, _)
            | FieldDelta::AddToSet(field, _)
            | FieldDelta::Pull(field, _) => field,
        }
    }
}

// =============================================================================
// Store trait
// =============================================================================

/// Durable keyed storage for the five record kinds.
///
/// Every method touches exactly one document, except `find` and `count`
/// which read. There are no multi-document transactions.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait EntityStore: Send + Sync {
    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Value>>;

    /// Documents matching every condition, in the query's sort order.
    fn find(&self, kind: EntityKind, query: &Query) -> StoreResult<Vec<Value>>;

    /// Stores a new document under a store-assigned id and returns it with
    /// the `id` field filled in. Any `id` already present is replaced.
    fn insert(&self, kind: EntityKind, document: Value) -> StoreResult<Value>;

    /// Inserts or replaces the document named by its `id` field.
    fn put(&self, kind: EntityKind, document: Value) -> StoreResult<Value>;

    /// Applies the deltas to one document atomically. `None` if absent.
    fn patch(
        &self,
        kind: EntityKind,
        id: &str,
        deltas: &[FieldDelta],
    ) -> StoreResult<Option<Value>>;

    /// Returns whether a document was removed.
    fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool>;

    fn count(&self, kind: EntityKind) -> StoreResult<usize>;
}

/// Typed helpers over [`EntityStore`] for [`Document`] records.
pub trait TypedEntityStore {
    fn get_record<D: Document>(&self, id: &str) -> StoreResult<Option<D>>;

    fn find_records<D: Document>(&self, query: &Query) -> StoreResult<Vec<D>>;

    fn insert_record<D: Document>(&self, record: &D) -> StoreResult<D>;

    fn exists(&self, kind: EntityKind, id: &str) -> StoreResult<bool>;
}

impl<S: EntityStore + ?Sized> TypedEntityStore for S {
    fn get_record<D: Document>(&self, id: &str) -> StoreResult<Option<D>> {
        self.get(D::KIND, id)?
            .map(|value| decode::<D>(value))
            .transpose()
    }

    fn find_records<D: Document>(&self, query: &Query) -> StoreResult<Vec<D>> {
        self.find(D::KIND, query)?
            .into_iter()
            .map(decode::<D>)
            .collect()
    }

    fn insert_record<D: Document>(&self, record: &D) -> StoreResult<D> {
        let stored = self.insert(D::KIND, serde_json::to_value(record)?)?;
        decode::<D>(stored)
    }

    fn exists(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        Ok(self.get(kind, id)?.is_some())
    }
}

fn decode<D: Document>(value: Value) -> StoreResult<D> {
    serde_json::from_value(value).map_err(|e| StoreError::InvalidDocument {
        kind: D::KIND,
        reason: e.to_string(),
    })
}
