mod models;
mod patch;
mod schema;
mod sqlite_store;
mod trait_def;

pub use models::*;
pub use patch::apply_deltas;
pub use schema::ENTITY_VERSIONED_SCHEMAS;
pub use sqlite_store::SqliteEntityStore;
pub use trait_def::{
    Condition, EntityStore, FieldDelta, Query, SortOrder, StoreError, StoreResult,
    TypedEntityStore,
};

#[cfg(any(test, feature = "mock"))]
pub use trait_def::MockEntityStore;
