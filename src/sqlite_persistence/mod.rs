mod versioned_schema;

pub use versioned_schema::*;

/// Offset added to schema versions before they're written to `PRAGMA user_version`,
/// so that a database created by another tool (user_version = 0) is never mistaken
/// for one of ours.
pub const BASE_DB_VERSION: usize = 77000;
