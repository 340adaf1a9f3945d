//! Music catalog core: artists, albums, tracks and per-user favorites over a
//! document store, with parent-side id arrays kept in step with the
//! children's back-references.

pub mod catalog;
pub mod cli_style;
pub mod config;
pub mod entity_store;
pub mod error;
pub mod favorites;
pub mod integrity;
pub mod mirror;
pub mod sqlite_persistence;
pub mod user;

pub use error::{ResultCategory, ServiceError, ServiceResult};
