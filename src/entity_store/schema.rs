//! SQLite schema for the entity store.
//!
//! Each collection keeps the whole document as JSON in `body`. Fields that
//! need a store-level constraint or a fast lookup are copied into key columns
//! on every write.

use super::models::EntityKind;
use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

const ARTISTS_TABLE_V_0: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["id"]],
};

const ALBUMS_TABLE_V_0: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_albums_artist_id", "artist_id")],
    unique_constraints: &[&["id"]],
};

const TRACKS_TABLE_V_0: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("album_id", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_tracks_artist_id", "artist_id"),
        ("idx_tracks_album_id", "album_id"),
    ],
    unique_constraints: &[&["id"]],
};

const USERS_TABLE_V_0: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["id"]],
};

const FAVORITES_TABLE_V_0: Table = Table {
    name: "favorites",
    columns: &[
        sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("category", &SqlType::Text, non_null = true),
        sqlite_column!("item_id", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_favorites_user_id", "user_id"),
        ("idx_favorites_item_id", "item_id"),
    ],
    unique_constraints: &[&["id"], &["user_id", "category", "item_id"]],
};

pub const ENTITY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ARTISTS_TABLE_V_0,
        ALBUMS_TABLE_V_0,
        TRACKS_TABLE_V_0,
        USERS_TABLE_V_0,
        FAVORITES_TABLE_V_0,
    ],
    migration: None,
}];

/// Columns every collection table has besides its key columns.
const BOOKKEEPING_COLUMNS: &[&str] = &["seq", "id", "body", "created", "updated"];

/// The table backing a collection in the latest schema.
pub fn table_for(kind: EntityKind) -> &'static Table {
    let tables = latest_tables();
    match kind {
        EntityKind::Artist => &tables[0],
        EntityKind::Album => &tables[1],
        EntityKind::Track => &tables[2],
        EntityKind::User => &tables[3],
        EntityKind::Favorite => &tables[4],
    }
}

fn latest_tables() -> &'static [Table] {
    ENTITY_VERSIONED_SCHEMAS[ENTITY_VERSIONED_SCHEMAS.len() - 1].tables
}

/// Document fields copied into their own column, in column order.
pub fn key_columns(kind: EntityKind) -> impl Iterator<Item = &'static Column> {
    table_for(kind)
        .columns
        .iter()
        .filter(|column| !BOOKKEEPING_COLUMNS.contains(&column.name))
}
