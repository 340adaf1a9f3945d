//! Records persisted by the entity store.
//!
//! Every record is stored as a JSON document. Parents carry mirror sets of
//! their children's ids (`album_ids`, `track_ids`, `favorite_ids`), children
//! carry back-references (`artist_id`, `album_id`, `user_id`). Mirror sets are
//! only ever modified through the mirror maintainer.

use crate::user::UserRole;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Entity kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Album,
    Track,
    User,
    Favorite,
}

impl EntityKind {
    /// All kinds, parents before children.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Artist,
        EntityKind::Album,
        EntityKind::Track,
        EntityKind::User,
        EntityKind::Favorite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Track => "track",
            EntityKind::User => "user",
            EntityKind::Favorite => "favorite",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "artist" => Some(EntityKind::Artist),
            "album" => Some(EntityKind::Album),
            "track" => Some(EntityKind::Track),
            "user" => Some(EntityKind::User),
            "favorite" => Some(EntityKind::Favorite),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed record that lives in one of the store's collections.
pub trait Document: Serialize + DeserializeOwned + Send {
    const KIND: EntityKind;
}

// =============================================================================
// Catalog records
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub grammy_count: u32,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub album_ids: BTreeSet<String>,
    #[serde(default)]
    pub track_ids: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub artist_id: String,
    pub name: String,
    pub year: i32,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub track_ids: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub artist_id: String,
    pub album_id: String,
    pub name: String,
    pub duration_seconds: f64,
    #[serde(default)]
    pub hidden: bool,
}

impl Document for Artist {
    const KIND: EntityKind = EntityKind::Artist;
}

impl Document for Album {
    const KIND: EntityKind = EntityKind::Album;
}

impl Document for Track {
    const KIND: EntityKind = EntityKind::Track;
}

// =============================================================================
// User records
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    #[serde(default)]
    pub favorite_ids: BTreeSet<String>,
    /// Unix timestamp, seconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavoriteCategory {
    Artist,
    Album,
    Track,
}

impl FavoriteCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FavoriteCategory::Artist => "artist",
            FavoriteCategory::Album => "album",
            FavoriteCategory::Track => "track",
        }
    }

    /// Exact match only, categories are not case-folded.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "artist" => Some(FavoriteCategory::Artist),
            "album" => Some(FavoriteCategory::Album),
            "track" => Some(FavoriteCategory::Track),
            _ => None,
        }
    }

    /// The collection the favorite's `item_id` points into.
    pub fn item_kind(self) -> EntityKind {
        match self {
            FavoriteCategory::Artist => EntityKind::Artist,
            FavoriteCategory::Album => EntityKind::Album,
            FavoriteCategory::Track => EntityKind::Track,
        }
    }

    pub fn for_item_kind(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::Artist => Some(FavoriteCategory::Artist),
            EntityKind::Album => Some(FavoriteCategory::Album),
            EntityKind::Track => Some(FavoriteCategory::Track),
            EntityKind::User | EntityKind::Favorite => None,
        }
    }
}

impl fmt::Display for FavoriteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: String,
    pub user_id: String,
    pub category: FavoriteCategory,
    pub item_id: String,
    /// Unix timestamp, seconds.
    pub created_at: i64,
}

impl Document for User {
    const KIND: EntityKind = EntityKind::User;
}

impl Document for Favorite {
    const KIND: EntityKind = EntityKind::Favorite;
}
