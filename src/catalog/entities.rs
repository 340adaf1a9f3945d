//! Per-kind payload rules for the catalog records.

use super::validation::{
    as_object, optional_bool, optional_i32, optional_positive, optional_string, optional_u32,
    reject_unknown, required_i32, required_positive, required_string, required_u32,
    ValidationError, ValidationResult,
};
use crate::entity_store::{Album, Artist, Document, EntityKind, FieldDelta, Track};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// How a list filter value is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// An id that must name an existing record of the kind.
    Reference(EntityKind),
    Count,
    Year,
    Flag,
}

pub trait CatalogEntity: Document + Clone + std::fmt::Debug {
    /// Filter keys accepted by `list`. Other keys are ignored.
    const FILTERS: &'static [(&'static str, FilterKind)];

    fn name(&self) -> &str;

    /// Builds a new, unattached record. The id is left for the store to assign.
    fn from_payload(payload: &Value) -> ValidationResult<Self>;

    /// Field changes for an update. Absent and `null` fields are left alone.
    fn update_deltas(payload: &Value) -> ValidationResult<Vec<FieldDelta>>;
}

fn set_deltas(fields: Vec<(&'static str, Option<Value>)>) -> ValidationResult<Vec<FieldDelta>> {
    let deltas: Vec<FieldDelta> = fields
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| FieldDelta::Set(field.to_string(), v)))
        .collect();
    if deltas.is_empty() {
        return Err(ValidationError::EmptyUpdate);
    }
    Ok(deltas)
}

// =============================================================================
// Artist
// =============================================================================

const ARTIST_FIELDS: &[&str] = &["name", "grammy_count", "hidden"];

impl CatalogEntity for Artist {
    const FILTERS: &'static [(&'static str, FilterKind)] =
        &[("grammy_count", FilterKind::Count), ("hidden", FilterKind::Flag)];

    fn name(&self) -> &str {
        &self.name
    }

    fn from_payload(payload: &Value) -> ValidationResult<Self> {
        let object = as_object(payload)?;
        reject_unknown(object, ARTIST_FIELDS, &[])?;
        Ok(Artist {
            id: String::new(),
            name: required_string(object, "name")?,
            grammy_count: required_u32(object, "grammy_count")?,
            hidden: optional_bool(object, "hidden")?.unwrap_or(false),
            album_ids: BTreeSet::new(),
            track_ids: BTreeSet::new(),
        })
    }

    fn update_deltas(payload: &Value) -> ValidationResult<Vec<FieldDelta>> {
        let object = as_object(payload)?;
        reject_unknown(object, ARTIST_FIELDS, &[])?;
        set_deltas(vec![
            ("name", optional_string(object, "name")?.map(Value::from)),
            (
                "grammy_count",
                optional_u32(object, "grammy_count")?.map(Value::from),
            ),
            ("hidden", optional_bool(object, "hidden")?.map(Value::from)),
        ])
    }
}

// =============================================================================
// Album
// =============================================================================

const ALBUM_CREATE_FIELDS: &[&str] = &["artist_id", "name", "year", "hidden"];
const ALBUM_UPDATE_FIELDS: &[&str] = &["name", "year", "hidden"];

impl CatalogEntity for Album {
    const FILTERS: &'static [(&'static str, FilterKind)] = &[
        ("artist_id", FilterKind::Reference(EntityKind::Artist)),
        ("year", FilterKind::Year),
        ("hidden", FilterKind::Flag),
    ];

    fn name(&self) -> &str {
        &self.name
    }

    fn from_payload(payload: &Value) -> ValidationResult<Self> {
        let object = as_object(payload)?;
        reject_unknown(object, ALBUM_CREATE_FIELDS, &[])?;
        Ok(Album {
            id: String::new(),
            artist_id: required_string(object, "artist_id")?,
            name: required_string(object, "name")?,
            year: required_i32(object, "year")?,
            hidden: optional_bool(object, "hidden")?.unwrap_or(false),
            track_ids: BTreeSet::new(),
        })
    }

    fn update_deltas(payload: &Value) -> ValidationResult<Vec<FieldDelta>> {
        let object = as_object(payload)?;
        reject_unknown(object, ALBUM_UPDATE_FIELDS, &["artist_id"])?;
        set_deltas(vec![
            ("name", optional_string(object, "name")?.map(Value::from)),
            ("year", optional_i32(object, "year")?.map(Value::from)),
            ("hidden", optional_bool(object, "hidden")?.map(Value::from)),
        ])
    }
}

// =============================================================================
// Track
// =============================================================================

const TRACK_FIELDS: &[&str] = &[
    "artist_id",
    "album_id",
    "name",
    "duration_seconds",
    "hidden",
];

impl CatalogEntity for Track {
    const FILTERS: &'static [(&'static str, FilterKind)] = &[
        ("artist_id", FilterKind::Reference(EntityKind::Artist)),
        ("album_id", FilterKind::Reference(EntityKind::Album)),
        ("hidden", FilterKind::Flag),
    ];

    fn name(&self) -> &str {
        &self.name
    }

    fn from_payload(payload: &Value) -> ValidationResult<Self> {
        let object = as_object(payload)?;
        reject_unknown(object, TRACK_FIELDS, &[])?;
        Ok(Track {
            id: String::new(),
            artist_id: required_string(object, "artist_id")?,
            album_id: required_string(object, "album_id")?,
            name: required_string(object, "name")?,
            duration_seconds: required_positive(object, "duration_seconds")?,
            hidden: optional_bool(object, "hidden")?.unwrap_or(false),
        })
    }

    fn update_deltas(payload: &Value) -> ValidationResult<Vec<FieldDelta>> {
        let object = as_object(payload)?;
        reject_unknown(object, TRACK_FIELDS, &[])?;
        set_deltas(vec![
            ("name", optional_string(object, "name")?.map(Value::from)),
            (
                "duration_seconds",
                optional_positive(object, "duration_seconds")?.map(Value::from),
            ),
            ("hidden", optional_bool(object, "hidden")?.map(Value::from)),
            ("artist_id", optional_string(object, "artist_id")?.map(Value::from)),
            ("album_id", optional_string(object, "album_id")?.map(Value::from)),
        ])
    }
}

// =============================================================================
// Views
// =============================================================================

/// An album with its artist's name resolved through `artist_id`.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumView {
    #[serde(flatten)]
    pub album: Album,
    pub artist_name: Option<String>,
}

/// A track with artist and album names resolved through its ids.
#[derive(Debug, Clone, Serialize)]
pub struct TrackView {
    #[serde(flatten)]
    pub track: Track,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
}
