//! Read-only consistency check over the whole store.

use crate::entity_store::{EntityKind, EntityStore, FavoriteCategory, Query, StoreResult};
use crate::mirror::{mirror_entries, MIRROR_LINKS};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// `kind id.field` names a record that does not exist.
    DanglingReference {
        kind: EntityKind,
        id: String,
        field: &'static str,
        target_kind: EntityKind,
        target_id: String,
    },
    /// The track's album belongs to a different artist.
    CrossArtistTrack {
        track_id: String,
        artist_id: String,
        album_artist_id: String,
    },
    MissingMirrorEntry {
        parent_kind: EntityKind,
        parent_id: String,
        field: &'static str,
        child_id: String,
    },
    ExtraMirrorEntry {
        parent_kind: EntityKind,
        parent_id: String,
        field: &'static str,
        child_id: String,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::DanglingReference {
                kind,
                id,
                field,
                target_kind,
                target_id,
            } => write!(
                f,
                "dangling: {} {} {} -> missing {} {}",
                kind, id, field, target_kind, target_id
            ),
            Problem::CrossArtistTrack {
                track_id,
                artist_id,
                album_artist_id,
            } => write!(
                f,
                "cross-artist: track {} has artist {} but its album belongs to {}",
                track_id, artist_id, album_artist_id
            ),
            Problem::MissingMirrorEntry {
                parent_kind,
                parent_id,
                field,
                child_id,
            } => write!(
                f,
                "missing mirror: {} {}.{} lacks {}",
                parent_kind, parent_id, field, child_id
            ),
            Problem::ExtraMirrorEntry {
                parent_kind,
                parent_id,
                field,
                child_id,
            } => write!(
                f,
                "extra mirror: {} {}.{} holds {}",
                parent_kind, parent_id, field, child_id
            ),
        }
    }
}

fn id_of(doc: &Value) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

fn str_field<'a>(doc: &'a Value, field: &str) -> &'a str {
    doc.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Reports every broken reference and mirror without modifying anything.
pub fn check(store: &dyn EntityStore) -> StoreResult<Vec<Problem>> {
    let mut all: BTreeMap<EntityKind, Vec<Value>> = BTreeMap::new();
    for kind in EntityKind::ALL {
        all.insert(kind, store.find(kind, &Query::new())?);
    }
    let docs = |kind: EntityKind| all.get(&kind).map(Vec::as_slice).unwrap_or_default();

    let mut problems = Vec::new();

    for link in MIRROR_LINKS.iter() {
        let parents: BTreeMap<&str, BTreeSet<String>> = docs(link.parent)
            .iter()
            .filter_map(|p| id_of(p).map(|id| (id, mirror_entries(p, link.mirror_field))))
            .collect();
        let mut pointing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

        for child in docs(link.child) {
            let Some(child_id) = id_of(child) else { continue };
            let parent_id = str_field(child, link.back_ref);
            match parents.get(parent_id) {
                None => problems.push(Problem::DanglingReference {
                    kind: link.child,
                    id: child_id.to_string(),
                    field: link.back_ref,
                    target_kind: link.parent,
                    target_id: parent_id.to_string(),
                }),
                Some(mirror) => {
                    if !mirror.contains(child_id) {
                        problems.push(Problem::MissingMirrorEntry {
                            parent_kind: link.parent,
                            parent_id: parent_id.to_string(),
                            field: link.mirror_field,
                            child_id: child_id.to_string(),
                        });
                    }
                    pointing.entry(parent_id).or_default().insert(child_id);
                }
            }
        }

        for (parent_id, mirror) in &parents {
            let expected = pointing.get(parent_id);
            for entry in mirror {
                if !expected.is_some_and(|set| set.contains(entry.as_str())) {
                    problems.push(Problem::ExtraMirrorEntry {
                        parent_kind: link.parent,
                        parent_id: parent_id.to_string(),
                        field: link.mirror_field,
                        child_id: entry.clone(),
                    });
                }
            }
        }
    }

    let album_artists: BTreeMap<&str, &str> = docs(EntityKind::Album)
        .iter()
        .filter_map(|album| id_of(album).map(|id| (id, str_field(album, "artist_id"))))
        .collect();
    for track in docs(EntityKind::Track) {
        let Some(track_id) = id_of(track) else { continue };
        let artist_id = str_field(track, "artist_id");
        if let Some(album_artist_id) = album_artists.get(str_field(track, "album_id")) {
            if *album_artist_id != artist_id {
                problems.push(Problem::CrossArtistTrack {
                    track_id: track_id.to_string(),
                    artist_id: artist_id.to_string(),
                    album_artist_id: album_artist_id.to_string(),
                });
            }
        }
    }

    for favorite in docs(EntityKind::Favorite) {
        let Some(favorite_id) = id_of(favorite) else { continue };
        let Some(category) = FavoriteCategory::from_str(str_field(favorite, "category")) else {
            continue;
        };
        let item_kind = category.item_kind();
        let item_id = str_field(favorite, "item_id");
        if !docs(item_kind).iter().any(|doc| id_of(doc) == Some(item_id)) {
            problems.push(Problem::DanglingReference {
                kind: EntityKind::Favorite,
                id: favorite_id.to_string(),
                field: "item_id",
                target_kind: item_kind,
                target_id: item_id.to_string(),
            });
        }
    }

    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_store::MockEntityStore;
    use serde_json::json;

    fn store_with(docs: Vec<(EntityKind, Value)>) -> MockEntityStore {
        let mut store = MockEntityStore::new();
        store.expect_find().returning(move |kind, _| {
            Ok(docs
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, doc)| doc.clone())
                .collect())
        });
        store
    }

    #[test]
    fn consistent_catalog_has_no_problems() {
        let store = store_with(vec![
            (
                EntityKind::Artist,
                json!({"id": "a1", "album_ids": ["b1"], "track_ids": ["t1"]}),
            ),
            (
                EntityKind::Album,
                json!({"id": "b1", "artist_id": "a1", "track_ids": ["t1"]}),
            ),
            (
                EntityKind::Track,
                json!({"id": "t1", "artist_id": "a1", "album_id": "b1"}),
            ),
        ]);
        assert!(check(&store).unwrap().is_empty());
    }

    #[test]
    fn detects_every_problem_kind() {
        let store = store_with(vec![
            (
                EntityKind::Artist,
                json!({"id": "a1", "album_ids": ["b1", "ghost"], "track_ids": []}),
            ),
            (
                EntityKind::Artist,
                json!({"id": "a2", "album_ids": ["b2"], "track_ids": ["t1"]}),
            ),
            (
                EntityKind::Album,
                json!({"id": "b1", "artist_id": "a1", "track_ids": ["t1"]}),
            ),
            (
                EntityKind::Album,
                json!({"id": "b2", "artist_id": "a2", "track_ids": []}),
            ),
            (
                EntityKind::Track,
                json!({"id": "t1", "artist_id": "a2", "album_id": "b1"}),
            ),
            (
                EntityKind::Favorite,
                json!({"id": "f1", "user_id": "u9", "category": "track", "item_id": "t1"}),
            ),
        ]);

        let problems = check(&store).unwrap();
        assert!(problems.contains(&Problem::ExtraMirrorEntry {
            parent_kind: EntityKind::Artist,
            parent_id: "a1".to_string(),
            field: "album_ids",
            child_id: "ghost".to_string(),
        }));
        assert!(problems.contains(&Problem::CrossArtistTrack {
            track_id: "t1".to_string(),
            artist_id: "a2".to_string(),
            album_artist_id: "a1".to_string(),
        }));
        assert!(problems.contains(&Problem::DanglingReference {
            kind: EntityKind::Favorite,
            id: "f1".to_string(),
            field: "user_id",
            target_kind: EntityKind::User,
            target_id: "u9".to_string(),
        }));
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn missing_mirror_entry_is_reported() {
        let store = store_with(vec![
            (
                EntityKind::User,
                json!({"id": "u1", "favorite_ids": []}),
            ),
            (
                EntityKind::Artist,
                json!({"id": "a1", "album_ids": [], "track_ids": []}),
            ),
            (
                EntityKind::Favorite,
                json!({"id": "f1", "user_id": "u1", "category": "artist", "item_id": "a1"}),
            ),
        ]);

        let problems = check(&store).unwrap();
        assert_eq!(
            problems,
            vec![Problem::MissingMirrorEntry {
                parent_kind: EntityKind::User,
                parent_id: "u1".to_string(),
                field: "favorite_ids",
                child_id: "f1".to_string(),
            }]
        );
    }
}
