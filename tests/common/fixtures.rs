//! Record builders that go through the services, so mirrors are populated
//! the same way production code populates them.

use super::constants::*;
use super::TestContext;
use music_catalog::entity_store::{Album, Artist, EntityKind, Track, TypedEntityStore, User};
use music_catalog::integrity::{self, Problem};
use music_catalog::user::{Identity, UserRole};
use serde_json::{json, Value};
use std::collections::BTreeSet;

pub fn artist_payload(name: &str) -> Value {
    json!({ "name": name, "grammy_count": 0 })
}

pub fn album_payload(artist_id: &str, name: &str) -> Value {
    json!({ "artist_id": artist_id, "name": name, "year": 1843 })
}

pub fn track_payload(artist_id: &str, album_id: &str, name: &str) -> Value {
    json!({
        "artist_id": artist_id,
        "album_id": album_id,
        "name": name,
        "duration_seconds": 184.5,
    })
}

pub fn create_artist(ctx: &TestContext, name: &str) -> String {
    ctx.catalog.create::<Artist>(&artist_payload(name)).unwrap()
}

pub fn create_album(ctx: &TestContext, artist_id: &str, name: &str) -> String {
    ctx.catalog
        .create::<Album>(&album_payload(artist_id, name))
        .unwrap()
}

pub fn create_track(ctx: &TestContext, artist_id: &str, album_id: &str, name: &str) -> String {
    ctx.catalog
        .create::<Track>(&track_payload(artist_id, album_id, name))
        .unwrap()
}

pub fn create_user(ctx: &TestContext, email: &str, role: UserRole) -> Identity {
    let id = ctx.users.create_user(email, TEST_PASS, role).unwrap();
    Identity::new(id, role)
}

/// One artist with one album holding three tracks.
pub struct SmallCatalog {
    pub artist_id: String,
    pub album_id: String,
    pub track_ids: Vec<String>,
}

pub fn small_catalog(ctx: &TestContext) -> SmallCatalog {
    let artist_id = create_artist(ctx, ARTIST_NAME);
    let album_id = create_album(ctx, &artist_id, ALBUM_NAME);
    let track_ids = TRACK_NAMES
        .iter()
        .map(|name| create_track(ctx, &artist_id, &album_id, name))
        .collect();
    SmallCatalog {
        artist_id,
        album_id,
        track_ids,
    }
}

pub fn artist(ctx: &TestContext, id: &str) -> Artist {
    ctx.store.get_record::<Artist>(id).unwrap().unwrap()
}

pub fn album(ctx: &TestContext, id: &str) -> Album {
    ctx.store.get_record::<Album>(id).unwrap().unwrap()
}

pub fn user(ctx: &TestContext, id: &str) -> User {
    ctx.store.get_record::<User>(id).unwrap().unwrap()
}

pub fn exists(ctx: &TestContext, kind: EntityKind, id: &str) -> bool {
    ctx.store.exists(kind, id).unwrap()
}

pub fn ids<'a>(items: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    items.into_iter().map(String::from).collect()
}

pub fn problems(ctx: &TestContext) -> Vec<Problem> {
    integrity::check(ctx.store.as_ref()).unwrap()
}

pub fn assert_consistent(ctx: &TestContext) {
    let problems = problems(ctx);
    assert!(problems.is_empty(), "integrity problems: {:#?}", problems);
}
