//! Partial failures, reconcile and sweep.

mod common;

use common::*;
use music_catalog::catalog::ParentDeletePolicy;
use music_catalog::entity_store::{Album, EntityKind, EntityStore, FieldDelta, Track};
use music_catalog::integrity::Problem;
use music_catalog::mirror::MirrorError;
use music_catalog::user::UserRole;
use music_catalog::{ResultCategory, ServiceError};
use serde_json::{json, Value};

fn add_to(field: &str, id: &str) -> FieldDelta {
    FieldDelta::AddToSet(field.to_string(), Value::from(id))
}

fn pull_from(field: &str, id: &str) -> FieldDelta {
    FieldDelta::Pull(field.to_string(), Value::from(id))
}

fn partial_failure_id(err: ServiceError, expected_kind: EntityKind) -> String {
    assert_eq!(err.category(), ResultCategory::PartialFailure, "{}", err);
    match err {
        ServiceError::PartialFailure { kind, id, .. } => {
            assert_eq!(kind, expected_kind);
            id
        }
        other => panic!("expected a partial failure, got {:?}", other),
    }
}

// =============================================================================
// Attach / detach
// =============================================================================

#[test]
fn attach_and_detach_are_idempotent() {
    let ctx = TestContext::new();
    let ada = create_artist(&ctx, ARTIST_NAME);
    let album_id = create_album(&ctx, &ada, ALBUM_NAME);

    ctx.mirror
        .attach(EntityKind::Artist, &ada, EntityKind::Album, &album_id)
        .unwrap();
    ctx.mirror
        .attach(EntityKind::Artist, &ada, EntityKind::Album, &album_id)
        .unwrap();
    assert_eq!(artist(&ctx, &ada).album_ids, ids([album_id.as_str()]));

    ctx.mirror
        .detach(EntityKind::Artist, &ada, EntityKind::Album, &album_id)
        .unwrap();
    ctx.mirror
        .detach(EntityKind::Artist, &ada, EntityKind::Album, &album_id)
        .unwrap();
    assert!(artist(&ctx, &ada).album_ids.is_empty());
}

#[test]
fn attach_needs_an_existing_parent_and_a_known_link() {
    let ctx = TestContext::new();

    let err = ctx
        .mirror
        .attach(EntityKind::Artist, "ghost", EntityKind::Album, "some-album")
        .unwrap_err();
    assert!(matches!(
        err,
        MirrorError::ParentMissing {
            kind: EntityKind::Artist,
            ..
        }
    ));

    let err = ctx
        .mirror
        .attach(EntityKind::Album, "any", EntityKind::Artist, "any")
        .unwrap_err();
    assert!(matches!(err, MirrorError::NoSuchLink { .. }));

    // Detaching from a parent that is gone is fine.
    ctx.mirror
        .detach(EntityKind::Artist, "ghost", EntityKind::Album, "some-album")
        .unwrap();
}

// =============================================================================
// Partial failures
// =============================================================================

#[test]
fn failed_album_attach_on_track_create_is_repaired_by_reconcile() {
    let ctx = TestContext::new();
    let catalog = small_catalog(&ctx);

    ctx.flaky.fail_next(StoreOp::Patch, EntityKind::Album);
    let err = ctx
        .catalog
        .create::<Track>(&track_payload(
            &catalog.artist_id,
            &catalog.album_id,
            "Late",
        ))
        .unwrap_err();
    let track_id = partial_failure_id(err, EntityKind::Track);
    assert_eq!(ctx.flaky.injected(), 1);

    // The artist mirror was updated before the failure, the album's was not.
    assert!(exists(&ctx, EntityKind::Track, &track_id));
    assert!(artist(&ctx, &catalog.artist_id).track_ids.contains(&track_id));
    assert!(!album(&ctx, &catalog.album_id).track_ids.contains(&track_id));

    let report = ctx.mirror.reconcile(EntityKind::Track, &track_id).unwrap();
    assert_eq!(report.attached, 1);
    assert_eq!(report.detached, 0);
    assert!(report.dangling.is_empty());
    assert_consistent(&ctx);
}

#[test]
fn failed_reconcile_after_reparenting_is_retryable() {
    let ctx = TestContext::new();
    let catalog = small_catalog(&ctx);
    let second_album = create_album(&ctx, &catalog.artist_id, OTHER_ALBUM_NAME);
    let track_id = &catalog.track_ids[0];

    ctx.flaky.fail_next(StoreOp::Patch, EntityKind::Album);
    let err = ctx
        .catalog
        .update::<Track>(track_id, &json!({ "album_id": second_album }))
        .unwrap_err();
    assert_eq!(partial_failure_id(err, EntityKind::Track), *track_id);

    // The track itself moved.
    let track = ctx.catalog.get::<Track>(track_id).unwrap();
    assert_eq!(track.album_id, second_album);
    assert!(!problems(&ctx).is_empty());

    ctx.mirror.reconcile(EntityKind::Track, track_id).unwrap();
    assert_eq!(album(&ctx, &second_album).track_ids, ids([track_id.as_str()]));
    assert!(!album(&ctx, &catalog.album_id).track_ids.contains(track_id));
    assert_consistent(&ctx);
}

#[test]
fn failed_detach_keeps_the_record_for_a_retry() {
    let ctx = TestContext::new();
    let catalog = small_catalog(&ctx);
    let track_id = &catalog.track_ids[2];

    ctx.flaky.fail_next(StoreOp::Patch, EntityKind::Artist);
    let err = ctx.catalog.delete::<Track>(track_id).unwrap_err();
    assert_eq!(partial_failure_id(err, EntityKind::Track), *track_id);
    assert!(exists(&ctx, EntityKind::Track, track_id));
    assert_consistent(&ctx);

    ctx.catalog.delete::<Track>(track_id).unwrap();
    assert!(!exists(&ctx, EntityKind::Track, track_id));
    assert!(!artist(&ctx, &catalog.artist_id).track_ids.contains(track_id));
    assert!(!album(&ctx, &catalog.album_id).track_ids.contains(track_id));
    assert_consistent(&ctx);
}

#[test]
fn store_failure_before_the_write_is_not_partial() {
    let ctx = TestContext::new();
    let ada = create_artist(&ctx, ARTIST_NAME);

    ctx.flaky.fail_next(StoreOp::Insert, EntityKind::Album);
    let err = ctx
        .catalog
        .create::<Album>(&album_payload(&ada, ALBUM_NAME))
        .unwrap_err();
    assert_eq!(err.category(), ResultCategory::Internal);
    assert!(!err.is_retryable());
    assert_eq!(ctx.store.count(EntityKind::Album).unwrap(), 0);
    assert!(artist(&ctx, &ada).album_ids.is_empty());
}

// =============================================================================
// Reconcile
// =============================================================================

#[test]
fn reconcile_converges_from_a_scrambled_child() {
    let ctx = TestContext::new();
    let catalog = small_catalog(&ctx);
    let wrong_album = create_album(&ctx, &catalog.artist_id, OTHER_ALBUM_NAME);
    let track_id = &catalog.track_ids[1];

    ctx.raw
        .patch(
            EntityKind::Album,
            &catalog.album_id,
            &[pull_from("track_ids", track_id)],
        )
        .unwrap();
    ctx.raw
        .patch(
            EntityKind::Album,
            &wrong_album,
            &[add_to("track_ids", track_id)],
        )
        .unwrap();
    assert_eq!(problems(&ctx).len(), 2);

    let first = ctx.mirror.reconcile(EntityKind::Track, track_id).unwrap();
    assert_eq!((first.attached, first.detached), (1, 1));

    for _ in 0..3 {
        let again = ctx.mirror.reconcile(EntityKind::Track, track_id).unwrap();
        assert!(!again.changed());
    }
    assert!(album(&ctx, &catalog.album_id).track_ids.contains(track_id));
    assert!(!album(&ctx, &wrong_album).track_ids.contains(track_id));
    assert_consistent(&ctx);
}

#[test]
fn reconcile_of_a_parent_rebuilds_its_mirrors() {
    let ctx = TestContext::new();
    let catalog = small_catalog(&ctx);

    ctx.raw
        .patch(
            EntityKind::Artist,
            &catalog.artist_id,
            &[
                FieldDelta::Set("track_ids".to_string(), json!(["ghost-track"])),
                add_to("album_ids", "ghost-album"),
            ],
        )
        .unwrap();

    let report = ctx
        .mirror
        .reconcile(EntityKind::Artist, &catalog.artist_id)
        .unwrap();
    assert_eq!(report.attached, 3);
    assert_eq!(report.detached, 2);

    let repaired = artist(&ctx, &catalog.artist_id);
    assert_eq!(
        repaired.track_ids,
        ids(catalog.track_ids.iter().map(String::as_str))
    );
    assert_eq!(repaired.album_ids, ids([catalog.album_id.as_str()]));
    assert_consistent(&ctx);
}

#[test]
fn reconcile_of_a_deleted_child_clears_stale_entries() {
    let ctx = TestContext::new();
    let catalog = small_catalog(&ctx);
    let track_id = catalog.track_ids[0].clone();

    // Delete the record behind the services' back, leaving both mirrors stale.
    ctx.raw.delete(EntityKind::Track, &track_id).unwrap();
    assert_eq!(problems(&ctx).len(), 2);

    let report = ctx.mirror.reconcile(EntityKind::Track, &track_id).unwrap();
    assert_eq!(report.detached, 2);
    assert_consistent(&ctx);
}

#[test]
fn reconcile_reports_orphans_of_a_deleted_parent() {
    let ctx = TestContext::builder()
        .parent_delete_policy(ParentDeletePolicy::Orphan)
        .build();
    let catalog = small_catalog(&ctx);

    ctx.catalog.delete::<Album>(&catalog.album_id).unwrap();

    let report = ctx
        .mirror
        .reconcile(EntityKind::Album, &catalog.album_id)
        .unwrap();
    assert!(!report.changed());
    assert_eq!(report.dangling.len(), 3);
    assert!(report
        .dangling
        .iter()
        .all(|d| d.field == "album_id" && d.target_id == catalog.album_id));
}

// =============================================================================
// Sweep and integrity check
// =============================================================================

#[test]
fn sweep_repairs_every_collection() {
    let ctx = TestContext::new();
    let catalog = small_catalog(&ctx);
    let ada = create_user(&ctx, USER_EMAIL, UserRole::Viewer);
    let favorite_id = ctx
        .favorites
        .add(&ada, "track", &catalog.track_ids[0])
        .unwrap();

    ctx.raw
        .patch(
            EntityKind::User,
            &ada.user_id,
            &[pull_from("favorite_ids", &favorite_id)],
        )
        .unwrap();
    ctx.raw
        .patch(
            EntityKind::Album,
            &catalog.album_id,
            &[add_to("track_ids", "ghost-track")],
        )
        .unwrap();
    ctx.raw
        .patch(
            EntityKind::Artist,
            &catalog.artist_id,
            &[pull_from("album_ids", &catalog.album_id)],
        )
        .unwrap();
    assert_eq!(problems(&ctx).len(), 3);

    let report = ctx.mirror.sweep().unwrap();
    assert!(report.changed());
    assert!(report.dangling.is_empty());
    assert_consistent(&ctx);

    let second = ctx.mirror.sweep().unwrap();
    assert!(!second.changed());
}

#[test]
fn check_reports_cross_artist_tracks_and_dangling_favorites() {
    let ctx = TestContext::new();
    let catalog = small_catalog(&ctx);
    let babbage = create_artist(&ctx, OTHER_ARTIST_NAME);
    let ada = create_user(&ctx, USER_EMAIL, UserRole::Viewer);
    ctx.favorites
        .add(&ada, "album", &catalog.album_id)
        .unwrap();
    let track_id = &catalog.track_ids[0];

    ctx.raw
        .patch(
            EntityKind::Track,
            track_id,
            &[FieldDelta::Set("artist_id".to_string(), json!(babbage))],
        )
        .unwrap();
    ctx.raw.delete(EntityKind::Album, &catalog.album_id).unwrap();

    let found = problems(&ctx);
    assert!(found
        .iter()
        .any(|p| matches!(p, Problem::DanglingReference { kind: EntityKind::Favorite, .. })));
    assert!(found.iter().any(|p| matches!(
        p,
        Problem::DanglingReference { field: "album_id", id, .. } if id == track_id
    )));

    // With the album back in place, the artist mismatch becomes visible.
    let album_doc = serde_json::to_value(Album {
        id: catalog.album_id.clone(),
        artist_id: catalog.artist_id.clone(),
        name: ALBUM_NAME.to_string(),
        year: 1843,
        hidden: false,
        track_ids: ids(catalog.track_ids.iter().map(String::as_str)),
    })
    .unwrap();
    ctx.raw.put(EntityKind::Album, album_doc).unwrap();

    assert!(problems(&ctx).iter().any(|p| matches!(
        p,
        Problem::CrossArtistTrack { track_id: t, .. } if t == track_id
    )));
}
