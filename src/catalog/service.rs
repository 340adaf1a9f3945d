//! Artist, album and track CRUD.
//!
//! Writes follow a fixed order: validate references, write the record, then
//! update mirrors. Deletes run the same order backwards: detach, then delete.

use super::entities::{AlbumView, CatalogEntity, FilterKind, TrackView};
use super::params::{parse_filters, ListParams, PageLimits};
use crate::entity_store::{
    apply_deltas, Album, Artist, EntityKind, EntityStore, FavoriteCategory, Query, StoreError,
    Track, TypedEntityStore,
};
use crate::error::{ServiceError, ServiceResult};
use crate::favorites::FavoritesService;
use crate::mirror::{links_for_child, links_for_parent, MirrorMaintainer};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What deleting an artist or album does to the records pointing at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParentDeletePolicy {
    /// Delete the children first, through the regular delete path.
    #[default]
    Cascade,
    /// Refuse while any child points at the parent.
    Restrict,
    /// Leave children with a dangling back-reference.
    Orphan,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSettings {
    pub limits: PageLimits,
    pub parent_delete_policy: ParentDeletePolicy,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn EntityStore>,
    mirror: MirrorMaintainer,
    favorites: FavoritesService,
    settings: CatalogSettings,
}

fn document_id(document: &Value) -> &str {
    document
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        favorites: FavoritesService,
        settings: CatalogSettings,
    ) -> Self {
        CatalogService {
            mirror: MirrorMaintainer::new(store.clone()),
            store,
            favorites,
            settings,
        }
    }

    // =========================================================================
    // Create / read
    // =========================================================================

    /// Validates and stores a new record, then attaches it to its parents.
    ///
    /// If a parent vanished after validation the record is removed again and
    /// the error is `ReferenceNotFound`. Any other attach failure leaves the
    /// record stored and the error is `PartialFailure` carrying its id.
    pub fn create<E: CatalogEntity>(&self, payload: &Value) -> ServiceResult<String> {
        let record = E::from_payload(payload)?;
        let document = serde_json::to_value(&record).map_err(StoreError::from)?;
        self.check_references(E::KIND, &document)?;

        let stored = self.store.insert(E::KIND, document)?;
        let id = document_id(&stored).to_string();
        if let Err(e) = self.mirror.attach_all(E::KIND, &stored) {
            return Err(self.mirror.undo_insert(E::KIND, &stored, e));
        }

        info!("Created {} {} '{}'", E::KIND, id, record.name());
        Ok(id)
    }

    pub fn get<E: CatalogEntity>(&self, id: &str) -> ServiceResult<E> {
        self.store
            .get_record::<E>(id)?
            .ok_or_else(|| ServiceError::not_found(E::KIND, id))
    }

    pub fn album_view(&self, id: &str) -> ServiceResult<AlbumView> {
        let album: Album = self.get(id)?;
        let artist_name = self
            .store
            .get_record::<Artist>(&album.artist_id)?
            .map(|artist| artist.name);
        Ok(AlbumView { album, artist_name })
    }

    pub fn track_view(&self, id: &str) -> ServiceResult<TrackView> {
        let track: Track = self.get(id)?;
        let artist_name = self
            .store
            .get_record::<Artist>(&track.artist_id)?
            .map(|artist| artist.name);
        let album_name = self
            .store
            .get_record::<Album>(&track.album_id)?
            .map(|album| album.name);
        Ok(TrackView {
            track,
            artist_name,
            album_name,
        })
    }

    /// Filtered page of records in insertion order. Unknown filter keys are
    /// ignored; hidden records are included unless filtered out.
    pub fn list<E: CatalogEntity>(&self, params: &ListParams) -> ServiceResult<Vec<E>> {
        let filters = parse_filters(&params.filters, E::FILTERS)?;
        let (limit, offset) = self.settings.limits.clamp(params.limit, params.offset);

        let mut query = Query::new().page(limit, offset);
        for filter in filters {
            if let FilterKind::Reference(kind) = filter.kind {
                let id = filter.value.as_str().unwrap_or_default();
                if !self.store.exists(kind, id)? {
                    return Err(ServiceError::reference_not_found(kind, id));
                }
            }
            query = query.eq(filter.key, filter.value);
        }
        Ok(self.store.find_records(&query)?)
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Applies the allowed fields present in `payload`. Changing a track's
    /// artist or album re-checks the pair, then reconciles the track's
    /// mirrors.
    pub fn update<E: CatalogEntity>(&self, id: &str, payload: &Value) -> ServiceResult<()> {
        let current = self
            .store
            .get(E::KIND, id)?
            .ok_or_else(|| ServiceError::not_found(E::KIND, id))?;
        let deltas = E::update_deltas(payload)?;

        let reparents = deltas
            .iter()
            .any(|delta| links_for_child(E::KIND).any(|link| link.back_ref == delta.field()));
        if reparents {
            let mut proposed = current;
            apply_deltas(E::KIND, &mut proposed, &deltas)?;
            self.check_references(E::KIND, &proposed)?;
        }

        self.store
            .patch(E::KIND, id, &deltas)?
            .ok_or_else(|| ServiceError::not_found(E::KIND, id))?;

        if reparents {
            self.mirror
                .reconcile(E::KIND, id)
                .map_err(|e| ServiceError::partial(E::KIND, id, e))?;
        }
        info!("Updated {} {} ({} field(s))", E::KIND, id, deltas.len());
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Deletes the record and returns its name.
    pub fn delete<E: CatalogEntity>(&self, id: &str) -> ServiceResult<String> {
        let document = self
            .store
            .get(E::KIND, id)?
            .ok_or_else(|| ServiceError::not_found(E::KIND, id))?;
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.delete_document(E::KIND, &document)?;
        Ok(name)
    }

    fn delete_document(&self, kind: EntityKind, document: &Value) -> ServiceResult<()> {
        let id = document_id(document);
        self.apply_parent_policy(kind, id)?;

        if let Some(category) = FavoriteCategory::for_item_kind(kind) {
            self.favorites.remove_all_for_item(category, id)?;
        }

        self.mirror
            .detach_all(kind, document)
            .map_err(|e| ServiceError::partial(kind, id, e))?;
        if !self.store.delete(kind, id)? {
            return Err(ServiceError::not_found(kind, id));
        }
        info!("Deleted {} {}", kind, id);
        Ok(())
    }

    fn apply_parent_policy(&self, kind: EntityKind, id: &str) -> ServiceResult<()> {
        let policy = self.settings.parent_delete_policy;
        for link in links_for_parent(kind) {
            let children = self
                .store
                .find(link.child, &Query::new().eq(link.back_ref, id))?;
            if children.is_empty() {
                continue;
            }
            match policy {
                ParentDeletePolicy::Restrict => {
                    return Err(ServiceError::HasDependents {
                        kind,
                        id: id.to_string(),
                        dependents: children.len(),
                    });
                }
                ParentDeletePolicy::Orphan => {
                    warn!(
                        "Deleting {} {} leaves {} {} record(s) orphaned",
                        kind,
                        id,
                        children.len(),
                        link.child
                    );
                }
                ParentDeletePolicy::Cascade => {
                    debug!(
                        "Cascading delete of {} {} to {} {} record(s)",
                        kind,
                        id,
                        children.len(),
                        link.child
                    );
                    for child in &children {
                        // A previous link's cascade may already have removed it.
                        if self.store.exists(link.child, document_id(child))? {
                            self.delete_document(link.child, child)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // References
    // =========================================================================

    /// Every back-reference must resolve, and a track's album must belong to
    /// the track's artist.
    fn check_references(&self, kind: EntityKind, document: &Value) -> ServiceResult<()> {
        for link in links_for_child(kind) {
            let parent_id = document
                .get(link.back_ref)
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !self.store.exists(link.parent, parent_id)? {
                return Err(ServiceError::reference_not_found(link.parent, parent_id));
            }
        }

        if kind == EntityKind::Track {
            let track: Track = serde_json::from_value(document.clone()).map_err(StoreError::from)?;
            let album = self
                .store
                .get_record::<Album>(&track.album_id)?
                .ok_or_else(|| ServiceError::reference_not_found(EntityKind::Album, &track.album_id))?;
            if album.artist_id != track.artist_id {
                debug!(
                    "Album {} belongs to artist {}, not {}",
                    album.id, album.artist_id, track.artist_id
                );
                return Err(ServiceError::reference_not_found(
                    EntityKind::Album,
                    &track.album_id,
                ));
            }
        }
        Ok(())
    }
}
