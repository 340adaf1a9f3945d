use crate::catalog::PageLimits;
use crate::entity_store::{
    EntityKind, EntityStore, Favorite, FavoriteCategory, Query, SortOrder, StoreError,
    TypedEntityStore,
};
use crate::error::{ServiceError, ServiceResult};
use crate::mirror::MirrorMaintainer;
use crate::user::Identity;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-user favorites, mirrored into `User.favorite_ids`.
#[derive(Clone)]
pub struct FavoritesService {
    store: Arc<dyn EntityStore>,
    mirror: MirrorMaintainer,
    limits: PageLimits,
}

fn parse_category(category: &str) -> ServiceResult<FavoriteCategory> {
    FavoriteCategory::from_str(category)
        .ok_or_else(|| ServiceError::InvalidCategory(category.to_string()))
}

impl FavoritesService {
    pub fn new(store: Arc<dyn EntityStore>, limits: PageLimits) -> Self {
        FavoritesService {
            mirror: MirrorMaintainer::new(store.clone()),
            store,
            limits,
        }
    }

    /// Favorites `item_id` for the caller and returns the new favorite's id.
    ///
    /// Duplicates are caught by the store's unique index on
    /// (user, category, item), so concurrent adds leave exactly one record.
    /// A user deleted between the checks and the attach takes the new
    /// favorite with it.
    pub fn add(&self, identity: &Identity, category: &str, item_id: &str) -> ServiceResult<String> {
        let category = parse_category(category)?;
        if !self.store.exists(EntityKind::User, &identity.user_id)? {
            return Err(ServiceError::reference_not_found(
                EntityKind::User,
                &identity.user_id,
            ));
        }
        if !self.store.exists(category.item_kind(), item_id)? {
            return Err(ServiceError::reference_not_found(
                category.item_kind(),
                item_id,
            ));
        }

        let favorite = Favorite {
            id: String::new(),
            user_id: identity.user_id.clone(),
            category,
            item_id: item_id.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };
        let stored = match self.store.insert_record(&favorite) {
            Ok(stored) => stored,
            Err(StoreError::UniqueViolation { .. }) => {
                debug!(
                    "User {} already has {} {} as favorite",
                    identity.user_id, category, item_id
                );
                return Err(ServiceError::DuplicateFavorite);
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.mirror.attach(
            EntityKind::User,
            &identity.user_id,
            EntityKind::Favorite,
            &stored.id,
        ) {
            let document = serde_json::to_value(&stored).map_err(StoreError::from)?;
            return Err(self.mirror.undo_insert(EntityKind::Favorite, &document, e));
        }

        info!(
            "User {} added favorite {} ({} {})",
            identity.user_id, stored.id, category, item_id
        );
        Ok(stored.id)
    }

    /// The caller's own favorites in one category, newest first.
    pub fn list_by_category(
        &self,
        identity: &Identity,
        category: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Favorite>> {
        let category = parse_category(category)?;
        let (limit, offset) = self.limits.clamp(limit, offset);
        let query = Query::new()
            .eq("user_id", identity.user_id.as_str())
            .eq("category", category.as_str())
            .sorted(SortOrder::NewestFirst)
            .page(limit, offset);
        Ok(self.store.find_records(&query)?)
    }

    /// Removes one of the caller's favorites. A favorite owned by someone
    /// else is reported exactly like a missing one.
    pub fn remove(&self, identity: &Identity, favorite_id: &str) -> ServiceResult<()> {
        let favorite = self
            .store
            .get_record::<Favorite>(favorite_id)?
            .filter(|favorite| favorite.user_id == identity.user_id)
            .ok_or_else(|| ServiceError::not_found(EntityKind::Favorite, favorite_id))?;
        self.remove_favorite(&favorite)
    }

    pub fn remove_all_for_user(&self, user_id: &str) -> ServiceResult<usize> {
        let favorites: Vec<Favorite> = self
            .store
            .find_records(&Query::new().eq("user_id", user_id))?;
        for favorite in &favorites {
            self.remove_favorite(favorite)?;
        }
        Ok(favorites.len())
    }

    pub fn remove_all_for_item(
        &self,
        category: FavoriteCategory,
        item_id: &str,
    ) -> ServiceResult<usize> {
        let favorites: Vec<Favorite> = self.store.find_records(
            &Query::new()
                .eq("category", category.as_str())
                .eq("item_id", item_id),
        )?;
        for favorite in &favorites {
            self.remove_favorite(favorite)?;
        }
        if !favorites.is_empty() {
            info!(
                "Removed {} favorite(s) of {} {}",
                favorites.len(),
                category,
                item_id
            );
        }
        Ok(favorites.len())
    }

    /// Detach, then delete.
    fn remove_favorite(&self, favorite: &Favorite) -> ServiceResult<()> {
        self.mirror.detach(
            EntityKind::User,
            &favorite.user_id,
            EntityKind::Favorite,
            &favorite.id,
        )?;
        if !self.store.delete(EntityKind::Favorite, &favorite.id)? {
            return Err(ServiceError::not_found(EntityKind::Favorite, &favorite.id));
        }
        debug!("Removed favorite {} of user {}", favorite.id, favorite.user_id);
        Ok(())
    }
}
