//! Shared setup for the integration tests.
//!
//! Every test gets its own throwaway database. The services run on top of a
//! [`FlakyStore`], which passes calls straight through until a fault is armed,
//! so the same context serves both happy-path and partial-failure tests.
#![allow(dead_code)]

mod constants;
mod fixtures;
mod flaky_store;

pub use constants::*;
pub use fixtures::*;
pub use flaky_store::{FlakyStore, StoreOp};

use music_catalog::catalog::{CatalogService, CatalogSettings, PageLimits, ParentDeletePolicy};
use music_catalog::entity_store::{EntityStore, SqliteEntityStore};
use music_catalog::favorites::FavoritesService;
use music_catalog::mirror::MirrorMaintainer;
use music_catalog::user::UserManager;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestContext {
    _dir: TempDir,
    /// The store underneath the fault injector, for seeding broken state.
    pub raw: SqliteEntityStore,
    pub flaky: Arc<FlakyStore>,
    pub store: Arc<dyn EntityStore>,
    pub catalog: CatalogService,
    pub favorites: FavoritesService,
    pub users: UserManager,
    pub mirror: MirrorMaintainer,
}

pub struct TestContextBuilder {
    settings: CatalogSettings,
    read_pool_size: usize,
}

impl TestContextBuilder {
    pub fn parent_delete_policy(mut self, policy: ParentDeletePolicy) -> Self {
        self.settings.parent_delete_policy = policy;
        self
    }

    pub fn limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.settings.limits = PageLimits {
            default_limit,
            max_limit,
        };
        self
    }

    pub fn build(self) -> TestContext {
        let dir = TempDir::new().unwrap();
        let raw = SqliteEntityStore::new(dir.path().join("catalog.db"), self.read_pool_size)
            .unwrap();
        let flaky = Arc::new(FlakyStore::new(raw.clone()));
        let store: Arc<dyn EntityStore> = flaky.clone();

        let favorites = FavoritesService::new(store.clone(), self.settings.limits);
        TestContext {
            _dir: dir,
            raw,
            catalog: CatalogService::new(store.clone(), favorites.clone(), self.settings),
            users: UserManager::new(store.clone(), favorites.clone(), self.settings.limits),
            mirror: MirrorMaintainer::new(store.clone()),
            favorites,
            flaky,
            store,
        }
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestContextBuilder {
        TestContextBuilder {
            settings: CatalogSettings::default(),
            read_pool_size: 2,
        }
    }
}
