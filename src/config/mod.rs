mod file_config;

pub use file_config::{CatalogConfig, FileConfig};

use crate::catalog::{
    CatalogSettings, PageLimits, ParentDeletePolicy, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub read_pool_size: usize,
    pub parent_delete_policy: ParentDeletePolicy,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            db_path: None,
            read_pool_size: DEFAULT_READ_POOL_SIZE,
            parent_delete_policy: ParentDeletePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub read_pool_size: usize,
    pub catalog: CatalogSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        // The database file itself is created on first open, its directory is not.
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let read_pool_size = file.read_pool_size.unwrap_or(cli.read_pool_size);
        if read_pool_size == 0 {
            bail!("read_pool_size must be at least 1");
        }

        let catalog_file = file.catalog.unwrap_or_default();
        let limits = PageLimits {
            default_limit: catalog_file.default_page_limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            max_limit: catalog_file.max_page_limit.unwrap_or(MAX_PAGE_LIMIT),
        };
        if limits.default_limit == 0 || limits.max_limit == 0 {
            bail!("Page limits must be positive");
        }
        if limits.default_limit > limits.max_limit {
            bail!(
                "default_page_limit ({}) exceeds max_page_limit ({})",
                limits.default_limit,
                limits.max_limit
            );
        }

        let parent_delete_policy = match catalog_file.parent_delete_policy {
            Some(s) => parse_parent_delete_policy(&s)?,
            None => cli.parent_delete_policy,
        };

        Ok(AppConfig {
            db_path,
            read_pool_size,
            catalog: CatalogSettings {
                limits,
                parent_delete_policy,
            },
        })
    }
}

/// Uses clap's ValueEnum trait for parsing.
fn parse_parent_delete_policy(s: &str) -> Result<ParentDeletePolicy> {
    ParentDeletePolicy::from_str(s, true)
        .map_err(|_| anyhow::anyhow!("Unknown parent_delete_policy '{}'", s))
}
