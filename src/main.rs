use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use music_catalog::catalog::{CatalogService, ListParams, ParentDeletePolicy};
use music_catalog::cli_style::{get_styles, print_key_values, print_list};
use music_catalog::config::{AppConfig, CliConfig, FileConfig, DEFAULT_READ_POOL_SIZE};
use music_catalog::entity_store::{
    Album, Artist, EntityKind, EntityStore, Favorite, SqliteEntityStore, Track, TypedEntityStore,
};
use music_catalog::favorites::FavoritesService;
use music_catalog::integrity;
use music_catalog::mirror::MirrorMaintainer;
use music_catalog::user::{Identity, Operation, UserManager, UserRole};
use music_catalog::ServiceError;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_kind(s: &str) -> Result<EntityKind, String> {
    EntityKind::from_str(s).ok_or_else(|| format!("unknown kind '{}'", s))
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[derive(Parser, Debug)]
#[command(styles = get_styles(), name = "catalog-admin", version)]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Number of read-only connections in the pool.
    #[clap(long, default_value_t = DEFAULT_READ_POOL_SIZE)]
    pub read_pool_size: usize,

    /// What deleting an artist or album does to its children.
    #[clap(long, value_enum, default_value_t = ParentDeletePolicy::Cascade)]
    pub parent_delete_policy: ParentDeletePolicy,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates an admin user. Admins can only be created here.
    AddAdmin { email: String, password: String },

    /// Creates an editor or viewer.
    AddUser {
        email: String,
        password: String,
        #[clap(default_value = "viewer")]
        role: String,
    },

    /// Lists users, newest first.
    Users {
        #[clap(long)]
        role: Option<String>,
        #[clap(long)]
        limit: Option<i64>,
        #[clap(long)]
        offset: Option<i64>,
    },

    /// Deletes a non-admin user and all of their favorites.
    DeleteUser { user_id: String },

    AddArtist {
        name: String,
        #[clap(default_value_t = 0)]
        grammy_count: u32,
        #[clap(long)]
        hidden: bool,
    },

    AddAlbum {
        artist_id: String,
        name: String,
        year: i32,
        #[clap(long)]
        hidden: bool,
    },

    AddTrack {
        artist_id: String,
        album_id: String,
        name: String,
        duration_seconds: f64,
        #[clap(long)]
        hidden: bool,
    },

    /// Prints one record as JSON.
    Show {
        #[clap(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
    },

    /// Lists artists, albums or tracks, filtered with `--filter key=value`.
    List {
        #[clap(value_parser = parse_kind)]
        kind: EntityKind,
        #[clap(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
        #[clap(long)]
        limit: Option<i64>,
        #[clap(long)]
        offset: Option<i64>,
    },

    /// Deletes an artist, album or track, applying the parent delete policy.
    Delete {
        #[clap(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
    },

    /// Brings the mirrors touching one record back in line.
    Reconcile {
        #[clap(value_parser = parse_kind)]
        kind: EntityKind,
        id: String,
    },

    /// Reconciles every record of every kind.
    Sweep,

    /// Reports integrity problems without changing anything.
    Check,

    /// Shows the path of the current database.
    Where,
}

struct AdminContext {
    store: Arc<dyn EntityStore>,
    catalog: CatalogService,
    users: UserManager,
    mirror: MirrorMaintainer,
    operator: Identity,
    db_path: PathBuf,
}

impl AdminContext {
    fn build(config: &AppConfig) -> Result<Self> {
        info!("Opening SQLite catalog database at {:?}...", config.db_path);
        let store: Arc<dyn EntityStore> = Arc::new(SqliteEntityStore::new(
            &config.db_path,
            config.read_pool_size,
        )?);
        let favorites = FavoritesService::new(store.clone(), config.catalog.limits);
        Ok(AdminContext {
            catalog: CatalogService::new(store.clone(), favorites.clone(), config.catalog),
            users: UserManager::new(store.clone(), favorites, config.catalog.limits),
            mirror: MirrorMaintainer::new(store.clone()),
            operator: Identity::new("operator", UserRole::Admin),
            db_path: config.db_path.clone(),
            store,
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn show(ctx: &AdminContext, kind: EntityKind, id: &str) -> Result<()> {
    match kind {
        EntityKind::Artist => print_json(&ctx.catalog.get::<Artist>(id)?),
        EntityKind::Album => print_json(&ctx.catalog.album_view(id)?),
        EntityKind::Track => print_json(&ctx.catalog.track_view(id)?),
        EntityKind::User => {
            ctx.operator.authorize(Operation::ListUsers)?;
            print_json(&ctx.users.get_user(id)?)
        }
        EntityKind::Favorite => match ctx.store.get_record::<Favorite>(id)? {
            Some(favorite) => print_json(&favorite),
            None => bail!("favorite '{}' not found", id),
        },
    }
}

fn list(ctx: &AdminContext, kind: EntityKind, params: &ListParams) -> Result<()> {
    match kind {
        EntityKind::Artist => print_json(&ctx.catalog.list::<Artist>(params)?),
        EntityKind::Album => print_json(&ctx.catalog.list::<Album>(params)?),
        EntityKind::Track => print_json(&ctx.catalog.list::<Track>(params)?),
        other => bail!("{} records cannot be listed here, use `users`", other),
    }
}

fn run(ctx: &AdminContext, command: Command) -> Result<()> {
    let operator = &ctx.operator;
    match command {
        Command::AddAdmin { email, password } => {
            operator.authorize(Operation::AddUser)?;
            let id = ctx.users.create_user(&email, &password, UserRole::Admin)?;
            println!("Created admin {}", id);
        }
        Command::AddUser {
            email,
            password,
            role,
        } => {
            operator.authorize(Operation::AddUser)?;
            let id = ctx.users.add_user(&email, &password, &role)?;
            println!("Created user {}", id);
        }
        Command::Users {
            role,
            limit,
            offset,
        } => {
            operator.authorize(Operation::ListUsers)?;
            let role = match role {
                Some(role) => match UserRole::from_str(&role) {
                    Some(role) => Some(role),
                    None => bail!("Invalid role '{}'", role),
                },
                None => None,
            };
            let users = ctx.users.list_users(role, limit, offset)?;
            let lines: Vec<String> = users
                .iter()
                .map(|u| {
                    format!(
                        "{} {} [{}] {} favorite(s)",
                        u.id, u.email, u.role, u.favorite_count
                    )
                })
                .collect();
            print_list("Users", &lines);
        }
        Command::DeleteUser { user_id } => {
            operator.authorize(Operation::DeleteUser)?;
            let email = ctx.users.delete_user(&user_id)?;
            println!("Deleted user {}", email);
        }
        Command::AddArtist {
            name,
            grammy_count,
            hidden,
        } => {
            operator.authorize(Operation::WriteCatalog)?;
            let payload = json!({ "name": name, "grammy_count": grammy_count, "hidden": hidden });
            println!("Created artist {}", ctx.catalog.create::<Artist>(&payload)?);
        }
        Command::AddAlbum {
            artist_id,
            name,
            year,
            hidden,
        } => {
            operator.authorize(Operation::WriteCatalog)?;
            let payload = json!({
                "artist_id": artist_id,
                "name": name,
                "year": year,
                "hidden": hidden,
            });
            println!("Created album {}", ctx.catalog.create::<Album>(&payload)?);
        }
        Command::AddTrack {
            artist_id,
            album_id,
            name,
            duration_seconds,
            hidden,
        } => {
            operator.authorize(Operation::WriteCatalog)?;
            let payload = json!({
                "artist_id": artist_id,
                "album_id": album_id,
                "name": name,
                "duration_seconds": duration_seconds,
                "hidden": hidden,
            });
            println!("Created track {}", ctx.catalog.create::<Track>(&payload)?);
        }
        Command::Show { kind, id } => {
            operator.authorize(Operation::ReadCatalog)?;
            show(ctx, kind, &id)?;
        }
        Command::List {
            kind,
            filters,
            limit,
            offset,
        } => {
            operator.authorize(Operation::ReadCatalog)?;
            let mut params = ListParams::new();
            for (key, value) in filters {
                params = params.filter(key, value);
            }
            params.limit = limit;
            params.offset = offset;
            list(ctx, kind, &params)?;
        }
        Command::Delete { kind, id } => {
            operator.authorize(Operation::WriteCatalog)?;
            let name = match kind {
                EntityKind::Artist => ctx.catalog.delete::<Artist>(&id)?,
                EntityKind::Album => ctx.catalog.delete::<Album>(&id)?,
                EntityKind::Track => ctx.catalog.delete::<Track>(&id)?,
                EntityKind::User => bail!("use `delete-user` to delete users"),
                EntityKind::Favorite => bail!("favorites are removed by their owner"),
            };
            println!("Deleted {} '{}'", kind, name);
        }
        Command::Reconcile { kind, id } => {
            operator.authorize(Operation::Reconcile)?;
            let report = ctx.mirror.reconcile(kind, &id)?;
            print_key_values(&[
                ("attached", report.attached.to_string()),
                ("detached", report.detached.to_string()),
            ]);
            print_list("Dangling references", &report.dangling);
        }
        Command::Sweep => {
            operator.authorize(Operation::Reconcile)?;
            let report = ctx.mirror.sweep()?;
            print_key_values(&[
                ("attached", report.attached.to_string()),
                ("detached", report.detached.to_string()),
            ]);
            print_list("Dangling references", &report.dangling);
        }
        Command::Check => {
            operator.authorize(Operation::CheckIntegrity)?;
            let problems = integrity::check(ctx.store.as_ref())?;
            print_list("Problems", &problems);
        }
        Command::Where => {
            println!("{}", ctx.db_path.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install the log subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        read_pool_size: cli_args.read_pool_size,
        parent_delete_policy: cli_args.parent_delete_policy,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;
    let ctx = AdminContext::build(&config)?;

    if let Err(err) = run(&ctx, cli_args.command) {
        if let Some(ServiceError::PartialFailure { kind, id, .. }) = err.downcast_ref() {
            warn!(
                "{} {} was written but its mirrors are stale, run `reconcile {} {}`",
                kind, id, kind, id
            );
        }
        return Err(err);
    }
    Ok(())
}
