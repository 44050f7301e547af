mod auth;
mod config;
mod graphql;
mod http;
mod seed;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use platform_db::{DatabaseSettings, DbPool, SeaOrmDealStore, connect};
use platform_obs::{ObsConfig, init_tracing};
use products_crm::{Caller, DealStore, MemoryDealStore, PipelineEngine};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "crm-server", version, about = "Deal pipeline server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Open a demo pipeline for one owner.
    Seed {
        #[arg(long, value_name = "UUID", help = "Owner of the seeded deals")]
        owner: Option<Uuid>,
    },
    /// Forecast every deal owner and print the batch as JSON.
    #[command(name = "forecast-all")]
    ForecastAll,
    /// Issue a session token for local testing.
    #[command(name = "issue-token")]
    IssueToken {
        #[arg(long, value_name = "UUID")]
        user: Uuid,
    },
    /// Print the GraphQL schema snapshot.
    #[command(name = "schema:print")]
    SchemaPrint {
        #[arg(long, value_name = "FILE", help = "Destination file path")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
    #[arg(long, help = "Keep deals in process memory instead of the database")]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _obs = init_tracing(ObsConfig::from_env())?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Migrate(action) => match action {
            MigrateCommand::Up => migrate_up().await,
            MigrateCommand::Down => migrate_down().await,
        },
        Command::Seed { owner } => run_seed(owner).await,
        Command::ForecastAll => forecast_all().await,
        Command::IssueToken { user } => issue_token(user),
        Command::SchemaPrint { output } => schema_print(output),
    }
}

async fn setup_pool() -> Result<DbPool> {
    let settings = DatabaseSettings::from_env();
    connect(&settings).await.map_err(Into::into)
}

async fn database_engine() -> Result<(PipelineEngine, DbPool)> {
    let pool = setup_pool().await?;
    let store: Arc<dyn DealStore> = Arc::new(SeaOrmDealStore::new(pool.clone()));
    Ok((PipelineEngine::new(store), pool))
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    let config = AppConfig::load()?;
    let (engine, pool) = if cmd.memory {
        warn!("serving from the in-memory store; deals are lost on exit");
        let store: Arc<dyn DealStore> = Arc::new(MemoryDealStore::new());
        (PipelineEngine::new(store), None)
    } else {
        let (engine, pool) = database_engine().await?;
        ensure_migrations(&pool, cmd.allow_dirty).await?;
        (engine, Some(pool))
    };
    let state = AppState {
        schema: graphql::build_schema(engine.clone()),
        engine,
        auth: Arc::new(config.auth),
        cors_allowed_origins: Arc::new(config.cors_allowed_origins),
        pool,
    };
    http::serve(ServeConfig::new(cmd.host, cmd.port), state).await
}

async fn ensure_migrations(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `cargo run -p server -- migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn migrate_up() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::up(&pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::down(&pool, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}

async fn run_seed(owner: Option<Uuid>) -> Result<()> {
    let (engine, pool) = database_engine().await?;
    ensure_migrations(&pool, false).await?;
    let owner = owner.unwrap_or_else(Uuid::new_v4);
    let deals = seed::seed_demo_pipeline(&engine, Caller::new(owner))
        .await
        .context("seed data failed")?;
    println!("seeded {} deals for owner {owner}", deals.len());
    Ok(())
}

async fn forecast_all() -> Result<()> {
    let (engine, _pool) = database_engine().await?;
    let batch = engine
        .forecast_all()
        .await
        .context("batch forecast failed")?;
    println!("{}", serde_json::to_string_pretty(&batch)?);
    Ok(())
}

fn issue_token(user: Uuid) -> Result<()> {
    let config = AppConfig::load()?;
    let token = auth::issue_token(user, &config.auth).context("failed to sign token")?;
    println!("{token}");
    Ok(())
}

fn schema_print(path: Option<PathBuf>) -> Result<()> {
    let store: Arc<dyn DealStore> = Arc::new(MemoryDealStore::new());
    let schema = graphql::build_schema(PipelineEngine::new(store));
    let sdl = schema.sdl();
    match path {
        Some(target) => {
            std::fs::write(&target, sdl)
                .with_context(|| format!("failed to write {}", target.display()))?;
            info!(path = %target.display(), "schema snapshot written");
        }
        None => println!("{sdl}"),
    }
    Ok(())
}
