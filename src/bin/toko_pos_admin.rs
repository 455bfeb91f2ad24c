use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use toko_pos_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    services::maintenance::{retention_cutoff, MaintenanceService},
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "toko-pos-admin", about = "Maintenance tasks for the Toko POS database", version)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Load demo accounts, categories and products into an empty database
    Seed,
    /// Permanently remove rows soft-deleted longer ago than the retention window
    Purge {
        /// Days a soft-deleted row is kept; defaults to the configured retention
        #[arg(long)]
        retention_days: Option<i64>,
    },
}

struct AdminContext {
    config: AppConfig,
    db: Arc<DbPool>,
}

impl AdminContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;

        Ok(Self {
            config,
            db: Arc::new(db_pool),
        })
    }

    fn maintenance(&self) -> MaintenanceService {
        MaintenanceService::new(self.db.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = AdminContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            print_outcome(cli.json, &serde_json::json!({ "migrated": true }), "Migrations applied")?;
        }
        Commands::Seed => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            match context.maintenance().seed_demo_data().await? {
                Some(report) => print_outcome(
                    cli.json,
                    &report,
                    &format!(
                        "Seeded {} users, {} categories, {} products",
                        report.users, report.categories, report.products
                    ),
                )?,
                None => print_outcome(
                    cli.json,
                    &serde_json::json!({ "skipped": true }),
                    "Database already has users; seed skipped",
                )?,
            }
        }
        Commands::Purge { retention_days } => {
            let days = retention_days.unwrap_or(context.config.soft_delete_retention_days);
            if days < 0 {
                anyhow::bail!("--retention-days must not be negative");
            }
            let cutoff = retention_cutoff(Utc::now(), days);
            info!(%cutoff, retention_days = days, "purging expired soft-deleted rows");

            let report = context.maintenance().purge_expired_soft_deletes(cutoff).await?;
            print_outcome(
                cli.json,
                &report,
                &format!(
                    "Purged {} products, {} categories, {} users ({} still referenced by sales history)",
                    report.products_purged,
                    report.categories_purged,
                    report.users_purged,
                    report.products_skipped + report.categories_skipped + report.users_skipped
                ),
            )?;
        }
    }

    if let Ok(pool) = Arc::try_unwrap(context.db) {
        db::close_pool(pool).await?;
    }
    Ok(())
}

fn print_outcome<T: serde::Serialize>(json: bool, value: &T, summary: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}
