use anyhow::Context;
use sea_orm_migration::MigratorTrait;
use storefront_api::{config, db, migrator::Migrator};
use tracing::info;

/// Applies pending migrations, or with `down` reverts the most recent one.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    match std::env::args().nth(1).as_deref() {
        Some("down") => {
            info!("Reverting last migration");
            Migrator::down(&pool, Some(1))
                .await
                .context("failed to revert migration")?;
        }
        Some("up") | None => {
            db::run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
        }
        Some(other) => anyhow::bail!("unknown command {other:?}; expected `up` or `down`"),
    }

    info!("Migration completed successfully");
    Ok(())
}
