//! Integrity reconciliation batch job
//!
//! Scans all images, self-heals unambiguous invariant violations and prints
//! a report of what it could not resolve. Exit code 1 when problems remain.

use image_service::config::{DatabaseConfig, S3Config};
use image_service::services::reconcile::Reconciler;
use image_service::storage::S3Store;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let database = DatabaseConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .connect(&database.url)
        .await?;

    let store = S3Store::from_config(&S3Config::from_env()?).await;

    let reconciler = Reconciler {
        pool: &pool,
        store: &store,
    };

    let report = reconciler.run().await?;

    println!("orphan images deleted: {}", report.orphans_deleted.len());
    println!("duplicate primaries healed: {}", report.healed.len());

    if !report.unresolved_conflicts.is_empty() {
        println!("images with conflicting primary variants:");
        for id in &report.unresolved_conflicts {
            println!("- {id}");
        }
    }

    if !report.missing_primary.is_empty() {
        println!("images without a primary variant:");
        for id in &report.missing_primary {
            println!("- {id}");
        }
    }

    if report.unresolved_conflicts.is_empty() && report.missing_primary.is_empty() {
        println!("OK");
        Ok(())
    } else {
        std::process::exit(1);
    }
}
