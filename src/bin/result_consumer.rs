//! Result consumer
//!
//! Long-running consumer on the shared result queue: stores transcoded bytes
//! and marks variants available. An error exits the process with the message
//! unacknowledged, so the broker redelivers it.

use futures::StreamExt;
use image_service::config::{AmqpConfig, DatabaseConfig, S3Config};
use image_service::queue::{self, messages::TranscodeResult, Broker, RESULT_QUEUE};
use image_service::services::results;
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
    let broker = Broker::connect(&AmqpConfig::from_env()?).await?;

    let mut consumer = broker.consume(RESULT_QUEUE).await?;

    tracing::info!(queue = RESULT_QUEUE, "result consumer starting");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;

        let message: TranscodeResult = serde_json::from_slice(&delivery.data)?;
        results::process_result(&pool, &store, message).await?;

        queue::ack(&delivery).await?;
    }

    Ok(())
}
