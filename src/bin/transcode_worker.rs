//! Transcoding worker
//!
//! Long-running consumer turning forward jobs into result messages via the
//! external encoders. One unacked message at a time per process; run more
//! processes for throughput.

use image_service::config::AmqpConfig;
use image_service::queue::Broker;
use image_service::services::worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AmqpConfig::from_env()?;
    let broker = Broker::connect(&config).await?;

    let kinds_env = std::env::var("WORKER_KINDS").ok();
    let kinds = worker::enabled_kinds(kinds_env.as_deref());

    tracing::info!(?kinds, "transcode worker starting");

    let mut tasks = tokio::task::JoinSet::new();
    for kind in kinds {
        let broker = Broker::connect(&config).await?;
        tasks.spawn(async move { worker::run_kind_consumer(&broker, kind).await });
    }

    while let Some(result) = tasks.join_next().await {
        result??;
    }

    Ok(())
}
