//! Re-render stored variants by id
//!
//! Raster variants are re-rendered from the full-size original and
//! re-uploaded in place. Optimized (worker-produced) variants are only
//! flagged `regenerate`; primaries are refused.

use bytes::Bytes;
use image_service::config::{AmqpConfig, DatabaseConfig, S3Config};
use image_service::db::variant_repo;
use image_service::queue::Broker;
use image_service::services::processor::{self, RenderSpec};
use image_service::services::variants;
use image_service::storage::{ObjectStore, S3Store};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let variant_ids: Vec<Uuid> = std::env::args()
        .skip(1)
        .map(|raw| Uuid::parse_str(&raw))
        .collect::<Result<_, _>>()?;

    if variant_ids.is_empty() {
        anyhow::bail!("usage: regenerate-variants <variant-id>...");
    }

    let database = DatabaseConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .connect(&database.url)
        .await?;

    let store = S3Store::from_config(&S3Config::from_env()?).await;
    let broker = Broker::connect(&AmqpConfig::from_env()?).await?;

    for variant_id in variant_ids {
        println!("regenerating variant {variant_id}");

        let Some(variant) = variant_repo::find_by_id(&pool, variant_id).await? else {
            println!("variant {variant_id} not found, skipping");
            continue;
        };

        let kind = variant.encoding_kind();
        let is_raster = kind.map(|k| k.is_raster()).unwrap_or(false);

        if variant.is_full_size && is_raster {
            println!("can't regenerate an original image");
            continue;
        }

        if !is_raster {
            // the workers own these; flag the row and put a fresh job on the wire
            variant_repo::set_regenerate(&pool, variant_id).await?;
            variants::send_to_worker(&pool, &store, &broker, &variant).await?;
            continue;
        }

        let source = variant_repo::find_full_size_raster(&pool, variant.image_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("image {} has no full-size raster", variant.image_id))?;

        let original: Bytes = store.download(&source.storage_key()).await?;

        let rendered = processor::render_variant_async(
            original,
            RenderSpec {
                width: variant.width.max(0) as u32,
                height: variant.height.max(0) as u32,
                gaussian_blur: variant.gaussian_blur,
                brightness: variant.brightness,
            },
        )
        .await?;

        // the encoder may have switched raster kinds (alpha appeared or went)
        variant_repo::set_kind(&pool, variant_id, rendered.kind.as_str()).await?;
        variants::replace_rendered_object(&store, variant_id, &variant.kind, rendered.kind, rendered.data)
            .await?;
    }

    Ok(())
}
