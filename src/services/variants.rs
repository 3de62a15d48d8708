//! Optimized-variant fan-out and forward-job publishing

use bytes::Bytes;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::db::variant_repo;
use crate::error::{AppError, Result};
use crate::models::{storage_key, EncodingKind, ImageVariant};
use crate::queue::messages::TranscodeJob;
use crate::queue::Broker;
use crate::storage::ObjectStore;

/// Create the Requested-state rows for every optimized kind derived from
/// `parent` and publish their forward jobs, reusing the parent bytes already
/// in memory. Kinds without a worker queue get a row but no job.
pub async fn fan_out_optimized(
    pool: &PgPool,
    broker: &Broker,
    parent: &ImageVariant,
    parent_bytes: &Bytes,
) -> Result<()> {
    for kind in EncodingKind::OPTIMIZED {
        let variant = ImageVariant {
            id: Uuid::new_v4(),
            image_id: parent.image_id,
            width: parent.width,
            height: parent.height,
            gaussian_blur: parent.gaussian_blur,
            brightness: parent.brightness,
            is_full_size: parent.is_full_size,
            is_primary_variant: false,
            kind: kind.as_str().to_string(),
            available: false,
            regenerate: false,
        };

        variant_repo::insert(pool, &variant).await?;

        broker
            .publish_job(
                kind,
                &TranscodeJob {
                    variant_id: variant.id.to_string(),
                    original_file: parent_bytes.to_vec(),
                },
            )
            .await?;
    }

    info!(parent_id = %parent.id, image_id = %parent.image_id, "optimized variants enqueued");

    Ok(())
}

/// Delete a variant row together with its stored object. A missing object is
/// not an error; the row still goes.
pub async fn delete_variant(
    pool: &PgPool,
    store: &dyn ObjectStore,
    variant: &ImageVariant,
) -> Result<()> {
    match store.delete(&variant.storage_key()).await {
        Ok(()) | Err(crate::storage::StorageError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    variant_repo::delete(pool, variant.id).await
}

/// Store a re-rendered variant's bytes under its new kind's key. When the
/// encoder switched raster kinds the object at the old extension is removed,
/// tolerating one that is already gone.
pub async fn replace_rendered_object(
    store: &dyn ObjectStore,
    variant_id: Uuid,
    old_kind: &str,
    rendered: EncodingKind,
    data: Bytes,
) -> Result<()> {
    store
        .upload(
            &storage_key(variant_id, rendered.extension()),
            data,
            rendered.content_type(),
        )
        .await?;

    if old_kind != rendered.as_str() {
        match store.delete(&storage_key(variant_id, old_kind)).await {
            Ok(()) | Err(crate::storage::StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Publish a forward job for an existing optimized variant, fetching the
/// parent raster variant's bytes from the blob store.
pub async fn send_to_worker(
    pool: &PgPool,
    store: &dyn ObjectStore,
    broker: &Broker,
    variant: &ImageVariant,
) -> Result<()> {
    let Some(kind) = variant.encoding_kind() else {
        return Err(AppError::Internal(format!(
            "variant {} has unknown kind {}",
            variant.id, variant.kind
        )));
    };

    let parent = variant_repo::find_parent_raster(
        pool,
        variant.image_id,
        variant.width,
        variant.height,
        variant.gaussian_blur,
        variant.brightness,
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("no parent variant for {}", variant.id)))?;

    let bytes = store.download(&parent.storage_key()).await?;

    broker
        .publish_job(
            kind,
            &TranscodeJob {
                variant_id: variant.id.to_string(),
                original_file: bytes.to_vec(),
            },
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    #[tokio::test]
    async fn kind_flip_removes_the_stale_object() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .upload(&storage_key(id, "jpg"), Bytes::from_static(b"old"), "image/jpeg")
            .await
            .unwrap();

        replace_rendered_object(&store, id, "jpg", EncodingKind::Png, Bytes::from_static(b"new"))
            .await
            .unwrap();

        assert!(store.contains(&storage_key(id, "png")));
        assert!(!store.contains(&storage_key(id, "jpg")));
    }

    #[tokio::test]
    async fn unchanged_kind_overwrites_in_place() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .upload(&storage_key(id, "jpg"), Bytes::from_static(b"old"), "image/jpeg")
            .await
            .unwrap();

        replace_rendered_object(&store, id, "jpg", EncodingKind::Jpeg, Bytes::from_static(b"new"))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            &store.download(&storage_key(id, "jpg")).await.unwrap()[..],
            b"new"
        );
    }
}
