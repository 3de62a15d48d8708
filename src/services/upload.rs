//! Upload path: normalization, content-hash deduplication, primary variant
//! creation and optimized fan-out

use bytes::Bytes;
use chrono::Utc;
use md5::{Digest, Md5};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::db::{image_repo, variant_repo};
use crate::error::{AppError, Result};
use crate::models::{Image, ImageVariant, CURRENT_IMAGE_VERSION};
use crate::queue::Broker;
use crate::services::{encoder, processor, variants};
use crate::storage::ObjectStore;

/// Result of an upload request
#[derive(Debug, serde::Serialize)]
pub struct UploadOutcome {
    pub created: bool,
    pub id: Uuid,
}

pub struct Uploader<'a> {
    pub pool: &'a PgPool,
    pub store: &'a dyn ObjectStore,
    pub broker: &'a Broker,
}

impl Uploader<'_> {
    /// Idempotent upload: byte-identical content (after normalization) maps
    /// to the existing image id with no new records or objects.
    pub async fn upload(&self, original_name: &str, data: Bytes) -> Result<UploadOutcome> {
        let normalized =
            processor::normalize_upload_async(original_name.to_string(), data).await?;

        let md5 = hex::encode(Md5::digest(&normalized.data));

        if let Some(existing) = image_repo::find_by_md5(self.pool, &md5).await? {
            info!(image_id = %existing.id, "duplicate upload, reusing image");
            return Ok(UploadOutcome {
                created: false,
                id: existing.id,
            });
        }

        let image = Image {
            id: Uuid::new_v4(),
            creation_date: Utc::now(),
            uploaded: false,
            original_name: normalized.filename.clone(),
            original_mime_type: normalized.content_type.to_string(),
            original_md5: md5,
            width: normalized.width as i32,
            height: normalized.height as i32,
            version: CURRENT_IMAGE_VERSION,
        };

        image_repo::insert(self.pool, &image).await?;

        let primary = ImageVariant {
            id: Uuid::new_v4(),
            image_id: image.id,
            width: image.width,
            height: image.height,
            gaussian_blur: 0.0,
            brightness: 1.0,
            is_full_size: true,
            is_primary_variant: true,
            kind: normalized.kind.as_str().to_string(),
            available: true,
            regenerate: false,
        };

        variant_repo::insert(self.pool, &primary).await?;

        let stored = Bytes::from(
            encoder::strip_gps_metadata(&normalized.data)
                .await
                .map_err(|e| AppError::Processing(format!("gps strip failed: {e}")))?,
        );

        self.store
            .upload(&primary.storage_key(), stored.clone(), normalized.content_type)
            .await?;

        variants::fan_out_optimized(self.pool, self.broker, &primary, &stored).await?;

        image_repo::mark_uploaded(self.pool, image.id).await?;

        info!(image_id = %image.id, name = %image.original_name, "image uploaded");

        Ok(UploadOutcome {
            created: true,
            id: image.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 9, Rgb([40, 80, 120])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn dedup_hash(name: &str, data: &[u8]) -> String {
        let normalized = processor::normalize_upload(name, data).unwrap();
        hex::encode(Md5::digest(&normalized.data))
    }

    #[test]
    fn reencoded_uploads_hash_their_normalized_bytes() {
        let gif = encoded(ImageFormat::Gif);

        // same content dedups regardless of the uploaded name
        assert_eq!(dedup_hash("a.gif", &gif), dedup_hash("b.gif", &gif));
        // and the hash is taken after normalization, not over the raw upload
        assert_ne!(dedup_hash("a.gif", &gif), hex::encode(Md5::digest(&gif)));
    }

    #[test]
    fn passthrough_uploads_hash_their_original_bytes() {
        let jpeg = encoded(ImageFormat::Jpeg);
        assert_eq!(dedup_hash("cat.jpg", &jpeg), hex::encode(Md5::digest(&jpeg)));
    }
}
