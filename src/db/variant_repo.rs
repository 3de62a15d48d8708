//! Variant repository - the filtered lookups behind the resolver, the result
//! consumer and the reconciler

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::ImageVariant;

const COLUMNS: &str = "id, image_id, width, height, gaussian_blur, brightness, is_full_size, \
                       is_primary_variant, kind, available, regenerate";

pub async fn insert(pool: &PgPool, variant: &ImageVariant) -> Result<()> {
    sqlx::query(
        "INSERT INTO image_variants (id, image_id, width, height, gaussian_blur, brightness, \
         is_full_size, is_primary_variant, kind, available, regenerate) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(variant.id)
    .bind(variant.image_id)
    .bind(variant.width)
    .bind(variant.height)
    .bind(variant.gaussian_blur)
    .bind(variant.brightness)
    .bind(variant.is_full_size)
    .bind(variant.is_primary_variant)
    .bind(&variant.kind)
    .bind(variant.available)
    .bind(variant.regenerate)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ImageVariant>> {
    let variant = sqlx::query_as::<_, ImageVariant>(&format!(
        "SELECT {COLUMNS} FROM image_variants WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(variant)
}

/// All rows matching the exact request tuple, any kind. `only_available`
/// applies the schema-version availability rule.
pub async fn find_by_dimensions(
    pool: &PgPool,
    image_id: Uuid,
    width: i32,
    height: i32,
    gaussian_blur: f64,
    brightness: f64,
    only_available: bool,
) -> Result<Vec<ImageVariant>> {
    let variants = sqlx::query_as::<_, ImageVariant>(&format!(
        "SELECT {COLUMNS} FROM image_variants \
         WHERE image_id = $1 AND width = $2 AND height = $3 \
           AND gaussian_blur = $4 AND brightness = $5 \
           AND ($6 = false OR available = true)"
    ))
    .bind(image_id)
    .bind(width)
    .bind(height)
    .bind(gaussian_blur)
    .bind(brightness)
    .bind(only_available)
    .fetch_all(pool)
    .await?;

    Ok(variants)
}

/// The raster variant a derived/optimized variant takes its pixels from:
/// same tuple, jpg or png kind.
pub async fn find_parent_raster(
    pool: &PgPool,
    image_id: Uuid,
    width: i32,
    height: i32,
    gaussian_blur: f64,
    brightness: f64,
) -> Result<Option<ImageVariant>> {
    let variant = sqlx::query_as::<_, ImageVariant>(&format!(
        "SELECT {COLUMNS} FROM image_variants \
         WHERE image_id = $1 AND width = $2 AND height = $3 \
           AND gaussian_blur = $4 AND brightness = $5 \
           AND kind IN ('jpg', 'png') \
         LIMIT 1"
    ))
    .bind(image_id)
    .bind(width)
    .bind(height)
    .bind(gaussian_blur)
    .bind(brightness)
    .fetch_optional(pool)
    .await?;

    Ok(variant)
}

/// The canonical full-size raster rendition the on-demand path reads from
pub async fn find_full_size_raster(pool: &PgPool, image_id: Uuid) -> Result<Option<ImageVariant>> {
    let variant = sqlx::query_as::<_, ImageVariant>(&format!(
        "SELECT {COLUMNS} FROM image_variants \
         WHERE image_id = $1 AND is_full_size = true \
           AND kind IN ('jpg', 'png') AND gaussian_blur = 0 AND brightness = 1 \
         LIMIT 1"
    ))
    .bind(image_id)
    .fetch_optional(pool)
    .await?;

    Ok(variant)
}

/// All rows claiming to be the primary variant. More than one is an
/// invariant violation the reconciler resolves.
pub async fn find_primaries(pool: &PgPool, image_id: Uuid) -> Result<Vec<ImageVariant>> {
    let variants = sqlx::query_as::<_, ImageVariant>(&format!(
        "SELECT {COLUMNS} FROM image_variants \
         WHERE image_id = $1 AND is_primary_variant = true ORDER BY id"
    ))
    .bind(image_id)
    .fetch_all(pool)
    .await?;

    Ok(variants)
}

pub async fn set_available(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE image_variants SET available = true WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_regenerate(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE image_variants SET regenerate = true WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_kind(pool: &PgPool, id: Uuid, kind: &str) -> Result<()> {
    sqlx::query("UPDATE image_variants SET kind = $2 WHERE id = $1")
        .bind(id)
        .bind(kind)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM image_variants WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}
