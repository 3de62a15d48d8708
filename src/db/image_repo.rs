//! Image repository - database operations for uploaded originals

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Image;

const COLUMNS: &str = "id, creation_date, uploaded, original_name, original_mime_type, \
                       original_md5, width, height, version";

pub async fn insert(pool: &PgPool, image: &Image) -> Result<()> {
    sqlx::query(
        "INSERT INTO images (id, creation_date, uploaded, original_name, original_mime_type, \
         original_md5, width, height, version) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(image.id)
    .bind(image.creation_date)
    .bind(image.uploaded)
    .bind(&image.original_name)
    .bind(&image.original_mime_type)
    .bind(&image.original_md5)
    .bind(image.width)
    .bind(image.height)
    .bind(image.version)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Image>> {
    let image = sqlx::query_as::<_, Image>(&format!(
        "SELECT {COLUMNS} FROM images WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(image)
}

/// Dedup lookup: `original_md5` is unique across all images
pub async fn find_by_md5(pool: &PgPool, md5: &str) -> Result<Option<Image>> {
    let image = sqlx::query_as::<_, Image>(&format!(
        "SELECT {COLUMNS} FROM images WHERE original_md5 = $1"
    ))
    .bind(md5)
    .fetch_optional(pool)
    .await?;

    Ok(image)
}

pub async fn mark_uploaded(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE images SET uploaded = true WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Variant rows cascade with the image row
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM images WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<Image>> {
    let images = sqlx::query_as::<_, Image>(&format!(
        "SELECT {COLUMNS} FROM images ORDER BY creation_date"
    ))
    .fetch_all(pool)
    .await?;

    Ok(images)
}

/// Images with zero variants; reconciliation deletes these outright
pub async fn ids_without_variants(pool: &PgPool) -> Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT i.id FROM images i \
         WHERE NOT EXISTS (SELECT 1 FROM image_variants v WHERE v.image_id = i.id)",
    )
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
