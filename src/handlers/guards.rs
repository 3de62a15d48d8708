//! Capability guards composed in front of the handlers
//!
//! Explicit guard functions taking the request context and returning either
//! the resolved value or a typed rejection (forbidden / not found).

use actix_web::HttpRequest;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{auth_repo, image_repo};
use crate::error::{AppError, Result};
use crate::models::{AuthorizationKey, Image};

/// Extract and resolve the `Authorization: Key <uuid>` header
async fn authorization_key(pool: &PgPool, req: &HttpRequest) -> Result<AuthorizationKey> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Forbidden("missing authorization key".into()))?;

    let key_id = header
        .strip_prefix("Key ")
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| AppError::Forbidden("malformed authorization key".into()))?;

    auth_repo::find_by_id(pool, key_id)
        .await?
        .ok_or_else(|| AppError::Forbidden("unknown authorization key".into()))
}

pub async fn require_can_upload_image(pool: &PgPool, req: &HttpRequest) -> Result<AuthorizationKey> {
    let key = authorization_key(pool, req).await?;
    if !key.can_upload_image {
        return Err(AppError::Forbidden("key cannot upload images".into()));
    }
    Ok(key)
}

/// Resolve a path image id or reject with a typed not-found
pub async fn resolve_image(pool: &PgPool, image_id: Uuid) -> Result<Image> {
    image_repo::find_by_id(pool, image_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("image {image_id} not found")))
}
