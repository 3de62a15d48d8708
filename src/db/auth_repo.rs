//! Authorization key lookups backing the capability guards

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::AuthorizationKey;

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<AuthorizationKey>> {
    let key = sqlx::query_as::<_, AuthorizationKey>(
        "SELECT id, name, can_upload_image, can_upload_variant \
         FROM authorization_keys WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(key)
}
