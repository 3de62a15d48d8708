//! Result-channel processing: store transcoded bytes and flip availability
//!
//! Runs in its own long-lived process. Acknowledgment happens only after the
//! blob upload and the metadata update both succeed; any error propagates,
//! leaving the message unacknowledged for broker redelivery. Both side
//! effects are safe to repeat (full overwrite of the same key).

use bytes::Bytes;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::variant_repo;
use crate::error::Result;
use crate::queue::messages::TranscodeResult;
use crate::storage::ObjectStore;

/// What happened to one result message
#[derive(Debug, PartialEq, Eq)]
pub enum ResultDisposition {
    /// Bytes stored, variant now available
    Stored,
    /// No such variant (deleted or never existed); message dropped
    UnknownVariant,
}

pub async fn process_result(
    pool: &PgPool,
    store: &dyn ObjectStore,
    message: TranscodeResult,
) -> Result<ResultDisposition> {
    let variant_id = Uuid::parse_str(&message.variant_id)
        .map_err(|e| crate::error::AppError::Internal(format!("bad variant id: {e}")))?;

    let Some(variant) = variant_repo::find_by_id(pool, variant_id).await? else {
        warn!(%variant_id, "result for unknown variant, dropping");
        return Ok(ResultDisposition::UnknownVariant);
    };

    let content_type = variant
        .encoding_kind()
        .map(|k| k.content_type())
        .unwrap_or("binary/octet-stream");

    store
        .upload(
            &variant.storage_key(),
            Bytes::from(message.variant_file),
            content_type,
        )
        .await?;

    variant_repo::set_available(pool, variant_id).await?;

    info!(%variant_id, kind = %variant.kind, "variant available");

    Ok(ResultDisposition::Stored)
}
