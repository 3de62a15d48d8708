//! Forward-queue consumer: one job message in, one result message out
//!
//! A failed encode is logged and the job acknowledged with no result: the
//! variant stays Requested forever. There is no retry and no dead-letter.

use futures::StreamExt;
use tracing::{error, info};

use crate::error::Result;
use crate::models::EncodingKind;
use crate::queue::messages::{TranscodeJob, TranscodeResult};
use crate::queue::{self, forward_queue, Broker};
use crate::services::encoder;

/// Parse the enabled-kinds list from the `WORKER_KINDS` environment value.
/// Unset or empty means every kind that has a forward queue.
pub fn enabled_kinds(raw: Option<&str>) -> Vec<EncodingKind> {
    let all: Vec<EncodingKind> = EncodingKind::OPTIMIZED
        .into_iter()
        .filter(|k| forward_queue(*k).is_some())
        .collect();

    let Some(raw) = raw else { return all };

    let requested: Vec<EncodingKind> = raw
        .to_lowercase()
        .split(|c: char| ",;-_ /".contains(c))
        .filter_map(EncodingKind::from_str)
        .filter(|k| forward_queue(*k).is_some())
        .collect();

    if requested.is_empty() {
        all
    } else {
        requested
    }
}

/// Consume `kind`'s forward queue until the stream ends or the broker fails
pub async fn run_kind_consumer(broker: &Broker, kind: EncodingKind) -> Result<()> {
    let Some(queue_name) = forward_queue(kind) else {
        return Err(crate::error::AppError::Internal(format!(
            "no forward queue for kind {}",
            kind.as_str()
        )));
    };
    let mut consumer = broker.consume(queue_name).await?;

    info!(queue = queue_name, "waiting for transcode jobs");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;

        if let Err(e) = handle_job(broker, kind, &delivery.data).await {
            // Abandoned: acked below, never retried
            error!(kind = kind.as_str(), error = %e, "transcode job failed");
        }

        queue::ack(&delivery).await?;
    }

    Ok(())
}

async fn handle_job(broker: &Broker, kind: EncodingKind, body: &[u8]) -> Result<()> {
    let job: TranscodeJob = serde_json::from_slice(body)?;

    info!(variant_id = %job.variant_id, kind = kind.as_str(), "transcoding");

    let encoded = encoder::encode(kind, &job.original_file)
        .await
        .map_err(|e| crate::error::AppError::Processing(e.to_string()))?;

    broker
        .publish_result(&TranscodeResult {
            variant_id: job.variant_id.clone(),
            variant_file: encoded,
        })
        .await?;

    info!(variant_id = %job.variant_id, kind = kind.as_str(), "result published");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_all_queue_backed_kinds() {
        assert_eq!(
            enabled_kinds(None),
            vec![EncodingKind::Avif, EncodingKind::Webp]
        );
        assert_eq!(
            enabled_kinds(Some("")),
            vec![EncodingKind::Avif, EncodingKind::Webp]
        );
    }

    #[test]
    fn parses_separated_kind_lists() {
        assert_eq!(enabled_kinds(Some("webp")), vec![EncodingKind::Webp]);
        assert_eq!(
            enabled_kinds(Some("AVIF, webp")),
            vec![EncodingKind::Avif, EncodingKind::Webp]
        );
    }

    #[test]
    fn ignores_kinds_without_a_queue() {
        // jpegli has no worker queue; asking for it falls back to the default set
        assert_eq!(
            enabled_kinds(Some("jpegli")),
            vec![EncodingKind::Avif, EncodingKind::Webp]
        );
    }
}
