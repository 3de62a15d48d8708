//! AMQP broker plumbing for the transcode job protocol
//!
//! Topology: one durable forward queue per worker-backed encoding kind, plus
//! a single durable result queue shared by all kinds. Every consumer runs
//! with prefetch = 1; scale-out is competing consumer processes, not
//! in-process concurrency.

pub mod messages;

use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::debug;
use uuid::Uuid;

use crate::config::AmqpConfig;
use crate::error::{AppError, Result};
use crate::models::EncodingKind;
use messages::{TranscodeJob, TranscodeResult};

/// Shared result queue name
pub const RESULT_QUEUE: &str = "variant_results";

/// Forward queue for a kind, if a worker exists for it. `None` kinds are
/// silently dropped by [`Broker::publish_job`].
pub fn forward_queue(kind: EncodingKind) -> Option<&'static str> {
    match kind {
        EncodingKind::Avif => Some("transcode_avif"),
        EncodingKind::Webp => Some("transcode_webp"),
        _ => None,
    }
}

/// Connection to the message broker with the protocol's publish contracts
pub struct Broker {
    channel: Channel,
}

impl Broker {
    pub async fn connect(config: &AmqpConfig) -> Result<Self> {
        let connection = Connection::connect(
            &config.address,
            ConnectionProperties::default().with_connection_name("image-service".into()),
        )
        .await?;

        let channel = connection.create_channel().await?;

        Ok(Self { channel })
    }

    /// Declare a queue durable, as both producers and consumers must before use
    pub async fn declare(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    /// Publish a forward job to the queue for `kind`. Kinds without a worker
    /// queue are dropped without error.
    pub async fn publish_job(&self, kind: EncodingKind, job: &TranscodeJob) -> Result<()> {
        let Some(queue) = forward_queue(kind) else {
            debug!(kind = kind.as_str(), variant_id = %job.variant_id, "no worker queue for kind, dropping job");
            return Ok(());
        };

        self.declare(queue).await?;
        self.publish(queue, &serde_json::to_vec(job)?).await
    }

    pub async fn publish_result(&self, result: &TranscodeResult) -> Result<()> {
        self.declare(RESULT_QUEUE).await?;
        self.publish(RESULT_QUEUE, &serde_json::to_vec(result)?).await
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                // delivery mode 2: persisted by the broker before consumption
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?;
        confirm.await?;
        Ok(())
    }

    /// Declare `queue` durable and start a prefetch-1 consumer on it
    pub async fn consume(&self, queue: &str) -> Result<Consumer> {
        self.declare(queue).await?;

        self.channel
            .basic_qos(1, BasicQosOptions::default())
            .await?;

        let consumer = self
            .channel
            .basic_consume(
                queue,
                &consumer_tag(&self.channel),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer)
    }
}

fn consumer_tag(channel: &Channel) -> String {
    format!("ctag{}.{}", channel.id(), Uuid::new_v4())
}

/// Acknowledge a delivery. Exactly one ack per message, after its side effects.
pub async fn ack(delivery: &lapin::message::Delivery) -> Result<()> {
    delivery
        .ack(BasicAckOptions::default())
        .await
        .map_err(AppError::from)
}
