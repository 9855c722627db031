//! # Kafka trigger channel.
//!
//! Each [`KafkaSource`] is an rdkafka `StreamConsumer` joined to the shared
//! group. Offsets are stored only on [`commit`](TriggerSource::commit) and
//! flushed by the client's auto-commit. [`rewind`](TriggerSource::rewind)
//! seeks the partition back to a failed message, so the stored offset never
//! moves past it: later messages on that partition are read again after it.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{ClientConfig, Offset};
use tracing::{debug, info};

use crate::channel::{Delivery, TriggerChannel, TriggerSource};
use crate::core::ConsumerConfig;
use crate::error::ChannelError;

/// Consumer-group factory for the trigger topic.
#[derive(Debug, Clone)]
pub struct KafkaChannel {
    brokers: String,
    topic: String,
    group_id: String,
}

impl KafkaChannel {
    /// Builds a channel from consumer settings.
    pub fn new(cfg: &ConsumerConfig) -> Self {
        Self {
            brokers: cfg.brokers.clone(),
            topic: cfg.topic.clone(),
            group_id: cfg.group_id.clone(),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest");
        config
    }
}

impl TriggerChannel for KafkaChannel {
    type Source = KafkaSource;

    fn subscribe(&self, member: usize) -> Result<Self::Source, ChannelError> {
        let consumer: StreamConsumer =
            self.client_config()
                .create()
                .map_err(|e| ChannelError::Transport {
                    error: format!("failed to create consumer: {e}"),
                })?;
        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| ChannelError::Transport {
                error: format!("failed to subscribe: {e}"),
            })?;
        info!(
            member,
            brokers = %self.brokers,
            topic = %self.topic,
            group_id = %self.group_id,
            "joined trigger consumer group"
        );
        Ok(KafkaSource { consumer })
    }
}

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// One consumer-group member.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

#[async_trait]
impl TriggerSource for KafkaSource {
    async fn recv(&mut self) -> Result<Delivery, ChannelError> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| ChannelError::Transport {
                error: e.to_string(),
            })?;
        Ok(Delivery {
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
        })
    }

    fn commit(&mut self, delivery: &Delivery) -> Result<(), ChannelError> {
        // The stored offset is the next one to read.
        self.consumer
            .store_offset(&delivery.topic, delivery.partition, delivery.offset + 1)
            .map_err(|e| ChannelError::Transport {
                error: e.to_string(),
            })
    }

    fn rewind(&mut self, delivery: &Delivery) -> Result<(), ChannelError> {
        debug!(
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "seeking back to unhandled trigger"
        );
        self.consumer
            .seek(
                &delivery.topic,
                delivery.partition,
                Offset::Offset(delivery.offset),
                SEEK_TIMEOUT,
            )
            .map_err(|e| ChannelError::Transport {
                error: format!("seek failed: {e}"),
            })
    }
}
