//! # Trigger channel abstraction.
//!
//! Sinks publish trigger messages to a topic; consumers read them back through
//! a consumer group so that each message goes to one member.
//!
//! ```text
//! TriggerChannel::subscribe(member) ──► TriggerSource (one per consumer worker)
//!                                         ├─ recv()   → Delivery
//!                                         ├─ commit() → offset handled
//!                                         └─ rewind() → read it again
//! ```
//!
//! Delivery is at-least-once. A member rewinds past a message it could not
//! handle, so it is read again before anything after it is committed.

#[cfg(feature = "kafka")]
mod kafka;
mod memory;

use async_trait::async_trait;

use crate::error::ChannelError;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaChannel, KafkaSource};
pub use memory::{MemorySubscription, MemoryTopic};

/// One message read from the trigger channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Raw payload (may be empty for tombstones).
    pub payload: Vec<u8>,
    /// Topic the message was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

/// # One consumer-group member.
#[async_trait]
pub trait TriggerSource: Send + 'static {
    /// Waits for the next message.
    ///
    /// Errors end the caller's read loop; implementations do not reconnect.
    async fn recv(&mut self) -> Result<Delivery, ChannelError>;

    /// Marks `delivery` as handled so it is not redelivered.
    fn commit(&mut self, delivery: &Delivery) -> Result<(), ChannelError>;

    /// Repositions the member so that `delivery` is the next message read.
    fn rewind(&mut self, delivery: &Delivery) -> Result<(), ChannelError>;
}

/// # Factory for consumer-group members.
pub trait TriggerChannel: Send + Sync + 'static {
    /// Member type.
    type Source: TriggerSource;

    /// Joins the group as member number `member`.
    fn subscribe(&self, member: usize) -> Result<Self::Source, ChannelError>;
}
