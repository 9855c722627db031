//! # In-process trigger topic.
//!
//! [`MemoryTopic`] models a single-partition topic read by one consumer group:
//! all subscriptions share one queue, so each published message is received
//! by exactly one member. A rewound delivery goes back to the head of the
//! queue and is the next message any member reads. Duplicate delivery is
//! modelled by publishing the same payload again.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;

use crate::channel::{Delivery, TriggerChannel, TriggerSource};
use crate::error::ChannelError;

const TOPIC: &str = "memory";

struct Shared {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    next_offset: AtomicI64,
    committed: AtomicU64,
    rewound: std::sync::Mutex<VecDeque<Delivery>>,
    rewinds: AtomicU64,
    rewound_ready: Notify,
    closed: CancellationToken,
}

impl Shared {
    fn take_rewound(&self) -> Option<Delivery> {
        self.rewound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

/// Shared in-process topic; clones refer to the same queue.
#[derive(Clone)]
pub struct MemoryTopic {
    inner: Arc<Shared>,
}

impl MemoryTopic {
    /// Creates an empty topic.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Shared {
                tx,
                rx: Mutex::new(rx),
                next_offset: AtomicI64::new(0),
                committed: AtomicU64::new(0),
                rewound: std::sync::Mutex::new(VecDeque::new()),
                rewinds: AtomicU64::new(0),
                rewound_ready: Notify::new(),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Appends a message. Messages published after [`close`](Self::close) are discarded.
    pub fn publish(&self, payload: Vec<u8>) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        let offset = self.inner.next_offset.fetch_add(1, Ordering::Relaxed);
        let _ = self.inner.tx.send(Delivery {
            payload,
            topic: TOPIC.to_string(),
            partition: 0,
            offset,
        });
    }

    /// Closes the topic: members drain what is queued, then receive
    /// [`ChannelError::Closed`].
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    /// Number of messages published so far.
    pub fn published(&self) -> u64 {
        self.inner.next_offset.load(Ordering::Relaxed) as u64
    }

    /// Number of commits made by all members.
    pub fn committed(&self) -> u64 {
        self.inner.committed.load(Ordering::Relaxed)
    }

    /// Number of rewinds made by all members.
    pub fn rewinds(&self) -> u64 {
        self.inner.rewinds.load(Ordering::Relaxed)
    }
}

impl Default for MemoryTopic {
    fn default() -> Self {
        Self::new()
    }
}

/// One member of the topic's consumer group.
pub struct MemorySubscription {
    topic: MemoryTopic,
}

#[async_trait]
impl TriggerSource for MemorySubscription {
    async fn recv(&mut self) -> Result<Delivery, ChannelError> {
        let shared = &self.topic.inner;
        let mut rx = shared.rx.lock().await;
        loop {
            let rewound = shared.rewound_ready.notified();
            if let Some(delivery) = shared.take_rewound() {
                return Ok(delivery);
            }
            tokio::select! {
                biased;
                _ = rewound => continue,
                msg = rx.recv() => return msg.ok_or(ChannelError::Closed),
                _ = shared.closed.cancelled() => {
                    return rx.try_recv().map_err(|_| ChannelError::Closed);
                }
            }
        }
    }

    fn commit(&mut self, _delivery: &Delivery) -> Result<(), ChannelError> {
        self.topic.inner.committed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rewind(&mut self, delivery: &Delivery) -> Result<(), ChannelError> {
        let shared = &self.topic.inner;
        shared
            .rewound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_front(delivery.clone());
        shared.rewinds.fetch_add(1, Ordering::Relaxed);
        shared.rewound_ready.notify_waiters();
        Ok(())
    }
}

impl TriggerChannel for MemoryTopic {
    type Source = MemorySubscription;

    fn subscribe(&self, _member: usize) -> Result<Self::Source, ChannelError> {
        Ok(MemorySubscription {
            topic: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_each_message_goes_to_one_member() {
        let topic = MemoryTopic::new();
        for i in 0..10u8 {
            topic.publish(vec![i]);
        }
        topic.close();

        let mut a = topic.subscribe(0).unwrap();
        let mut b = topic.subscribe(1).unwrap();
        let mut seen = HashSet::new();
        loop {
            let ra = a.recv().await;
            let rb = b.recv().await;
            if ra.is_err() && rb.is_err() {
                break;
            }
            for d in [ra, rb].into_iter().flatten() {
                assert!(seen.insert(d.offset));
            }
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(a.recv().await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_rewound_delivery_is_read_next() {
        let topic = MemoryTopic::new();
        for i in 0..3u8 {
            topic.publish(vec![i]);
        }
        let mut sub = topic.subscribe(0).unwrap();
        let first = sub.recv().await.unwrap();
        sub.rewind(&first).unwrap();
        assert_eq!(sub.recv().await.unwrap(), first);
        assert_eq!(sub.recv().await.unwrap().offset, 1);
        assert_eq!(topic.rewinds(), 1);
    }

    #[tokio::test]
    async fn test_rewind_wakes_waiting_member() {
        let topic = MemoryTopic::new();
        topic.publish(vec![7]);
        let mut a = topic.subscribe(0).unwrap();
        let mut b = topic.subscribe(1).unwrap();
        let delivery = a.recv().await.unwrap();
        let waiter = tokio::spawn(async move { b.recv().await });
        tokio::task::yield_now().await;
        a.rewind(&delivery).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), delivery);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_member() {
        let topic = MemoryTopic::new();
        let mut sub = topic.subscribe(0).unwrap();
        let waiter = tokio::spawn(async move { sub.recv().await });
        tokio::task::yield_now().await;
        topic.close();
        assert_eq!(waiter.await.unwrap(), Err(ChannelError::Closed));
    }
}
