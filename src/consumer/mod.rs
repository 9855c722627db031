//! # Trigger consumer pool.
//!
//! [`TriggerConsumer`] runs `M` workers, each holding its own member of the
//! trigger channel's consumer group, and tears down every listener whose
//! trigger message arrives.
//!
//! ```text
//! TriggerConsumer::run(token)
//!   ├─ channel.subscribe(0..M)            (all members joined before any work)
//!   └─► WorkerGroup "consumer" ── consumer-0 .. consumer-M-1
//!          each worker:
//!            loop {
//!              select! { token.cancelled() ─► stop
//!                        source.recv()     ─► delivery }
//!              ├─ Err(read)  ─► ChannelFailed, stop (no reconnect)
//!              └─ Ok(delivery)
//!                   decode ─┬─ err ─► TriggerDecodeFailed           ─► commit
//!                           └─ ok  ─► teardown(view, sink)
//!                                      ├─ TornDown      ─► tally++   ─► commit
//!                                      ├─ AlreadyAbsent ─► duplicate ─► commit
//!                                      └─ Err           ─► failure   ─► rewind, retry delay
//!            }
//! ```
//!
//! A failed teardown is never committed past: the member rewinds to it and
//! reads it again after the retry delay, before anything behind it.
//!
//! Only the waits (for a message, for the retry delay) are cancellable; a
//! teardown in progress always finishes.

mod handler;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::{TriggerChannel, TriggerSource};
use crate::core::WorkerGroup;
use crate::engine::EngineRef;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::progress::{Progress, ProgressCounter};
use crate::teardown::TeardownCoordinator;

pub use handler::Handled;
use handler::TriggerHandler;

/// Pool of trigger-consuming workers.
pub struct TriggerConsumer<C: TriggerChannel> {
    channel: C,
    engine: EngineRef,
    bus: Bus,
    workers: usize,
    grace: Duration,
    retry_delay: Duration,
    tally: Arc<ProgressCounter>,
}

impl<C: TriggerChannel> TriggerConsumer<C> {
    /// Pool of `workers` (min 1) reading `channel` and dropping listeners in `engine`.
    pub fn new(channel: C, engine: EngineRef, bus: Bus, workers: usize) -> Self {
        Self {
            channel,
            engine,
            bus,
            workers: workers.max(1),
            grace: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
            tally: Arc::new(ProgressCounter::new()),
        }
    }

    /// Sets the pause before a failed teardown is read again.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets how long to wait for in-flight teardowns after cancellation.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Teardown tally, readable while the pool runs.
    pub fn tally(&self) -> Arc<ProgressCounter> {
        Arc::clone(&self.tally)
    }

    /// Runs until every worker's channel fails or `token` is cancelled, and
    /// returns the teardown tally.
    pub async fn run(self, token: &CancellationToken) -> Result<Progress, RuntimeError> {
        let mut sources = Vec::with_capacity(self.workers);
        for member in 0..self.workers {
            let source = self
                .channel
                .subscribe(member)
                .map_err(|source| RuntimeError::Subscribe { member, source })?;
            sources.push(source);
        }

        let handler = Arc::new(TriggerHandler::new(
            TeardownCoordinator::new(self.engine),
            Arc::clone(&self.tally),
            self.bus.clone(),
        ));
        let mut group = WorkerGroup::new("consumer", self.bus.clone(), token);
        for (i, source) in sources.into_iter().enumerate() {
            let name = format!("consumer-{i}");
            let ctx = WorkerCtx {
                name: name.clone(),
                source,
                handler: Arc::clone(&handler),
                bus: self.bus.clone(),
                retry_delay: self.retry_delay,
            };
            group.spawn(name, move |token| ctx.run(token));
        }
        group.join(self.grace).await?;

        Ok(self.tally.total())
    }
}

struct WorkerCtx<S> {
    name: String,
    source: S,
    handler: Arc<TriggerHandler>,
    bus: Bus,
    retry_delay: Duration,
}

impl<S: TriggerSource> WorkerCtx<S> {
    async fn run(mut self, token: CancellationToken) {
        loop {
            let res = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                res = self.source.recv() => res,
            };
            let delivery = match res {
                Ok(d) => d,
                Err(err) => {
                    self.channel_failed(err.as_label(), err.to_string());
                    break;
                }
            };

            let handled = self.handler.handle(&self.name, &delivery).await;
            let settled = if handled.should_commit() {
                self.source.commit(&delivery)
            } else {
                self.source.rewind(&delivery)
            };
            if let Err(err) = settled {
                self.channel_failed(err.as_label(), err.to_string());
                break;
            }
            if !handled.should_commit() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }
        }
    }

    fn channel_failed(&self, label: &'static str, reason: String) {
        self.bus.publish(
            Event::new(EventKind::ChannelFailed)
                .with_worker(self.name.as_str())
                .with_label(label)
                .with_reason(reason),
        );
    }
}
