//! # Bounded registration pool.
//!
//! ```text
//! RegistrarPool::run(source, token)
//!   └─► WorkerGroup "registrar" ── registrar-0 .. registrar-N-1
//!          each worker:
//!            loop {
//!              slot = counter.reserve()      ── None ─► stop (target claimed)
//!              loop {
//!                spec = source.next_spec()   ── None ─► stop (slot released)
//!                register(spec)
//!                  ├─ Ok  ─► slot.commit(), ListenerRegistered, next slot
//!                  └─ Err ─► record_failure(), publish, next spec (same slot)
//!              }
//!            }
//! ```
//!
//! Cancellation is checked between registrations; an in-flight registration
//! always runs to completion so it never leaves a half-created listener.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::WorkerGroup;
use crate::error::{RegistrationError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::progress::{Progress, ProgressCounter};
use crate::registrar::{Registrar, SpecSource};

/// Runs registrar workers until the target is reached.
pub struct RegistrarPool {
    registrar: Arc<Registrar>,
    bus: Bus,
    workers: usize,
    grace: Duration,
    counter: Arc<ProgressCounter>,
}

impl RegistrarPool {
    /// Pool of `workers` (min 1) sharing one registrar.
    ///
    /// `target = None` runs until the source is exhausted or the token is cancelled.
    pub fn new(registrar: Registrar, bus: Bus, workers: usize, target: Option<u64>) -> Self {
        let counter = match target {
            Some(t) => ProgressCounter::with_target(t),
            None => ProgressCounter::new(),
        };
        Self {
            registrar: Arc::new(registrar),
            bus,
            workers: workers.max(1),
            grace: Duration::from_secs(30),
            counter: Arc::new(counter),
        }
    }

    /// Sets how long to wait for in-flight registrations after cancellation.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Shared counter, readable while the pool runs.
    pub fn counter(&self) -> Arc<ProgressCounter> {
        Arc::clone(&self.counter)
    }

    /// Runs all workers to completion and returns the final tally.
    pub async fn run(
        self,
        source: Arc<dyn SpecSource>,
        token: &CancellationToken,
    ) -> Result<Progress, RuntimeError> {
        let mut group = WorkerGroup::new("registrar", self.bus.clone(), token);
        for i in 0..self.workers {
            let name = format!("registrar-{i}");
            let ctx = WorkerCtx {
                name: name.clone(),
                registrar: Arc::clone(&self.registrar),
                source: Arc::clone(&source),
                counter: Arc::clone(&self.counter),
                bus: self.bus.clone(),
            };
            group.spawn(name, move |token| ctx.run(token));
        }
        group.join(self.grace).await?;

        let progress = self.counter.total();
        if self.counter.is_complete() {
            self.bus
                .publish(Event::new(EventKind::TargetReached).with_progress(progress));
        }
        Ok(progress)
    }
}

struct WorkerCtx {
    name: String,
    registrar: Arc<Registrar>,
    source: Arc<dyn SpecSource>,
    counter: Arc<ProgressCounter>,
    bus: Bus,
}

impl WorkerCtx {
    async fn run(self, token: CancellationToken) {
        'slots: while !token.is_cancelled() {
            let Some(slot) = self.counter.reserve() else {
                break;
            };
            loop {
                if token.is_cancelled() {
                    break 'slots;
                }
                let Some(spec) = self.source.next_spec() else {
                    break 'slots;
                };
                let view = spec.view_name().clone();
                let sink = spec.sink_name().clone();
                match self.registrar.register(spec).await {
                    Ok(listener) => {
                        slot.commit();
                        self.bus.publish(
                            Event::new(EventKind::ListenerRegistered)
                                .with_worker(self.name.as_str())
                                .with_view(&view)
                                .with_sink(&sink)
                                .with_workflow(listener.workflow_id),
                        );
                        break;
                    }
                    Err(err) => {
                        self.counter.record_failure();
                        self.bus.publish(failure_event(&err).with_worker(self.name.as_str()));
                    }
                }
            }
        }
    }
}

fn failure_event(err: &RegistrationError) -> Event {
    let (kind, view, sink) = match err {
        RegistrationError::CreateView { view, .. }
        | RegistrationError::Tail { view, .. }
        | RegistrationError::Cancelled { view } => (EventKind::RegistrationFailed, view, None),
        RegistrationError::CreateSink { view, sink, .. } => {
            (EventKind::OrphanDropped, view, Some(sink))
        }
        RegistrationError::Orphaned { view, sink, .. } => {
            (EventKind::CompensationFailed, view, Some(sink))
        }
    };
    let mut ev = Event::new(kind)
        .with_view(view)
        .with_label(err.as_label())
        .with_reason(err.to_string());
    if let Some(sink) = sink {
        ev = ev.with_sink(sink);
    }
    ev
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryTopic;
    use crate::engine::{MemoryEngine, Op, SinkTarget};
    use crate::listener::SelectorPool;
    use crate::naming::ObjectName;
    use crate::registrar::{SpecGenerator, SpecQueue};

    fn registrar(engine: &Arc<MemoryEngine>) -> Registrar {
        engine.attach_topic("triggers", MemoryTopic::new());
        Registrar::new(
            engine.clone(),
            ObjectName::default_source(),
            SinkTarget {
                broker: "b".into(),
                topic: "triggers".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_queue_exhaustion_stops_pool() {
        let engine = Arc::new(MemoryEngine::default());
        let generator = SpecGenerator::new(SelectorPool::default());
        let specs: Vec<_> = (0..5).filter_map(|_| generator.next_spec()).collect();
        let pool = RegistrarPool::new(registrar(&engine), Bus::new(256), 3, Some(100));
        let progress = pool
            .run(Arc::new(SpecQueue::new(specs)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(progress.succeeded, 5);
        assert_eq!(engine.view_count(), 5);
        assert_eq!(engine.sink_count(), 5);
    }

    #[tokio::test]
    async fn test_failures_are_skipped_and_target_still_met() {
        let engine = Arc::new(MemoryEngine::default());
        engine.fail_every(Op::CreateView, 3);
        let pool = RegistrarPool::new(registrar(&engine), Bus::new(256), 2, Some(20));
        let progress = pool
            .run(
                Arc::new(SpecGenerator::new(SelectorPool::default())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(progress.succeeded, 20);
        assert!(progress.failed() > 0);
        assert_eq!(engine.view_count(), 20);
    }

    #[tokio::test]
    async fn test_cancelled_pool_stops_dispatching() {
        let engine = Arc::new(MemoryEngine::default());
        let token = CancellationToken::new();
        token.cancel();
        let pool = RegistrarPool::new(registrar(&engine), Bus::new(16), 4, None);
        let progress = pool
            .run(Arc::new(SpecGenerator::new(SelectorPool::default())), &token)
            .await
            .unwrap();
        assert_eq!(progress, Progress::default());
        assert_eq!(engine.calls(Op::CreateView), 0);
    }
}
