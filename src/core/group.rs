//! # Worker groups: bounded task sets with cancellation and a shutdown grace.
//!
//! A [`WorkerGroup`] owns a [`JoinSet`] of named workers, each receiving a
//! child [`CancellationToken`] of the group token. The group token itself is a
//! child of the caller's runtime token, so cancelling either stops the group.
//!
//! ```text
//! runtime token ──► group token ──┬─► worker-0 token ──► set.spawn(worker-0)
//!                                 ├─► worker-1 token ──► set.spawn(worker-1)
//!                                 └─► worker-N token ──► set.spawn(worker-N)
//!
//! join(grace):
//!   ├─ all workers return           → Ok(())
//!   └─ group token cancelled        → Bus.publish(ShutdownRequested)
//!        └─ wait up to `grace`:
//!             ├─ all joined         → Bus.publish(AllStoppedWithin), Ok(())
//!             └─ timeout exceeded   → Bus.publish(GraceExceeded), abort the rest,
//!                                     Err(RuntimeError::GraceExceeded { stuck })
//! ```
//!
//! Every worker publishes `WorkerStarted` when spawned and `WorkerStopped`
//! when its future completes, panics, or is aborted.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};

type Alive = Arc<Mutex<BTreeSet<String>>>;

/// Removes the worker from the alive set and reports it stopped.
struct AliveGuard {
    name: String,
    alive: Alive,
    bus: Bus,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.alive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
        let mut ev = Event::new(EventKind::WorkerStopped).with_worker(self.name.as_str());
        if std::thread::panicking() {
            ev = ev.with_reason("panicked");
        }
        self.bus.publish(ev);
    }
}

/// Named set of cancellable workers.
pub struct WorkerGroup {
    name: &'static str,
    bus: Bus,
    token: CancellationToken,
    set: JoinSet<()>,
    alive: Alive,
}

impl WorkerGroup {
    /// Creates an empty group whose token is a child of `parent`.
    pub fn new(name: &'static str, bus: Bus, parent: &CancellationToken) -> Self {
        Self {
            name,
            bus,
            token: parent.child_token(),
            set: JoinSet::new(),
            alive: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Group token; cancelling it asks every worker to stop.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of workers not yet joined.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// True if no workers are left to join.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Spawns a worker with its own child token.
    pub fn spawn<F, Fut>(&mut self, worker: impl Into<String>, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = worker.into();
        self.alive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone());
        self.bus
            .publish(Event::new(EventKind::WorkerStarted).with_worker(name.as_str()));

        let guard = AliveGuard {
            name,
            alive: Arc::clone(&self.alive),
            bus: self.bus.clone(),
        };
        let fut = f(self.token.child_token());
        self.set.spawn(async move {
            let _guard = guard;
            fut.await;
        });
    }

    /// Waits until all workers return, or until the group is cancelled and
    /// then at most `grace` longer.
    pub async fn join(mut self, grace: Duration) -> Result<(), RuntimeError> {
        let token = self.token.clone();
        let finished = tokio::select! {
            _ = drain(&mut self.set) => true,
            _ = token.cancelled() => false,
        };
        if finished {
            return Ok(());
        }

        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_worker(self.name));
        self.wait_all_with_grace(grace).await
    }

    async fn wait_all_with_grace(&mut self, grace: Duration) -> Result<(), RuntimeError> {
        match tokio::time::timeout(grace, drain(&mut self.set)).await {
            Ok(()) => {
                self.bus
                    .publish(Event::new(EventKind::AllStoppedWithin).with_worker(self.name));
                Ok(())
            }
            Err(_) => {
                let stuck: Vec<String> = self
                    .alive
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .cloned()
                    .collect();
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded)
                        .with_worker(self.name)
                        .with_timeout(grace)
                        .with_reason(stuck.join(",")),
                );
                self.set.abort_all();
                drain(&mut self.set).await;
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

async fn drain(set: &mut JoinSet<()>) {
    while set.join_next().await.is_some() {}
}
