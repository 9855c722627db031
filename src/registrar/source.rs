//! Where registrar workers get their next listener spec from.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::listener::{ListenerSpec, SelectorPool};
use crate::naming::NamePrefix;

/// # Shared supply of listener specs.
///
/// Called concurrently by every worker of a pool; each returned spec goes to
/// exactly one caller. `None` means the supply is exhausted.
pub trait SpecSource: Send + Sync + 'static {
    /// Takes the next spec.
    fn next_spec(&self) -> Option<ListenerSpec>;
}

/// Unbounded source of random specs drawn from a [`SelectorPool`].
pub struct SpecGenerator {
    pool: SelectorPool,
    view_prefix: NamePrefix,
    sink_prefix: NamePrefix,
}

impl SpecGenerator {
    /// Generator with the default `view_` / `sink_` prefixes.
    pub fn new(pool: SelectorPool) -> Self {
        Self::with_prefixes(pool, NamePrefix::VIEW, NamePrefix::SINK)
    }

    /// Generator with custom name prefixes.
    pub fn with_prefixes(pool: SelectorPool, view_prefix: NamePrefix, sink_prefix: NamePrefix) -> Self {
        Self {
            pool,
            view_prefix,
            sink_prefix,
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl SpecSource for SpecGenerator {
    fn next_spec(&self) -> Option<ListenerSpec> {
        let selectors = self.pool.draw(&mut rand::rng(), unix_now());
        // Pool type sets are validated on construction, so this only fails on a bug.
        ListenerSpec::build(selectors, &self.view_prefix, &self.sink_prefix).ok()
    }
}

/// Bounded FIFO of caller-supplied specs, each handed out once.
#[derive(Default)]
pub struct SpecQueue {
    queue: Mutex<VecDeque<ListenerSpec>>,
}

impl SpecQueue {
    /// Queue holding `specs` in order.
    pub fn new(specs: impl IntoIterator<Item = ListenerSpec>) -> Self {
        Self {
            queue: Mutex::new(specs.into_iter().collect()),
        }
    }

    /// Specs not yet handed out.
    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl SpecSource for SpecQueue {
    fn next_spec(&self) -> Option<ListenerSpec> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{Selectors, build_spec};
    use uuid::Uuid;

    #[test]
    fn test_generator_respects_prefixes() {
        let generator = SpecGenerator::with_prefixes(
            SelectorPool::default(),
            NamePrefix::new("lv_").unwrap(),
            NamePrefix::new("ls_").unwrap(),
        );
        let spec = generator.next_spec().unwrap();
        assert!(spec.view_name().as_str().starts_with("lv_"));
        assert!(spec.sink_name().as_str().starts_with("ls_"));
        assert!(spec.since() <= unix_now());
    }

    #[test]
    fn test_queue_hands_out_each_spec_once() {
        let specs: Vec<_> = (0..3)
            .map(|i| {
                build_spec(Selectors {
                    resource_id: Uuid::from_u128(i),
                    lead_id: Uuid::nil(),
                    types: vec!["tg_start".into()],
                    since: 0,
                })
                .unwrap()
            })
            .collect();
        let q = SpecQueue::new(specs.clone());
        assert_eq!(q.next_spec().as_ref(), Some(&specs[0]));
        assert_eq!(q.remaining(), 2);
        assert_eq!(q.next_spec().as_ref(), Some(&specs[1]));
        assert_eq!(q.next_spec().as_ref(), Some(&specs[2]));
        assert_eq!(q.next_spec(), None);
    }
}
