//! # Lock-free progress tally.
//!
//! [`ProgressCounter`] counts attempted and successful operations (listener
//! registrations, teardowns) across many workers.
//!
//! Both counts live in one `AtomicU64` (attempted in the high half,
//! succeeded in the low half), so a [`total`](ProgressCounter::total) snapshot
//! never shows a success without its attempt. Each count saturates at
//! [`MAX_PROGRESS`]; once attempts reach it further records are dropped.
//!
//! ## Target counts
//! With a target `T`, workers [`reserve`](ProgressCounter::reserve) one of `T`
//! slots before working. A [`Reservation`] is committed on success and
//! released on drop otherwise, so no more than `T` successes are ever
//! recorded and every committed slot is counted once:
//!
//! ```text
//! reserve() ─► Some(slot) ─► work ─┬─ ok  ─► slot.commit()  (succeeded += 1)
//!          │                       ├─ err ─► record_failure(), retry in same slot
//!          │                       └─ stop ─► drop(slot)    (slot returned)
//!          └─► None (T slots taken) ─► worker exits
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const SUCCESS: u64 = 1;
const ATTEMPT: u64 = 1 << 32;
const LOW: u64 = (1 << 32) - 1;

/// Largest value either count can hold.
pub const MAX_PROGRESS: u64 = LOW;

/// Point-in-time view of a [`ProgressCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Operations started (successful or not).
    pub attempted: u64,
    /// Operations that succeeded.
    pub succeeded: u64,
}

impl Progress {
    /// Attempts that did not succeed.
    pub fn failed(&self) -> u64 {
        self.attempted.saturating_sub(self.succeeded)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.succeeded, self.attempted)
    }
}

/// Thread-safe attempted/succeeded tally with an optional target.
#[derive(Debug)]
pub struct ProgressCounter {
    packed: AtomicU64,
    reserved: AtomicU64,
    target: Option<u64>,
}

impl ProgressCounter {
    /// Counter without a target; [`reserve`](Self::reserve) never refuses.
    pub fn new() -> Self {
        Self {
            packed: AtomicU64::new(0),
            reserved: AtomicU64::new(0),
            target: None,
        }
    }

    /// Counter that stops handing out slots after `target` reservations.
    ///
    /// Targets above [`MAX_PROGRESS`] are clamped to it.
    pub fn with_target(target: u64) -> Self {
        Self {
            target: Some(target.min(MAX_PROGRESS)),
            ..Self::new()
        }
    }

    /// Configured target, if any.
    pub fn target(&self) -> Option<u64> {
        self.target
    }

    /// Records a successful operation (also counted as attempted).
    ///
    /// Returns `false` if the counter is saturated and nothing was recorded.
    pub fn increment(&self) -> bool {
        self.add(ATTEMPT | SUCCESS)
    }

    /// Records a failed operation.
    ///
    /// Returns `false` if the counter is saturated and nothing was recorded.
    pub fn record_failure(&self) -> bool {
        self.add(ATTEMPT)
    }

    // Attempts bound successes, so a full attempt half means either add would carry.
    fn add(&self, delta: u64) -> bool {
        self.packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v >> 32 < MAX_PROGRESS).then_some(v + delta)
            })
            .is_ok()
    }

    /// Consistent snapshot of both counts.
    pub fn total(&self) -> Progress {
        let v = self.packed.load(Ordering::Acquire);
        Progress {
            attempted: v >> 32,
            succeeded: v & LOW,
        }
    }

    /// True once the target (if any) has been reached.
    pub fn is_complete(&self) -> bool {
        self.target
            .is_some_and(|t| self.total().succeeded >= t)
    }

    /// Claims one of the target slots.
    ///
    /// Returns `None` when all slots are claimed (committed or in flight).
    ///
    /// # Example
    /// ```
    /// use listenvisor::ProgressCounter;
    ///
    /// let counter = ProgressCounter::with_target(1);
    /// let slot = counter.reserve().unwrap();
    /// assert!(counter.reserve().is_none());
    /// slot.commit();
    /// assert_eq!(counter.total().succeeded, 1);
    /// assert!(counter.is_complete());
    /// ```
    pub fn reserve(&self) -> Option<Reservation<'_>> {
        if let Some(target) = self.target {
            self.reserved
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                    (r < target).then_some(r + 1)
                })
                .ok()?;
        }
        Some(Reservation {
            counter: self,
            done: false,
        })
    }
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// One claimed target slot; see [`ProgressCounter::reserve`].
#[must_use = "dropping a reservation releases the slot"]
pub struct Reservation<'a> {
    counter: &'a ProgressCounter,
    done: bool,
}

impl Reservation<'_> {
    /// Records the success this slot was claimed for.
    pub fn commit(mut self) {
        let _ = self.counter.increment();
        self.done = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.done && self.counter.target.is_some() {
            self.counter.reserved.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_snapshot_counts_success_as_attempt() {
        let c = ProgressCounter::new();
        c.increment();
        c.record_failure();
        c.increment();
        assert_eq!(
            c.total(),
            Progress {
                attempted: 3,
                succeeded: 2
            }
        );
        assert_eq!(c.total().failed(), 1);
        assert!(!c.is_complete());
    }

    #[test]
    fn test_counts_saturate_instead_of_carrying() {
        let c = ProgressCounter::new();
        c.packed.store(((MAX_PROGRESS - 1) << 32) | (MAX_PROGRESS - 1), Ordering::Release);
        assert!(c.increment());
        assert!(!c.increment());
        assert!(!c.record_failure());
        assert_eq!(
            c.total(),
            Progress {
                attempted: MAX_PROGRESS,
                succeeded: MAX_PROGRESS
            }
        );
    }

    #[test]
    fn test_dropped_reservation_frees_slot() {
        let c = ProgressCounter::with_target(1);
        {
            let _slot = c.reserve().unwrap();
            assert!(c.reserve().is_none());
        }
        let slot = c.reserve().unwrap();
        slot.commit();
        assert!(c.reserve().is_none());
        assert_eq!(c.total().succeeded, 1);
    }

    #[test]
    fn test_concurrent_reservations_never_exceed_target() {
        let c = Arc::new(ProgressCounter::with_target(500));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    let mut mine = 0;
                    while let Some(slot) = c.reserve() {
                        c.record_failure();
                        slot.commit();
                        mine += 1;
                    }
                    mine
                })
            })
            .collect();
        let sum: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(sum, 500);
        assert_eq!(
            c.total(),
            Progress {
                attempted: 1_000,
                succeeded: 500
            }
        );
    }
}
