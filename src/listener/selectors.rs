//! # Random listener requests.
//!
//! A [`SelectorPool`] holds the candidate resources, leads, and type sets a
//! load generator draws from. Each draw picks one of each uniformly and sets
//! `since = now - jitter`, with `jitter` uniform in `0..lookback_secs`.

use rand::Rng;
use rand::seq::IndexedRandom;
use uuid::Uuid;

use crate::error::SpecError;
use crate::listener::spec::{Selectors, TypeSet};

/// Candidates for random listener requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorPool {
    resources: Vec<Uuid>,
    leads: Vec<Uuid>,
    type_sets: Vec<Vec<String>>,
    lookback_secs: u32,
}

impl SelectorPool {
    /// Builds a pool; every candidate list must be non-empty.
    pub fn new(
        resources: Vec<Uuid>,
        leads: Vec<Uuid>,
        type_sets: Vec<Vec<String>>,
        lookback_secs: u32,
    ) -> Result<Self, SpecError> {
        if resources.is_empty() {
            return Err(SpecError::EmptyPool { pool: "resources" });
        }
        if leads.is_empty() {
            return Err(SpecError::EmptyPool { pool: "leads" });
        }
        if type_sets.is_empty() {
            return Err(SpecError::EmptyPool { pool: "type_sets" });
        }
        for set in &type_sets {
            TypeSet::new(set.iter().map(String::as_str))?;
        }
        Ok(Self {
            resources,
            leads,
            type_sets,
            lookback_secs,
        })
    }

    /// Draws one request relative to `now` (epoch seconds).
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R, now: i64) -> Selectors {
        // Non-emptiness is checked in `new`; the fallbacks are unreachable.
        let resource_id = self.resources.choose(rng).copied().unwrap_or_default();
        let lead_id = self.leads.choose(rng).copied().unwrap_or_default();
        let types = self.type_sets.choose(rng).cloned().unwrap_or_default();
        let jitter = if self.lookback_secs == 0 {
            0
        } else {
            rng.random_range(0..self.lookback_secs)
        };
        Selectors {
            resource_id,
            lead_id,
            types,
            since: now - i64::from(jitter),
        }
    }

    /// Candidate resources.
    pub fn resources(&self) -> &[Uuid] {
        &self.resources
    }

    /// Candidate leads.
    pub fn leads(&self) -> &[Uuid] {
        &self.leads
    }

    /// Candidate type sets.
    pub fn type_sets(&self) -> &[Vec<String>] {
        &self.type_sets
    }

    /// Upper bound (exclusive) of the random lookback in seconds.
    pub fn lookback_secs(&self) -> u32 {
        self.lookback_secs
    }
}

const RESOURCES: [u128; 10] = [
    0x1a34b742_1ec4_11ed_861d_0242ac120002,
    0x2a4aad70_1ec4_11ed_861d_0242ac120002,
    0x3a4aad70_1ec4_11ed_861d_0242ac120002,
    0x4a4aad70_1ec4_11ed_861d_0242ac120002,
    0x5a4aad70_1ec4_11ed_861d_0242ac120002,
    0x6a4aad70_1ec4_11ed_861d_0242ac120002,
    0x7a4aad70_1ec4_11ed_861d_0242ac120002,
    0x8a4aad70_1ec4_11ed_861d_0242ac120002,
    0x9a4aad70_1ec4_11ed_861d_0242ac120002,
    0x0a4aad70_1ec4_11ed_861d_0242ac120002,
];

const LEADS: [u128; 10] = [
    0x1f486320_1ec4_11ed_861d_0242ac120002,
    0x24d36d76_1ec4_11ed_861d_0242ac120002,
    0x34d36d76_1ec4_11ed_861d_0242ac120002,
    0x44d36d76_1ec4_11ed_861d_0242ac120002,
    0x54d36d76_1ec4_11ed_861d_0242ac120002,
    0x64d36d76_1ec4_11ed_861d_0242ac120002,
    0x74d36d76_1ec4_11ed_861d_0242ac120002,
    0x84d36d76_1ec4_11ed_861d_0242ac120002,
    0x94d36d76_1ec4_11ed_861d_0242ac120002,
    0x04d36d76_1ec4_11ed_861d_0242ac120002,
];

impl Default for SelectorPool {
    /// Ten demo resources, ten demo leads, the three Telegram type sets, and a
    /// 10 second lookback.
    fn default() -> Self {
        Self {
            resources: RESOURCES.iter().copied().map(Uuid::from_u128).collect(),
            leads: LEADS.iter().copied().map(Uuid::from_u128).collect(),
            type_sets: vec![
                vec!["tg_send_text".into()],
                vec!["tg_send_text".into(), "tg_start".into()],
                vec!["tg_start".into()],
            ],
            lookback_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_draw_stays_within_pool_and_window() {
        let pool = SelectorPool::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let s = pool.draw(&mut rng, 1_000);
            assert!(pool.resources().contains(&s.resource_id));
            assert!(pool.leads().contains(&s.lead_id));
            assert!(pool.type_sets().contains(&s.types));
            assert!(s.since <= 1_000 && s.since > 990);
        }
    }

    #[test]
    fn test_zero_lookback_pins_since() {
        let pool = SelectorPool::new(
            vec![Uuid::from_u128(1)],
            vec![Uuid::from_u128(2)],
            vec![vec!["tg_start".into()]],
            0,
        )
        .unwrap();
        let s = pool.draw(&mut rand::rng(), 42);
        assert_eq!(s.since, 42);
    }

    #[test]
    fn test_empty_pool_rejected() {
        let err = SelectorPool::new(vec![], vec![Uuid::nil()], vec![vec!["a".into()]], 1);
        assert_eq!(err, Err(SpecError::EmptyPool { pool: "resources" }));
    }

    #[test]
    fn test_empty_type_set_in_pool_rejected() {
        let err = SelectorPool::new(vec![Uuid::nil()], vec![Uuid::nil()], vec![vec![]], 1);
        assert_eq!(err, Err(SpecError::EmptyTypeSet));
    }

    #[test]
    fn test_default_uuids_match_literals() {
        let pool = SelectorPool::default();
        assert_eq!(
            pool.resources()[0].to_string(),
            "1a34b742-1ec4-11ed-861d-0242ac120002"
        );
        assert_eq!(
            pool.leads()[9].to_string(),
            "04d36d76-1ec4-11ed-861d-0242ac120002"
        );
    }
}
