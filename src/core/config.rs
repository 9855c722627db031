//! # Runtime configuration.
//!
//! One plain struct per concern, aggregated by [`Config`]. Every struct has a
//! `Default` matching the reference deployment (local Materialize, Redpanda
//! reachable from the engine as `redpanda:29092`, consumers on `localhost:9092`).
//!
//! ## Sentinel values
//! - `EngineConfig::statement_timeout = 0s` → no timeout
//! - `RegistrarConfig::target = 0` → no target (run until the source is exhausted or cancelled)
//! - `*::workers = 0` / `pool_size = 0` → clamped to 1

use std::time::Duration;

use crate::engine::SinkTarget;
use crate::naming::{NamePrefix, ObjectName};

/// Streaming engine connection.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Postgres-wire connection string.
    pub url: String,
    /// Maximum pooled connections.
    pub pool_size: usize,
    /// Per-statement timeout, pool checkout included (`0s` = none).
    pub statement_timeout: Duration,
    /// Event log source the views read from.
    pub source: ObjectName,
}

impl EngineConfig {
    /// Pool size clamped to a minimum of 1.
    #[inline]
    pub fn pool_size_clamped(&self) -> usize {
        self.pool_size.max(1)
    }

    /// Connection string with any password replaced by `***`, for logs.
    ///
    /// Handles both URL (`postgres://user:pw@host/db`) and key/value
    /// (`host=h password=pw`) forms.
    ///
    /// # Example
    /// ```
    /// use listenvisor::EngineConfig;
    ///
    /// let cfg = EngineConfig { url: "postgres://mz:s3cret@db:6875/materialize".into(), ..Default::default() };
    /// assert_eq!(cfg.redacted_url(), "postgres://mz:***@db:6875/materialize");
    /// ```
    pub fn redacted_url(&self) -> String {
        let url = self.url.as_str();
        if let Some((scheme, rest)) = url.split_once("://") {
            let authority_end = rest.find('/').unwrap_or(rest.len());
            let Some(at) = rest[..authority_end].rfind('@') else {
                return url.to_string();
            };
            return match rest[..at].split_once(':') {
                Some((user, _)) => format!("{scheme}://{user}:***{}", &rest[at..]),
                None => url.to_string(),
            };
        }
        url.split_whitespace()
            .map(|pair| match pair.split_once('=') {
                Some(("password", _)) => "password=***".to_string(),
                _ => pair.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Statement timeout as an `Option` (`None` = no timeout).
    #[inline]
    pub fn statement_timeout(&self) -> Option<Duration> {
        if self.statement_timeout.is_zero() {
            None
        } else {
            Some(self.statement_timeout)
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "postgres://materialize@localhost:6875/materialize?sslmode=disable".into(),
            pool_size: 16,
            statement_timeout: Duration::from_secs(30),
            source: ObjectName::default_source(),
        }
    }
}

/// Where sinks publish, as seen from the engine.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Broker address reachable from the engine.
    pub broker: String,
    /// Trigger topic.
    pub topic: String,
}

impl SinkConfig {
    /// Sink target for DDL.
    pub fn target(&self) -> SinkTarget {
        SinkTarget {
            broker: self.broker.clone(),
            topic: self.topic.clone(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            broker: "redpanda:29092".into(),
            topic: "triggers".into(),
        }
    }
}

/// Registration pool.
#[derive(Clone, Debug)]
pub struct RegistrarConfig {
    /// Number of concurrent registrar workers.
    pub workers: usize,
    /// Successful registrations to reach before stopping (`0` = no target).
    pub target: u64,
    /// How long to wait for in-flight registrations after cancellation.
    pub grace: Duration,
    /// Random lookback applied to generated `since` bounds (seconds, exclusive).
    pub lookback_secs: u32,
    /// Prefix for generated view names.
    pub view_prefix: NamePrefix,
    /// Prefix for generated sink names.
    pub sink_prefix: NamePrefix,
}

impl RegistrarConfig {
    /// Worker count clamped to a minimum of 1.
    #[inline]
    pub fn workers_clamped(&self) -> usize {
        self.workers.max(1)
    }

    /// Target as an `Option` (`None` = no target).
    #[inline]
    pub fn target_count(&self) -> Option<u64> {
        (self.target > 0).then_some(self.target)
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            target: 10_000,
            grace: Duration::from_secs(30),
            lookback_secs: 10,
            view_prefix: NamePrefix::VIEW,
            sink_prefix: NamePrefix::SINK,
        }
    }
}

/// Trigger consumer pool.
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// Bootstrap brokers as seen from the consumer.
    pub brokers: String,
    /// Trigger topic.
    pub topic: String,
    /// Consumer group shared by all workers.
    pub group_id: String,
    /// Number of consumer workers (group members).
    pub workers: usize,
    /// How long to wait for in-flight teardowns after cancellation.
    pub grace: Duration,
    /// Pause before a failed teardown is read again.
    pub retry_delay: Duration,
}

impl ConsumerConfig {
    /// Worker count clamped to a minimum of 1.
    #[inline]
    pub fn workers_clamped(&self) -> usize {
        self.workers.max(1)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".into(),
            topic: "triggers".into(),
            group_id: "triggers_consumer".into(),
            workers: 2,
            grace: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Aggregate configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Engine connection.
    pub engine: EngineConfig,
    /// Sink target.
    pub sink: SinkConfig,
    /// Registration pool.
    pub registrar: RegistrarConfig,
    /// Consumer pool.
    pub consumer: ConsumerConfig,
    /// Event bus ring buffer size (min 1; clamped by Bus).
    pub bus_capacity: usize,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            sink: SinkConfig::default(),
            registrar: RegistrarConfig::default(),
            consumer: ConsumerConfig::default(),
            bus_capacity: 1024,
        }
    }
}
