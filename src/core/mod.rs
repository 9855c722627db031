//! Runtime core: worker groups, shutdown signals, configuration.
//!
//! - [`group`]: named `JoinSet` of cancellable workers with a shutdown grace;
//! - [`shutdown`]: cross-platform termination signal handling;
//! - [`config`]: configuration structs and defaults.

mod config;
mod group;
pub mod shutdown;

pub use config::{Config, ConsumerConfig, EngineConfig, RegistrarConfig, SinkConfig};
pub use group::WorkerGroup;
