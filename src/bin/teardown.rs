//! Consumes trigger messages and tears down the listeners that fired.
//!
//! ```text
//! listenvisor-teardown --brokers localhost:9092 --group-id triggers_consumer --workers 2
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use listenvisor::core::shutdown::cancel_on_signal;
use listenvisor::{
    Bus, Config, ConsumerConfig, EngineConfig, KafkaChannel, LogWriter, ObjectName, PgEngine,
    Subscribe, SubscriberSet, TriggerConsumer,
};

/// listenvisor teardown consumer: drops every listener whose trigger arrives.
#[derive(Parser, Debug)]
#[command(name = "listenvisor-teardown")]
#[command(version, about, long_about = None)]
struct Args {
    /// Postgres-wire connection string of the engine
    #[arg(long, env = "LISTENVISOR_ENGINE_URL", default_value_t = EngineConfig::default().url)]
    engine_url: String,

    /// Maximum pooled engine connections
    #[arg(long, env = "LISTENVISOR_POOL_SIZE", default_value_t = EngineConfig::default().pool_size)]
    pool_size: usize,

    /// Per-statement timeout in seconds (0 = none)
    #[arg(long, env = "LISTENVISOR_STATEMENT_TIMEOUT", default_value_t = 30)]
    statement_timeout_secs: u64,

    /// Bootstrap brokers as reachable from this process
    #[arg(long, env = "LISTENVISOR_BROKERS", default_value_t = ConsumerConfig::default().brokers)]
    brokers: String,

    /// Trigger topic
    #[arg(long, env = "LISTENVISOR_TOPIC", default_value_t = ConsumerConfig::default().topic)]
    topic: String,

    /// Consumer group shared by all workers
    #[arg(long, env = "LISTENVISOR_GROUP_ID", default_value_t = ConsumerConfig::default().group_id)]
    group_id: String,

    /// Consumer workers (group members)
    #[arg(long, env = "LISTENVISOR_WORKERS", default_value_t = ConsumerConfig::default().workers)]
    workers: usize,

    /// Seconds to wait for in-flight teardowns on shutdown
    #[arg(long, env = "LISTENVISOR_GRACE", default_value_t = 30)]
    grace_secs: u64,

    /// Milliseconds to wait before retrying a failed teardown
    #[arg(long, env = "LISTENVISOR_RETRY_DELAY_MS", default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            engine: EngineConfig {
                url: self.engine_url.clone(),
                pool_size: self.pool_size,
                statement_timeout: Duration::from_secs(self.statement_timeout_secs),
                source: ObjectName::default_source(),
            },
            consumer: ConsumerConfig {
                brokers: self.brokers.clone(),
                topic: self.topic.clone(),
                group_id: self.group_id.clone(),
                workers: self.workers,
                grace: Duration::from_secs(self.grace_secs),
                retry_delay: Duration::from_millis(self.retry_delay_ms),
            },
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = args.config();
    let token = CancellationToken::new();
    let signals = cancel_on_signal(token.clone());

    let bus = Bus::new(cfg.bus_capacity_clamped());
    let stop_logs = CancellationToken::new();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let logs = SubscriberSet::new(subs, bus.clone()).listen(&bus, stop_logs.clone());

    let engine = PgEngine::new(&cfg.engine).context("failed to build engine pool")?;
    info!(url = %cfg.engine.redacted_url(), "engine pool ready");

    let consumer = TriggerConsumer::new(
        KafkaChannel::new(&cfg.consumer),
        Arc::new(engine),
        bus.clone(),
        cfg.consumer.workers_clamped(),
    )
    .with_grace(cfg.consumer.grace)
    .with_retry_delay(cfg.consumer.retry_delay);
    let result = consumer.run(&token).await;

    token.cancel();
    let _ = signals.await;
    stop_logs.cancel();
    let _ = logs.await;

    let progress = result.context("consumer pool did not shut down cleanly")?;
    println!("total torn down: {}", progress.succeeded);
    Ok(())
}
