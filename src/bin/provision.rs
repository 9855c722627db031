//! Registers listeners against the engine until the target count is reached.
//!
//! ```text
//! listenvisor-provision --workers 16 --target 10000 \
//!     --engine-url postgres://materialize@localhost:6875/materialize?sslmode=disable
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
    Bus, Config, EngineConfig, LogWriter, NamePrefix, ObjectName, PgEngine, Registrar,
    RegistrarConfig, RegistrarPool, SelectorPool, SinkConfig, SpecGenerator, Subscribe,
    SubscriberSet,
};

/// listenvisor provisioner: creates filtered views and their sinks.
#[derive(Parser, Debug)]
#[command(name = "listenvisor-provision")]
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

    /// Event log source the views read from
    #[arg(long, env = "LISTENVISOR_SOURCE", default_value = listenvisor::DEFAULT_SOURCE)]
    source: String,

    /// Broker address as reachable from the engine
    #[arg(long, env = "LISTENVISOR_SINK_BROKER", default_value_t = SinkConfig::default().broker)]
    sink_broker: String,

    /// Trigger topic the sinks publish to
    #[arg(long, env = "LISTENVISOR_TOPIC", default_value_t = SinkConfig::default().topic)]
    topic: String,

    /// Concurrent registrar workers
    #[arg(long, env = "LISTENVISOR_WORKERS", default_value_t = RegistrarConfig::default().workers)]
    workers: usize,

    /// Successful registrations to reach (0 = run until interrupted)
    #[arg(long, env = "LISTENVISOR_TARGET", default_value_t = RegistrarConfig::default().target)]
    target: u64,

    /// Seconds to wait for in-flight registrations on shutdown
    #[arg(long, env = "LISTENVISOR_GRACE", default_value_t = 30)]
    grace_secs: u64,

    /// Random lookback applied to each listener's lower time bound, in seconds
    #[arg(long, env = "LISTENVISOR_LOOKBACK", default_value_t = RegistrarConfig::default().lookback_secs)]
    lookback_secs: u32,

    /// Prefix for generated view names
    #[arg(long, default_value = "view_")]
    view_prefix: String,

    /// Prefix for generated sink names
    #[arg(long, default_value = "sink_")]
    sink_prefix: String,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> Result<Config> {
        Ok(Config {
            engine: EngineConfig {
                url: self.engine_url.clone(),
                pool_size: self.pool_size,
                statement_timeout: Duration::from_secs(self.statement_timeout_secs),
                source: ObjectName::parse(self.source.as_str()).context("invalid --source")?,
            },
            sink: SinkConfig {
                broker: self.sink_broker.clone(),
                topic: self.topic.clone(),
            },
            registrar: RegistrarConfig {
                workers: self.workers,
                target: self.target,
                grace: Duration::from_secs(self.grace_secs),
                lookback_secs: self.lookback_secs,
                view_prefix: NamePrefix::new(self.view_prefix.clone())
                    .context("invalid --view-prefix")?,
                sink_prefix: NamePrefix::new(self.sink_prefix.clone())
                    .context("invalid --sink-prefix")?,
            },
            ..Config::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = args.config()?;
    let token = CancellationToken::new();
    let signals = cancel_on_signal(token.clone());

    let bus = Bus::new(cfg.bus_capacity_clamped());
    let stop_logs = CancellationToken::new();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let logs = SubscriberSet::new(subs, bus.clone()).listen(&bus, stop_logs.clone());

    let engine = PgEngine::new(&cfg.engine).context("failed to build engine pool")?;
    info!(url = %cfg.engine.redacted_url(), source = %cfg.engine.source, "engine pool ready");
    let registrar = Registrar::new(Arc::new(engine), cfg.engine.source.clone(), cfg.sink.target());

    let defaults = SelectorPool::default();
    let selectors = SelectorPool::new(
        defaults.resources().to_vec(),
        defaults.leads().to_vec(),
        defaults.type_sets().to_vec(),
        cfg.registrar.lookback_secs,
    )?;
    let generator = SpecGenerator::with_prefixes(
        selectors,
        cfg.registrar.view_prefix.clone(),
        cfg.registrar.sink_prefix.clone(),
    );

    let pool = RegistrarPool::new(
        registrar,
        bus.clone(),
        cfg.registrar.workers_clamped(),
        cfg.registrar.target_count(),
    )
    .with_grace(cfg.registrar.grace);
    let result = pool.run(Arc::new(generator), &token).await;

    token.cancel();
    let _ = signals.await;
    stop_logs.cancel();
    let _ = logs.await;

    let progress = result.context("registration pool did not shut down cleanly")?;
    println!("total created: {}", progress.succeeded);
    Ok(())
}
