//! # Postgres-wire engine.
//!
//! [`PgEngine`] renders DDL with [`sql`](crate::engine::sql) and executes it on
//! a pooled connection (`deadpool-postgres`). Every operation is one
//! `batch_execute` round-trip bounded by the configured statement timeout
//! (pool checkout included).
//!
//! ## Error classification
//! ```text
//! SQLSTATE 42704 / 42P01, "unknown catalog item", "does not exist" ──► EngineError::NotFound
//! SQLSTATE 42710 / 42P07, "already exists"                          ──► EngineError::AlreadyExists
//! pool checkout failure                                             ──► EngineError::Pool
//! transport failure (no server response)                            ──► EngineError::Connection
//! timeout elapsed                                                   ──► EngineError::Timeout
//! anything else                                                     ──► EngineError::Statement
//! ```
//!
//! ## Tail sessions
//! [`tail_first`](Engine::tail_first) opens `DECLARE .. CURSOR FOR TAIL` in a
//! transaction and blocks in `FETCH` until the view emits an insert. It is not
//! bounded by the statement timeout, and its connection is detached from the
//! pool and closed afterwards.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::debug;

use crate::core::EngineConfig;
use crate::engine::{Engine, SinkDefinition, ViewDefinition, sql};
use crate::error::EngineError;
use crate::listener::TriggerMessage;
use crate::naming::ObjectName;

/// Engine reached over the Postgres wire protocol (Materialize).
pub struct PgEngine {
    pool: Pool,
    timeout: Option<Duration>,
}

impl PgEngine {
    /// Parses the connection string and builds the pool.
    ///
    /// Connectivity is not checked until the first statement.
    pub fn new(cfg: &EngineConfig) -> Result<Self, EngineError> {
        let pg_config: tokio_postgres::Config =
            cfg.url.parse().map_err(|e| EngineError::Pool {
                error: format!("invalid connection string: {e}"),
            })?;
        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(cfg.pool_size_clamped())
            .build()
            .map_err(|e| EngineError::Pool {
                error: format!("pool creation failed: {e}"),
            })?;
        Ok(Self {
            pool,
            timeout: cfg.statement_timeout(),
        })
    }

    async fn checkout(&self) -> Result<Object, EngineError> {
        self.pool.get().await.map_err(|e| EngineError::Pool {
            error: e.to_string(),
        })
    }

    async fn execute(&self, object: &ObjectName, stmt: String) -> Result<(), EngineError> {
        debug!(%object, statement = %stmt, "executing");
        let run = async {
            let client = self.checkout().await?;
            client
                .batch_execute(&stmt)
                .await
                .map_err(|e| classify(&e, object))
        };
        match self.timeout {
            None => run.await,
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .unwrap_or(Err(EngineError::Timeout { timeout })),
        }
    }
}

fn classify(err: &tokio_postgres::Error, object: &ObjectName) -> EngineError {
    let object = object.to_string();
    let Some(db) = err.as_db_error() else {
        return EngineError::Connection {
            error: err.to_string(),
        };
    };
    let code = db.code();
    let msg = db.message();
    if *code == SqlState::UNDEFINED_OBJECT
        || *code == SqlState::UNDEFINED_TABLE
        || msg.contains("unknown catalog item")
        || msg.contains("does not exist")
    {
        return EngineError::NotFound { object };
    }
    if *code == SqlState::DUPLICATE_OBJECT
        || *code == SqlState::DUPLICATE_TABLE
        || msg.contains("already exists")
    {
        return EngineError::AlreadyExists { object };
    }
    EngineError::Statement {
        error: format!("{}: {msg}", code.code()),
    }
}

fn column_error(column: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::Statement {
        error: format!("unexpected tail column {column}: {err}"),
    }
}

fn name_column(row: &Row, column: &str) -> Result<ObjectName, EngineError> {
    let raw: String = row.try_get(column).map_err(|e| column_error(column, e))?;
    ObjectName::parse(raw).map_err(|e| column_error(column, e))
}

fn decode_row(row: &Row) -> Result<TriggerMessage, EngineError> {
    let workflow: String = row
        .try_get("workflow_id")
        .map_err(|e| column_error("workflow_id", e))?;
    Ok(TriggerMessage {
        view_name: name_column(row, "view_name")?,
        sink_name: name_column(row, "sink_name")?,
        workflow_id: workflow
            .parse()
            .map_err(|e| column_error("workflow_id", e))?,
        body: row.try_get("body").map_err(|e| column_error("body", e))?,
        match_timestamp: row
            .try_get("timestamp")
            .map_err(|e| column_error("timestamp", e))?,
    })
}

#[async_trait]
impl Engine for PgEngine {
    async fn create_view(&self, def: &ViewDefinition) -> Result<(), EngineError> {
        self.execute(&def.name, sql::create_view(def)).await
    }

    async fn create_sink(&self, def: &SinkDefinition) -> Result<(), EngineError> {
        self.execute(&def.name, sql::create_sink(def)).await
    }

    async fn drop_view(&self, name: &ObjectName) -> Result<(), EngineError> {
        self.execute(name, sql::drop_view(name)).await
    }

    async fn drop_sink(&self, name: &ObjectName) -> Result<(), EngineError> {
        self.execute(name, sql::drop_sink(name)).await
    }

    async fn tail_first(&self, view: &ObjectName) -> Result<TriggerMessage, EngineError> {
        let client = match self.timeout {
            None => self.checkout().await?,
            Some(timeout) => tokio::time::timeout(timeout, self.checkout())
                .await
                .unwrap_or(Err(EngineError::Timeout { timeout }))?,
        };
        let client = Object::take(client);
        debug!(%view, "opening tail cursor");
        client
            .batch_execute(&sql::declare_tail(view))
            .await
            .map_err(|e| classify(&e, view))?;
        loop {
            let rows = client
                .query(sql::FETCH_TAIL, &[])
                .await
                .map_err(|e| classify(&e, view))?;
            for row in &rows {
                let diff: i64 = row.try_get("mz_diff").map_err(|e| column_error("mz_diff", e))?;
                if diff > 0 {
                    let msg = decode_row(row)?;
                    let _ = client.batch_execute("COMMIT").await;
                    return Ok(msg);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
