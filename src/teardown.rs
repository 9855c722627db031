//! # Listener teardown.
//!
//! [`TeardownCoordinator::teardown`] removes the sink and the view a trigger
//! message names. The sink goes first because the engine refuses to drop a
//! view that a sink still reads from; both drops are attempted regardless.
//!
//! ```text
//! drop_sink ─┬─ ok / not found ─┐
//!            └─ other error ────┤ (recorded)
//! drop_view ─┬─ ok / not found ─┤
//!            └─ other error ────┤ (recorded)
//!                               ▼
//!   any recorded error   → Err(TeardownError)   (listener stays; redelivery retries)
//!   both were not found  → Ok(AlreadyAbsent)    (duplicate delivery)
//!   otherwise            → Ok(TornDown)
//! ```

use tracing::debug;

use crate::engine::EngineRef;
use crate::error::{EngineError, TeardownError};
use crate::naming::ObjectName;

/// Result of a successful teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// At least one of the two objects was removed by this call.
    TornDown,
    /// Both objects were already gone.
    AlreadyAbsent,
}

/// Removes listeners from an engine.
pub struct TeardownCoordinator {
    engine: EngineRef,
}

/// `Ok(true)` if removed, `Ok(false)` if it was already absent.
fn absent_ok(res: Result<(), EngineError>) -> Result<bool, EngineError> {
    match res {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

impl TeardownCoordinator {
    /// Coordinator over `engine`.
    pub fn new(engine: EngineRef) -> Self {
        Self { engine }
    }

    /// Drops `sink_name` and `view_name`; idempotent.
    pub async fn teardown(
        &self,
        view_name: &ObjectName,
        sink_name: &ObjectName,
    ) -> Result<TeardownOutcome, TeardownError> {
        let sink = absent_ok(self.engine.drop_sink(sink_name).await);
        let view = absent_ok(self.engine.drop_view(view_name).await);
        debug!(%view_name, %sink_name, ?sink, ?view, "teardown attempted");

        match (sink, view) {
            (Ok(false), Ok(false)) => Ok(TeardownOutcome::AlreadyAbsent),
            (Ok(_), Ok(_)) => Ok(TeardownOutcome::TornDown),
            (sink, view) => Err(TeardownError {
                view: view_name.to_string(),
                sink: sink_name.to_string(),
                view_error: view.err(),
                sink_error: sink.err(),
            }),
        }
    }
}
