//! # Listener registration.
//!
//! [`Registrar::register`] turns a [`ListenerSpec`] into a live view + sink:
//!
//! ```text
//! create_view(view) ──err──► indeterminate? ──no──► RegistrationError::CreateView
//!        │ ok                      │ yes
//!        │                         └─► drop_view(view) ──ok──► RegistrationError::CreateView
//!        │                                        └──err─► RegistrationError::Orphaned
//! create_sink(sink) ──err──► drop_view(view) ──ok──► RegistrationError::CreateSink
//!        │ ok                              └──err─► RegistrationError::Orphaned (view left)
//!        ▼
//! RegisteredListener { spec, workflow_id, created_at }
//! ```
//!
//! A timed-out or disconnected `CREATE` may still have committed, so the view
//! is dropped before reporting it. Compensating drops treat "does not exist"
//! as done.
//!
//! [`Registrar::listen_once`] is the sink-less variant: it creates the view,
//! waits for its first row and drops the view again.
//!
//! [`RegistrarPool`] runs `N` registrar workers against a shared
//! [`SpecSource`] until the target count is reached, the source is exhausted,
//! or the token is cancelled.

mod pool;
mod source;

use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::engine::{EngineRef, SinkDefinition, SinkTarget, ViewDefinition};
use crate::error::{EngineError, RegistrationError};
use crate::listener::{ListenerSpec, RegisteredListener, TriggerMessage};
use crate::naming::ObjectName;

pub use pool::RegistrarPool;
pub use source::{SpecGenerator, SpecQueue, SpecSource};

/// Creates listeners against an engine.
pub struct Registrar {
    engine: EngineRef,
    source: ObjectName,
    target: SinkTarget,
}

impl Registrar {
    /// Registrar reading from event log `source` and publishing to `target`.
    pub fn new(engine: EngineRef, source: ObjectName, target: SinkTarget) -> Self {
        Self {
            engine,
            source,
            target,
        }
    }

    /// Registers one listener, compensating a half-created one.
    ///
    /// A fresh workflow id is generated and projected into every trigger row.
    pub async fn register(
        &self,
        spec: ListenerSpec,
    ) -> Result<RegisteredListener, RegistrationError> {
        let workflow_id = Uuid::new_v4();
        let view = ViewDefinition::for_listener(&spec, &self.source, workflow_id);
        let sink = SinkDefinition::for_listener(&spec, &self.target);

        self.create_view(&view).await?;

        if let Err(sink_error) = self.engine.create_sink(&sink).await {
            debug!(view = %view.name, error = %sink_error, "sink failed; dropping view");
            return Err(match self.drop_view(&view.name).await {
                Ok(()) => RegistrationError::CreateSink {
                    view: view.name.to_string(),
                    sink: sink.name.to_string(),
                    source: sink_error,
                },
                Err(drop_error) => RegistrationError::Orphaned {
                    view: view.name.to_string(),
                    sink: sink.name.to_string(),
                    cause: Some(sink_error),
                    drop_error,
                },
            });
        }

        Ok(RegisteredListener {
            spec,
            workflow_id,
            created_at: SystemTime::now(),
        })
    }

    /// Creates the listener's view without a sink, waits for its first match
    /// and drops the view.
    ///
    /// At most one row is delivered. On cancellation or a failed wait the view
    /// is dropped before the error is returned.
    pub async fn listen_once(
        &self,
        spec: &ListenerSpec,
        token: &CancellationToken,
    ) -> Result<FirstMatch, RegistrationError> {
        let view = ViewDefinition::for_listener(spec, &self.source, Uuid::new_v4());
        self.create_view(&view).await?;

        let waited = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            res = self.engine.tail_first(&view.name) => Some(res),
        };
        let dropped = self.drop_view(&view.name).await;
        let name = view.name.to_string();
        match (waited, dropped) {
            (Some(Ok(message)), dropped) => Ok(FirstMatch {
                message,
                orphaned: dropped.err(),
            }),
            (Some(Err(source)), Ok(())) => Err(RegistrationError::Tail { view: name, source }),
            (None, Ok(())) => Err(RegistrationError::Cancelled { view: name }),
            (waited, Err(drop_error)) => Err(RegistrationError::Orphaned {
                view: name,
                sink: view.sink_name.to_string(),
                cause: waited.and_then(Result::err),
                drop_error,
            }),
        }
    }

    async fn create_view(&self, view: &ViewDefinition) -> Result<(), RegistrationError> {
        let Err(view_error) = self.engine.create_view(view).await else {
            return Ok(());
        };
        if !view_error.is_indeterminate() {
            return Err(RegistrationError::CreateView {
                view: view.name.to_string(),
                source: view_error,
            });
        }
        debug!(view = %view.name, error = %view_error, "view outcome unknown; dropping view");
        Err(match self.drop_view(&view.name).await {
            Ok(()) => RegistrationError::CreateView {
                view: view.name.to_string(),
                source: view_error,
            },
            Err(drop_error) => RegistrationError::Orphaned {
                view: view.name.to_string(),
                sink: view.sink_name.to_string(),
                cause: Some(view_error),
                drop_error,
            },
        })
    }

    /// Compensating drop; an absent view counts as dropped.
    async fn drop_view(&self, name: &ObjectName) -> Result<(), EngineError> {
        match self.engine.drop_view(name).await {
            Err(err) if err.is_not_found() => Ok(()),
            res => res,
        }
    }
}

/// First row of a one-shot listener; see [`Registrar::listen_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstMatch {
    /// The row the view emitted.
    pub message: TriggerMessage,
    /// Why the view could not be dropped afterwards, if it could not.
    pub orphaned: Option<EngineError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryTopic;
    use crate::engine::{MemoryEngine, Op};
    use crate::error::EngineError;
    use crate::listener::{LogRecord, Selectors, build_spec};
    use std::sync::Arc;
    use std::time::Duration;

    fn timeout() -> EngineError {
        EngineError::Timeout {
            timeout: Duration::from_secs(30),
        }
    }

    fn setup() -> (Arc<MemoryEngine>, Registrar) {
        let engine = Arc::new(MemoryEngine::default());
        engine.attach_topic("triggers", MemoryTopic::new());
        let registrar = Registrar::new(
            engine.clone(),
            ObjectName::default_source(),
            SinkTarget {
                broker: "redpanda:29092".into(),
                topic: "triggers".into(),
            },
        );
        (engine, registrar)
    }

    fn spec() -> ListenerSpec {
        build_spec(Selectors {
            resource_id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            types: vec!["tg_start".into()],
            since: 0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_creates_both_objects() {
        let (engine, registrar) = setup();
        let spec = spec();
        let listener = registrar.register(spec.clone()).await.unwrap();
        assert_eq!(listener.spec, spec);
        assert!(engine.has_view(spec.view_name()));
        assert!(engine.has_sink(spec.sink_name()));
    }

    #[tokio::test]
    async fn test_view_failure_leaves_nothing() {
        let (engine, registrar) = setup();
        engine.fail_next(
            Op::CreateView,
            EngineError::Statement {
                error: "boom".into(),
            },
        );
        let err = registrar.register(spec()).await.unwrap_err();
        assert_eq!(err.as_label(), "registration_create_view");
        assert_eq!(engine.calls(Op::CreateSink), 0);
        assert_eq!(engine.view_count(), 0);
    }

    #[tokio::test]
    async fn test_sink_failure_drops_view() {
        let (engine, registrar) = setup();
        engine.fail_next(
            Op::CreateSink,
            EngineError::Statement {
                error: "boom".into(),
            },
        );
        let err = registrar.register(spec()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::CreateSink { .. }));
        assert_eq!(engine.view_count(), 0);
        assert_eq!(engine.sink_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_compensation_reports_orphan() {
        let (engine, registrar) = setup();
        engine.fail_next(
            Op::CreateSink,
            EngineError::Statement {
                error: "sink".into(),
            },
        );
        engine.fail_next(
            Op::DropView,
            EngineError::Pool {
                error: "gone".into(),
            },
        );
        let spec = spec();
        let err = registrar.register(spec.clone()).await.unwrap_err();
        assert!(err.is_orphaned());
        match err {
            RegistrationError::Orphaned {
                view,
                cause,
                drop_error,
                ..
            } => {
                assert_eq!(view, spec.view_name().as_str());
                assert_eq!(cause.as_ref().map(EngineError::as_label), Some("engine_statement"));
                assert_eq!(drop_error.as_label(), "engine_pool");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(engine.has_view(spec.view_name()));
    }

    #[tokio::test]
    async fn test_committed_view_behind_timeout_is_dropped() {
        let (engine, registrar) = setup();
        engine.lose_reply(Op::CreateView, timeout());
        let spec = spec();
        let err = registrar.register(spec.clone()).await.unwrap_err();
        assert_eq!(err.as_label(), "registration_create_view");
        assert_eq!(engine.calls(Op::DropView), 1);
        assert_eq!(engine.calls(Op::CreateSink), 0);
        assert!(!engine.has_view(spec.view_name()));
    }

    #[tokio::test]
    async fn test_timeout_before_commit_is_plain_view_failure() {
        let (engine, registrar) = setup();
        engine.fail_next(Op::CreateView, timeout());
        let err = registrar.register(spec()).await.unwrap_err();
        assert_eq!(err.as_label(), "registration_create_view");
        assert_eq!(engine.calls(Op::DropView), 1);
        assert_eq!(engine.view_count(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_view_that_cannot_be_dropped_is_orphaned() {
        let (engine, registrar) = setup();
        engine.lose_reply(Op::CreateView, timeout());
        engine.fail_next(
            Op::DropView,
            EngineError::Pool {
                error: "gone".into(),
            },
        );
        let spec = spec();
        let err = registrar.register(spec.clone()).await.unwrap_err();
        match err {
            RegistrationError::Orphaned { cause, .. } => {
                assert_eq!(cause, Some(timeout()));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(engine.has_view(spec.view_name()));
    }

    #[tokio::test]
    async fn test_listen_once_returns_first_match_and_drops_view() {
        let (engine, registrar) = setup();
        let spec = spec();
        let (resource_id, lead_id) = (spec.resource_id(), spec.lead_id());

        let waiting = tokio::spawn({
            let spec = spec.clone();
            async move { registrar.listen_once(&spec, &CancellationToken::new()).await }
        });
        while !engine.has_view(spec.view_name()) {
            tokio::task::yield_now().await;
        }
        engine.append(LogRecord::inbound(resource_id, lead_id, "tg_start", "once", 5));
        engine.append(LogRecord::inbound(resource_id, lead_id, "tg_start", "twice", 6));

        let first = waiting.await.unwrap().unwrap();
        assert_eq!(first.message.body, "once");
        assert_eq!(first.orphaned, None);
        assert!(!engine.has_view(spec.view_name()));
        assert_eq!(engine.calls(Op::CreateSink), 0);
    }

    #[tokio::test]
    async fn test_cancelled_listen_once_drops_view() {
        let (engine, registrar) = setup();
        let spec = spec();
        let token = CancellationToken::new();
        let waiting = tokio::spawn({
            let spec = spec.clone();
            let token = token.clone();
            async move { registrar.listen_once(&spec, &token).await }
        });
        while !engine.has_view(spec.view_name()) {
            tokio::task::yield_now().await;
        }
        token.cancel();
        let err = waiting.await.unwrap().unwrap_err();
        assert_eq!(err.as_label(), "registration_cancelled");
        assert_eq!(engine.view_count(), 0);
    }
}
