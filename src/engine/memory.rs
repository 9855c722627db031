//! # In-process engine.
//!
//! [`MemoryEngine`] keeps an append-only log of [`LogRecord`]s and evaluates
//! every view's predicate against it, both over history when the view is
//! created and incrementally on [`append`](MemoryEngine::append). Sinks
//! publish each view row wrapped in the `after.row` envelope to the
//! [`MemoryTopic`] attached under the sink's topic name.
//!
//! Catalog rules follow the real engine:
//! - views and sinks share one namespace; duplicate names fail with `AlreadyExists`;
//! - dropping or reading from a missing object fails with `NotFound`;
//! - a view cannot be dropped while a sink still reads from it.
//!
//! Failures can be injected per operation ([`fail_next`](MemoryEngine::fail_next),
//! [`fail_every`](MemoryEngine::fail_every)). [`lose_reply`](MemoryEngine::lose_reply)
//! applies an operation and then fails it, the way a timed-out statement can
//! still commit. An artificial round-trip latency can be configured to force
//! interleaving between workers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::channel::MemoryTopic;
use crate::engine::{Engine, SinkDefinition, ViewDefinition};
use crate::error::EngineError;
use crate::listener::{LogRecord, TriggerMessage};
use crate::naming::ObjectName;

/// Engine operation, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// [`Engine::create_view`]
    CreateView,
    /// [`Engine::create_sink`]
    CreateSink,
    /// [`Engine::drop_view`]
    DropView,
    /// [`Engine::drop_sink`]
    DropSink,
    /// [`Engine::tail_first`]
    TailFirst,
}

struct MemView {
    def: ViewDefinition,
    rows: Vec<TriggerMessage>,
}

#[derive(Default)]
struct State {
    log: Vec<LogRecord>,
    views: HashMap<ObjectName, MemView>,
    sinks: HashMap<ObjectName, SinkDefinition>,
    topics: HashMap<String, MemoryTopic>,
    injected: HashMap<Op, VecDeque<EngineError>>,
    lost: HashMap<Op, VecDeque<EngineError>>,
    every: HashMap<Op, u64>,
    calls: HashMap<Op, u64>,
}

impl State {
    fn exists(&self, name: &ObjectName) -> bool {
        self.views.contains_key(name) || self.sinks.contains_key(name)
    }

    /// Counts the call and returns an injected failure, if one is due.
    fn enter(&mut self, op: Op) -> Result<(), EngineError> {
        let n = {
            let c = self.calls.entry(op).or_insert(0);
            *c += 1;
            *c
        };
        if let Some(err) = self.injected.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(every) = self.every.get(&op).copied() {
            if every > 0 && n % every == 0 {
                return Err(EngineError::Statement {
                    error: format!("injected failure on call {n} of {op:?}"),
                });
            }
        }
        Ok(())
    }

    /// Result of an applied operation; a lost reply turns it into an error.
    fn reply(&mut self, op: Op) -> Result<(), EngineError> {
        match self.lost.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn publish(&self, sink: &SinkDefinition, row: &TriggerMessage) {
        if let Some(topic) = self.topics.get(&sink.target.topic) {
            topic.publish(row.encode());
        }
    }
}

fn project(def: &ViewDefinition, rec: &LogRecord) -> TriggerMessage {
    TriggerMessage {
        view_name: def.name.clone(),
        sink_name: def.sink_name.clone(),
        workflow_id: def.workflow_id,
        body: rec.body.clone(),
        match_timestamp: rec.timestamp,
    }
}

/// In-process engine.
pub struct MemoryEngine {
    source: ObjectName,
    latency: Duration,
    state: Mutex<State>,
    changed: Notify,
}

impl MemoryEngine {
    /// Creates an empty engine whose log is exposed under `source`.
    pub fn new(source: ObjectName) -> Self {
        Self {
            source,
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
            changed: Notify::new(),
        }
    }

    /// Adds an artificial delay before every operation.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Routes sinks targeting `topic` to `channel`.
    pub fn attach_topic(&self, topic: impl Into<String>, channel: MemoryTopic) {
        self.lock().topics.insert(topic.into(), channel);
    }

    /// Appends a record to the event log and feeds every matching view.
    pub fn append(&self, record: LogRecord) {
        self.append_locked(record);
        self.changed.notify_waiters();
    }

    fn append_locked(&self, record: LogRecord) {
        let mut st = self.lock();
        let mut fired = Vec::new();
        for view in st.views.values_mut() {
            if record.matches(&view.def.predicate) {
                let row = project(&view.def, &record);
                view.rows.push(row.clone());
                fired.push(row);
            }
        }
        for row in &fired {
            for sink in st.sinks.values().filter(|s| s.from == row.view_name) {
                st.publish(sink, row);
            }
        }
        st.log.push(record);
    }

    /// Fails the next call of `op` with `err` (queued, one per call).
    pub fn fail_next(&self, op: Op, err: EngineError) {
        self.lock().injected.entry(op).or_default().push_back(err);
    }

    /// Applies the next call of `op`, then fails it with `err` as if the reply
    /// were lost.
    pub fn lose_reply(&self, op: Op, err: EngineError) {
        self.lock().lost.entry(op).or_default().push_back(err);
    }

    /// Fails every `n`-th call of `op` (`0` disables).
    pub fn fail_every(&self, op: Op, n: u64) {
        self.lock().every.insert(op, n);
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn calls(&self, op: Op) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// True if a view named `name` exists.
    pub fn has_view(&self, name: &ObjectName) -> bool {
        self.lock().views.contains_key(name)
    }

    /// True if a sink named `name` exists.
    pub fn has_sink(&self, name: &ObjectName) -> bool {
        self.lock().sinks.contains_key(name)
    }

    /// Number of live views.
    pub fn view_count(&self) -> usize {
        self.lock().views.len()
    }

    /// Number of live sinks.
    pub fn sink_count(&self) -> usize {
        self.lock().sinks.len()
    }

    /// Rows currently in a view.
    pub fn rows(&self, view: &ObjectName) -> Option<Vec<TriggerMessage>> {
        self.lock().views.get(view).map(|v| v.rows.clone())
    }
}

impl Default for MemoryEngine {
    /// Engine with the log exposed as `events_source`.
    fn default() -> Self {
        Self::new(ObjectName::default_source())
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn create_view(&self, def: &ViewDefinition) -> Result<(), EngineError> {
        self.round_trip().await;
        let mut st = self.lock();
        st.enter(Op::CreateView)?;
        if def.source != self.source {
            return Err(EngineError::NotFound {
                object: def.source.to_string(),
            });
        }
        if st.exists(&def.name) {
            return Err(EngineError::AlreadyExists {
                object: def.name.to_string(),
            });
        }
        let rows = st
            .log
            .iter()
            .filter(|r| r.matches(&def.predicate))
            .map(|r| project(def, r))
            .collect();
        st.views.insert(
            def.name.clone(),
            MemView {
                def: def.clone(),
                rows,
            },
        );
        st.reply(Op::CreateView)
    }

    async fn create_sink(&self, def: &SinkDefinition) -> Result<(), EngineError> {
        self.round_trip().await;
        let mut st = self.lock();
        st.enter(Op::CreateSink)?;
        if st.exists(&def.name) {
            return Err(EngineError::AlreadyExists {
                object: def.name.to_string(),
            });
        }
        let Some(view) = st.views.get(&def.from) else {
            return Err(EngineError::NotFound {
                object: def.from.to_string(),
            });
        };
        if !st.topics.contains_key(&def.target.topic) {
            return Err(EngineError::Statement {
                error: format!(
                    "broker {} has no topic {}",
                    def.target.broker, def.target.topic
                ),
            });
        }
        for row in &view.rows {
            st.publish(def, row);
        }
        st.sinks.insert(def.name.clone(), def.clone());
        st.reply(Op::CreateSink)
    }

    async fn drop_view(&self, name: &ObjectName) -> Result<(), EngineError> {
        self.round_trip().await;
        let mut st = self.lock();
        st.enter(Op::DropView)?;
        if !st.views.contains_key(name) {
            return Err(EngineError::NotFound {
                object: name.to_string(),
            });
        }
        if let Some(sink) = st.sinks.values().find(|s| &s.from == name) {
            return Err(EngineError::Statement {
                error: format!("cannot drop {name}: still depended upon by sink {}", sink.name),
            });
        }
        st.views.remove(name);
        drop(st);
        self.changed.notify_waiters();
        self.lock().reply(Op::DropView)
    }

    async fn drop_sink(&self, name: &ObjectName) -> Result<(), EngineError> {
        self.round_trip().await;
        let mut st = self.lock();
        st.enter(Op::DropSink)?;
        match st.sinks.remove(name) {
            Some(_) => st.reply(Op::DropSink),
            None => Err(EngineError::NotFound {
                object: name.to_string(),
            }),
        }
    }

    async fn tail_first(&self, view: &ObjectName) -> Result<TriggerMessage, EngineError> {
        self.round_trip().await;
        self.lock().enter(Op::TailFirst)?;
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            {
                let st = self.lock();
                let Some(v) = st.views.get(view) else {
                    return Err(EngineError::NotFound {
                        object: view.to_string(),
                    });
                };
                if let Some(row) = v.rows.first() {
                    return Ok(row.clone());
                }
            }
            changed.await;
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{TriggerChannel, TriggerSource};
    use crate::engine::SinkTarget;
    use crate::listener::{Selectors, build_spec};
    use uuid::Uuid;

    const TOPIC: &str = "triggers";

    fn setup() -> (MemoryEngine, MemoryTopic) {
        let engine = MemoryEngine::default();
        let topic = MemoryTopic::new();
        engine.attach_topic(TOPIC, topic.clone());
        (engine, topic)
    }

    fn target() -> SinkTarget {
        SinkTarget {
            broker: "redpanda:29092".into(),
            topic: TOPIC.into(),
        }
    }

    fn spec(since: i64) -> crate::listener::ListenerSpec {
        build_spec(Selectors {
            resource_id: Uuid::from_u128(1),
            lead_id: Uuid::from_u128(2),
            types: vec!["tg_start".into()],
            since,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_sink_publishes_matches_in_envelope() {
        let (engine, topic) = setup();
        let spec = spec(10);
        let wf = Uuid::from_u128(99);
        let source = ObjectName::default_source();
        engine
            .create_view(&ViewDefinition::for_listener(&spec, &source, wf))
            .await
            .unwrap();
        engine
            .create_sink(&SinkDefinition::for_listener(&spec, &target()))
            .await
            .unwrap();

        engine.append(LogRecord::inbound(
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            "tg_send_text",
            "ignored",
            11,
        ));
        engine.append(LogRecord::inbound(
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            "tg_start",
            "hello",
            11,
        ));

        let mut sub = topic.subscribe(0).unwrap();
        let delivery = sub.recv().await.unwrap();
        let msg = TriggerMessage::decode(&delivery.payload).unwrap();
        assert_eq!(&msg.view_name, spec.view_name());
        assert_eq!(&msg.sink_name, spec.sink_name());
        assert_eq!(msg.workflow_id, wf);
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.match_timestamp, 11);
        assert_eq!(topic.published(), 1);
    }

    #[tokio::test]
    async fn test_history_is_replayed_on_create() {
        let (engine, topic) = setup();
        engine.append(LogRecord::inbound(
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            "tg_start",
            "early",
            20,
        ));
        let spec = spec(10);
        let source = ObjectName::default_source();
        engine
            .create_view(&ViewDefinition::for_listener(&spec, &source, Uuid::nil()))
            .await
            .unwrap();
        assert_eq!(engine.rows(spec.view_name()).unwrap().len(), 1);
        engine
            .create_sink(&SinkDefinition::for_listener(&spec, &target()))
            .await
            .unwrap();
        assert_eq!(topic.published(), 1);
    }

    #[tokio::test]
    async fn test_catalog_rules() {
        let (engine, _topic) = setup();
        let spec = spec(0);
        let source = ObjectName::default_source();
        let view = ViewDefinition::for_listener(&spec, &source, Uuid::nil());
        let sink = SinkDefinition::for_listener(&spec, &target());

        engine.create_view(&view).await.unwrap();
        assert!(matches!(
            engine.create_view(&view).await,
            Err(EngineError::AlreadyExists { .. })
        ));
        engine.create_sink(&sink).await.unwrap();
        assert!(matches!(
            engine.drop_view(spec.view_name()).await,
            Err(EngineError::Statement { .. })
        ));
        engine.drop_sink(spec.sink_name()).await.unwrap();
        engine.drop_view(spec.view_name()).await.unwrap();
        assert!(
            engine
                .drop_view(spec.view_name())
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            engine
                .drop_sink(spec.sink_name())
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert_eq!(engine.calls(Op::DropView), 3);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let (engine, _topic) = setup();
        engine.fail_every(Op::CreateView, 2);
        engine.fail_next(
            Op::DropSink,
            EngineError::Pool {
                error: "down".into(),
            },
        );
        let source = ObjectName::default_source();

        let a = spec(0);
        let b = spec(0);
        assert!(engine
            .create_view(&ViewDefinition::for_listener(&a, &source, Uuid::nil()))
            .await
            .is_ok());
        assert!(engine
            .create_view(&ViewDefinition::for_listener(&b, &source, Uuid::nil()))
            .await
            .is_err());
        assert!(!engine.has_view(b.view_name()));

        let err = engine.drop_sink(a.sink_name()).await.unwrap_err();
        assert_eq!(err.as_label(), "engine_pool");
        assert!(engine.drop_sink(a.sink_name()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_lost_reply_still_applies() {
        let (engine, _topic) = setup();
        let spec = spec(0);
        engine.lose_reply(
            Op::CreateView,
            EngineError::Timeout {
                timeout: Duration::from_secs(1),
            },
        );
        let err = engine
            .create_view(&ViewDefinition::for_listener(&spec, &ObjectName::default_source(), Uuid::nil()))
            .await
            .unwrap_err();
        assert!(err.is_indeterminate());
        assert!(engine.has_view(spec.view_name()));
    }

    #[tokio::test]
    async fn test_tail_waits_for_first_match() {
        let engine = std::sync::Arc::new(MemoryEngine::default());
        let spec = spec(10);
        engine
            .create_view(&ViewDefinition::for_listener(&spec, &ObjectName::default_source(), Uuid::nil()))
            .await
            .unwrap();

        let tail = tokio::spawn({
            let engine = engine.clone();
            let view = spec.view_name().clone();
            async move { engine.tail_first(&view).await }
        });
        tokio::task::yield_now().await;
        assert!(!tail.is_finished());

        for body in ["first", "second"] {
            engine.append(LogRecord::inbound(
                Uuid::from_u128(1),
                Uuid::from_u128(2),
                "tg_start",
                body,
                11,
            ));
        }
        let msg = tail.await.unwrap().unwrap();
        assert_eq!(msg.body, "first");
        assert_eq!(&msg.view_name, spec.view_name());
    }

    #[tokio::test]
    async fn test_tail_ends_when_view_is_dropped() {
        let engine = std::sync::Arc::new(MemoryEngine::default());
        let spec = spec(10);
        engine
            .create_view(&ViewDefinition::for_listener(&spec, &ObjectName::default_source(), Uuid::nil()))
            .await
            .unwrap();
        let tail = tokio::spawn({
            let engine = engine.clone();
            let view = spec.view_name().clone();
            async move { engine.tail_first(&view).await }
        });
        tokio::task::yield_now().await;
        engine.drop_view(spec.view_name()).await.unwrap();
        assert!(tail.await.unwrap().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_source_is_not_found() {
        let (engine, _topic) = setup();
        let other = ObjectName::parse("other_source").unwrap();
        let err = engine
            .create_view(&ViewDefinition::for_listener(&spec(0), &other, Uuid::nil()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
