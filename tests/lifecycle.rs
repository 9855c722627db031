use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use listenvisor::{
    Bus, EventKind, LogRecord, MemoryEngine, MemoryTopic, ObjectName, Registrar, Selectors,
    SinkTarget, TeardownCoordinator, TeardownOutcome, TriggerChannel,
    TriggerConsumer, TriggerMessage, TriggerSource, build_spec,
};

const T0: i64 = 1_700_000_000;

fn setup() -> (Arc<MemoryEngine>, MemoryTopic, Registrar) {
    let engine = Arc::new(MemoryEngine::default());
    let topic = MemoryTopic::new();
    engine.attach_topic("triggers", topic.clone());
    let registrar = Registrar::new(
        engine.clone(),
        ObjectName::default_source(),
        SinkTarget {
            broker: "redpanda:29092".into(),
            topic: "triggers".into(),
        },
    );
    (engine, topic, registrar)
}

#[tokio::test]
async fn matching_record_fires_once_and_teardown_removes_listener() {
    let (engine, topic, registrar) = setup();
    let (r1, l1) = (Uuid::from_u128(1), Uuid::from_u128(2));
    let spec = build_spec(Selectors {
        resource_id: r1,
        lead_id: l1,
        types: vec!["tg_start".into()],
        since: T0,
    })
    .unwrap();
    let listener = registrar.register(spec.clone()).await.unwrap();

    engine.append(LogRecord::inbound(r1, l1, "tg_send_text", "wrong type", T0 + 1));
    engine.append(LogRecord::inbound(r1, l1, "tg_start", "too old", T0 - 1));
    engine.append(LogRecord::inbound(r1, Uuid::from_u128(3), "tg_start", "other lead", T0 + 1));
    assert_eq!(topic.published(), 0);

    engine.append(LogRecord::inbound(r1, l1, "tg_start", "hello", T0 + 1));
    assert_eq!(topic.published(), 1);

    let mut peek = topic.subscribe(0).unwrap();
    let delivery = peek.recv().await.unwrap();
    drop(peek);
    let msg = TriggerMessage::decode(&delivery.payload).unwrap();
    assert_eq!(&msg.view_name, spec.view_name());
    assert_eq!(&msg.sink_name, spec.sink_name());
    assert_eq!(msg.workflow_id, listener.workflow_id);
    assert_eq!(msg.body, "hello");
    assert_eq!(msg.match_timestamp, T0 + 1);

    // Deliver it, then redeliver it.
    topic.publish(delivery.payload.clone());
    topic.publish(delivery.payload);
    topic.close();

    let bus = Bus::new(64);
    let mut rx = bus.subscribe();
    let consumer = TriggerConsumer::new(topic.clone(), engine.clone(), bus, 1);
    let progress = consumer.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(progress.succeeded, 1);
    assert_eq!(progress.failed(), 0);
    assert!(!engine.has_view(spec.view_name()));
    assert!(!engine.has_sink(spec.sink_name()));
    assert_eq!(topic.committed(), 2);

    let mut torn_down = 0;
    let mut duplicates = 0;
    while let Ok(ev) = rx.try_recv() {
        match ev.kind {
            EventKind::ListenerTornDown => torn_down += 1,
            EventKind::DuplicateTrigger => duplicates += 1,
            _ => {}
        }
    }
    assert_eq!((torn_down, duplicates), (1, 1));
}

#[tokio::test]
async fn register_then_teardown_by_own_names_leaves_nothing() {
    let (engine, _topic, registrar) = setup();
    let specs: Vec<_> = (0..20u128)
        .map(|i| {
            build_spec(Selectors {
                resource_id: Uuid::from_u128(i),
                lead_id: Uuid::from_u128(i + 100),
                types: vec!["tg_send_text".into(), "tg_start".into()],
                since: T0,
            })
            .unwrap()
        })
        .collect();

    let mut listeners = Vec::new();
    for spec in specs {
        listeners.push(registrar.register(spec).await.unwrap());
    }
    assert_eq!(engine.view_count(), 20);
    assert_eq!(engine.sink_count(), 20);

    let teardown = TeardownCoordinator::new(engine.clone());
    for l in &listeners {
        let outcome = teardown
            .teardown(l.spec.view_name(), l.spec.sink_name())
            .await
            .unwrap();
        assert_eq!(outcome, TeardownOutcome::TornDown);
    }
    assert_eq!(engine.view_count(), 0);
    assert_eq!(engine.sink_count(), 0);

    for l in &listeners {
        let again = teardown.teardown(l.spec.view_name(), l.spec.sink_name()).await;
        assert_eq!(again, Ok(TeardownOutcome::AlreadyAbsent));
    }
}

#[tokio::test]
async fn envelope_without_row_never_reaches_teardown() {
    let (engine, topic, registrar) = setup();
    let spec = build_spec(Selectors {
        resource_id: Uuid::from_u128(1),
        lead_id: Uuid::from_u128(2),
        types: vec!["tg_start".into()],
        since: T0,
    })
    .unwrap();
    registrar.register(spec.clone()).await.unwrap();

    topic.publish(br#"{"before":null,"after":null}"#.to_vec());
    topic.publish(br#"{"after":{}}"#.to_vec());
    topic.close();

    let consumer = TriggerConsumer::new(topic.clone(), engine.clone(), Bus::new(64), 2);
    let progress = consumer.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(progress.attempted, 0);
    assert_eq!(engine.calls(listenvisor::engine::Op::DropSink), 0);
    assert_eq!(engine.calls(listenvisor::engine::Op::DropView), 0);
    assert!(engine.has_view(spec.view_name()));
    assert_eq!(topic.committed(), 2);
}
