//! Per-delivery handling: decode, tear down, decide whether to commit.

use std::sync::Arc;

use crate::channel::Delivery;
use crate::error::{DecodeError, TeardownError};
use crate::events::{Bus, Event, EventKind};
use crate::listener::TriggerMessage;
use crate::progress::ProgressCounter;
use crate::teardown::{TeardownCoordinator, TeardownOutcome};

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The listener was removed.
    TornDown,
    /// The listener was already gone.
    Duplicate,
    /// The payload was not a trigger message; it is dropped.
    Skipped(DecodeError),
    /// Teardown failed; the delivery stays uncommitted.
    Failed(TeardownError),
}

impl Handled {
    /// True if the delivery is done with and its offset may advance.
    pub fn should_commit(&self) -> bool {
        !matches!(self, Handled::Failed(_))
    }
}

pub(crate) struct TriggerHandler {
    teardown: TeardownCoordinator,
    tally: Arc<ProgressCounter>,
    bus: Bus,
}

impl TriggerHandler {
    pub(crate) fn new(teardown: TeardownCoordinator, tally: Arc<ProgressCounter>, bus: Bus) -> Self {
        Self {
            teardown,
            tally,
            bus,
        }
    }

    pub(crate) async fn handle(&self, worker: &str, delivery: &Delivery) -> Handled {
        let msg = match TriggerMessage::decode(&delivery.payload) {
            Ok(msg) => msg,
            Err(err) => {
                self.bus.publish(
                    Event::new(EventKind::TriggerDecodeFailed)
                        .with_worker(worker)
                        .with_label(err.as_label())
                        .with_reason(format!(
                            "{err} ({}/{}@{})",
                            delivery.topic, delivery.partition, delivery.offset
                        )),
                );
                return Handled::Skipped(err);
            }
        };

        let event = |kind| {
            Event::new(kind)
                .with_worker(worker)
                .with_view(&msg.view_name)
                .with_sink(&msg.sink_name)
                .with_workflow(msg.workflow_id)
        };
        self.bus.publish(event(EventKind::TriggerReceived));

        match self.teardown.teardown(&msg.view_name, &msg.sink_name).await {
            Ok(TeardownOutcome::TornDown) => {
                self.tally.increment();
                self.bus.publish(event(EventKind::ListenerTornDown));
                Handled::TornDown
            }
            Ok(TeardownOutcome::AlreadyAbsent) => {
                self.bus.publish(event(EventKind::DuplicateTrigger));
                Handled::Duplicate
            }
            Err(err) => {
                self.tally.record_failure();
                self.bus.publish(
                    event(EventKind::TeardownFailed)
                        .with_label(err.as_label())
                        .with_reason(err.to_string()),
                );
                Handled::Failed(err)
            }
        }
    }
}
