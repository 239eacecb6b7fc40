//! Fan-out of kiosk events to screens, the console and tests.
//!
//! One [`tokio::sync::broadcast`] channel per [`Topic`]; a slow observer
//! lags and loses old events but never holds up the runtime. Screens, the
//! REPL and tests subscribe. Only the runtime side publishes.
//!
//! | Lane | Carries |
//! |---|---|
//! | [`Topic::Connection`] | Connection status changes |
//! | [`Topic::Controller`] | Decoded controller notifications, relay commands sent |
//! | [`Topic::Order`] | Order phase changes and countdowns |
//! | [`Topic::Notices`] | One toast-style notice per success or failure |

use kiosk_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::trace;

/// Events buffered per lane before the oldest are overwritten.
const LANE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `ConnectionChanged` events.
    Connection,
    /// Traffic to and from the relay controller.
    Controller,
    /// Order state machine progress.
    Order,
    /// User-facing notices.
    Notices,
}

impl Topic {
    /// The lane a payload belongs on.
    pub fn for_payload(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::ConnectionChanged { .. } => Topic::Connection,
            EventPayload::Controller(_) | EventPayload::CommandSent(_) => Topic::Controller,
            EventPayload::OrderChanged { .. } | EventPayload::Countdown { .. } => Topic::Order,
            EventPayload::Notice(_) => Topic::Notices,
        }
    }
}

/// Handle to the four lanes. Clones publish into and subscribe from the
/// same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    connection: broadcast::Sender<Event>,
    controller: broadcast::Sender<Event>,
    order: broadcast::Sender<Event>,
    notices: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is per lane.
    pub fn new(capacity: usize) -> Self {
        let (connection, _) = broadcast::channel(capacity);
        let (controller, _) = broadcast::channel(capacity);
        let (order, _) = broadcast::channel(capacity);
        let (notices, _) = broadcast::channel(capacity);
        Self {
            connection,
            controller,
            order,
            notices,
        }
    }

    /// Returns how many subscribers got `event`; `0` when nobody listens,
    /// which is not an error.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(_) => {
                trace!(?topic, "no subscribers");
                0
            }
        }
    }

    /// Wrap `payload` in an [`Event`] and publish it on its natural topic.
    pub fn emit(&self, source: &str, payload: EventPayload) -> usize {
        let topic = Topic::for_payload(&payload);
        self.publish_to(topic, Event::new(source, payload))
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Connection => &self.connection,
            Topic::Controller => &self.controller,
            Topic::Order => &self.order,
            Topic::Notices => &self.notices,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(LANE_CAPACITY)
    }
}

/// Subscription to one lane, from [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Next event on the lane. `Lagged(n)` means `n` events were lost to a
    /// full buffer; `Closed` means every publisher is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking poll, for draining in tests and the REPL.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_types::{ConnectionStatus, Notice, NotificationEvent, TransportKind};

    fn connected() -> EventPayload {
        EventPayload::ConnectionChanged {
            status: ConnectionStatus::Connected,
            transport: TransportKind::Sim,
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut screen = bus.subscribe_to(Topic::Connection);
        let mut console = bus.subscribe_to(Topic::Connection);

        let event = Event::new("kiosk-middleware::test", connected());
        assert_eq!(bus.publish_to(Topic::Connection, event.clone()), 2);

        assert_eq!(screen.recv().await?.id, event.id);
        assert_eq!(console.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.emit("test", connected()), 0);
    }

    #[test]
    fn emit_routes_by_payload() {
        let bus = EventBus::default();
        let mut notices = bus.subscribe_to(Topic::Notices);
        let mut controller = bus.subscribe_to(Topic::Controller);

        bus.emit("test", EventPayload::Notice(Notice::info("Hi", "there")));
        bus.emit(
            "test",
            EventPayload::Controller(NotificationEvent::LimitSwitchPressed),
        );

        assert!(matches!(
            notices.try_recv().map(|e| e.payload),
            Ok(EventPayload::Notice(_))
        ));
        assert!(notices.try_recv().is_err());
        assert!(matches!(
            controller.try_recv().map(|e| e.payload),
            Ok(EventPayload::Controller(NotificationEvent::LimitSwitchPressed))
        ));
    }

    #[tokio::test]
    async fn slow_screen_lags_instead_of_blocking() {
        let bus = EventBus::new(16);
        let mut screen = bus.subscribe_to(Topic::Order);

        for seconds in 0..1_000 {
            bus.emit(
                "flood",
                EventPayload::Countdown {
                    label: "dispense".into(),
                    seconds,
                },
            );
        }

        let result = screen.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
