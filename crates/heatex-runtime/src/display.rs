//! Display sinks.
//!
//! The dashboard hands every frame to a [`DisplaySink`].  The production
//! sink, [`BusDisplaySink`], publishes frames on the
//! [`EventBus`][heatex_middleware::EventBus] where the cockpit and the
//! terminal pick them up.

use heatex_middleware::EventBus;
use heatex_types::{DisplayUpdate, Event, EventPayload, ReconnectStatus};
use tracing::trace;

/// Source label for events published by the dashboard.
pub const DASHBOARD_SOURCE: &str = "heatex-runtime::dashboard";

/// A rendering surface.  Called from the dashboard loop; must not block.
pub trait DisplaySink: Send + Sync {
    /// A new reading was committed or the status label changed.
    fn render(&self, update: &DisplayUpdate);

    /// The realtime channel changed state.
    fn channel_changed(&self, _status: &ReconnectStatus) {}
}

/// Publishes frames on the event bus.
#[derive(Clone)]
pub struct BusDisplaySink {
    bus: EventBus,
}

impl BusDisplaySink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl DisplaySink for BusDisplaySink {
    fn render(&self, update: &DisplayUpdate) {
        let delivered = self
            .bus
            .publish(Event::new(DASHBOARD_SOURCE, EventPayload::Display(update.clone())));
        trace!(delivered, "display update published");
    }

    fn channel_changed(&self, status: &ReconnectStatus) {
        self.bus
            .publish(Event::new(DASHBOARD_SOURCE, EventPayload::Channel(status.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatex_middleware::Topic;
    use heatex_types::{ChannelState, DataSourceMode, Reading};

    #[tokio::test]
    async fn bus_sink_publishes_display_and_channel_events() {
        let bus = EventBus::default();
        let mut display = bus.subscribe_to(Topic::Display);
        let mut channel = bus.subscribe_to(Topic::Channel);
        let sink = BusDisplaySink::new(bus.clone());

        sink.render(&DisplayUpdate {
            reading: Reading::BASELINE,
            efficiency: 86.7,
            history: vec![],
            status: "Mode: Simulator Only".into(),
        });
        sink.channel_changed(&ReconnectStatus {
            mode: DataSourceMode::RealtimeChannel,
            attempt_count: 1,
            max_attempts: 5,
            has_pending_retry: true,
            channel_state: ChannelState::AwaitingRetry,
        });

        let event = display.recv().await.unwrap();
        assert_eq!(event.source, DASHBOARD_SOURCE);
        assert!(matches!(event.payload, EventPayload::Display(ref u) if u.status == "Mode: Simulator Only"));

        let event = channel.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::Channel(ref s) if s.attempt_count == 1));
    }

    #[test]
    fn publishing_without_listeners_is_silent() {
        let sink = BusDisplaySink::new(EventBus::default());
        sink.render(&DisplayUpdate {
            reading: Reading::BASELINE,
            efficiency: 0.0,
            history: vec![],
            status: String::new(),
        });
    }
}
