use tokio::sync::broadcast;
use tracing::warn;

use crate::event::Event;

/// Bounded capacity for the broadcast channel; beyond this, slow
/// subscribers start missing events rather than blocking publishers.
const BROADCAST_CAPACITY: usize = 256;

/// Single-process pub/sub primitive fanning lifecycle events out to
/// WebSocket subscribers.
pub struct BroadcastHub {
    tx: broadcast::Sender<Event>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// A new subscriber joins the fan-out. The returned receiver observes
    /// every event published after this call, in publish order.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Fan an event out to every live subscriber. Never blocks; with no
    /// subscribers the event is simply dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain a subscriber's receiver into a callback, logging (once) when the
/// subscriber lagged and events were dropped rather than silently losing
/// the gap. Callers typically run this inside a `tokio::select!` loop
/// alongside other connection I/O rather than calling it directly.
pub async fn recv_or_log_lag(rx: &mut broadcast::Receiver<Event>) -> Option<Event> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "subscriber lagged behind broadcast hub, resuming from next event");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = BroadcastHub::new();
        let mut rx = hub.subscribe();
        hub.publish(Event::HeartbeatTick { projects_checked: 3 });
        let event = recv_or_log_lag(&mut rx).await.unwrap();
        match event {
            Event::HeartbeatTick { projects_checked } => assert_eq!(projects_checked, 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let hub = BroadcastHub::new();
        hub.publish(Event::HeartbeatTick { projects_checked: 0 });
    }

    #[tokio::test]
    async fn multiple_subscribers_each_see_every_event() {
        let hub = BroadcastHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        hub.publish(Event::HeartbeatSkipped {
            job: "tick".into(),
            reason: "tick_in_progress".into(),
        });
        assert!(recv_or_log_lag(&mut a).await.is_some());
        assert!(recv_or_log_lag(&mut b).await.is_some());
    }
}
