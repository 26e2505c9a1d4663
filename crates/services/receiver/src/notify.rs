//! Outbound status notifications.
//!
//! Every lifecycle transition is announced on a broadcast channel so host
//! applications can observe the session without being part of it. Delivery
//! is best-effort: a hub with no subscribers (or a lagging subscriber)
//! never blocks or fails a transition.

use serde::Serialize;
use tokio::sync::broadcast;

/// Lifecycle events announced to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    Connect,
    ConnectionClosed,
    ConnectionReset,
    ConnectionTeardown,
    MainLoopStarted,
    MainLoopStopped,
    VideoSizeChanged,
    Stopped,
}

impl StatusEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusEvent::Connect => "connect",
            StatusEvent::ConnectionClosed => "connection closed",
            StatusEvent::ConnectionReset => "connection reset",
            StatusEvent::ConnectionTeardown => "connection teardown",
            StatusEvent::MainLoopStarted => "main loop started",
            StatusEvent::MainLoopStopped => "main loop stopped",
            StatusEvent::VideoSizeChanged => "video size changed",
            StatusEvent::Stopped => "stopped",
        }
    }
}

/// One notification: the event plus free-form detail text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNotification {
    pub event: StatusEvent,
    pub detail: String,
}

/// Broadcast hub for status notifications.
#[derive(Debug, Clone)]
pub struct StatusHub {
    tx: broadcast::Sender<StatusNotification>,
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(64)
    }
}

impl StatusHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusNotification> {
        self.tx.subscribe()
    }

    /// Emit a notification. Never blocks; send errors (no subscribers) are
    /// ignored.
    pub fn emit(&self, event: StatusEvent, detail: impl Into<String>) {
        let notification = StatusNotification {
            event,
            detail: detail.into(),
        };
        tracing::debug!(event = event.as_str(), detail = %notification.detail, "status");
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_all_subscribers() {
        let hub = StatusHub::new(8);
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        hub.emit(StatusEvent::Connect, "");

        assert_eq!(rx1.try_recv().unwrap().event, StatusEvent::Connect);
        assert_eq!(rx2.try_recv().unwrap().event, StatusEvent::Connect);
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let hub = StatusHub::new(8);
        hub.emit(StatusEvent::Stopped, "done");
    }

    #[test]
    fn event_names() {
        assert_eq!(StatusEvent::MainLoopStarted.as_str(), "main loop started");
        assert_eq!(StatusEvent::Stopped.as_str(), "stopped");
    }

    #[test]
    fn notifications_serialize_for_external_consumers() {
        let notification = StatusNotification {
            event: StatusEvent::ConnectionReset,
            detail: "timeouts=5".to_string(),
        };
        let json = serde_json::to_string(&notification).unwrap();
        assert_eq!(json, r#"{"event":"connection_reset","detail":"timeouts=5"}"#);
    }
}
