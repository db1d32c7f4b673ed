//! Events flowing from pipelines to the emulator widget.
//!
//! Many pipelines share one channel to the GUI runtime; every event carries
//! its session id so the sink can route it to the right widget.

use tokio::sync::mpsc;

/// Payload of a pipeline event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermEventKind {
    /// Full sanitized scrollback, CRLF-normalized
    History(String),
    /// Incremental sanitized bytes for the emulator
    Data(String),
    /// The pipeline is gone; the message is user-facing
    Exit(String),
    /// Remote only: the error budget was exhausted
    ConnectionLost,
    /// Remote only: a reconnect attempt is starting
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Remote only: connectivity came back
    ConnectionRestored,
    /// Remote only: reconnection gave up
    ConnectionFailed,
}

impl TermEventKind {
    /// The event-channel topic this payload is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            TermEventKind::History(_) => "terminal:history",
            TermEventKind::Data(_) => "terminal:data",
            TermEventKind::Exit(_) => "terminal:exit",
            TermEventKind::ConnectionLost => "terminal:connection-lost",
            TermEventKind::Reconnecting { .. } => "terminal:reconnecting",
            TermEventKind::ConnectionRestored => "terminal:connection-restored",
            TermEventKind::ConnectionFailed => "terminal:connection-failed",
        }
    }
}

/// One event from one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEvent {
    /// Owning session
    pub session_id: String,
    /// Payload
    pub kind: TermEventKind,
}

/// Sending half of the shared event channel.
pub type EventSender = mpsc::UnboundedSender<TermEvent>;

/// Receiving half, owned by the GUI runtime.
pub type EventReceiver = mpsc::UnboundedReceiver<TermEvent>;

/// Create the shared event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(
            TermEventKind::History(String::new()).topic(),
            "terminal:history"
        );
        assert_eq!(TermEventKind::Data(String::new()).topic(), "terminal:data");
        assert_eq!(TermEventKind::Exit(String::new()).topic(), "terminal:exit");
        assert_eq!(
            TermEventKind::ConnectionLost.topic(),
            "terminal:connection-lost"
        );
        assert_eq!(
            TermEventKind::Reconnecting { attempt: 1 }.topic(),
            "terminal:reconnecting"
        );
        assert_eq!(
            TermEventKind::ConnectionRestored.topic(),
            "terminal:connection-restored"
        );
        assert_eq!(
            TermEventKind::ConnectionFailed.topic(),
            "terminal:connection-failed"
        );
    }

    #[tokio::test]
    async fn test_channel_carries_session_id() {
        let (tx, mut rx) = event_channel();
        tx.send(TermEvent {
            session_id: "deadbeef-1700000000".to_string(),
            kind: TermEventKind::Data("x".to_string()),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id, "deadbeef-1700000000");
    }
}
