//! Event system for UI decoupling.
//!
//! Decoding stays pure; whoever drives a session decides how to present what
//! happened by plugging in a [`SessionObserver`].

use crate::protocol::{CanonicalOverload, CanonicalStatus};
use crate::transport::TransportKind;

/// Events emitted by a command session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Transport opened and attached to a session.
    Connected {
        kind: TransportKind,
        resource: String,
    },
    /// Command handed to the transport.
    CommandSent { command: String },
    /// Reply decoded.
    ReplyReceived {
        command: String,
        response: String,
        status: CanonicalStatus,
        overload: Option<CanonicalOverload>,
    },
    /// Command failed; the session stays usable.
    CommandFailed { command: String, message: String },
    /// Connection released.
    Closed { resource: String },
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait SessionObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SessionEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Connected { kind, resource } => {
                tracing::info!(transport = %kind, resource = %resource, "Connected");
            }
            SessionEvent::CommandSent { command } => {
                tracing::info!(command = %command, "Send query command");
            }
            SessionEvent::ReplyReceived {
                command,
                response,
                status,
                overload,
            } => {
                tracing::debug!(
                    command = %command,
                    response = %response,
                    status = ?status,
                    overload = ?overload,
                    "Reply received"
                );
            }
            SessionEvent::CommandFailed { command, message } => {
                tracing::error!(command = %command, "Command failed: {}", message);
            }
            SessionEvent::Closed { resource } => {
                tracing::info!(resource = %resource, "Close connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records event names, used by session and terminal tests too.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub events: Mutex<Vec<String>>,
    }

    impl SessionObserver for RecordingObserver {
        fn on_event(&self, event: &SessionEvent) {
            let name = match event {
                SessionEvent::Connected { .. } => "connected".to_string(),
                SessionEvent::CommandSent { command } => format!("sent:{command}"),
                SessionEvent::ReplyReceived { command, .. } => format!("reply:{command}"),
                SessionEvent::CommandFailed { command, .. } => format!("failed:{command}"),
                SessionEvent::Closed { .. } => "closed".to_string(),
            };
            self.events.lock().unwrap().push(name);
        }
    }

    #[test]
    fn test_recording_observer() {
        let obs = RecordingObserver::default();
        obs.on_event(&SessionEvent::CommandSent {
            command: "VER".into(),
        });
        NullObserver.on_event(&SessionEvent::Closed {
            resource: "x".into(),
        });
        assert_eq!(*obs.events.lock().unwrap(), vec!["sent:VER"]);
    }
}

#[cfg(test)]
pub(crate) use tests::RecordingObserver;
