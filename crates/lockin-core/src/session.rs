//! Command session - the single entry point for talking to an instrument.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::events::{SessionEvent, SessionObserver, TracingObserver};
use crate::protocol::{
    CR, CanonicalOverload, CanonicalStatus, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, LF,
    LockinModel, ResourceId, decode_overload, decode_status,
};
use crate::transport::{
    EthernetTransport, LockinTransport, SerialTransport, TransportError, TransportKind,
    UsbTransport,
};

/// Which physical link to open, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Usb {
        model: LockinModel,
        serial_number: String,
    },
    Ethernet {
        address: String,
    },
    Gpib {
        address: String,
    },
    Serial {
        port: String,
        baud_rate: u32,
    },
}

/// Configuration for a command session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Deadline for one command exchange, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause between GPIB status polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Commands sent once right after opening.
    #[serde(default)]
    pub startup_commands: Vec<String>,
    pub transport: TransportConfig,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl SessionConfig {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            startup_commands: Vec::new(),
            transport,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Open the transport described by `config`.
pub fn open_transport(config: &SessionConfig) -> Result<Box<dyn LockinTransport>, TransportError> {
    let transport: Box<dyn LockinTransport> = match &config.transport {
        TransportConfig::Usb {
            model,
            serial_number,
        } => Box::new(UsbTransport::open(model.as_str(), serial_number)?),
        TransportConfig::Ethernet { address } => {
            Box::new(EthernetTransport::open(address, config.timeout())?)
        }
        TransportConfig::Gpib { address } => open_gpib(address, config)?,
        TransportConfig::Serial { port, baud_rate } => {
            Box::new(SerialTransport::open(port, *baud_rate)?)
        }
    };
    Ok(transport)
}

#[cfg(feature = "visa")]
fn open_gpib(
    address: &str,
    config: &SessionConfig,
) -> Result<Box<dyn LockinTransport>, TransportError> {
    let gpib = crate::transport::GpibTransport::open(address)?
        .with_poll_interval(config.poll_interval());
    Ok(Box::new(gpib))
}

#[cfg(not(feature = "visa"))]
fn open_gpib(
    address: &str,
    _config: &SessionConfig,
) -> Result<Box<dyn LockinTransport>, TransportError> {
    Err(TransportError::Unsupported(format!(
        "{} needs a GPIB bus driver; rebuild with --features visa",
        ResourceId::gpib(address)
    )))
}

/// Decoded reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub response: String,
    /// Status byte as the transport produced it.
    pub raw_status: u8,
    pub status: CanonicalStatus,
    /// USB only.
    pub overload: Option<CanonicalOverload>,
}

/// One open transport plus the observer that presents its traffic.
///
/// Callers must serialize their own use; nothing here is shared.
pub struct CommandSession<O: SessionObserver = TracingObserver> {
    transport: Box<dyn LockinTransport>,
    observer: Arc<O>,
    timeout: Duration,
}

impl CommandSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: Box<dyn LockinTransport>) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver))
    }

    /// Open the configured transport and wrap it in a session.
    pub fn open(config: &SessionConfig) -> Result<Self, TransportError> {
        let transport = open_transport(config)?;
        Ok(Self::new(transport).with_timeout(config.timeout()))
    }
}

impl<O: SessionObserver> CommandSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(transport: Box<dyn LockinTransport>, observer: Arc<O>) -> Self {
        observer.on_event(&SessionEvent::Connected {
            kind: transport.kind(),
            resource: transport.resource().to_string(),
        });
        Self {
            transport,
            observer,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn resource(&self) -> &ResourceId {
        self.transport.resource()
    }

    /// Send one command and decode the reply.
    ///
    /// Transport errors are returned unchanged; there is no retry.
    #[instrument(skip(self), fields(transport = %self.transport.kind()))]
    pub fn send(&mut self, command: &str) -> Result<Reply, TransportError> {
        if command.contains([CR as char, LF as char]) {
            return Err(TransportError::InvalidCommand(command.to_string()));
        }

        self.observer.on_event(&SessionEvent::CommandSent {
            command: command.to_string(),
        });

        let raw = match self.transport.query(command, self.timeout) {
            Ok(raw) => raw,
            Err(e) => {
                self.observer.on_event(&SessionEvent::CommandFailed {
                    command: command.to_string(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let reply = Reply {
            status: decode_status(raw.status),
            raw_status: raw.status,
            overload: raw.overload.map(decode_overload),
            response: raw.response,
        };

        self.observer.on_event(&SessionEvent::ReplyReceived {
            command: command.to_string(),
            response: reply.response.clone(),
            status: reply.status,
            overload: reply.overload,
        });

        Ok(reply)
    }

    /// Close the connection. Consumes the session so it can only happen once.
    pub fn close(mut self) -> Result<(), TransportError> {
        self.close_transport()
    }

    fn close_transport(&mut self) -> Result<(), TransportError> {
        if self.transport.is_closed() {
            return Ok(());
        }
        let result = self.transport.close();
        self.observer.on_event(&SessionEvent::Closed {
            resource: self.transport.resource().to_string(),
        });
        result
    }
}

impl<O: SessionObserver> Drop for CommandSession<O> {
    fn drop(&mut self) {
        if let Err(e) = self.close_transport() {
            warn!(error = %e, "Close on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::transport::{MockLink, UsbTransport};

    fn usb_session(mock: &MockLink) -> CommandSession<RecordingObserver> {
        let usb = UsbTransport::new(mock.clone(), ResourceId::usb(LockinModel::Model7230, "1"));
        CommandSession::with_observer(Box::new(usb), Arc::new(RecordingObserver::default()))
            .with_timeout(Duration::from_millis(50))
    }

    fn ethernet_session(mock: &MockLink) -> CommandSession<RecordingObserver> {
        let eth = EthernetTransport::new(mock.clone(), ResourceId::ethernet("10.0.0.2"));
        CommandSession::with_observer(Box::new(eth), Arc::new(RecordingObserver::default()))
            .with_timeout(Duration::from_millis(50))
    }

    #[test]
    fn test_usb_end_to_end() {
        let mock = MockLink::new();
        mock.queue_frame(b"OK\nA\r\0");
        let mut session = usb_session(&mock);

        let reply = session.send("VER").unwrap();
        assert_eq!(reply.response, "OK");
        assert_eq!(reply.raw_status, 65);
        // 0x41 & 0x8F: bit 6 is dropped, Command Done remains.
        assert_eq!(reply.status.bits(), 0x01);
        assert!(reply.status.command_done());
        assert!(!reply.status.data_available());
        assert_eq!(reply.overload.map(|o| o.bits()), Some(10));
    }

    #[test]
    fn test_status_masked() {
        let mock = MockLink::new();
        mock.queue_bytes(b"\r113\r");
        let mut session = ethernet_session(&mock);

        let reply = session.send("X").unwrap();
        assert_eq!(reply.raw_status, 113);
        assert_eq!(reply.status.bits(), 113 & 0x8F);
        assert_eq!(reply.overload, None);
    }

    #[test]
    fn test_rejects_terminator_in_command() {
        let mock = MockLink::new();
        let mut session = ethernet_session(&mock);

        assert!(matches!(
            session.send("VER\rST"),
            Err(TransportError::InvalidCommand(_))
        ));
        assert!(session.send("A\nB").is_err());
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_error_propagates_and_session_survives() {
        let mock = MockLink::new();
        mock.queue_frame(b"\x01");
        mock.queue_frame(b"\x00\x01\n\0");
        let mut session = usb_session(&mock);

        assert!(matches!(
            session.send("A"),
            Err(TransportError::MalformedFrame { .. })
        ));
        let reply = session.send("B").unwrap();
        assert!(reply.status.command_done());

        let events = session.observer.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["connected", "sent:A", "failed:A", "sent:B", "reply:B"]
        );
    }

    #[test]
    fn test_close_runs_once() {
        let mock = MockLink::new();
        let session = usb_session(&mock);
        session.close().unwrap();
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_drop_closes() {
        let mock = MockLink::new();
        {
            let mut session = usb_session(&mock);
            assert!(session.send("X").is_err());
        }
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_close_error_reported() {
        let mock = MockLink::new();
        mock.fail_close();
        let session = usb_session(&mock);
        assert!(session.close().is_err());
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = SessionConfig::new(TransportConfig::Serial {
            port: "ASRL8".into(),
            baud_rate: 19200,
        });
        config.startup_commands = vec!["VER".into()];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockin.toml");
        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_defaults_and_model() {
        let config: SessionConfig = toml::from_str(
            r#"
            [transport]
            kind = "usb"
            model = "7124"
            serial_number = "42"
            "#,
        )
        .unwrap();
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert!(config.startup_commands.is_empty());
        assert_eq!(
            config.transport,
            TransportConfig::Usb {
                model: LockinModel::Model7124,
                serial_number: "42".into()
            }
        );
    }

    #[test]
    fn test_config_unknown_model() {
        let result: Result<SessionConfig, _> = toml::from_str(
            r#"
            [transport]
            kind = "usb"
            model = "5210"
            serial_number = "42"
            "#,
        );
        assert!(result.is_err());
    }

    #[cfg(not(feature = "visa"))]
    #[test]
    fn test_gpib_without_driver() {
        let config = SessionConfig::new(TransportConfig::Gpib {
            address: "12".into(),
        });
        assert!(matches!(
            open_transport(&config),
            Err(TransportError::Unsupported(_))
        ));
    }
}
