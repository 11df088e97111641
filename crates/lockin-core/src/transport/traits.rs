//! Transport layer abstraction.
//!
//! Two seams live here:
//! - [`Link`] / [`GpibLink`]: raw byte I/O on one physical connection
//!   (nusb, TCP socket, serial port, VISA, mock).
//! - [`LockinTransport`]: the framing contract every transport implements
//!   on top of a link ("send command, get response, get status").

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::protocol::ResourceId;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Unsupported lock-in model: {0}")]
    UnsupportedModel(String),

    #[error("Device not found: {resource}")]
    DeviceNotFound { resource: String },

    #[error("Failed to open {resource}: {message}")]
    OpenFailed { resource: String, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Malformed frame: {len} bytes, need at least {min}")]
    MalformedFrame { len: usize, min: usize },

    #[error("Invalid status encoding: {0:?}")]
    InvalidStatusEncoding(String),

    #[error("Command contains a line terminator: {0:?}")]
    InvalidCommand(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Instrument unresponsive after {timeout_ms}ms waiting for {waiting_for}")]
    Unresponsive {
        waiting_for: &'static str,
        timeout_ms: u64,
    },

    #[error("Connection already closed")]
    Closed,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub(crate) fn open_failed(resource: &ResourceId, err: impl fmt::Display) -> Self {
        TransportError::OpenFailed {
            resource: resource.to_string(),
            message: err.to_string(),
        }
    }

    /// Map an I/O error from a blocking read, keeping timeouts distinguishable.
    pub(crate) fn from_read(err: std::io::Error, timeout: Duration) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
            }
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => TransportError::Disconnected,
            _ => TransportError::ReadFailed(err.to_string()),
        }
    }
}

/// Raw byte I/O on one physical connection.
///
/// This trait enables:
/// - Production implementations (nusb, TCP, serialport, VISA)
/// - Mock implementation for unit testing the framing rules
pub trait Link: Send {
    /// Write raw bytes, no terminator added.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read one frame (or whatever is available), at most `max_len` bytes.
    ///
    /// Returns [`TransportError::Timeout`] when nothing arrives in `timeout`.
    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Read exactly one byte.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, TransportError> {
        let bytes = self.read(1, timeout)?;
        bytes
            .first()
            .copied()
            .ok_or_else(|| TransportError::ReadFailed("Empty read".into()))
    }

    /// Shutdown notification before the handle is released.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// GPIB links also expose the bus status register.
pub trait GpibLink: Link {
    /// Serial-poll the status register (not a data read), bounded by `timeout`.
    fn read_status_byte(&mut self, timeout: Duration) -> Result<u8, TransportError>;
}

/// Physical link type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Usb,
    Ethernet,
    Gpib,
    Serial,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Usb => write!(f, "USB"),
            TransportKind::Ethernet => write!(f, "Ethernet"),
            TransportKind::Gpib => write!(f, "GPIB"),
            TransportKind::Serial => write!(f, "RS232"),
        }
    }
}

/// De-framed reply, before status decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReply {
    pub response: String,
    pub status: u8,
    /// Only USB carries an overload byte.
    pub overload: Option<u8>,
}

/// Framing contract shared by the four transports.
pub trait LockinTransport: Send {
    fn kind(&self) -> TransportKind;

    fn resource(&self) -> &ResourceId;

    /// Send one command and collect the reply.
    ///
    /// `timeout` bounds the whole exchange, including any status follow-up.
    fn query(&mut self, command: &str, timeout: Duration) -> Result<RawReply, TransportError>;

    /// Release the connection. Runs the link shutdown once; later calls are no-ops.
    fn close(&mut self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

/// Time budget for one exchange.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_expired(&self) -> bool {
        self.start.elapsed() >= self.budget
    }

    /// Time left, or `Unresponsive` once the budget is spent.
    pub fn remaining(&self, waiting_for: &'static str) -> Result<Duration, TransportError> {
        self.budget
            .checked_sub(self.start.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| self.unresponsive(waiting_for))
    }

    pub fn unresponsive(&self, waiting_for: &'static str) -> TransportError {
        TransportError::Unresponsive {
            waiting_for,
            timeout_ms: self.budget.as_millis() as u64,
        }
    }
}
