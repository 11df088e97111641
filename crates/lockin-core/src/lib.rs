//! Lockin-Core: command/response protocol layer for lock-in amplifiers.
//!
//! One logical operation ("send command, get response, get status") over four
//! wires that frame it differently: raw bulk USB, raw TCP socket, GPIB and
//! echoing RS232.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, status/overload decoding, resource identifiers
//! - **Transport**: Raw byte links (nusb, TCP, serialport, VISA, mock) and the
//!   per-wire framing built on them
//! - **Events**: Observer pattern for presentation
//! - **Session**: Single entry point, configuration
//! - **Terminal**: Interactive command loop
//!
//! # Example
//!
//! ```no_run
//! use lockin_core::session::{CommandSession, SessionConfig, TransportConfig};
//!
//! let config = SessionConfig::new(TransportConfig::Serial {
//!     port: "/dev/ttyUSB0".to_string(),
//!     baud_rate: 19200,
//! });
//!
//! let mut session = CommandSession::open(&config).expect("open failed");
//! let reply = session.send("VER").expect("VER failed");
//! println!("{} ({:?})", reply.response, reply.status);
//! session.close().expect("close failed");
//! ```

pub mod events;
pub mod protocol;
pub mod session;
pub mod terminal;
pub mod transport;

// Re-exports for convenience
pub use events::{NullObserver, SessionEvent, SessionObserver, TracingObserver};
pub use protocol::{
    CanonicalOverload, CanonicalStatus, LockinModel, OverloadFlag, ResourceId, StatusFlag,
    decode_overload, decode_status,
};
pub use session::{CommandSession, Reply, SessionConfig, TransportConfig, open_transport};
pub use terminal::{TerminalSummary, run_terminal, write_reply};
pub use transport::{
    EthernetTransport, GpibTransport, LockinTransport, MockLink, RawReply, SerialTransport,
    TransportError, TransportKind, UsbTransport,
};
