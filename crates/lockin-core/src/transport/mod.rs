//! Transport layer module.
//!
//! Physical links (`nusb`, `tcp`, `rs232`, `visa`, `mock`) carry raw bytes.
//! Transports (`usb`, `ethernet`, `gpib`, `serial`) add each wire's framing.

mod connection;
mod framing;

pub mod ethernet;
pub mod gpib;
pub mod mock;
pub mod nusb;
pub mod rs232;
pub mod serial;
pub mod tcp;
pub mod traits;
pub mod usb;
#[cfg(feature = "visa")]
pub mod visa;

pub use connection::Connection;
pub use ethernet::EthernetTransport;
pub use gpib::GpibTransport;
pub use mock::MockLink;
pub use self::nusb::NusbLink;
pub use rs232::SerialLink;
pub use serial::SerialTransport;
pub use tcp::TcpLink;
pub use traits::{
    Deadline, GpibLink, Link, LockinTransport, RawReply, TransportError, TransportKind,
};
pub use usb::{UsbTransport, split_usb_frame};
#[cfg(feature = "visa")]
pub use visa::VisaGpibLink;
