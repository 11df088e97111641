//! Raw TCP socket framing.
//!
//! Commands are CR-terminated. The reply is read byte by byte up to CR, then
//! status is fetched with a second `ST` exchange framed the same way.

use std::time::Duration;

use tracing::{debug, info, instrument, trace};

use super::connection::Connection;
use super::framing::{parse_status_text, read_until, strip_line_breaks};
use super::tcp::TcpLink;
use super::traits::{Deadline, Link, LockinTransport, RawReply, TransportError, TransportKind};
use crate::protocol::{CR, ResourceId, STATUS_QUERY};

pub struct EthernetTransport<L: Link = TcpLink> {
    conn: Connection<L>,
}

impl EthernetTransport<TcpLink> {
    /// Connect to `<address>:50001`.
    #[instrument(level = "info")]
    pub fn open(address: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let resource = ResourceId::ethernet(address);
        info!(resource = %resource, "Open connection via Ethernet");
        let link = TcpLink::connect(&resource, connect_timeout)?;
        Ok(Self::new(link, resource))
    }
}

impl<L: Link> EthernetTransport<L> {
    pub fn new(link: L, resource: ResourceId) -> Self {
        Self {
            conn: Connection::new(link, resource),
        }
    }

    /// Write `text` + CR, then collect bytes up to the next CR.
    fn exchange(
        link: &mut L,
        text: &str,
        deadline: &Deadline,
        waiting_for: &'static str,
    ) -> Result<Vec<u8>, TransportError> {
        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(CR);
        link.write(&frame)?;

        let (bytes, _) = read_until(link, deadline, waiting_for, |b| b == CR)?;
        trace!(text, len = bytes.len(), "Exchange complete");
        Ok(bytes)
    }
}

impl<L: Link> LockinTransport for EthernetTransport<L> {
    fn kind(&self) -> TransportKind {
        TransportKind::Ethernet
    }

    fn resource(&self) -> &ResourceId {
        self.conn.resource()
    }

    fn query(&mut self, command: &str, timeout: Duration) -> Result<RawReply, TransportError> {
        let deadline = Deadline::after(timeout);
        let link = self.conn.link()?;

        let response = Self::exchange(link, command, &deadline, "response CR")?;
        let status_text = Self::exchange(link, STATUS_QUERY, &deadline, "status CR")?;
        let status = parse_status_text(&String::from_utf8_lossy(&status_text))?;

        debug!(command, status, "Ethernet reply");

        Ok(RawReply {
            response: strip_line_breaks(&response),
            status,
            overload: None,
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.conn.close()
    }

    fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}
