//! RS232 framing.
//!
//! The link echoes every byte, so commands go out one byte at a time with one
//! echo read after each. The reply ends with a prompt: `*` (done, no error) or
//! `?` (check status). On `?` the real status is fetched with an `ST` query
//! through the same path.

use std::time::Duration;

use tracing::{debug, info, instrument, trace};

use super::connection::Connection;
use super::framing::{parse_status_text, read_byte, read_until, strip_line_breaks};
use super::rs232::SerialLink;
use super::traits::{Deadline, Link, LockinTransport, RawReply, TransportError, TransportKind};
use crate::protocol::{
    COMMAND_TERMINATOR, PROMPT_CHECK, PROMPT_OK, ResourceId, STATUS_QUERY, STB_COMMAND_DONE,
};

pub struct SerialTransport<L: Link = SerialLink> {
    conn: Connection<L>,
}

impl SerialTransport<SerialLink> {
    /// Open `port` at `baud_rate`, 7 data bits, even parity.
    #[instrument(level = "info")]
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let resource = ResourceId::serial(port, baud_rate);
        info!(resource = %resource, baud_rate, "Open connection via RS232");
        let link = SerialLink::open(&resource)?;
        Ok(Self::new(link, resource))
    }
}

impl<L: Link> SerialTransport<L> {
    pub fn new(link: L, resource: ResourceId) -> Self {
        Self {
            conn: Connection::new(link, resource),
        }
    }

    fn exchange(
        link: &mut L,
        command: &str,
        deadline: &Deadline,
    ) -> Result<RawReply, TransportError> {
        for &byte in command.as_bytes() {
            link.write(&[byte])?;
            // Handshake: any byte back counts as the echo.
            let echo = read_byte(link, deadline, "echo")?;
            trace!(sent = byte, echo, "Echo");
        }
        link.write(&[COMMAND_TERMINATOR])?;

        let (bytes, prompt) = read_until(link, deadline, "prompt", |b| {
            b == PROMPT_CHECK || b == PROMPT_OK
        })?;
        let response = strip_line_breaks(&bytes);

        // The status query itself never recurses, so its own `?` reads as done.
        let status = if prompt == PROMPT_CHECK && command != STATUS_QUERY {
            let reply = Self::exchange(link, STATUS_QUERY, deadline)?;
            parse_status_text(&reply.response)?
        } else {
            STB_COMMAND_DONE
        };

        debug!(command, prompt = %(prompt as char), status, "RS232 reply");

        Ok(RawReply {
            response,
            status,
            overload: None,
        })
    }
}

impl<L: Link> LockinTransport for SerialTransport<L> {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn resource(&self) -> &ResourceId {
        self.conn.resource()
    }

    fn query(&mut self, command: &str, timeout: Duration) -> Result<RawReply, TransportError> {
        let deadline = Deadline::after(timeout);
        let link = self.conn.link()?;
        Self::exchange(link, command, &deadline)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.conn.close()
    }

    fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}
