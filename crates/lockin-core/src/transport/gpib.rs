//! GPIB framing.
//!
//! Commands go out without a terminator. Completion is signalled through the
//! bus status register: bit 7 means a reply is waiting on the data line, bit 0
//! means the command finished. Both are polled with a bounded deadline.

use std::thread;
use std::time::Duration;

use tracing::{debug, trace};
#[cfg(feature = "visa")]
use tracing::{info, instrument};

use super::connection::Connection;
use super::framing::strip_line_breaks;
use super::traits::{Deadline, GpibLink, LockinTransport, RawReply, TransportError, TransportKind};
use crate::protocol::{
    DEFAULT_POLL_INTERVAL, MAX_FRAME_SIZE, ResourceId, STB_COMMAND_DONE, STB_DATA_AVAILABLE,
};

#[cfg(feature = "visa")]
use super::visa::VisaGpibLink;

pub struct GpibTransport<L: GpibLink> {
    conn: Connection<L>,
    poll_interval: Duration,
}

#[cfg(feature = "visa")]
impl GpibTransport<VisaGpibLink> {
    /// Open `GPIB0::<address>::INSTR` through the VISA runtime.
    #[instrument(level = "info")]
    pub fn open(address: &str) -> Result<Self, TransportError> {
        let resource = ResourceId::gpib(address);
        info!(resource = %resource, "Open connection via GPIB");
        let link = VisaGpibLink::open(&resource)?;
        Ok(Self::new(link, resource))
    }
}

impl<L: GpibLink> GpibTransport<L> {
    pub fn new(link: L, resource: ResourceId) -> Self {
        Self {
            conn: Connection::new(link, resource),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll the status register until any bit of `mask` is set.
    fn poll_until(
        link: &mut L,
        mask: u8,
        poll_interval: Duration,
        deadline: &Deadline,
        waiting_for: &'static str,
    ) -> Result<u8, TransportError> {
        let mut polls = 0u64;
        loop {
            let stb = link.read_status_byte(deadline.remaining(waiting_for)?)?;
            polls += 1;
            if stb & mask != 0 {
                trace!(stb = %format!("0x{:02X}", stb), polls, waiting_for, "Status bit set");
                return Ok(stb);
            }
            if deadline.is_expired() {
                return Err(deadline.unresponsive(waiting_for));
            }
            if !poll_interval.is_zero() {
                thread::sleep(poll_interval);
            }
        }
    }
}

impl<L: GpibLink> LockinTransport for GpibTransport<L> {
    fn kind(&self) -> TransportKind {
        TransportKind::Gpib
    }

    fn resource(&self) -> &ResourceId {
        self.conn.resource()
    }

    fn query(&mut self, command: &str, timeout: Duration) -> Result<RawReply, TransportError> {
        let deadline = Deadline::after(timeout);
        let poll_interval = self.poll_interval;
        let link = self.conn.link()?;

        link.write(command.as_bytes())?;

        let mut stb = Self::poll_until(
            link,
            STB_DATA_AVAILABLE | STB_COMMAND_DONE,
            poll_interval,
            &deadline,
            "data available or command done",
        )?;

        let mut response = String::new();
        if stb & STB_DATA_AVAILABLE != 0 {
            let remaining = deadline.remaining("GPIB data")?;
            let mut data = match link.read(MAX_FRAME_SIZE, remaining) {
                Err(TransportError::Timeout { .. }) => {
                    return Err(deadline.unresponsive("GPIB data"));
                }
                other => other?,
            };
            if data.ends_with(b"\r\n") {
                data.truncate(data.len() - 2);
            }
            response = strip_line_breaks(&data);

            // Data ready does not imply command done.
            if stb & STB_COMMAND_DONE == 0 {
                stb = Self::poll_until(
                    link,
                    STB_COMMAND_DONE,
                    poll_interval,
                    &deadline,
                    "command done",
                )?;
            }
        }

        debug!(command, stb = %format!("0x{:02X}", stb), "GPIB reply");

        Ok(RawReply {
            response,
            status: stb,
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
