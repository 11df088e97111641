//! Serial port link (serialport crate), fixed 7E1 framing.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, instrument};

use super::traits::{Link, TransportError};
use crate::protocol::{DEFAULT_TIMEOUT, ResourceId};

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    #[instrument(level = "info", fields(resource = %resource))]
    pub fn open(resource: &ResourceId) -> Result<Self, TransportError> {
        let ResourceId::Serial { port, baud_rate } = resource else {
            return Err(TransportError::open_failed(resource, "not a serial resource"));
        };

        let port = serialport::new(port.as_str(), *baud_rate)
            .data_bits(DataBits::Seven)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(DEFAULT_TIMEOUT)
            .open()
            .map_err(|e| TransportError::open_failed(resource, e))?;

        port.clear(ClearBuffer::All)
            .map_err(|e| TransportError::open_failed(resource, e))?;

        info!(baud_rate, "Serial port opened (7E1)");
        Ok(Self { port })
    }
}

impl Link for SerialLink {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.port
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        Ok(data.len())
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut buf = vec![0u8; max_len];
        let n = self
            .port
            .read(&mut buf)
            .map_err(|e| TransportError::from_read(e, timeout))?;
        buf.truncate(n);
        Ok(buf)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        debug!("Flushing serial port");
        self.port.flush()?;
        Ok(())
    }
}
