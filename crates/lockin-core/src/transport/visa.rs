//! VISA-backed GPIB bus link (feature `visa`).

use std::ffi::CString;
use std::io::{Read, Write};
use std::time::Duration;

use tracing::{debug, info, instrument};
use visa_rs::prelude::*;

use super::traits::{GpibLink, Link, TransportError};
use crate::protocol::ResourceId;

pub struct VisaGpibLink {
    // Keeps the VISA session alive for the lifetime of the instrument handle.
    _rm: DefaultRM,
    instrument: Instrument,
}

impl VisaGpibLink {
    #[instrument(level = "info", fields(resource = %resource))]
    pub fn open(resource: &ResourceId) -> Result<Self, TransportError> {
        let rm = DefaultRM::new().map_err(|e| TransportError::open_failed(resource, e))?;
        let c_string = CString::new(resource.to_string())
            .map_err(|e| TransportError::open_failed(resource, e))?;
        let visa_string = visa_rs::VisaString::from(c_string);
        let instrument = rm
            .open(&visa_string, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
            .map_err(|e| TransportError::open_failed(resource, e))?;

        info!("VISA session opened");
        Ok(Self {
            _rm: rm,
            instrument,
        })
    }

    /// Bound the next VISA call by the time left in the exchange.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1);
        self.instrument
            .set_timeout(ms)
            .map_err(|e| TransportError::ReadFailed(format!("Failed to set VISA timeout: {e}")))
    }
}

impl Link for VisaGpibLink {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.instrument
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.set_timeout(timeout)?;
        let mut buf = vec![0u8; max_len];
        let n = self
            .instrument
            .read(&mut buf)
            .map_err(|e| TransportError::from_read(e, timeout))?;
        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Session is closed when the handle drops.
        debug!("Closing VISA session");
        Ok(())
    }
}

impl GpibLink for VisaGpibLink {
    fn read_status_byte(&mut self, timeout: Duration) -> Result<u8, TransportError> {
        self.set_timeout(timeout)?;
        let stb = self
            .instrument
            .read_stb()
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        Ok(stb as u8)
    }
}
