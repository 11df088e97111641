//! Raw TCP socket link.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::traits::{Link, TransportError};
use crate::protocol::ResourceId;

pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    #[instrument(level = "info", fields(resource = %resource))]
    pub fn connect(resource: &ResourceId, timeout: Duration) -> Result<Self, TransportError> {
        let ResourceId::Ethernet { address, port } = resource else {
            return Err(TransportError::open_failed(resource, "not an Ethernet resource"));
        };

        let addr: SocketAddr = (address.as_str(), *port)
            .to_socket_addrs()
            .map_err(|e| TransportError::open_failed(resource, e))?
            .next()
            .ok_or_else(|| TransportError::DeviceNotFound {
                resource: resource.to_string(),
            })?;

        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| TransportError::open_failed(resource, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::open_failed(resource, e))?;

        info!(peer = %addr, "Socket connected");
        Ok(Self { stream })
    }
}

impl Link for TcpLink {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.stream
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.stream.set_read_timeout(Some(timeout))?;

        let mut buf = vec![0u8; max_len];
        let n = self
            .stream
            .read(&mut buf)
            .map_err(|e| TransportError::from_read(e, timeout))?;
        if n == 0 && max_len > 0 {
            return Err(TransportError::Disconnected);
        }
        buf.truncate(n);
        Ok(buf)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.shutdown(Shutdown::Both) {
            // Peer already gone.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(TransportError::from),
        }
    }
}
