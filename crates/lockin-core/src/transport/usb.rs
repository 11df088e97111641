//! Raw-bulk USB framing.
//!
//! Commands go out as-is. Every reply ends with a four byte trailer:
//! `[overload][status][LF][NUL]`.

use std::time::Duration;

use tracing::{debug, info, instrument, trace};

use super::connection::Connection;
use super::nusb::NusbLink;
use super::traits::{Deadline, Link, LockinTransport, RawReply, TransportError, TransportKind};
use crate::protocol::{LF, LockinModel, MAX_FRAME_SIZE, ResourceId, USB_TRAILER_LEN};

/// Split a reply frame into payload, overload byte and status byte.
pub fn split_usb_frame(frame: &[u8]) -> Result<(&[u8], u8, u8), TransportError> {
    let n = frame.len();
    if n < USB_TRAILER_LEN {
        return Err(TransportError::MalformedFrame {
            len: n,
            min: USB_TRAILER_LEN,
        });
    }
    let payload = &frame[..n - USB_TRAILER_LEN];
    let overload = frame[n - 4];
    let status = frame[n - 3];
    Ok((payload, overload, status))
}

/// Collect one reply frame, which may span several bulk reads.
///
/// The frame ends on a short read or once the buffer ends in `[LF][NUL]`.
fn read_frame<L: Link>(link: &mut L, deadline: &Deadline) -> Result<Vec<u8>, TransportError> {
    let mut frame = Vec::new();
    loop {
        let remaining = deadline.remaining("USB reply frame")?;
        let chunk = match link.read(MAX_FRAME_SIZE, remaining) {
            Err(TransportError::Timeout { .. }) => {
                return Err(deadline.unresponsive("USB reply frame"));
            }
            other => other?,
        };
        let short = chunk.len() < MAX_FRAME_SIZE;
        frame.extend_from_slice(&chunk);
        if short || (frame.len() >= USB_TRAILER_LEN && frame.ends_with(&[LF, 0])) {
            return Ok(frame);
        }
        trace!(len = frame.len(), "USB reply continues");
    }
}

pub struct UsbTransport<L: Link = NusbLink> {
    conn: Connection<L>,
}

impl UsbTransport<NusbLink> {
    /// Open the lock-in identified by model and serial number.
    #[instrument(level = "info")]
    pub fn open(model: &str, serial_number: &str) -> Result<Self, TransportError> {
        let model: LockinModel = model.parse()?;
        let resource = ResourceId::usb(model, serial_number);
        info!(resource = %resource, "Open connection via USB");
        let link = NusbLink::open(&resource)?;
        Ok(Self::new(link, resource))
    }
}

impl<L: Link> UsbTransport<L> {
    pub fn new(link: L, resource: ResourceId) -> Self {
        Self {
            conn: Connection::new(link, resource),
        }
    }
}

impl<L: Link> LockinTransport for UsbTransport<L> {
    fn kind(&self) -> TransportKind {
        TransportKind::Usb
    }

    fn resource(&self) -> &ResourceId {
        self.conn.resource()
    }

    fn query(&mut self, command: &str, timeout: Duration) -> Result<RawReply, TransportError> {
        let link = self.conn.link()?;
        link.write(command.as_bytes())?;

        let frame = read_frame(link, &Deadline::after(timeout))?;
        let (payload, overload, status) = split_usb_frame(&frame)?;

        debug!(
            command,
            len = frame.len(),
            status = %format!("0x{:02X}", status),
            overload = %format!("0x{:02X}", overload),
            "USB reply"
        );

        Ok(RawReply {
            response: String::from_utf8_lossy(payload).into_owned(),
            status,
            overload: Some(overload),
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.conn.close()
    }

    fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockLink;

    const T: Duration = Duration::from_millis(50);

    fn transport(mock: &MockLink) -> UsbTransport<MockLink> {
        UsbTransport::new(mock.clone(), ResourceId::usb(LockinModel::Model7270, "16000000"))
    }

    #[test]
    fn test_split_indices() {
        let frame = [b'a', b'b', b'c', 0x05, 0x81, b'\n', 0];
        let (payload, overload, status) = split_usb_frame(&frame).unwrap();
        assert_eq!(payload, b"abc");
        assert_eq!(overload, 0x05);
        assert_eq!(status, 0x81);
    }

    #[test]
    fn test_trailer_only() {
        let (payload, overload, status) = split_usb_frame(&[0, 1, b'\n', 0]).unwrap();
        assert!(payload.is_empty());
        assert_eq!((overload, status), (0, 1));
    }

    #[test]
    fn test_short_frame() {
        let err = split_usb_frame(b"\x01\n\0").unwrap_err();
        assert!(matches!(err, TransportError::MalformedFrame { len: 3, min: 4 }));
    }

    #[test]
    fn test_query_ok_frame() {
        let mock = MockLink::new();
        mock.queue_frame(b"OK\nA\r\0");
        let mut usb = transport(&mock);

        let reply = usb.query("VER", T).unwrap();
        assert_eq!(reply.response, "OK");
        assert_eq!(reply.overload, Some(10));
        assert_eq!(reply.status, 65);
        // 0x41: bit 6 is not a status flag, only Command Done survives decoding.
        assert_eq!(crate::protocol::decode_status(reply.status).bits(), 0x01);
        // No terminator appended
        assert_eq!(mock.get_writes(), vec![b"VER".to_vec()]);
    }

    #[test]
    fn test_query_frame_longer_than_one_read() {
        let mock = MockLink::new();
        let mut frame = vec![b'7'; 5000];
        frame.extend_from_slice(&[0x00, 0x01, b'\n', 0]);
        mock.queue_frame(&frame);
        let mut usb = transport(&mock);

        let reply = usb.query("DC 0", T).unwrap();
        assert_eq!(reply.response.len(), 5000);
        assert_eq!(reply.status, 0x01);
        assert_eq!(reply.overload, Some(0x00));
        assert_eq!(mock.pending_bytes(), 0);
    }

    #[test]
    fn test_query_frame_of_exactly_one_read() {
        let mock = MockLink::new();
        let mut frame = vec![b'1'; MAX_FRAME_SIZE - USB_TRAILER_LEN];
        frame.extend_from_slice(&[0x02, 0x81, b'\n', 0]);
        mock.queue_frame(&frame);
        let mut usb = transport(&mock);

        let reply = usb.query("DC 0", T).unwrap();
        assert_eq!(reply.response.len(), MAX_FRAME_SIZE - USB_TRAILER_LEN);
        assert_eq!((reply.status, reply.overload), (0x81, Some(0x02)));
    }

    #[test]
    fn test_query_truncated_long_frame() {
        let mock = MockLink::new();
        mock.queue_frame(&vec![b'9'; MAX_FRAME_SIZE]);
        let mut usb = transport(&mock);
        assert!(matches!(
            usb.query("DC 0", T),
            Err(TransportError::Unresponsive { .. })
        ));
    }

    #[test]
    fn test_query_malformed() {
        let mock = MockLink::new();
        mock.queue_frame(b"\x01\n");
        let mut usb = transport(&mock);
        assert!(matches!(
            usb.query("X", T),
            Err(TransportError::MalformedFrame { len: 2, .. })
        ));
    }

    #[test]
    fn test_query_no_reply() {
        let mock = MockLink::new();
        let mut usb = transport(&mock);
        assert!(matches!(
            usb.query("X", T),
            Err(TransportError::Unresponsive { .. })
        ));
    }

    #[test]
    fn test_query_after_close() {
        let mock = MockLink::new();
        let mut usb = transport(&mock);
        usb.close().unwrap();
        assert!(usb.is_closed());
        assert!(matches!(usb.query("X", T), Err(TransportError::Closed)));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_open_unknown_model() {
        let err = UsbTransport::open("9999", "1").err().unwrap();
        assert!(matches!(err, TransportError::UnsupportedModel(_)));
    }
}
