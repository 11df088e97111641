//! Byte-level helpers shared by the transports.

use tracing::trace;

use super::traits::{Deadline, Link, TransportError};
use crate::protocol::{CR, LF};

/// Read one byte at a time until `is_terminator` matches.
///
/// Returns the accumulated bytes (terminator excluded) and the terminator.
pub(crate) fn read_until<L, F>(
    link: &mut L,
    deadline: &Deadline,
    waiting_for: &'static str,
    is_terminator: F,
) -> Result<(Vec<u8>, u8), TransportError>
where
    L: Link + ?Sized,
    F: Fn(u8) -> bool,
{
    let mut buf = Vec::new();
    loop {
        let byte = read_byte(link, deadline, waiting_for)?;
        if is_terminator(byte) {
            trace!(len = buf.len(), terminator = byte, "Terminator received");
            return Ok((buf, byte));
        }
        buf.push(byte);
    }
}

/// Single byte read bounded by the exchange deadline.
pub(crate) fn read_byte<L>(
    link: &mut L,
    deadline: &Deadline,
    waiting_for: &'static str,
) -> Result<u8, TransportError>
where
    L: Link + ?Sized,
{
    let remaining = deadline.remaining(waiting_for)?;
    match link.read_byte(remaining) {
        Err(TransportError::Timeout { .. }) => Err(deadline.unresponsive(waiting_for)),
        other => other,
    }
}

/// Decode reply bytes and drop any CR/LF.
pub(crate) fn strip_line_breaks(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c != CR as char && c != LF as char)
        .collect()
}

/// Parse a decimal status reply (`ST` response) into a raw status byte.
pub(crate) fn parse_status_text(text: &str) -> Result<u8, TransportError> {
    text.trim()
        .parse::<u8>()
        .map_err(|_| TransportError::InvalidStatusEncoding(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockLink;
    use std::time::Duration;

    #[test]
    fn test_read_until_excludes_terminator() {
        let mut mock = MockLink::new();
        mock.queue_bytes(b"1.5\rX");
        let deadline = Deadline::after(Duration::from_millis(100));

        let (buf, term) = read_until(&mut mock, &deadline, "CR", |b| b == CR).unwrap();
        assert_eq!(buf, b"1.5");
        assert_eq!(term, CR);
        assert_eq!(mock.pending_bytes(), 1);
    }

    #[test]
    fn test_read_until_starved() {
        let mut mock = MockLink::new();
        mock.queue_bytes(b"partial");
        let deadline = Deadline::after(Duration::from_millis(100));

        let err = read_until(&mut mock, &deadline, "CR", |b| b == CR).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unresponsive {
                waiting_for: "CR",
                ..
            }
        ));
    }

    #[test]
    fn test_strip_line_breaks() {
        assert_eq!(strip_line_breaks(b"\n1.0\r\n2.0\r"), "1.02.0");
        assert_eq!(strip_line_breaks(b""), "");
    }

    #[test]
    fn test_parse_status_text() {
        assert_eq!(parse_status_text("9").unwrap(), 9);
        assert_eq!(parse_status_text(" 129 ").unwrap(), 129);
        assert!(matches!(
            parse_status_text("ERR"),
            Err(TransportError::InvalidStatusEncoding(s)) if s == "ERR"
        ));
        assert!(parse_status_text("").is_err());
        assert!(parse_status_text("300").is_err());
    }
}
