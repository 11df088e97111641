//! Mock link for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{GpibLink, Link, TransportError};

/// Mock link for unit testing the framing rules.
///
/// Clones share state, so a test can keep a handle after moving one clone
/// into a transport.
#[derive(Clone)]
pub struct MockLink {
    /// Queued inbound frames.
    rx_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Bytes echoed back from writes, served before `rx_queue`.
    echo_queue: Arc<Mutex<VecDeque<u8>>>,
    echo: Arc<Mutex<bool>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Scripted status register values.
    stb_queue: Arc<Mutex<VecDeque<u8>>>,
    /// Returned once `stb_queue` runs dry.
    idle_stb: Arc<Mutex<u8>>,
    stb_polls: Arc<Mutex<usize>>,
    /// Timeout handed to every read and status poll.
    timeouts: Arc<Mutex<Vec<Duration>>>,
    /// Whether the link is "connected".
    connected: Arc<Mutex<bool>>,
    close_count: Arc<Mutex<usize>>,
    close_fails: Arc<Mutex<bool>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            echo_queue: Arc::new(Mutex::new(VecDeque::new())),
            echo: Arc::new(Mutex::new(false)),
            write_log: Arc::new(Mutex::new(Vec::new())),
            stb_queue: Arc::new(Mutex::new(VecDeque::new())),
            idle_stb: Arc::new(Mutex::new(0)),
            stb_polls: Arc::new(Mutex::new(0)),
            timeouts: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
            close_count: Arc::new(Mutex::new(0)),
            close_fails: Arc::new(Mutex::new(false)),
        }
    }

    /// Queue one inbound frame.
    pub fn queue_frame(&self, frame: &[u8]) {
        self.rx_queue.lock().unwrap().push_back(frame.to_vec());
    }

    /// Queue inbound bytes (byte-wise reads split frames as needed).
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.queue_frame(bytes);
    }

    /// Echo every written byte back, like a half-duplex RS232 link.
    pub fn set_echo(&self, enabled: bool) {
        *self.echo.lock().unwrap() = enabled;
    }

    /// Queue status register values for successive polls.
    pub fn queue_status(&self, values: &[u8]) {
        self.stb_queue.lock().unwrap().extend(values.iter().copied());
    }

    /// Status register value once the scripted ones are used up.
    pub fn set_idle_status(&self, value: u8) {
        *self.idle_stb.lock().unwrap() = value;
    }

    pub fn status_polls(&self) -> usize {
        *self.stb_polls.lock().unwrap()
    }

    /// Timeouts passed to `read` and `read_status_byte`, in call order.
    pub fn timeouts_seen(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }

    /// Inbound bytes not yet consumed.
    pub fn pending_bytes(&self) -> usize {
        self.rx_queue.lock().unwrap().iter().map(Vec::len).sum()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// All writes joined into one byte string.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.write_log.lock().unwrap().concat()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Make the next close report a failure.
    pub fn fail_close(&self) {
        *self.close_fails.lock().unwrap() = true;
    }

    pub fn close_count(&self) -> usize {
        *self.close_count.lock().unwrap()
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if *self.connected.lock().unwrap() {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Link for MockLink {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.check_connected()?;
        self.write_log.lock().unwrap().push(data.to_vec());
        if *self.echo.lock().unwrap() {
            self.echo_queue.lock().unwrap().extend(data.iter().copied());
        }
        Ok(data.len())
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.check_connected()?;
        self.timeouts.lock().unwrap().push(timeout);

        let mut echo = self.echo_queue.lock().unwrap();
        if !echo.is_empty() {
            let n = max_len.min(echo.len());
            return Ok(echo.drain(..n).collect());
        }
        drop(echo);

        let mut rx = self.rx_queue.lock().unwrap();
        let mut frame = rx.pop_front().ok_or(TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })?;
        if frame.len() > max_len {
            let rest = frame.split_off(max_len);
            rx.push_front(rest);
        }
        Ok(frame)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        *self.close_count.lock().unwrap() += 1;
        *self.connected.lock().unwrap() = false;
        if *self.close_fails.lock().unwrap() {
            return Err(TransportError::WriteFailed("close notification failed".into()));
        }
        Ok(())
    }
}

impl GpibLink for MockLink {
    fn read_status_byte(&mut self, timeout: Duration) -> Result<u8, TransportError> {
        self.check_connected()?;
        self.timeouts.lock().unwrap().push(timeout);
        *self.stb_polls.lock().unwrap() += 1;
        let idle = *self.idle_stb.lock().unwrap();
        Ok(self.stb_queue.lock().unwrap().pop_front().unwrap_or(idle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_mock_frame_queue() {
        let mut mock = MockLink::new();
        mock.queue_frame(b"ABC");
        mock.queue_frame(b"D");

        assert_eq!(mock.read(2, T).unwrap(), b"AB");
        assert_eq!(mock.read(64, T).unwrap(), b"C");
        assert_eq!(mock.read_byte(T).unwrap(), b'D');

        // Queue is empty now
        assert!(matches!(
            mock.read(1, T),
            Err(TransportError::Timeout { timeout_ms: 10 })
        ));
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockLink::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(mock.written_bytes(), b"HelloWorld");
    }

    #[test]
    fn test_mock_echo_first() {
        let mut mock = MockLink::new();
        mock.set_echo(true);
        mock.queue_bytes(b"R");
        mock.write(b"V").unwrap();

        assert_eq!(mock.read_byte(T).unwrap(), b'V');
        assert_eq!(mock.read_byte(T).unwrap(), b'R');
    }

    #[test]
    fn test_mock_status_register() {
        let mut mock = MockLink::new();
        mock.queue_status(&[0x00, 0x81]);
        mock.set_idle_status(0x01);

        assert_eq!(mock.read_status_byte(T).unwrap(), 0x00);
        assert_eq!(mock.read_status_byte(T).unwrap(), 0x81);
        assert_eq!(mock.read_status_byte(T).unwrap(), 0x01);
        assert_eq!(mock.status_polls(), 3);
        assert_eq!(mock.timeouts_seen(), vec![T; 3]);
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockLink::new();
        mock.disconnect();
        assert!(matches!(mock.write(b"test"), Err(TransportError::Disconnected)));
        assert!(mock.read_status_byte(T).is_err());
    }
}
