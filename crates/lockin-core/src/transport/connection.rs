//! Exclusive ownership of one live link.

use tracing::{info, warn};

use super::traits::{Link, TransportError};
use crate::protocol::ResourceId;

/// One open link plus the resource it was opened on.
///
/// Closing takes the link out; there is no way to reopen the same value.
pub struct Connection<L: Link> {
    link: Option<L>,
    resource: ResourceId,
}

impl<L: Link> Connection<L> {
    pub fn new(link: L, resource: ResourceId) -> Self {
        Self {
            link: Some(link),
            resource,
        }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_none()
    }

    /// The live link, or `Closed`.
    pub fn link(&mut self) -> Result<&mut L, TransportError> {
        self.link.as_mut().ok_or(TransportError::Closed)
    }

    /// Run the link shutdown and drop the handle.
    ///
    /// The handle is released even when shutdown fails.
    pub fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut link) = self.link.take() else {
            return Ok(());
        };
        let result = link.close();
        drop(link);
        match &result {
            Ok(()) => info!(resource = %self.resource, "Connection closed"),
            Err(e) => warn!(resource = %self.resource, error = %e, "Close failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockLink;

    #[test]
    fn test_close_once() {
        let mock = MockLink::new();
        let mut conn = Connection::new(mock.clone(), ResourceId::gpib("1"));
        assert!(!conn.is_closed());

        conn.close().unwrap();
        conn.close().unwrap();

        assert!(conn.is_closed());
        assert_eq!(mock.close_count(), 1);
        assert!(matches!(conn.link(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_close_failure_still_releases() {
        let mock = MockLink::new();
        mock.fail_close();
        let mut conn = Connection::new(mock.clone(), ResourceId::gpib("1"));

        assert!(conn.close().is_err());
        assert!(conn.is_closed());
        assert!(conn.close().is_ok());
    }
}
