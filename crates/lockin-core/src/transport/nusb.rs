//! nusb-based raw bulk link.

use std::io::{Read, Write};
use std::time::Duration;

use nusb::transfer::{Bulk, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{Link, TransportError};
use crate::protocol::ResourceId;

/// Raw bulk USB link to one lock-in.
pub struct NusbLink {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
}

impl NusbLink {
    /// Open the device matching a USB resource (vendor, product and serial number).
    #[instrument(level = "info", fields(resource = %resource))]
    pub fn open(resource: &ResourceId) -> Result<Self, TransportError> {
        let ResourceId::Usb {
            vendor_id,
            product_id,
            serial_number,
        } = resource
        else {
            return Err(TransportError::open_failed(resource, "not a USB resource"));
        };

        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::open_failed(resource, e))?
            .find(|d| {
                d.vendor_id() == *vendor_id
                    && d.product_id() == *product_id
                    && d.serial_number() == Some(serial_number.as_str())
            })
            .ok_or_else(|| TransportError::DeviceNotFound {
                resource: resource.to_string(),
            })?;

        info!(
            vendor_id = %format!("{:04X}", vendor_id),
            product_id = %format!("{:04X}", product_id),
            serial = %serial_number,
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::open_failed(resource, e))?;

        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| TransportError::open_failed(resource, e))?;

        // Find BULK endpoints
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() == 0 {
                    for alt in iface.alt_settings() {
                        for ep in alt.endpoints() {
                            if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                                if ep.direction() == nusb::transfer::Direction::In {
                                    in_endpoint = ep.address();
                                } else {
                                    out_endpoint = ep.address();
                                }
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "Out".into(),
            });
        }

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
        })
    }
}

impl Link for NusbLink {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let mut writer = ep.writer(4096);
        writer
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(skip(self), fields(max_len))]
    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut reader = ep.reader(4096);
        reader.set_read_timeout(timeout);
        let mut buf = vec![0u8; max_len];

        let n = reader
            .read(&mut buf)
            .map_err(|e| TransportError::from_read(e, timeout))?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // Interface is released on drop.
        debug!("Releasing USB interface");
        Ok(())
    }
}
