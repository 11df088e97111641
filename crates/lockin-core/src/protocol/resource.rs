//! Instrument models and resource identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::constants::*;
use crate::transport::TransportError;

/// Lock-in models reachable over raw USB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LockinModel {
    Model7270,
    Model7230,
    Model7124,
}

impl LockinModel {
    pub const fn product_id(self) -> u16 {
        match self {
            LockinModel::Model7270 => MODEL_7270_PRODUCT_ID,
            LockinModel::Model7230 => MODEL_7230_PRODUCT_ID,
            LockinModel::Model7124 => MODEL_7124_PRODUCT_ID,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LockinModel::Model7270 => "7270",
            LockinModel::Model7230 => "7230",
            LockinModel::Model7124 => "7124",
        }
    }
}

impl FromStr for LockinModel {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7270" => Ok(LockinModel::Model7270),
            "7230" => Ok(LockinModel::Model7230),
            "7124" => Ok(LockinModel::Model7124),
            other => Err(TransportError::UnsupportedModel(other.to_string())),
        }
    }
}

impl TryFrom<String> for LockinModel {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LockinModel> for String {
    fn from(model: LockinModel) -> Self {
        model.as_str().to_string()
    }
}

impl fmt::Display for LockinModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the physical resource behind a connection.
///
/// `Display` renders the VISA-style resource string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceId {
    Usb {
        vendor_id: u16,
        product_id: u16,
        serial_number: String,
    },
    Ethernet {
        address: String,
        port: u16,
    },
    Gpib {
        address: String,
    },
    Serial {
        port: String,
        baud_rate: u32,
    },
}

impl ResourceId {
    pub fn usb(model: LockinModel, serial_number: impl Into<String>) -> Self {
        ResourceId::Usb {
            vendor_id: LOCKIN_VENDOR_ID,
            product_id: model.product_id(),
            serial_number: serial_number.into(),
        }
    }

    pub fn ethernet(address: impl Into<String>) -> Self {
        ResourceId::Ethernet {
            address: address.into(),
            port: ETHERNET_PORT,
        }
    }

    pub fn gpib(address: impl Into<String>) -> Self {
        ResourceId::Gpib {
            address: address.into(),
        }
    }

    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        ResourceId::Serial {
            port: port.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Usb {
                vendor_id,
                product_id,
                serial_number,
            } => write!(
                f,
                "USB0::{:#06X}::{:#06X}::{}::RAW",
                vendor_id, product_id, serial_number
            ),
            ResourceId::Ethernet { address, port } => {
                write!(f, "TCPIP0::{}::{}::SOCKET", address, port)
            }
            ResourceId::Gpib { address } => write!(f, "GPIB0::{}::INSTR", address),
            ResourceId::Serial { port, .. } => f.write_str(port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_table() {
        assert_eq!("7270".parse::<LockinModel>().unwrap().product_id(), 0x001B);
        assert_eq!("7230".parse::<LockinModel>().unwrap().product_id(), 0x0027);
        assert_eq!("7124".parse::<LockinModel>().unwrap().product_id(), 0x0018);
    }

    #[test]
    fn test_unknown_model() {
        let err = "7265".parse::<LockinModel>().unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedModel(m) if m == "7265"));
    }

    #[test]
    fn test_resource_strings() {
        let usb = ResourceId::usb(LockinModel::Model7270, "12345678");
        assert_eq!(usb.to_string(), "USB0::0x0A2D::0x001B::12345678::RAW");
        assert_eq!(
            ResourceId::ethernet("192.168.0.10").to_string(),
            "TCPIP0::192.168.0.10::50001::SOCKET"
        );
        assert_eq!(ResourceId::gpib("12").to_string(), "GPIB0::12::INSTR");
        assert_eq!(ResourceId::serial("ASRL8", 19200).to_string(), "ASRL8");
    }
}
