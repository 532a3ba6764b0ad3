//! Typed values carried by decoded nodes.

use std::net::IpAddr;

/// A single decoded value (field or compound).
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Compound nodes and zero-length flags carry no value of their own.
    None,
    Unsigned(u32),
    Bytes(Vec<u8>),
    Text(String),
    Ether([u8; 6]),
    Ip(IpAddr),
    AddressMask { address: IpAddr, mask: IpAddr },
    PortRange { start: u16, end: u16 },
    Vendor { id: u32, data: Vec<u8> },
}

impl DecodedValue {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            DecodedValue::Unsigned(x) => Some(*x),
            DecodedValue::Vendor { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DecodedValue::Bytes(b) => Some(b),
            DecodedValue::Vendor { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            DecodedValue::Ip(a) => Some(*a),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DecodedValue::None)
    }
}
