//! Value decoders: one pure function per decode kind.
//!
//! Each decoder gets exactly the value bytes of one TLV and never looks past
//! them. A payload whose length breaks the kind's contract falls back to a hex
//! dump with a [`Diagnostic::LengthMismatch`] instead of failing the message.

use crate::buffer::{hex_string, uint_from_slice, Endianness};
use crate::registry::{DecodeKind, LengthRule, SymbolTable};
use crate::resolve::NameResolver;
use crate::tree::{DecodedNode, Diagnostic, NodeKind};
use crate::value::DecodedValue;
use byteorder::{BigEndian, ByteOrder};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Result of decoding one value: typed value, display text and any synthesized children.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: DecodedValue,
    pub summary: String,
    pub children: Vec<DecodedNode>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Decoded {
    fn leaf(value: DecodedValue, summary: impl Into<String>) -> Self {
        Decoded { value, summary: summary.into(), children: Vec::new(), diagnostics: Vec::new() }
    }
}

/// Decode `bytes` (located at absolute `offset`) according to `kind`.
pub fn decode_value(
    kind: DecodeKind,
    symbols: Option<&SymbolTable>,
    bytes: &[u8],
    offset: usize,
    resolver: &dyn NameResolver,
) -> Decoded {
    let rule = kind.length_rule();
    if !rule.accepts(bytes.len()) {
        return length_mismatch(kind, rule, bytes);
    }
    let empty = SymbolTable::new();
    let symbols = symbols.unwrap_or(&empty);
    match kind {
        DecodeKind::Enum8 | DecodeKind::Enum16 | DecodeKind::Enum32 => decode_enum(symbols, bytes),
        DecodeKind::BitFlags8 | DecodeKind::BitFlags16 | DecodeKind::BitFlags32 => {
            decode_bitflags(symbols, bytes, offset)
        }
        DecodeKind::Dec8 | DecodeKind::Dec16 | DecodeKind::Dec32 => {
            let v = be_uint(bytes);
            Decoded::leaf(DecodedValue::Unsigned(v), v.to_string())
        }
        DecodeKind::Hex8 | DecodeKind::Hex16 | DecodeKind::Hex32 => {
            let v = be_uint(bytes);
            Decoded::leaf(DecodedValue::Unsigned(v), format!("0x{:0w$x}", v, w = bytes.len() * 2))
        }
        DecodeKind::AsciiString => {
            let s = String::from_utf8_lossy(bytes).into_owned();
            Decoded::leaf(DecodedValue::Text(s.clone()), s)
        }
        DecodeKind::Flag0 => Decoded::leaf(DecodedValue::None, "(no value)"),
        DecodeKind::Ether => decode_ether(bytes, resolver),
        DecodeKind::Ipv4 | DecodeKind::IpAddress => {
            let addr = ip_from_slice(bytes);
            Decoded::leaf(DecodedValue::Ip(addr), format_ip(addr, resolver))
        }
        DecodeKind::IdAmbiguousByLength => decode_id(bytes, resolver),
        DecodeKind::ProtocolList => decode_protocol_list(bytes, offset),
        DecodeKind::PortRangeList => decode_port_ranges(bytes, offset),
        DecodeKind::IpAddressMaskList => decode_address_mask_list(bytes, offset, resolver),
        DecodeKind::VendorSpecific => decode_vendor(bytes, offset, resolver),
        DecodeKind::Eap => decode_eap(bytes, offset),
        DecodeKind::Compound | DecodeKind::FixedBytes => raw(bytes),
    }
}

/// Hex dump of the whole value.
pub fn raw(bytes: &[u8]) -> Decoded {
    let summary = if bytes.is_empty() { "<empty>".to_string() } else { hex_string(bytes) };
    Decoded::leaf(DecodedValue::Bytes(bytes.to_vec()), summary)
}

fn length_mismatch(kind: DecodeKind, rule: LengthRule, bytes: &[u8]) -> Decoded {
    let mut d = raw(bytes);
    d.diagnostics.push(Diagnostic::LengthMismatch { kind, expected: rule.to_string(), actual: bytes.len() });
    d
}

fn be_uint(bytes: &[u8]) -> u32 {
    uint_from_slice(bytes, Endianness::Big).unwrap_or(0)
}

fn decode_enum(symbols: &SymbolTable, bytes: &[u8]) -> Decoded {
    let v = be_uint(bytes);
    Decoded::leaf(DecodedValue::Unsigned(v), symbols.name_or_unknown(v))
}

/// One child per set bit, most significant bit first. Tables are keyed by mask.
fn decode_bitflags(symbols: &SymbolTable, bytes: &[u8], offset: usize) -> Decoded {
    let v = be_uint(bytes);
    let width = bytes.len() * 8;
    let digits = bytes.len() * 2;
    let mut children = Vec::new();
    let mut names = Vec::new();
    for bit in (0..width).rev() {
        let mask = 1u32 << bit;
        if v & mask == 0 {
            continue;
        }
        let name = symbols.get(mask).unwrap_or("Unknown");
        names.push(name.to_string());
        children.push(
            DecodedNode::new(name, offset, bytes.len(), NodeKind::Item)
                .with_summary(format!("0x{:0w$x}", mask, w = digits))
                .with_value(DecodedValue::Unsigned(mask)),
        );
    }
    let summary = if names.is_empty() {
        format!("0x{:0w$x}", v, w = digits)
    } else {
        format!("0x{:0w$x} ({})", v, names.join(", "), w = digits)
    };
    Decoded { value: DecodedValue::Unsigned(v), summary, children, diagnostics: Vec::new() }
}

pub(crate) fn format_mac(addr: &[u8; 6]) -> String {
    addr.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
}

fn decode_ether(bytes: &[u8], resolver: &dyn NameResolver) -> Decoded {
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&bytes[..6]);
    let text = match resolver.ether(&addr) {
        Some(name) => format!("{} ({})", format_mac(&addr), name),
        None => format_mac(&addr),
    };
    Decoded::leaf(DecodedValue::Ether(addr), text)
}

/// 4 bytes → IPv4, 16 bytes → IPv6. Callers guarantee one of those lengths.
fn ip_from_slice(bytes: &[u8]) -> IpAddr {
    if bytes.len() == 16 {
        let mut b = [0u8; 16];
        b.copy_from_slice(bytes);
        IpAddr::V6(Ipv6Addr::from(b))
    } else {
        IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    }
}

fn format_ip(addr: IpAddr, resolver: &dyn NameResolver) -> String {
    let name = match addr {
        IpAddr::V4(a) => resolver.ipv4(a),
        IpAddr::V6(a) => resolver.ipv6(a),
    };
    match name {
        Some(n) => format!("{} ({})", n, addr),
        None => addr.to_string(),
    }
}

/// Identifier whose meaning follows from its delivered length alone.
fn decode_id(bytes: &[u8], resolver: &dyn NameResolver) -> Decoded {
    let (mut d, resolved_as) = match bytes.len() {
        6 => (decode_ether(bytes, resolver), "Ethernet MAC"),
        16 => {
            let addr = ip_from_slice(bytes);
            (Decoded::leaf(DecodedValue::Ip(addr), format_ip(addr, resolver)), "IPv6 address")
        }
        _ => {
            let addr = ip_from_slice(bytes);
            (Decoded::leaf(DecodedValue::Ip(addr), format_ip(addr, resolver)), "IPv4 address")
        }
    };
    d.diagnostics.push(Diagnostic::AmbiguousLengthResolved { length: bytes.len(), resolved_as });
    d
}

pub(crate) fn ip_protocol_name(p: u16) -> Option<&'static str> {
    Some(match p {
        0 => "hopopt",
        1 => "icmp",
        2 => "igmp",
        4 => "ipip",
        6 => "tcp",
        17 => "udp",
        41 => "ipv6",
        47 => "gre",
        50 => "esp",
        51 => "ah",
        58 => "ipv6-icmp",
        89 => "ospf",
        132 => "sctp",
        _ => return None,
    })
}

fn decode_protocol_list(bytes: &[u8], offset: usize) -> Decoded {
    let mut children = Vec::new();
    let mut names = Vec::new();
    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let p = BigEndian::read_u16(chunk);
        let text = match ip_protocol_name(p) {
            Some(n) => format!("{} ({})", n, p),
            None => format!("Unknown ({})", p),
        };
        names.push(text.clone());
        children.push(
            DecodedNode::new("Protocol", offset + i * 2, 2, NodeKind::Item)
                .with_summary(text)
                .with_value(DecodedValue::Unsigned(p as u32)),
        );
    }
    let summary = if names.is_empty() { "<empty>".to_string() } else { names.join(", ") };
    Decoded { value: DecodedValue::None, summary, children, diagnostics: Vec::new() }
}

fn decode_port_ranges(bytes: &[u8], offset: usize) -> Decoded {
    let mut children = Vec::new();
    let mut texts = Vec::new();
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        let start = BigEndian::read_u16(&chunk[..2]);
        let end = BigEndian::read_u16(&chunk[2..]);
        let text = format!("{}-{}", start, end);
        texts.push(text.clone());
        children.push(
            DecodedNode::new("Port Range", offset + i * 4, 4, NodeKind::Item)
                .with_summary(text)
                .with_value(DecodedValue::PortRange { start, end }),
        );
    }
    let summary = if texts.is_empty() { "<empty>".to_string() } else { texts.join(", ") };
    Decoded { value: DecodedValue::None, summary, children, diagnostics: Vec::new() }
}

/// Address/mask pairs. A length divisible by 32 is read as IPv6 pairs even
/// when it would also split into IPv4 pairs.
fn decode_address_mask_list(bytes: &[u8], offset: usize, resolver: &dyn NameResolver) -> Decoded {
    if bytes.is_empty() {
        return Decoded::leaf(DecodedValue::None, "<empty>");
    }
    let (entry, label, resolved_as) = if bytes.len() % 32 == 0 {
        (32, "IPv6 Address/Mask", "IPv6 address/mask pairs")
    } else {
        (8, "IPv4 Address/Mask", "IPv4 address/mask pairs")
    };
    let half = entry / 2;
    let mut children = Vec::new();
    let mut texts = Vec::new();
    for (i, chunk) in bytes.chunks_exact(entry).enumerate() {
        let address = ip_from_slice(&chunk[..half]);
        let mask = ip_from_slice(&chunk[half..]);
        let text = format!("{}/{}", format_ip(address, resolver), mask);
        texts.push(text.clone());
        children.push(
            DecodedNode::new(label, offset + i * entry, entry, NodeKind::Item)
                .with_summary(text)
                .with_value(DecodedValue::AddressMask { address, mask }),
        );
    }
    Decoded {
        value: DecodedValue::None,
        summary: texts.join(", "),
        children,
        diagnostics: vec![Diagnostic::AmbiguousLengthResolved { length: bytes.len(), resolved_as }],
    }
}

/// 24-bit vendor id followed by opaque vendor data (no alignment inside).
fn decode_vendor(bytes: &[u8], offset: usize, resolver: &dyn NameResolver) -> Decoded {
    let id = BigEndian::read_u24(&bytes[..3]);
    let data = &bytes[3..];
    let id_text = match resolver.vendor(id) {
        Some(name) => format!("0x{:06x} ({})", id, name),
        None => format!("0x{:06x}", id),
    };
    let mut children = vec![DecodedNode::new("Vendor ID", offset, 3, NodeKind::Item)
        .with_summary(id_text.clone())
        .with_value(DecodedValue::Unsigned(id))];
    if !data.is_empty() {
        children.push(
            DecodedNode::new("Vendor Data", offset + 3, data.len(), NodeKind::Item)
                .with_summary(hex_string(data))
                .with_value(DecodedValue::Bytes(data.to_vec())),
        );
    }
    Decoded {
        value: DecodedValue::Vendor { id, data: data.to_vec() },
        summary: format!("Vendor ID {}", id_text),
        children,
        diagnostics: Vec::new(),
    }
}

fn eap_code_name(code: u8) -> &'static str {
    match code {
        1 => "Request",
        2 => "Response",
        3 => "Success",
        4 => "Failure",
        _ => "Unknown",
    }
}

fn eap_type_name(t: u8) -> &'static str {
    match t {
        1 => "Identity",
        2 => "Notification",
        3 => "Legacy Nak",
        4 => "MD5-Challenge",
        13 => "EAP-TLS",
        18 => "EAP-SIM",
        21 => "EAP-TTLS",
        23 => "EAP-AKA",
        25 => "PEAP",
        26 => "EAP-MSCHAPv2",
        _ => "Unknown",
    }
}

/// EAP header summary; the payload itself stays opaque.
fn decode_eap(bytes: &[u8], offset: usize) -> Decoded {
    let code = bytes[0];
    let identifier = bytes[1];
    let length = BigEndian::read_u16(&bytes[2..4]);
    let mut children = vec![
        DecodedNode::new("Code", offset, 1, NodeKind::Item)
            .with_summary(format!("{} ({})", eap_code_name(code), code))
            .with_value(DecodedValue::Unsigned(code as u32)),
        DecodedNode::new("Identifier", offset + 1, 1, NodeKind::Item)
            .with_summary(identifier.to_string())
            .with_value(DecodedValue::Unsigned(identifier as u32)),
        DecodedNode::new("Length", offset + 2, 2, NodeKind::Item)
            .with_summary(length.to_string())
            .with_value(DecodedValue::Unsigned(length as u32)),
    ];
    let mut summary = format!("{} (id {}, length {})", eap_code_name(code), identifier, length);
    if bytes.len() > 4 && matches!(code, 1 | 2) {
        let t = bytes[4];
        children.push(
            DecodedNode::new("Type", offset + 4, 1, NodeKind::Item)
                .with_summary(format!("{} ({})", eap_type_name(t), t))
                .with_value(DecodedValue::Unsigned(t as u32)),
        );
        summary.push_str(&format!(", {}", eap_type_name(t)));
        if bytes.len() > 5 {
            children.push(
                DecodedNode::new("Type Data", offset + 5, bytes.len() - 5, NodeKind::Item)
                    .with_summary(hex_string(&bytes[5..]))
                    .with_value(DecodedValue::Bytes(bytes[5..].to_vec())),
            );
        }
    }
    Decoded { value: DecodedValue::Bytes(bytes.to_vec()), summary, children, diagnostics: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{NoResolver, StaticResolver};

    fn dec(kind: DecodeKind, bytes: &[u8]) -> Decoded {
        decode_value(kind, None, bytes, 0, &NoResolver)
    }

    #[test]
    fn enum_unknown_value() {
        let t = SymbolTable::from_pairs([(0, "off"), (1, "on")]);
        let d = decode_value(DecodeKind::Enum16, Some(&t), &[0x00, 0x01], 0, &NoResolver);
        assert_eq!(d.summary, "on");
        let d = decode_value(DecodeKind::Enum16, Some(&t), &[0x01, 0x00], 0, &NoResolver);
        assert_eq!(d.summary, "Unknown (256)");
        assert!(d.diagnostics.is_empty());
    }

    #[test]
    fn enum_length_mismatch_falls_back_to_hex() {
        let d = dec(DecodeKind::Enum16, &[1, 2, 3]);
        assert_eq!(d.summary, "01 02 03");
        assert_eq!(d.value, DecodedValue::Bytes(vec![1, 2, 3]));
        assert!(matches!(d.diagnostics[0], Diagnostic::LengthMismatch { actual: 3, .. }));
    }

    #[test]
    fn bitflags_msb_first_with_unknown_bits() {
        let t = SymbolTable::from_pairs([(0x8000, "first"), (0x0001, "last")]);
        let d = decode_value(DecodeKind::BitFlags16, Some(&t), &[0x80, 0x03], 10, &NoResolver);
        let labels: Vec<_> = d.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["first", "Unknown", "last"]);
        assert_eq!(d.children[0].offset, 10);
        assert_eq!(d.value, DecodedValue::Unsigned(0x8003));
    }

    #[test]
    fn bitflags_zero_has_no_children() {
        let d = dec(DecodeKind::BitFlags32, &[0, 0, 0, 0]);
        assert!(d.children.is_empty());
        assert_eq!(d.summary, "0x00000000");
    }

    #[test]
    fn ascii_string_keeps_nul_and_accepts_empty() {
        assert_eq!(dec(DecodeKind::AsciiString, b"ab\0").value, DecodedValue::Text("ab\0".to_string()));
        assert_eq!(dec(DecodeKind::AsciiString, b"").summary, "");
    }

    #[test]
    fn flag0_requires_zero_length() {
        assert_eq!(dec(DecodeKind::Flag0, &[]).summary, "(no value)");
        assert!(!dec(DecodeKind::Flag0, &[1]).diagnostics.is_empty());
    }

    #[test]
    fn ether_uses_resolver() {
        let mut r = StaticResolver::default();
        r.ether.insert([0, 1, 2, 3, 4, 5], "gw".to_string());
        let d = decode_value(DecodeKind::Ether, None, &[0, 1, 2, 3, 4, 5], 0, &r);
        assert_eq!(d.summary, "00:01:02:03:04:05 (gw)");
        assert_eq!(dec(DecodeKind::Ether, &[0, 1, 2, 3, 4, 5]).summary, "00:01:02:03:04:05");
    }

    #[test]
    fn id_resolves_by_length() {
        assert_eq!(dec(DecodeKind::IdAmbiguousByLength, &[10, 0, 0, 1]).summary, "10.0.0.1");
        let mac = dec(DecodeKind::IdAmbiguousByLength, &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(mac.value, DecodedValue::Ether([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
        let mut v6 = [0u8; 16];
        v6[15] = 1;
        assert_eq!(dec(DecodeKind::IdAmbiguousByLength, &v6).summary, "::1");
        let bad = dec(DecodeKind::IdAmbiguousByLength, &[1, 2, 3, 4, 5]);
        assert!(matches!(bad.diagnostics[0], Diagnostic::LengthMismatch { .. }));
    }

    #[test]
    fn address_mask_list_prefers_ipv6_on_multiple_of_32() {
        let d = dec(DecodeKind::IpAddressMaskList, &[0u8; 64]);
        assert_eq!(d.children.len(), 2);
        assert!(d.children.iter().all(|c| c.label == "IPv6 Address/Mask"));
        let d = dec(DecodeKind::IpAddressMaskList, &[10, 0, 0, 0, 255, 0, 0, 0]);
        assert_eq!(d.children.len(), 1);
        assert_eq!(d.summary, "10.0.0.0/255.0.0.0");
        let d = dec(DecodeKind::IpAddressMaskList, &[0u8; 12]);
        assert!(matches!(d.diagnostics[0], Diagnostic::LengthMismatch { .. }));
    }

    #[test]
    fn protocol_and_port_lists() {
        let d = dec(DecodeKind::ProtocolList, &[0, 6, 0, 17]);
        assert_eq!(d.summary, "tcp (6), udp (17)");
        let d = dec(DecodeKind::PortRangeList, &[0, 80, 0x01, 0xbb]);
        assert_eq!(d.children[0].value, DecodedValue::PortRange { start: 80, end: 443 });
        assert!(!dec(DecodeKind::PortRangeList, &[0, 80]).diagnostics.is_empty());
    }

    #[test]
    fn vendor_specific_24_bit_id() {
        let d = dec(DecodeKind::VendorSpecific, &[0x00, 0x60, 0xb9, 0xde, 0xad]);
        assert_eq!(d.value, DecodedValue::Vendor { id: 0x0060b9, data: vec![0xde, 0xad] });
        assert_eq!(d.children[1].offset, 3);
        assert!(!dec(DecodeKind::VendorSpecific, &[0, 1]).diagnostics.is_empty());
        assert_eq!(dec(DecodeKind::VendorSpecific, &[0, 0, 9]).children.len(), 1);
    }

    #[test]
    fn eap_header_summary() {
        let d = dec(DecodeKind::Eap, &[1, 7, 0, 5, 1]);
        assert_eq!(d.summary, "Request (id 7, length 5), Identity");
        assert_eq!(d.children.len(), 4);
    }

    #[test]
    fn hex_and_dec() {
        assert_eq!(dec(DecodeKind::Hex16, &[0x0a, 0xbc]).summary, "0x0abc");
        assert_eq!(dec(DecodeKind::Dec32, &[0, 0, 1, 0]).summary, "256");
    }
}
