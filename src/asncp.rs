//! WiMAX ASN Control Plane (R4/R6) messages.
//!
//! A message is a fixed 20-byte big-endian header followed by a TLV body:
//!
//! ```text
//!  0       1       2        3          4        6                12
//! +-------+-------+--------+----------+--------+----------------+
//! |version| flags |function|opid|type | length |      MSID      |
//! +-------+-------+--------+----------+--------+----------------+
//! 12                16      18        20
//! +-----------------+-------+---------+----------------------
//! |    reserved     | trans | reserved|  TLVs ...
//! +-----------------+-------+---------+----------------------
//! ```
//!
//! The header goes through the field-table walker, the body through the TLV
//! walker using a registry, normally [`default_registry`].

use crate::buffer::{Buffer, Endianness};
use crate::config::DecodeContext;
use crate::decoders::format_mac;
use crate::fields::{FieldDescriptor, FieldFormat, FieldScratch, FieldWalker};
use crate::parser::{load_registry, DictionaryError};
use crate::registry::TypeRegistry;
use crate::tree::{DecodedNode, Diagnostic, NodeKind};
use crate::value::DecodedValue;
use crate::walk::TlvWalker;

/// Registered UDP port.
pub const UDP_PORT: u16 = 2231;

pub const HEADER_LEN: usize = 20;

/// Bundled TLV dictionary source.
pub const DICTIONARY: &str = include_str!("../dictionaries/asncp.dict");

const FLAG_NAMES: &[(u32, &str)] = &[(0x02, "T bit: Type Identifier"), (0x01, "R bit: Reset Next Expected Transaction ID")];

pub const FUNCTION_TYPES: &[(u32, &str)] = &[
    (1, "QoS"),
    (2, "HO Control"),
    (3, "Data Path Control"),
    (4, "Context Transfer"),
    (5, "R3 Mobility"),
    (6, "Paging"),
    (7, "RRM"),
    (8, "Authentication Relay"),
    (9, "MS State"),
    (10, "Reauthentication"),
    (11, "IM Operations"),
    (12, "Accounting"),
];

pub const OP_IDS: &[(u32, &str)] = &[
    (0, "Invalid"),
    (1, "Request/Initiation"),
    (2, "Response"),
    (3, "Ack"),
    (4, "Indication"),
    (5, "Reserved"),
    (6, "Reserved"),
    (7, "Reserved"),
];

/// Message type names per function type.
pub const MESSAGE_TYPES: &[(u32, &[(u32, &str)])] = &[
    (1, &[(1, "RR_Ack"), (2, "RR_Req"), (3, "RR_Rsp")]),
    (2, &[(1, "HO_Ack"), (2, "HO_Complete"), (3, "HO_Cnf"), (4, "HO_Req"), (5, "HO_Rsp")]),
    (
        3,
        &[
            (1, "Path_Dereg_Ack"),
            (2, "Path_Dereg_Req"),
            (3, "Path_Dereg_Rsp"),
            (4, "Path_Modification_Ack"),
            (5, "Path_Modification_Req"),
            (6, "Path_Modification_Rsp"),
            (7, "Path_Prereg_Ack"),
            (8, "Path_Prereg_Req"),
            (9, "Path_Prereg_Rsp"),
            (10, "Path_Reg_Ack"),
            (11, "Path_Reg_Req"),
            (12, "Path_Reg_Rsp"),
            (13, "MS_Attachment_Req"),
            (14, "MS_Attachment_Rsp"),
            (15, "MS_Attachment_Ack"),
            (16, "Key_Change_Directive"),
        ],
    ),
    (4, &[(1, "Context_Rpt"), (2, "Context_Req"), (3, "Context_Ack")]),
    (
        5,
        &[
            (1, "Anchor_DPF_HO_Req"),
            (2, "Anchor_DPF_HO_Trigger"),
            (3, "Anchor_DPF_HO_Rsp"),
            (4, "Anchor_DPF_Relocate_Req"),
            (5, "FA_Register_Req"),
            (6, "FA_Register_Rsp"),
            (7, "Anchor_DPF_Relocate_Rsp"),
            (8, "FA_Revoke_Req"),
            (9, "FA_Revoke_Rsp"),
            (10, "Anchor_DPF_Release_Req"),
            (11, "Anchor_DPF_Release_Rsp"),
        ],
    ),
    (
        6,
        &[
            (1, "Initiate_Paging_Req"),
            (2, "Initiate_Paging_Rsp"),
            (3, "LU_Cnf"),
            (4, "LU_Req"),
            (5, "LU_Rsp"),
            (6, "Paging_Announce"),
            (7, "CMAC_Key_Count_Req"),
            (8, "CMAC_Key_Count_Rsp"),
        ],
    ),
    (
        7,
        &[
            (1, "R6 PHY_Parameters_Req"),
            (2, "R6 PHY_Parameters_Rpt"),
            (3, "R4/R6 Spare_Capacity_Req"),
            (4, "R4/R6 Spare_Capacity_Rpt"),
            (5, "R6 Neighbor_BS_Resource_Status_Update"),
            (6, "R4/R6 Radio_Config_Update_Req"),
            (7, "R4/R6 Radio_Config_Update_Rpt"),
            (8, "R4/R6 Radio_Config_Update_Ack"),
        ],
    ),
    (
        8,
        &[
            (1, "AR_Authenticated_EAP_Start"),
            (2, "AR_Authenticated_EAP_Transfer"),
            (3, "AR_EAP_Start"),
            (4, "AR_EAP_Transfer"),
            (5, "AR_EAP_Complete"),
        ],
    ),
    (
        9,
        &[
            (1, "IM_Exit_State_Change_Req"),
            (2, "IM_Exit_State_Change_Rsp"),
            (3, "Nw_ReEntry_State_Change_Directive"),
            (4, "MS_PreAttachment_Req"),
            (5, "MS_PreAttachment_Rsp"),
            (6, "MS_PreAttachment_Ack"),
            (7, "MS_Attachment_Req"),
            (8, "MS_Attachment_Rsp"),
            (9, "MS_Attachment_Ack"),
            (10, "Key_Change_Directive"),
            (11, "Key_Change_Cnf"),
            (12, "Key_Change_Ack"),
            (13, "Relocation_Cnf"),
            (14, "Relocation_Complete_Req"),
            (15, "Relocation_Complete_Rsp"),
            (16, "Relocation_Complete_Ack"),
            (17, "Relocation_Notify"),
            (18, "Relocation_Req"),
            (19, "Relocation_Rsp"),
            (20, "NetExit_MS_State_Change_Req"),
            (21, "NetExit_MS_State_Change_Rsp"),
        ],
    ),
    (10, &[(1, "Context_Rpt"), (2, "Context_Req"), (3, "Context_Ack")]),
    (
        11,
        &[
            (1, "IM_Entry_State_Change_Req"),
            (2, "IM_Entry_State_Change_Rsp"),
            (3, "IM_Entry_State_Change_Ack"),
            (4, "IM_Exit_State_Change_Req"),
            (5, "IM_Exit_State_Change_Rsp"),
            (6, "Initiate_Paging_Req"),
            (7, "Initiate_Paging_Rsp"),
            (8, "LU_Cnf"),
            (9, "LU_Req"),
            (10, "LU_Rsp"),
            (11, "Paging_Announce"),
            (12, "CMAC_Key_Count_Req"),
            (13, "CMAC_Key_Count_Rsp"),
        ],
    ),
    (12, &[(1, "Hot_lining_Req"), (2, "Hot_lining_Rsp")]),
];

const OP_ID_MESSAGE_TYPE: &str = "OP ID / Message Type";

/// The fixed message header, big-endian.
pub const HEADER: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("Version", 1),
    FieldDescriptor::fixed("Flags", 1).with_format(FieldFormat::BitFlags(FLAG_NAMES)),
    FieldDescriptor::fixed("Function Type", 1).with_format(FieldFormat::Enum(FUNCTION_TYPES)),
    FieldDescriptor::fixed(OP_ID_MESSAGE_TYPE, 1).with_format(FieldFormat::Hex),
    FieldDescriptor::fixed("Length", 2),
    FieldDescriptor::fixed("MSID", 6).with_format(FieldFormat::Bytes),
    FieldDescriptor::fixed("Reserved", 4).with_format(FieldFormat::Hex),
    FieldDescriptor::fixed("Transaction ID", 2).with_format(FieldFormat::Hex),
    FieldDescriptor::fixed("Reserved", 2).with_format(FieldFormat::Hex),
];

/// Registry built from the bundled dictionary.
pub fn default_registry() -> Result<TypeRegistry, DictionaryError> {
    load_registry(DICTIONARY)
}

fn name_of<'t>(table: &[(u32, &'t str)], v: u32) -> Option<&'t str> {
    table.iter().find(|(k, _)| *k == v).map(|(_, n)| *n)
}

pub fn function_type_name(function: u8) -> Option<&'static str> {
    name_of(FUNCTION_TYPES, function as u32)
}

pub fn op_id_name(op_id: u8) -> &'static str {
    name_of(OP_IDS, op_id as u32).unwrap_or("Reserved")
}

/// Message type name; meaningful only together with its function type.
pub fn message_type_name(function: u8, message_type: u8) -> Option<&'static str> {
    MESSAGE_TYPES
        .iter()
        .find(|(f, _)| *f == function as u32)
        .and_then(|(_, types)| name_of(types, message_type as u32))
}

/// Cheap plausibility check for traffic not on [`UDP_PORT`].
pub fn looks_like_asncp(data: &[u8]) -> bool {
    let buf = Buffer::new(data);
    let (Ok(version), Ok(flags), Ok(function), Ok(length), Ok(reserved)) = (
        buf.read_u8(0),
        buf.read_u8(1),
        buf.read_u8(2),
        buf.read_u16(4, Endianness::Big),
        buf.read_u32(12, Endianness::Big),
    ) else {
        return false;
    };
    version == 1
        && flags & 0xfc == 0
        && function_type_name(function).is_some()
        && length as usize >= HEADER_LEN
        && reserved == 0
}

/// Decode one message: header, then TLVs up to the declared length.
pub fn dissect_message(data: &[u8], registry: &TypeRegistry, ctx: DecodeContext<'_>) -> DecodedNode {
    let mut scratch = FieldScratch::new();
    let header_out = FieldWalker::new(ctx, Endianness::Big).walk(data, 0, HEADER, 0, &mut scratch);

    let mut header = DecodedNode::new("Header", 0, header_out.end_offset, NodeKind::Header);
    header.children = header_out.nodes;
    let function = field_u32(&header, "Function Type").unwrap_or(0) as u8;
    refine_header(&mut header, function);

    let mut msg = DecodedNode::new("WiMAX ASN Control Plane", 0, header_out.end_offset, NodeKind::Message);
    if header_out.incomplete {
        tracing::debug!(available = data.len(), "ASN-CP message shorter than its header");
        msg.summary = "Truncated header".to_string();
        msg.annotate(Diagnostic::Truncated { needed: HEADER_LEN, available: data.len() });
        msg.push_child(header);
        return msg;
    }

    let declared = field_u32(&header, "Length").unwrap_or(0) as usize;
    let transaction = field_u32(&header, "Transaction ID").unwrap_or(0);
    msg.summary = match header.child(OP_ID_MESSAGE_TYPE) {
        Some(n) => format!("{}, {}, Transaction ID 0x{:04x}", function_label(function), n.summary, transaction),
        None => format!("{}, Transaction ID 0x{:04x}", function_label(function), transaction),
    };

    if declared < HEADER_LEN {
        tracing::debug!(declared, "ASN-CP length shorter than header");
        if let Some(len_node) = header.children.iter_mut().find(|n| n.label == "Length") {
            len_node.annotate(Diagnostic::Truncated { needed: HEADER_LEN, available: declared });
        }
        msg.push_child(header);
        return msg;
    }

    let body_len = declared.min(data.len()) - HEADER_LEN;
    let body = TlvWalker::new(registry, ctx).walk(data, HEADER_LEN, body_len);
    if declared > data.len() {
        msg.annotate(Diagnostic::Truncated { needed: declared, available: data.len() });
    }
    msg.length = HEADER_LEN + body.consumed;
    msg.push_child(header);
    msg.children.extend(body.nodes);
    msg
}

fn function_label(function: u8) -> String {
    match function_type_name(function) {
        Some(n) => n.to_string(),
        None => format!("Unknown function type ({})", function),
    }
}

fn field_u32(header: &DecodedNode, label: &str) -> Option<u32> {
    header.child(label).and_then(|n| n.value.as_u32())
}

/// Split the op id / message type octet and render the MSID as a MAC address.
fn refine_header(header: &mut DecodedNode, function: u8) {
    for node in header.children.iter_mut() {
        match node.label.as_str() {
            OP_ID_MESSAGE_TYPE => {
                let Some(v) = node.value.as_u32() else { continue };
                let op_id = (v >> 5) as u8;
                let message_type = (v & 0x1f) as u8;
                let op_name = op_id_name(op_id);
                let msg_name = match message_type_name(function, message_type) {
                    Some(n) => n.to_string(),
                    None => format!("Unknown ({})", message_type),
                };
                node.summary = format!("{} / {}", op_name, msg_name);
                node.push_child(
                    DecodedNode::new("OP ID", node.offset, 1, NodeKind::Item)
                        .with_summary(format!("{} ({})", op_name, op_id))
                        .with_value(DecodedValue::Unsigned(op_id as u32)),
                );
                node.push_child(
                    DecodedNode::new("Message Type", node.offset, 1, NodeKind::Item)
                        .with_summary(format!("{} ({})", msg_name, message_type))
                        .with_value(DecodedValue::Unsigned(message_type as u32)),
                );
            }
            "MSID" => {
                if let Some(mac) = node.value.as_bytes().and_then(|b| <[u8; 6]>::try_from(b).ok()) {
                    node.summary = format_mac(&mac);
                    node.value = DecodedValue::Ether(mac);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_dictionary_loads() {
        let reg = default_registry().unwrap();
        assert!(reg.len() > 100);
        assert_eq!(reg.lookup(0x0001).name, "Accept/Reject Indicator");
        assert!(!reg.lookup(0xffff).is_unknown());
    }

    #[test]
    fn message_names_depend_on_function() {
        assert_eq!(message_type_name(2, 4), Some("HO_Req"));
        assert_eq!(message_type_name(6, 4), Some("LU_Req"));
        assert_eq!(message_type_name(99, 1), None);
        assert_eq!(op_id_name(1), "Request/Initiation");
    }

    #[test]
    fn heuristic_rejects_short_and_garbage() {
        assert!(!looks_like_asncp(&[1, 0, 2]));
        let mut hdr = [0u8; 20];
        hdr[0] = 1;
        hdr[2] = 2;
        hdr[5] = 20;
        assert!(looks_like_asncp(&hdr));
        hdr[2] = 0x40;
        assert!(!looks_like_asncp(&hdr));
    }
}
