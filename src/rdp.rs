//! RDP connection setup PDUs as static field tables (all little-endian).
//!
//! Covers the GCC conference user data blocks exchanged in MCS Connect
//! Initial/Response, the Client Info PDU behind its basic security header, and
//! static virtual channel PDUs. State learned from the user data blocks (the
//! negotiated encryption and the channel id → name map) is written to a
//! [`SessionStore`] and read back by later PDUs of the same connection.

use crate::buffer::{Buffer, Endianness};
use crate::config::DecodeContext;
use crate::decoders::raw;
use crate::fields::{CellId, FieldDescriptor, FieldFlags, FieldFormat, FieldScratch, FieldWalker};
use crate::session::{ConnectionKey, DissectorTable, SessionStore};
use crate::tree::{DecodedNode, Diagnostic, NodeKind};
use crate::value::DecodedValue;

pub const CS_CORE: u16 = 0xC001;
pub const CS_SECURITY: u16 = 0xC002;
pub const CS_NET: u16 = 0xC003;
pub const CS_CLUSTER: u16 = 0xC004;
pub const CS_MONITOR: u16 = 0xC005;
pub const SC_CORE: u16 = 0x0C01;
pub const SC_SECURITY: u16 = 0x0C02;
pub const SC_NET: u16 = 0x0C03;

pub const SEC_EXCHANGE_PKT: u32 = 0x0001;
pub const SEC_ENCRYPT: u32 = 0x0008;
pub const SEC_INFO_PKT: u32 = 0x0040;

/// User data block header length.
pub const UD_HEADER_LEN: usize = 4;
/// Channel PDU header length.
pub const CHANNEL_PDU_HEADER_LEN: usize = 8;

const BLOCK_TYPES: &[(u32, &str)] = &[
    (CS_CORE as u32, "clientCoreData"),
    (CS_SECURITY as u32, "clientSecurityData"),
    (CS_NET as u32, "clientNetworkData"),
    (CS_CLUSTER as u32, "clientClusterData"),
    (CS_MONITOR as u32, "clientMonitorData"),
    (SC_CORE as u32, "serverCoreData"),
    (SC_SECURITY as u32, "serverSecurityData"),
    (SC_NET as u32, "serverNetworkData"),
];

const VERSIONS: &[(u32, &str)] = &[
    (0x0008_0001, "RDP 4.0"),
    (0x0008_0004, "RDP 5.0, 5.1, 5.2, 6.0, 6.1, 7.0, 7.1, 8.0, 8.1"),
    (0x0008_0005, "RDP 10.0"),
    (0x0008_0006, "RDP 10.1"),
    (0x0008_0007, "RDP 10.2"),
    (0x0008_0008, "RDP 10.3"),
    (0x0008_0009, "RDP 10.4"),
    (0x0008_000a, "RDP 10.5"),
    (0x0008_000b, "RDP 10.6"),
    (0x0008_000c, "RDP 10.7"),
];

const COLOR_DEPTHS: &[(u32, &str)] = &[
    (0xCA00, "4 bits-per-pixel (bpp)"),
    (0xCA01, "8 bpp"),
    (0xCA02, "15-bit 555 RGB mask"),
    (0xCA03, "16-bit 565 RGB mask"),
    (0xCA04, "24-bit RGB mask"),
];

const HIGH_COLOR_DEPTHS: &[(u32, &str)] = &[(4, "4 bpp"), (8, "8 bpp"), (15, "15 bpp"), (16, "16 bpp"), (24, "24 bpp")];

const SUPPORTED_COLOR_DEPTHS: &[(u32, &str)] = &[
    (0x0001, "RNS_UD_24BPP_SUPPORT"),
    (0x0002, "RNS_UD_16BPP_SUPPORT"),
    (0x0004, "RNS_UD_15BPP_SUPPORT"),
    (0x0008, "RNS_UD_32BPP_SUPPORT"),
];

const EARLY_CAPABILITY_FLAGS: &[(u32, &str)] = &[
    (0x0001, "RNS_UD_CS_SUPPORT_ERRINFO_PDU"),
    (0x0002, "RNS_UD_CS_WANT_32BPP_SESSION"),
    (0x0004, "RNS_UD_CS_SUPPORT_STATUSINFO_PDU"),
    (0x0008, "RNS_UD_CS_STRONG_ASYMMETRIC_KEYS"),
    (0x0020, "RNS_UD_CS_VALID_CONNECTION_TYPE"),
    (0x0040, "RNS_UD_CS_SUPPORT_MONITOR_LAYOUT_PDU"),
    (0x0080, "RNS_UD_CS_SUPPORT_NETCHAR_AUTODETECT"),
    (0x0100, "RNS_UD_CS_SUPPORT_DYNVC_GFX_PROTOCOL"),
    (0x0200, "RNS_UD_CS_SUPPORT_DYNAMIC_TIME_ZONE"),
    (0x0400, "RNS_UD_CS_SUPPORT_HEARTBEAT_PDU"),
];

const CONNECTION_TYPES: &[(u32, &str)] = &[
    (1, "CONNECTION_TYPE_MODEM"),
    (2, "CONNECTION_TYPE_BROADBAND_LOW"),
    (3, "CONNECTION_TYPE_SATELLITE"),
    (4, "CONNECTION_TYPE_BROADBAND_HIGH"),
    (5, "CONNECTION_TYPE_WAN"),
    (6, "CONNECTION_TYPE_LAN"),
    (7, "CONNECTION_TYPE_AUTODETECT"),
];

const PROTOCOLS: &[(u32, &str)] = &[
    (0x0000_0001, "PROTOCOL_SSL"),
    (0x0000_0002, "PROTOCOL_HYBRID"),
    (0x0000_0004, "PROTOCOL_RDSTLS"),
    (0x0000_0008, "PROTOCOL_HYBRID_EX"),
];

const ENCRYPTION_METHODS: &[(u32, &str)] = &[
    (0x0000_0001, "40BIT_ENCRYPTION_FLAG"),
    (0x0000_0002, "128BIT_ENCRYPTION_FLAG"),
    (0x0000_0008, "56BIT_ENCRYPTION_FLAG"),
    (0x0000_0010, "FIPS_ENCRYPTION_FLAG"),
];

const ENCRYPTION_METHOD: &[(u32, &str)] = &[
    (0x0000_0000, "None"),
    (0x0000_0001, "40-bit RC4"),
    (0x0000_0002, "128-bit RC4"),
    (0x0000_0008, "56-bit RC4"),
    (0x0000_0010, "FIPS 140-1"),
];

const ENCRYPTION_LEVEL: &[(u32, &str)] = &[
    (0, "None"),
    (1, "Low"),
    (2, "Client Compatible"),
    (3, "High"),
    (4, "FIPS"),
];

const CHANNEL_OPTIONS: &[(u32, &str)] = &[
    (0x8000_0000, "CHANNEL_OPTION_INITIALIZED"),
    (0x4000_0000, "CHANNEL_OPTION_ENCRYPT_RDP"),
    (0x2000_0000, "CHANNEL_OPTION_ENCRYPT_SC"),
    (0x1000_0000, "CHANNEL_OPTION_ENCRYPT_CS"),
    (0x0800_0000, "CHANNEL_OPTION_PRI_HIGH"),
    (0x0400_0000, "CHANNEL_OPTION_PRI_MED"),
    (0x0200_0000, "CHANNEL_OPTION_PRI_LOW"),
    (0x0080_0000, "CHANNEL_OPTION_COMPRESS_RDP"),
    (0x0040_0000, "CHANNEL_OPTION_COMPRESS"),
    (0x0020_0000, "CHANNEL_OPTION_SHOW_PROTOCOL"),
    (0x0010_0000, "REMOTE_CONTROL_PERSISTENT"),
];

const SECURITY_FLAGS: &[(u32, &str)] = &[
    (0x8000, "SEC_FLAGSHI_VALID"),
    (0x4000, "SEC_HEARTBEAT"),
    (0x1000, "SEC_AUTODETECT_RSP"),
    (0x0800, "SEC_AUTODETECT_REQ"),
    (0x0400, "SEC_REDIRECTION_PKT"),
    (0x0200, "SEC_SECURE_CHECKSUM"),
    (0x0080, "SEC_LICENSE_PKT"),
    (0x0040, "SEC_INFO_PKT"),
    (0x0020, "SEC_IGNORE_SEQNO"),
    (0x0010, "SEC_RESET_SEQNO"),
    (0x0008, "SEC_ENCRYPT"),
    (0x0001, "SEC_EXCHANGE_PKT"),
];

const INFO_FLAGS: &[(u32, &str)] = &[
    (0x0000_0001, "INFO_MOUSE"),
    (0x0000_0002, "INFO_DISABLECTRLALTDEL"),
    (0x0000_0008, "INFO_AUTOLOGON"),
    (0x0000_0010, "INFO_UNICODE"),
    (0x0000_0020, "INFO_MAXIMIZESHELL"),
    (0x0000_0040, "INFO_LOGONNOTIFY"),
    (0x0000_0080, "INFO_COMPRESSION"),
    (0x0000_0100, "INFO_ENABLEWINDOWSKEY"),
    (0x0000_2000, "INFO_REMOTECONSOLEAUDIO"),
    (0x0000_4000, "INFO_FORCE_ENCRYPTED_CS_PDU"),
    (0x0000_8000, "INFO_RAIL"),
    (0x0001_0000, "INFO_LOGONERRORS"),
    (0x0002_0000, "INFO_MOUSE_HAS_WHEEL"),
    (0x0004_0000, "INFO_PASSWORD_IS_SC_PIN"),
    (0x0008_0000, "INFO_NOAUDIOPLAYBACK"),
    (0x0010_0000, "INFO_USING_SAVED_CREDS"),
    (0x0020_0000, "INFO_AUDIOCAPTURE"),
    (0x0040_0000, "INFO_VIDEO_DISABLE"),
    (0x0200_0000, "INFO_HIDEF_RAIL_SUPPORTED"),
];

const ADDRESS_FAMILIES: &[(u32, &str)] = &[(0x0002, "AF_INET"), (0x0017, "AF_INET6")];

const PERFORMANCE_FLAGS: &[(u32, &str)] = &[
    (0x0000_0001, "PERF_DISABLE_WALLPAPER"),
    (0x0000_0002, "PERF_DISABLE_FULLWINDOWDRAG"),
    (0x0000_0004, "PERF_DISABLE_MENUANIMATIONS"),
    (0x0000_0008, "PERF_DISABLE_THEMING"),
    (0x0000_0020, "PERF_DISABLE_CURSOR_SHADOW"),
    (0x0000_0040, "PERF_DISABLE_CURSORSETTINGS"),
    (0x0000_0080, "PERF_ENABLE_FONT_SMOOTHING"),
    (0x0000_0100, "PERF_ENABLE_DESKTOP_COMPOSITION"),
];

const CHANNEL_PDU_FLAGS: &[(u32, &str)] = &[
    (0x0000_0001, "CHANNEL_FLAG_FIRST"),
    (0x0000_0002, "CHANNEL_FLAG_LAST"),
    (0x0000_0010, "CHANNEL_FLAG_SHOW_PROTOCOL"),
    (0x0000_0020, "CHANNEL_FLAG_SUSPEND"),
    (0x0000_0040, "CHANNEL_FLAG_RESUME"),
    (0x0010_0000, "CHANNEL_FLAG_SHADOW_PERSISTENT"),
    (0x0020_0000, "CHANNEL_PACKET_COMPRESSED"),
    (0x0040_0000, "CHANNEL_PACKET_AT_FRONT"),
    (0x0080_0000, "CHANNEL_PACKET_FLUSHED"),
];

pub const UD_HEADER: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("type", 2).with_format(FieldFormat::Enum(BLOCK_TYPES)),
    FieldDescriptor::fixed("length", 2),
];

/// TS_UD_CS_CORE after its header; everything from `postBeta2ColorDepth` on is optional.
pub const CLIENT_CORE_DATA: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("version", 4).with_format(FieldFormat::Enum(VERSIONS)),
    FieldDescriptor::fixed("desktopWidth", 2),
    FieldDescriptor::fixed("desktopHeight", 2),
    FieldDescriptor::fixed("colorDepth", 2).with_format(FieldFormat::Enum(COLOR_DEPTHS)),
    FieldDescriptor::fixed("SASSequence", 2).with_format(FieldFormat::Hex),
    FieldDescriptor::fixed("keyboardLayout", 4).with_format(FieldFormat::Hex),
    FieldDescriptor::fixed("clientBuild", 4),
    FieldDescriptor::fixed("clientName", 32).string().with_flags(FieldFlags::UNICODE),
    FieldDescriptor::fixed("keyboardType", 4),
    FieldDescriptor::fixed("keyboardSubType", 4),
    FieldDescriptor::fixed("keyboardFunctionKey", 4),
    FieldDescriptor::fixed("imeFileName", 64).string().with_flags(FieldFlags::UNICODE),
    FieldDescriptor::fixed("postBeta2ColorDepth", 2).with_format(FieldFormat::Enum(COLOR_DEPTHS)),
    FieldDescriptor::fixed("clientProductId", 2),
    FieldDescriptor::fixed("serialNumber", 4),
    FieldDescriptor::fixed("highColorDepth", 2).with_format(FieldFormat::Enum(HIGH_COLOR_DEPTHS)),
    FieldDescriptor::fixed("supportedColorDepths", 2).with_format(FieldFormat::BitFlags(SUPPORTED_COLOR_DEPTHS)),
    FieldDescriptor::fixed("earlyCapabilityFlags", 2).with_format(FieldFormat::BitFlags(EARLY_CAPABILITY_FLAGS)),
    FieldDescriptor::fixed("clientDigProductId", 64).string().with_flags(FieldFlags::UNICODE),
    FieldDescriptor::fixed("connectionType", 1).with_format(FieldFormat::Enum(CONNECTION_TYPES)),
    FieldDescriptor::fixed("pad1octet", 1),
    FieldDescriptor::fixed("serverSelectedProtocol", 4).with_format(FieldFormat::BitFlags(PROTOCOLS)),
];

pub const CLIENT_SECURITY_DATA: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("encryptionMethods", 4).with_format(FieldFormat::BitFlags(ENCRYPTION_METHODS)),
    FieldDescriptor::fixed("extEncryptionMethods", 4).with_format(FieldFormat::BitFlags(ENCRYPTION_METHODS)),
];

pub const CLIENT_NETWORK_DATA: &[FieldDescriptor<'static>] = &[FieldDescriptor::fixed("channelCount", 4)];

/// One CHANNEL_DEF, repeated `channelCount` times.
pub const CHANNEL_DEF: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("name", 8).string().with_flags(FieldFlags::ANSI),
    FieldDescriptor::fixed("options", 4).with_format(FieldFormat::BitFlags(CHANNEL_OPTIONS)),
];

pub const SERVER_CORE_DATA: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("version", 4).with_format(FieldFormat::Enum(VERSIONS)),
    FieldDescriptor::fixed("clientRequestedProtocols", 4).with_format(FieldFormat::BitFlags(PROTOCOLS)),
    FieldDescriptor::fixed("earlyCapabilityFlags", 4).with_format(FieldFormat::Hex),
];

const SERVER_RANDOM_LEN: CellId = CellId(0);
const SERVER_CERT_LEN: CellId = CellId(1);

/// TS_UD_SC_SEC1. The random and certificate are absent when encryption is off.
pub const SERVER_SECURITY_DATA: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("encryptionMethod", 4).with_format(FieldFormat::Enum(ENCRYPTION_METHOD)),
    FieldDescriptor::fixed("encryptionLevel", 4).with_format(FieldFormat::Enum(ENCRYPTION_LEVEL)),
    FieldDescriptor::length("serverRandomLen", 4, SERVER_RANDOM_LEN, 0),
    FieldDescriptor::length("serverCertLen", 4, SERVER_CERT_LEN, 0),
    FieldDescriptor::variable("serverRandom", SERVER_RANDOM_LEN).with_format(FieldFormat::Bytes),
    FieldDescriptor::variable("serverCertificate", SERVER_CERT_LEN).with_format(FieldFormat::Bytes),
];

pub const SERVER_NETWORK_DATA: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("MCSChannelId", 2),
    FieldDescriptor::fixed("channelCount", 2),
];

pub const SECURITY_HEADER: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("flags", 2).with_format(FieldFormat::BitFlags(SECURITY_FLAGS)),
    FieldDescriptor::fixed("flagsHi", 2).with_format(FieldFormat::Hex),
];

const DOMAIN_LEN: CellId = CellId(0);
const USER_NAME_LEN: CellId = CellId(1);
const PASSWORD_LEN: CellId = CellId(2);
const ALTERNATE_SHELL_LEN: CellId = CellId(3);
const WORKING_DIR_LEN: CellId = CellId(4);
const CLIENT_ADDRESS_LEN: CellId = CellId(5);
const CLIENT_DIR_LEN: CellId = CellId(6);

/// TS_EXTENDED_INFO_PACKET, always UTF-16.
const EXTENDED_INFO: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("clientAddressFamily", 2).with_format(FieldFormat::Enum(ADDRESS_FAMILIES)),
    FieldDescriptor::length("cbClientAddress", 2, CLIENT_ADDRESS_LEN, 0),
    FieldDescriptor::variable("clientAddress", CLIENT_ADDRESS_LEN).string().with_flags(FieldFlags::UNICODE),
    FieldDescriptor::length("cbClientDir", 2, CLIENT_DIR_LEN, 0),
    FieldDescriptor::variable("clientDir", CLIENT_DIR_LEN).string().with_flags(FieldFlags::UNICODE),
    FieldDescriptor::fixed("clientTimeZone", 172).with_format(FieldFormat::Bytes),
    FieldDescriptor::fixed("clientSessionId", 4),
    FieldDescriptor::fixed("performanceFlags", 4).with_format(FieldFormat::BitFlags(PERFORMANCE_FLAGS)),
];

/// TS_INFO_PACKET. The cb* counts exclude the NUL terminator, whose width
/// follows the string encoding.
pub const INFO_PACKET: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("CodePage", 4),
    FieldDescriptor::fixed("flags", 4).with_format(FieldFormat::BitFlags(INFO_FLAGS)).with_flags(FieldFlags::INFO_FLAGS),
    FieldDescriptor::length("cbDomain", 2, DOMAIN_LEN, 0),
    FieldDescriptor::length("cbUserName", 2, USER_NAME_LEN, 0),
    FieldDescriptor::length("cbPassword", 2, PASSWORD_LEN, 0),
    FieldDescriptor::length("cbAlternateShell", 2, ALTERNATE_SHELL_LEN, 0),
    FieldDescriptor::length("cbWorkingDir", 2, WORKING_DIR_LEN, 0),
    FieldDescriptor::variable("Domain", DOMAIN_LEN).nul_excluded(),
    FieldDescriptor::variable("UserName", USER_NAME_LEN).nul_excluded(),
    FieldDescriptor::variable("Password", PASSWORD_LEN).nul_excluded(),
    FieldDescriptor::variable("AlternateShell", ALTERNATE_SHELL_LEN).nul_excluded(),
    FieldDescriptor::variable("WorkingDir", WORKING_DIR_LEN).nul_excluded(),
    FieldDescriptor::subtree("extraInfo", 0, EXTENDED_INFO),
];

pub const CHANNEL_PDU_HEADER: &[FieldDescriptor<'static>] = &[
    FieldDescriptor::fixed("length", 4),
    FieldDescriptor::fixed("flags", 4).with_format(FieldFormat::BitFlags(CHANNEL_PDU_FLAGS)),
];

fn lookup(table: &[(u32, &'static str)], v: u32) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == v).map(|(_, n)| *n)
}

fn value_of(nodes: &[DecodedNode], label: &str) -> Option<u32> {
    nodes.iter().find(|n| n.label == label).and_then(|n| n.value.as_u32())
}

fn text_of<'n>(nodes: &'n [DecodedNode], label: &str) -> Option<&'n str> {
    nodes.iter().find(|n| n.label == label).and_then(|n| n.value.as_text())
}

/// Walk the concatenated user data blocks of an MCS Connect Initial or
/// Connect Response. Encryption settings and channel ids are recorded in `store`.
pub fn dissect_gcc_user_data(
    data: &[u8],
    conn: ConnectionKey,
    store: &mut dyn SessionStore,
    ctx: DecodeContext<'_>,
) -> DecodedNode {
    let walker = FieldWalker::new(ctx, Endianness::Little);
    let buf = Buffer::new(data);
    let mut state = store.get(&conn);
    let mut root = DecodedNode::new("GCC User Data", 0, data.len(), NodeKind::Message);
    let mut pos = 0;

    while pos < data.len() {
        let (block_type, block_len) =
            match (buf.read_u16(pos, Endianness::Little), buf.read_u16(pos + 2, Endianness::Little)) {
                (Ok(t), Ok(l)) => (t, l as usize),
                _ => {
                    let mut node = DecodedNode::new("Truncated block header", pos, data.len() - pos, NodeKind::Item);
                    node.annotate(Diagnostic::Truncated { needed: UD_HEADER_LEN, available: data.len() - pos });
                    root.push_child(node);
                    break;
                }
            };
        let label = lookup(BLOCK_TYPES, block_type as u32).unwrap_or("Unknown user data block");
        let mut block = DecodedNode::new(label, pos, block_len, NodeKind::Subtree).with_code(block_type as u32);
        let mut scratch = FieldScratch::new();
        let header = walker.walk(data, pos, UD_HEADER, 0, &mut scratch);
        block.children = header.nodes;

        if block_len < UD_HEADER_LEN {
            tracing::debug!(block_type, block_len, "user data block shorter than its header");
            block.annotate(Diagnostic::Truncated { needed: UD_HEADER_LEN, available: block_len });
            root.push_child(block);
            break;
        }
        let body_len = block_len - UD_HEADER_LEN;
        let body_start = pos + UD_HEADER_LEN;
        if body_start + body_len > data.len() {
            block.annotate(Diagnostic::Truncated { needed: block_len, available: data.len() - pos });
        }
        // Fields of one block never read into the next.
        let block_data = &data[..(body_start + body_len).min(data.len())];

        let body = match block_type {
            CS_CORE => Some(CLIENT_CORE_DATA),
            CS_SECURITY => Some(CLIENT_SECURITY_DATA),
            CS_NET => Some(CLIENT_NETWORK_DATA),
            SC_CORE => Some(SERVER_CORE_DATA),
            SC_SECURITY => Some(SERVER_SECURITY_DATA),
            SC_NET => Some(SERVER_NETWORK_DATA),
            _ => None,
        };
        match body {
            Some(table) => {
                let out = walker.walk(block_data, body_start, table, body_len, &mut scratch);
                let mut cursor = out.end_offset;
                let nodes = out.nodes;
                match block_type {
                    CS_NET => {
                        let count = value_of(&nodes, "channelCount").unwrap_or(0);
                        block.children.extend(nodes);
                        state.requested_channels.clear();
                        for i in 0..count {
                            if cursor >= body_start + body_len {
                                break;
                            }
                            let def = walker.walk(block_data, cursor, CHANNEL_DEF, 0, &mut scratch);
                            let name = text_of(&def.nodes, "name").unwrap_or_default().to_string();
                            let len = def.end_offset - cursor;
                            let mut node = DecodedNode::new(format!("channelDef[{}]", i), cursor, len, NodeKind::Subtree)
                                .with_summary(name.clone());
                            node.children = def.nodes;
                            block.push_child(node);
                            state.requested_channels.push(name);
                            cursor = def.end_offset;
                            if def.incomplete {
                                break;
                            }
                        }
                    }
                    SC_SECURITY => {
                        state.encryption_method = value_of(&nodes, "encryptionMethod").unwrap_or(0);
                        state.encryption_level = value_of(&nodes, "encryptionLevel").unwrap_or(0);
                        tracing::debug!(
                            method = state.encryption_method,
                            level = state.encryption_level,
                            "server security data"
                        );
                        block.children.extend(nodes);
                    }
                    SC_NET => {
                        let count = value_of(&nodes, "channelCount").unwrap_or(0) as usize;
                        block.children.extend(nodes);
                        let end = block_data.len();
                        for i in 0..count {
                            if cursor + 2 > end {
                                let available = end.saturating_sub(cursor);
                                let mut node = DecodedNode::new("channelIdArray", cursor, available, NodeKind::Item);
                                node.annotate(Diagnostic::Truncated { needed: (count - i) * 2, available });
                                block.push_child(node);
                                break;
                            }
                            let Ok(id) = buf.read_u16(cursor, Endianness::Little) else { break };
                            let name = state.requested_channels.get(i).cloned();
                            let summary = match &name {
                                Some(n) => format!("{} ({})", id, n),
                                None => id.to_string(),
                            };
                            block.push_child(
                                DecodedNode::new(format!("channelId[{}]", i), cursor, 2, NodeKind::Item)
                                    .with_summary(summary)
                                    .with_value(DecodedValue::Unsigned(id as u32)),
                            );
                            if let Some(n) = name {
                                state.channels.insert(id, n);
                            }
                            cursor += 2;
                        }
                    }
                    _ => block.children.extend(nodes),
                }
            }
            None => {
                let bytes = buf.bytes_clamped(body_start, body_len);
                let opaque = raw(bytes);
                block.push_child(
                    DecodedNode::new("data", body_start, bytes.len(), NodeKind::Field)
                        .with_summary(opaque.summary)
                        .with_value(opaque.value),
                );
            }
        }
        let incomplete = block.is_incomplete();
        root.push_child(block);
        if incomplete {
            break;
        }
        pos += block_len;
    }

    store.set(conn, state);
    root
}

/// Client Info PDU: basic security header, then either the info packet or,
/// when the PDU or the session is encrypted, opaque encrypted bytes.
pub fn dissect_client_info(
    data: &[u8],
    conn: ConnectionKey,
    store: &mut dyn SessionStore,
    ctx: DecodeContext<'_>,
) -> DecodedNode {
    let walker = FieldWalker::new(ctx, Endianness::Little);
    let mut state = store.get(&conn);
    let mut scratch = FieldScratch::new();
    let mut root = DecodedNode::new("Client Info PDU", 0, data.len(), NodeKind::Message);

    let header = walker.walk(data, 0, SECURITY_HEADER, 0, &mut scratch);
    let flags = value_of(&header.nodes, "flags").unwrap_or(0);
    let mut sec = DecodedNode::new("securityHeader", 0, header.end_offset, NodeKind::Header);
    sec.children = header.nodes;
    root.push_child(sec);
    if header.incomplete {
        root.annotate(Diagnostic::Truncated { needed: 4, available: data.len() });
        return root;
    }

    let start = header.end_offset;
    if flags & SEC_ENCRYPT != 0 || state.is_encrypted() {
        let opaque = raw(&data[start..]);
        root.summary = "Encrypted".to_string();
        root.push_child(
            DecodedNode::new("Encrypted Client Info", start, data.len() - start, NodeKind::Field)
                .with_summary(opaque.summary)
                .with_value(opaque.value),
        );
        return root;
    }
    if flags & SEC_INFO_PKT == 0 {
        tracing::debug!(flags, "client info PDU without SEC_INFO_PKT");
    }

    let out = walker.walk(data, start, INFO_PACKET, data.len() - start, &mut scratch);
    let mut info = DecodedNode::new("TS_INFO_PACKET", start, out.end_offset - start, NodeKind::Subtree);
    if let Some(user) = text_of(&out.nodes, "UserName") {
        info.summary = format!("UserName {}", user);
    }
    info.children = out.nodes;
    root.push_child(info);

    if let Some(f) = scratch.info_flags() {
        state.info_flags = Some(f);
        store.set(conn, state);
    }
    root
}

/// Static virtual channel PDU on MCS channel `channel_id`. The payload is
/// handed to the dissector registered under the channel's name, if any.
pub fn dissect_channel_data(
    data: &[u8],
    channel_id: u16,
    conn: ConnectionKey,
    store: &dyn SessionStore,
    table: &DissectorTable<String>,
    ctx: DecodeContext<'_>,
) -> DecodedNode {
    let state = store.get(&conn);
    let name = state.channel_name(channel_id).map(str::to_string);
    let label = match &name {
        Some(n) => format!("Virtual Channel Data ({})", n),
        None => "Virtual Channel Data".to_string(),
    };
    let mut root = DecodedNode::new(label, 0, data.len(), NodeKind::Message).with_code(channel_id as u32);

    let mut scratch = FieldScratch::new();
    let header = FieldWalker::new(ctx, Endianness::Little).walk(data, 0, CHANNEL_PDU_HEADER, 0, &mut scratch);
    let mut hdr = DecodedNode::new("channelPDUHeader", 0, header.end_offset, NodeKind::Header);
    hdr.children = header.nodes;
    root.push_child(hdr);
    if header.incomplete {
        root.annotate(Diagnostic::Truncated { needed: CHANNEL_PDU_HEADER_LEN, available: data.len() });
        return root;
    }

    let payload = &data[CHANNEL_PDU_HEADER_LEN..];
    let dispatched = name.as_ref().and_then(|n| table.dispatch(n, payload));
    match dispatched {
        Some(mut sub) => {
            sub.shift(CHANNEL_PDU_HEADER_LEN);
            root.push_child(sub);
        }
        None => {
            tracing::trace!(channel_id, name = ?name, "no sub-dissector for channel");
            let opaque = raw(payload);
            root.push_child(
                DecodedNode::new("channelData", CHANNEL_PDU_HEADER_LEN, payload.len(), NodeKind::Field)
                    .with_summary(opaque.summary)
                    .with_value(opaque.value),
            );
        }
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_well_formed() {
        let fixed: u32 = CLIENT_CORE_DATA.iter().map(|f| f.fixed_length).sum();
        // 212 mandatory+optional bytes after the 4-byte header.
        assert_eq!(fixed, 212);
        assert!(INFO_PACKET[1].flags.contains(FieldFlags::INFO_FLAGS));
        assert_eq!(INFO_PACKET[2].offset_adjust, 0);
        assert!(INFO_PACKET[7..12].iter().all(|f| f.flags.contains(FieldFlags::NUL_EXCLUDED)));
    }
}
