//! Decode WiMAX ASN-CP messages from a pcap / pcapng capture.
//!
//! Usage:
//!   decode_pcap [OPTIONS] FILE.pcap
//!
//! Options:
//!   --dict=PATH     TLV dictionary (default: bundled dictionary)
//!   --dump[=PATH]   Write the decoded tree of every message (stdout if no path)
//!   --frame=N       Only dump packet N (1-based)
//!   --heuristic     Also try UDP payloads not on port 2231
//!   --verbose, -v   Per-message one-line summary and debug events (unmapped
//!                   TLV codes) on stderr

use asncp_dissect::asncp::{self, dissect_message, looks_like_asncp};
use asncp_dissect::dump::tree_to_dump;
use asncp_dissect::parser::load_registry_file;
use asncp_dissect::{DecodeContext, DecodedNode, TypeRegistry};
use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned, PcapError};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Events go to stderr so `--dump` on stdout stays clean. Warnings always, debug with `-v`.
fn init_logging(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();
}

struct Options {
    verbose: bool,
    heuristic: bool,
    frame_filter: Option<u64>,
}

#[derive(Default)]
struct Stats {
    packets: u64,
    udp_payloads: u64,
    messages: u64,
    incomplete: u64,
    with_diagnostics: u64,
    /// function type name → message count
    functions: BTreeMap<String, u64>,
    first_problem: Option<(u64, String)>,
}

fn main() -> anyhow::Result<()> {
    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = take_flag(&mut raw_args, &["--verbose", "-v"]);
    init_logging(verbose);
    let heuristic = take_flag(&mut raw_args, &["--heuristic"]);
    let dump_path: Option<PathBuf> = raw_args.iter().position(|a| a.starts_with("--dump")).and_then(|pos| {
        let arg = raw_args.remove(pos);
        if arg == "--dump" {
            Some(PathBuf::from("-"))
        } else {
            arg.strip_prefix("--dump=").map(PathBuf::from)
        }
    });
    let frame_filter: Option<u64> = raw_args.iter().position(|a| a.starts_with("--frame=")).and_then(|pos| {
        let arg = raw_args.remove(pos);
        arg.strip_prefix("--frame=").and_then(|s| s.parse().ok())
    });
    let dict_path: Option<PathBuf> = raw_args.iter().position(|a| a.starts_with("--dict=")).and_then(|pos| {
        let arg = raw_args.remove(pos);
        arg.strip_prefix("--dict=").map(PathBuf::from)
    });
    let pcap_path: PathBuf = raw_args
        .into_iter()
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: decode_pcap [OPTIONS] FILE.pcap"))?;

    let registry = match &dict_path {
        Some(p) => load_registry_file(p)?,
        None => asncp::default_registry()?,
    }
    .with_unknown_logging(verbose);
    let opts = Options { verbose, heuristic, frame_filter };
    let mut dump: Option<Box<dyn Write>> = match &dump_path {
        Some(p) if p.as_os_str() == "-" => Some(Box::new(std::io::stdout())),
        Some(p) => Some(Box::new(File::create(p)?)),
        None => None,
    };
    let mut stats = Stats::default();

    // pcap vs pcapng by the magic at start of file.
    let mut probe = [0u8; 4];
    File::open(&pcap_path)?.read_exact(&mut probe)?;
    let file = File::open(&pcap_path)?;
    if probe == [0x0a, 0x0d, 0x0d, 0x0a] {
        run_pcapng(file, &registry, &opts, &mut dump, &mut stats)?;
    } else {
        run_legacy_pcap(file, &registry, &opts, &mut dump, &mut stats)?;
    }

    eprintln!("pcap: {}", pcap_path.display());
    match &dict_path {
        Some(p) => eprintln!("dictionary: {} ({} TLV types)", p.display(), registry.len()),
        None => eprintln!("dictionary: bundled ({} TLV types)", registry.len()),
    }
    eprintln!("packets: {}", stats.packets);
    eprintln!("udp payloads: {}", stats.udp_payloads);
    eprintln!("asn-cp messages: {}", stats.messages);
    eprintln!("incomplete (truncated): {}", stats.incomplete);
    eprintln!("with diagnostics: {}", stats.with_diagnostics);
    if !stats.functions.is_empty() {
        eprintln!("function types:");
        for (name, n) in &stats.functions {
            eprintln!("  {}: {}", name, n);
        }
    }
    if let Some((pkt, msg)) = &stats.first_problem {
        eprintln!("first problem: packet {}: {}", pkt, msg);
    }
    Ok(())
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    match args.iter().position(|a| names.contains(&a.as_str())) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn run_legacy_pcap<R: Read>(
    file: R,
    registry: &TypeRegistry,
    opts: &Options,
    dump: &mut Option<Box<dyn Write>>,
    stats: &mut Stats,
) -> anyhow::Result<()> {
    let mut reader = pcap_parser::pcap::LegacyPcapReader::new(1 << 20, file)?;
    let mut linktype: Option<Linktype> = None;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(h) => linktype = Some(h.network),
                    PcapBlockOwned::Legacy(b) => {
                        stats.packets += 1;
                        let lt = linktype.unwrap_or(Linktype(1));
                        handle_frame(lt, b.data, registry, opts, dump, stats)?;
                    }
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| anyhow::anyhow!("pcap refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcap read error: {:?}", e)),
        }
    }
    Ok(())
}

fn run_pcapng<R: Read>(
    file: R,
    registry: &TypeRegistry,
    opts: &Options,
    dump: &mut Option<Box<dyn Write>>,
    stats: &mut Stats,
) -> anyhow::Result<()> {
    let mut reader = pcap_parser::pcapng::PcapNGReader::new(1 << 20, file)?;
    let mut if_linktypes: Vec<Linktype> = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::NG(b) = block {
                    match &b {
                        PcapNgBlock::InterfaceDescription(idb) => if_linktypes.push(idb.linktype),
                        PcapNgBlock::EnhancedPacket(epb) => {
                            stats.packets += 1;
                            let lt = if_linktypes.get(epb.if_id as usize).copied().unwrap_or(Linktype(1));
                            handle_frame(lt, epb.packet_data(), registry, opts, dump, stats)?;
                        }
                        PcapNgBlock::SimplePacket(spb) => {
                            stats.packets += 1;
                            let lt = if_linktypes.first().copied().unwrap_or(Linktype(1));
                            handle_frame(lt, spb.packet_data(), registry, opts, dump, stats)?;
                        }
                        _ => {}
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| anyhow::anyhow!("pcapng refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcapng read error: {:?}", e)),
        }
    }
    Ok(())
}

fn handle_frame(
    linktype: Linktype,
    frame: &[u8],
    registry: &TypeRegistry,
    opts: &Options,
    dump: &mut Option<Box<dyn Write>>,
    stats: &mut Stats,
) -> anyhow::Result<()> {
    let Some(udp) = udp_from_linktype(linktype, frame) else {
        return Ok(());
    };
    stats.udp_payloads += 1;
    let on_port = udp.src_port == asncp::UDP_PORT || udp.dst_port == asncp::UDP_PORT;
    if !on_port && !(opts.heuristic && looks_like_asncp(udp.payload)) {
        return Ok(());
    }

    let msg = dissect_message(udp.payload, registry, DecodeContext::default());
    record(stats, &msg);
    if opts.verbose {
        eprintln!("packet {}: {}", stats.packets, msg.summary);
    }
    if opts.frame_filter.map_or(true, |f| f == stats.packets) {
        if let Some(w) = dump.as_mut() {
            writeln!(w, "packet {} ({} bytes)", stats.packets, udp.payload.len())?;
            writeln!(w, "{}", tree_to_dump(&msg, 1))?;
        }
    }
    Ok(())
}

fn record(stats: &mut Stats, msg: &DecodedNode) {
    stats.messages += 1;
    let diags = msg.all_diagnostics();
    if diags.iter().any(|d| d.is_truncation()) {
        stats.incomplete += 1;
    }
    if diags.iter().any(|d| d.is_error()) {
        stats.with_diagnostics += 1;
        if stats.first_problem.is_none() {
            if let Some(d) = diags.iter().find(|d| d.is_error()) {
                stats.first_problem = Some((stats.packets, d.to_string()));
            }
        }
    }
    let function = msg
        .child("Header")
        .and_then(|h| h.child("Function Type"))
        .map(|n| n.summary.clone())
        .unwrap_or_else(|| "(no header)".to_string());
    *stats.functions.entry(function).or_insert(0) += 1;
}

struct Udp<'a> {
    src_port: u16,
    dst_port: u16,
    payload: &'a [u8],
}

fn udp_from_linktype(linktype: Linktype, frame: &[u8]) -> Option<Udp<'_>> {
    let (ethertype, l3) = match linktype.0 {
        1 => ethernet_l3(frame)?, // DLT_EN10MB
        101 => (ip_version_ethertype(frame)?, frame), // DLT_RAW
        113 => linux_sll_l3(frame)?, // DLT_LINUX_SLL
        _ => return None,
    };
    match ethertype {
        ETHERTYPE_IPV4 => ipv4_udp(l3),
        ETHERTYPE_IPV6 => ipv6_udp(l3),
        _ => None,
    }
}

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const IPPROTO_UDP: u8 = 17;

fn ip_version_ethertype(l3: &[u8]) -> Option<u16> {
    match l3.first()? >> 4 {
        4 => Some(ETHERTYPE_IPV4),
        6 => Some(ETHERTYPE_IPV6),
        _ => None,
    }
}

fn ethernet_l3(frame: &[u8]) -> Option<(u16, &[u8])> {
    let mut off = 12usize;
    let mut ethertype = u16::from_be_bytes([*frame.get(off)?, *frame.get(off + 1)?]);
    off += 2;
    // VLAN tags, possibly stacked
    while ethertype == 0x8100 || ethertype == 0x88a8 {
        off += 4;
        ethertype = u16::from_be_bytes([*frame.get(off - 2)?, *frame.get(off - 1)?]);
    }
    Some((ethertype, frame.get(off..)?))
}

fn linux_sll_l3(frame: &[u8]) -> Option<(u16, &[u8])> {
    let ethertype = u16::from_be_bytes([*frame.get(14)?, *frame.get(15)?]);
    Some((ethertype, frame.get(16..)?))
}

fn udp_payload(udp: &[u8]) -> Option<Udp<'_>> {
    if udp.len() < 8 {
        return None;
    }
    let udp_len = u16::from_be_bytes([udp[4], udp[5]]) as usize;
    if udp_len < 8 || udp.len() < udp_len {
        return None;
    }
    Some(Udp {
        src_port: u16::from_be_bytes([udp[0], udp[1]]),
        dst_port: u16::from_be_bytes([udp[2], udp[3]]),
        payload: &udp[8..udp_len],
    })
}

/// Fixed header only; extension headers are not followed.
fn ipv6_udp(l3: &[u8]) -> Option<Udp<'_>> {
    if l3.len() < 40 || l3[0] >> 4 != 6 || l3[6] != IPPROTO_UDP {
        return None;
    }
    let payload_len = u16::from_be_bytes([l3[4], l3[5]]) as usize;
    let end = (40 + payload_len).min(l3.len());
    udp_payload(&l3[40..end])
}

fn ipv4_udp(l3: &[u8]) -> Option<Udp<'_>> {
    if l3.len() < 20 || l3[0] >> 4 != 4 {
        return None;
    }
    let ihl = (l3[0] & 0x0f) as usize * 4;
    let total_len = u16::from_be_bytes([l3[2], l3[3]]) as usize;
    if ihl < 20 || total_len < ihl || l3.len() < ihl || l3[9] != IPPROTO_UDP {
        return None;
    }
    let end = total_len.min(l3.len());
    udp_payload(&l3[ihl..end])
}
