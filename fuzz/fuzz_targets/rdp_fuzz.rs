//! RDP fuzz target: arbitrary bytes as GCC user data, then as a Client Info PDU
//! and a channel PDU on the same connection. Node ranges must stay inside the input.
//! Build with: cargo fuzz run rdp_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fn within(node: &asncp_dissect::DecodedNode, len: usize) -> bool {
    node.range().end <= len && node.children.iter().all(|c| within(c, len))
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use asncp_dissect::rdp;
    use asncp_dissect::{ConnectionKey, DecodeContext, DissectorTable, MemorySessionStore};
    use std::net::{Ipv4Addr, SocketAddr};

    let conn = ConnectionKey::new(
        SocketAddr::from((Ipv4Addr::new(10, 0, 0, 1), 50000)),
        SocketAddr::from((Ipv4Addr::new(10, 0, 0, 2), 3389)),
    );
    let mut store = MemorySessionStore::new();
    let gcc = rdp::dissect_gcc_user_data(data, conn, &mut store, DecodeContext::default());
    assert!(gcc.children.iter().all(|b| b.offset <= data.len()));
    let info = rdp::dissect_client_info(data, conn, &mut store, DecodeContext::default());
    assert!(within(&info, data.len()));
    let table: DissectorTable<String> = DissectorTable::new();
    let chan = rdp::dissect_channel_data(data, 1004, conn, &store, &table, DecodeContext::default());
    assert!(within(&chan, data.len()));
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run rdp_fuzz");
}
