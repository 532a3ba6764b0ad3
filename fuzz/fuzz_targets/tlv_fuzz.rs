//! TLV walker fuzz target: arbitrary bytes as an ASN-CP message and as a bare TLV body.
//! Decoding must not panic, and the walker never reports more bytes than it was given.
//! Build with: cargo fuzz run tlv_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use asncp_dissect::{asncp, walk_tlvs, DecodeContext};
    let Ok(registry) = asncp::default_registry() else { return };
    let out = walk_tlvs(&registry, data, DecodeContext::default());
    assert!(out.consumed <= data.len());
    let msg = asncp::dissect_message(data, &registry, DecodeContext::default());
    assert!(msg.length <= data.len());
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run tlv_fuzz");
}
