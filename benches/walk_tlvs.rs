//! Benchmark: TLV walk over synthetic ASN-CP bodies with the bundled dictionary.
//! Flat scalar records, nested compounds and a full message (header table + body).

use asncp_dissect::asncp::{self, dissect_message};
use asncp_dissect::walk::{tlv_extent, TlvWalker};
use asncp_dissect::DecodeContext;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn tlv(code: u16, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + value.len() + 3);
    out.extend_from_slice(&code.to_be_bytes());
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

fn flat_body(records: usize) -> Vec<u8> {
    let mut body = Vec::new();
    for i in 0..records {
        match i % 5 {
            0 => body.extend(tlv(0x0001, &[1])),
            1 => body.extend(tlv(0x005c, &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55])),
            2 => body.extend(tlv(0x0009, &[10, 0, 0, 1])),
            3 => body.extend(tlv(0x008a, &[0xc0, 0x00])),
            _ => body.extend(tlv(0x005f, b"user@example.net")),
        }
    }
    body
}

fn nested_body(depth: usize) -> Vec<u8> {
    let mut inner = tlv(0x0001, &[0]);
    for _ in 0..depth {
        inner = tlv(0x0005, &inner);
    }
    inner
}

fn message(body: &[u8]) -> Vec<u8> {
    let mut msg = vec![1, 0, 2, 0x24];
    msg.extend_from_slice(&((20 + body.len()) as u16).to_be_bytes());
    msg.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    msg.extend_from_slice(&[0, 0, 0, 0, 0x00, 0x2a, 0, 0]);
    msg.extend_from_slice(body);
    msg
}

fn bench_walk(c: &mut Criterion) {
    let registry = match asncp::default_registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Skip bench: bundled dictionary: {}", e);
            return;
        }
    };
    let flat = flat_body(200);
    let nested = nested_body(32);
    let msg = message(&flat);
    let ctx = DecodeContext::default();

    c.bench_function("extent_flat_200", |b| {
        b.iter(|| black_box(tlv_extent(black_box(&flat), 0, flat.len())))
    });
    c.bench_function("walk_flat_200", |b| {
        let walker = TlvWalker::new(&registry, ctx);
        b.iter(|| black_box(walker.walk(black_box(&flat), 0, flat.len())))
    });
    c.bench_function("walk_nested_32", |b| {
        let walker = TlvWalker::new(&registry, ctx);
        b.iter(|| black_box(walker.walk(black_box(&nested), 0, nested.len())))
    });
    c.bench_function("dissect_message_200", |b| {
        b.iter(|| black_box(dissect_message(black_box(&msg), &registry, ctx)))
    });
}

criterion_group!(benches, bench_walk);
criterion_main!(benches);
