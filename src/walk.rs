//! Recursive TLV walker.
//!
//! Walks a region of a buffer as a sequence of 4-byte aligned TLVs:
//!
//! ```text
//!  0               2               4
//! +---------------+---------------+------------------------+-----------+
//! |  type (BE16)  | length (BE16) |  value (length bytes)  | pad (0-3) |
//! +---------------+---------------+------------------------+-----------+
//! ```
//!
//! Compound TLVs recurse into exactly their value region. Everything else is
//! handed to [`decode_value`](crate::decoders::decode_value). Malformed input
//! never aborts the walk of siblings already read: it becomes a raw node with a
//! [`Diagnostic`] attached.
//!
//! ## API summary
//!
//! | Use case | Function |
//! |----------|----------|
//! | Decode a TLV region into a tree | [`TlvWalker::walk`] / [`walk_tlvs`] |
//! | Read one TLV header | [`read_record`] |
//! | Byte extent of a TLV region without decoding values | [`tlv_extent`] |

use crate::buffer::{BoundsError, Buffer, Endianness};
use crate::config::{DecodeContext, TLV_ALIGNMENT};
use crate::decoders::{decode_value, raw};
use crate::registry::{DecodeKind, TypeDescriptor, TypeRegistry};
use crate::tree::{DecodedNode, Diagnostic, NodeKind};
use std::ops::Range;

/// Type (2) + length (2).
pub const TLV_HEADER_LEN: usize = 4;

/// Filler bytes after a value of `len` bytes so the next TLV is 4-byte aligned.
pub fn pad_for(len: usize) -> usize {
    (TLV_ALIGNMENT - len % TLV_ALIGNMENT) % TLV_ALIGNMENT
}

/// One TLV header plus where its value lives.
#[derive(Debug, Clone, Copy)]
pub struct TlvRecord<'r> {
    pub type_code: u32,
    pub declared_length: usize,
    pub pad: usize,
    /// Offset of the type field.
    pub offset: usize,
    pub descriptor: &'r TypeDescriptor,
}

impl TlvRecord<'_> {
    pub fn value_range(&self) -> Range<usize> {
        let start = self.offset + TLV_HEADER_LEN;
        start..start + self.declared_length
    }

    /// Header + value + pad.
    pub fn total_len(&self) -> usize {
        TLV_HEADER_LEN + self.declared_length + self.pad
    }
}

/// Read the TLV header at `offset`.
pub fn read_record<'r>(
    buf: &Buffer<'_>,
    offset: usize,
    registry: &'r TypeRegistry,
) -> Result<TlvRecord<'r>, BoundsError> {
    let type_code = buf.read_u16(offset, Endianness::Big)? as u32;
    let declared_length = buf.read_u16(offset + 2, Endianness::Big)? as usize;
    Ok(TlvRecord {
        type_code,
        declared_length,
        pad: pad_for(declared_length),
        offset,
        descriptor: registry.lookup(type_code),
    })
}

/// Nodes produced for one region and how far the walk got.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkOutcome {
    pub nodes: Vec<DecodedNode>,
    /// Bytes consumed from the start of the region.
    pub consumed: usize,
    /// False when the region ended in a truncated record.
    pub complete: bool,
}

/// Decodes TLV regions against one registry.
pub struct TlvWalker<'a> {
    registry: &'a TypeRegistry,
    ctx: DecodeContext<'a>,
}

impl<'a> TlvWalker<'a> {
    pub fn new(registry: &'a TypeRegistry, ctx: DecodeContext<'a>) -> Self {
        TlvWalker { registry, ctx }
    }

    /// Walk `len` bytes of `data` starting at `offset`. The region is clamped
    /// to the data actually present; clamping shows up as a truncated node.
    pub fn walk(&self, data: &[u8], offset: usize, len: usize) -> WalkOutcome {
        let buf = Buffer::new(data);
        let start = offset.min(data.len());
        let end = start.saturating_add(len).min(data.len());
        let mut out = self.walk_region(&buf, start, end, 0);
        if end - start < len {
            tracing::debug!(requested = len, available = end - start, "TLV region clamped to buffer");
            let mut node = DecodedNode::new("Missing TLV data", end, 0, NodeKind::Item);
            node.annotate(Diagnostic::Truncated { needed: len, available: end - start });
            out.nodes.push(node);
            out.complete = false;
        }
        out
    }

    fn walk_region(&self, buf: &Buffer<'_>, start: usize, end: usize, depth: usize) -> WalkOutcome {
        let mut nodes = Vec::new();
        let mut pos = start;
        let mut complete = true;

        while pos < end {
            let available = end - pos;
            if available < TLV_HEADER_LEN {
                nodes.push(truncated_raw("Truncated TLV header", buf, pos, end, TLV_HEADER_LEN));
                complete = false;
                pos = end;
                break;
            }
            let rec = match read_record(buf, pos, self.registry) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(error = %e, "TLV header unreadable");
                    nodes.push(truncated_raw("Truncated TLV header", buf, pos, end, TLV_HEADER_LEN));
                    complete = false;
                    pos = end;
                    break;
                }
            };
            let value_start = pos + TLV_HEADER_LEN;
            let value_available = end - value_start;
            let desc = rec.descriptor;
            tracing::trace!(code = rec.type_code, len = rec.declared_length, name = %desc.name, depth, "tlv");

            if desc.kind == DecodeKind::Compound {
                if rec.declared_length == 0 {
                    tracing::debug!(code = rec.type_code, "empty compound TLV");
                    let mut node = tlv_node(&rec, TLV_HEADER_LEN).with_summary("<empty>");
                    node.annotate(Diagnostic::EmptyCompound);
                    nodes.push(node);
                    pos += TLV_HEADER_LEN;
                    continue;
                }
                let value_len = rec.declared_length.min(value_available);
                let mut node;
                if depth + 1 >= self.ctx.config.max_depth {
                    tracing::debug!(code = rec.type_code, depth, "compound nesting limit reached");
                    let opaque = raw(buf.bytes_clamped(value_start, value_len));
                    node = tlv_node(&rec, TLV_HEADER_LEN + value_len)
                        .with_summary(opaque.summary)
                        .with_value(opaque.value);
                    node.annotate(Diagnostic::DepthExceeded { limit: self.ctx.config.max_depth });
                } else {
                    let inner = self.walk_region(buf, value_start, value_start + value_len, depth + 1);
                    assert!(inner.consumed <= value_len, "compound children overran their parent");
                    node = tlv_node(&rec, TLV_HEADER_LEN + value_len)
                        .with_summary(format!("{} nested TLVs", inner.nodes.len()));
                    node.children = inner.nodes;
                }
                if rec.declared_length + rec.pad > value_available {
                    node.annotate(Diagnostic::Truncated {
                        needed: rec.declared_length + rec.pad,
                        available: value_available,
                    });
                    nodes.push(node);
                    complete = false;
                    pos = end;
                    break;
                }
                node.length = rec.total_len();
                nodes.push(node);
                pos += rec.total_len();
                continue;
            }

            if rec.declared_length + rec.pad > value_available {
                tracing::debug!(
                    code = rec.type_code,
                    needed = rec.declared_length + rec.pad,
                    available = value_available,
                    "truncated TLV value"
                );
                let bytes = buf.bytes_clamped(value_start, value_available);
                let partial = raw(bytes);
                let mut node = tlv_node(&rec, TLV_HEADER_LEN + value_available)
                    .with_summary(partial.summary)
                    .with_value(partial.value);
                if desc.is_unknown() {
                    node.annotate(Diagnostic::UnknownType { code: rec.type_code });
                }
                node.annotate(Diagnostic::Truncated {
                    needed: rec.declared_length + rec.pad,
                    available: value_available,
                });
                nodes.push(node);
                complete = false;
                pos = end;
                break;
            }

            let bytes = buf.bytes_clamped(value_start, rec.declared_length);
            let decoded = decode_value(desc.kind, desc.symbols.as_ref(), bytes, value_start, self.ctx.resolver);
            let mut node = tlv_node(&rec, rec.total_len()).with_summary(decoded.summary).with_value(decoded.value);
            node.children = decoded.children;
            if desc.is_unknown() {
                node.annotate(Diagnostic::UnknownType { code: rec.type_code });
            }
            node.diagnostics.extend(decoded.diagnostics);
            nodes.push(node);
            pos += rec.total_len();
        }

        assert!(pos <= end, "TLV cursor {} moved past region end {}", pos, end);
        WalkOutcome { nodes, consumed: pos - start, complete }
    }
}

fn tlv_node(rec: &TlvRecord<'_>, length: usize) -> DecodedNode {
    DecodedNode::new(rec.descriptor.name.clone(), rec.offset, length, NodeKind::Tlv(rec.descriptor.kind))
        .with_code(rec.type_code)
}

fn truncated_raw(label: &str, buf: &Buffer<'_>, pos: usize, end: usize, needed: usize) -> DecodedNode {
    let bytes = buf.bytes_clamped(pos, end - pos);
    let partial = raw(bytes);
    let mut node = DecodedNode::new(label, pos, end - pos, NodeKind::Item)
        .with_summary(partial.summary)
        .with_value(partial.value);
    node.annotate(Diagnostic::Truncated { needed, available: end - pos });
    node
}

/// Decode every TLV in `data` with default configuration.
pub fn walk_tlvs(registry: &TypeRegistry, data: &[u8], ctx: DecodeContext<'_>) -> WalkOutcome {
    TlvWalker::new(registry, ctx).walk(data, 0, data.len())
}

/// Bytes covered by the well-formed TLV prefix of `data[offset..offset + len]`,
/// following headers only (no value decoding, no recursion).
pub fn tlv_extent(data: &[u8], offset: usize, len: usize) -> usize {
    let buf = Buffer::new(data);
    let start = offset.min(data.len());
    let end = start.saturating_add(len).min(data.len());
    let mut pos = start;
    while pos + TLV_HEADER_LEN <= end {
        let declared = match buf.read_u16(pos + 2, Endianness::Big) {
            Ok(l) => l as usize,
            Err(_) => break,
        };
        let total = TLV_HEADER_LEN + declared + pad_for(declared);
        if pos + total > end {
            break;
        }
        pos += total;
    }
    pos - start
}
