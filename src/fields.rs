//! Field-table walker: ordered field descriptors over one flat buffer.
//!
//! A table is a static slice of [`FieldDescriptor`]s evaluated front to back
//! with a single cursor. Variable-length fields get their width from a
//! *length cell* written by an earlier field of the same evaluation:
//!
//! ```text
//! cbDomain   : 2 bytes, writes cell D
//! ...
//! Domain     : 0 bytes, reads cell D, string, NUL excluded
//! ```
//!
//! Cells and the captured info-flags word live in a [`FieldScratch`] owned by
//! the caller, so two evaluations never share state.
//!
//! Flags:
//!
//! - `STRING`: text, NUL-terminated within the field width. `UNICODE` forces
//!   UTF-16LE, `ANSI` forces 8-bit; otherwise the captured info flags decide.
//! - `NO_ADVANCE`: read and display without moving the cursor.
//! - `SUBTREE`: open a labeled scope and evaluate `subfields` with the same cursor.
//! - `INFO_FLAGS`: capture this field's value as the info-flags word.
//! - `NUL_EXCLUDED`: the cell counts text without its terminator; the width
//!   grows by one code unit (2 bytes UTF-16, 1 byte 8-bit).

use crate::buffer::{hex_string, uint_from_slice, Buffer, Endianness};
use crate::config::DecodeContext;
use crate::tree::{DecodedNode, Diagnostic, NodeKind};
use crate::value::DecodedValue;
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;
use std::ops::BitOr;

/// Info-flags bit selecting UTF-16LE for encoding-dependent strings.
pub const INFO_UNICODE: u32 = 0x0000_0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FieldFlags(u8);

impl FieldFlags {
    pub const NONE: FieldFlags = FieldFlags(0);
    pub const STRING: FieldFlags = FieldFlags(0x01);
    pub const UNICODE: FieldFlags = FieldFlags(0x02);
    pub const ANSI: FieldFlags = FieldFlags(0x04);
    pub const NO_ADVANCE: FieldFlags = FieldFlags(0x08);
    pub const SUBTREE: FieldFlags = FieldFlags(0x10);
    pub const INFO_FLAGS: FieldFlags = FieldFlags(0x20);
    pub const NUL_EXCLUDED: FieldFlags = FieldFlags(0x40);

    pub const fn union(self, other: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        self.union(rhs)
    }
}

/// Handle of a length cell inside a [`FieldScratch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(pub u8);

/// How a non-string field is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat<'t> {
    Unsigned,
    Hex,
    Enum(&'t [(u32, &'t str)]),
    /// Table keyed by bit mask.
    BitFlags(&'t [(u32, &'t str)]),
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor<'t> {
    pub label: &'t str,
    /// 0 means "take the width from `length_cell`".
    pub fixed_length: u32,
    pub length_cell: Option<CellId>,
    /// Added to the value before it is stored in `length_cell`.
    pub offset_adjust: i32,
    pub flags: FieldFlags,
    pub format: FieldFormat<'t>,
    pub subfields: &'t [FieldDescriptor<'t>],
}

impl<'t> FieldDescriptor<'t> {
    pub const fn fixed(label: &'t str, len: u32) -> Self {
        FieldDescriptor {
            label,
            fixed_length: len,
            length_cell: None,
            offset_adjust: 0,
            flags: FieldFlags::NONE,
            format: FieldFormat::Unsigned,
            subfields: &[],
        }
    }

    /// Fixed-width numeric field whose value (+ `adjust`) becomes the width of a later field.
    pub const fn length(label: &'t str, len: u32, cell: CellId, adjust: i32) -> Self {
        FieldDescriptor { length_cell: Some(cell), offset_adjust: adjust, ..FieldDescriptor::fixed(label, len) }
    }

    /// Field whose width comes from `cell`.
    pub const fn variable(label: &'t str, cell: CellId) -> Self {
        FieldDescriptor { length_cell: Some(cell), ..FieldDescriptor::fixed(label, 0) }
    }

    pub const fn subtree(label: &'t str, len: u32, subfields: &'t [FieldDescriptor<'t>]) -> Self {
        FieldDescriptor { flags: FieldFlags::SUBTREE, subfields, ..FieldDescriptor::fixed(label, len) }
    }

    pub const fn with_flags(self, flags: FieldFlags) -> Self {
        FieldDescriptor { flags: self.flags.union(flags), ..self }
    }

    pub const fn with_format(self, format: FieldFormat<'t>) -> Self {
        FieldDescriptor { format, ..self }
    }

    pub const fn string(self) -> Self {
        self.with_flags(FieldFlags::STRING)
    }

    /// String whose length cell leaves out the terminating NUL.
    pub const fn nul_excluded(self) -> Self {
        self.with_flags(FieldFlags::STRING.union(FieldFlags::NUL_EXCLUDED))
    }

    pub const fn peek(self) -> Self {
        self.with_flags(FieldFlags::NO_ADVANCE)
    }

    fn writes_cell(&self) -> bool {
        self.fixed_length != 0 && self.length_cell.is_some()
    }
}

/// Per-evaluation mutable state: length cells and the captured info flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldScratch {
    cells: HashMap<CellId, u32>,
    info_flags: Option<u32>,
}

impl FieldScratch {
    pub fn new() -> Self {
        FieldScratch::default()
    }

    pub fn cell(&self, id: CellId) -> Option<u32> {
        self.cells.get(&id).copied()
    }

    pub fn set_cell(&mut self, id: CellId, v: u32) {
        self.cells.insert(id, v);
    }

    pub fn info_flags(&self) -> Option<u32> {
        self.info_flags
    }

    /// Seed the info flags from state captured elsewhere (e.g. a previous PDU).
    pub fn set_info_flags(&mut self, flags: u32) {
        self.info_flags = Some(flags);
    }
}

/// Nodes of one table evaluation and where the cursor stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutcome {
    pub nodes: Vec<DecodedNode>,
    pub end_offset: usize,
    /// A mandatory read ran past the end of the buffer.
    pub incomplete: bool,
}

/// Evaluates field tables in one byte order.
pub struct FieldWalker<'a> {
    ctx: DecodeContext<'a>,
    endianness: Endianness,
}

impl<'a> FieldWalker<'a> {
    pub fn new(ctx: DecodeContext<'a>, endianness: Endianness) -> Self {
        FieldWalker { ctx, endianness }
    }

    /// Evaluate `fields` at `offset`. A non-zero `total_len` stops the walk once
    /// that many bytes are consumed, skipping optional trailing fields.
    pub fn walk(
        &self,
        data: &[u8],
        offset: usize,
        fields: &[FieldDescriptor<'_>],
        total_len: usize,
        scratch: &mut FieldScratch,
    ) -> FieldOutcome {
        let buf = Buffer::new(data);
        self.walk_fields(&buf, offset, fields, total_len, scratch, 0)
    }

    fn walk_fields(
        &self,
        buf: &Buffer<'_>,
        base: usize,
        fields: &[FieldDescriptor<'_>],
        total_len: usize,
        scratch: &mut FieldScratch,
        depth: usize,
    ) -> FieldOutcome {
        let mut nodes = Vec::new();
        let mut pos = base;
        let mut incomplete = false;

        for f in fields {
            if total_len != 0 && pos - base >= total_len {
                tracing::trace!(field = f.label, total_len, "length budget consumed, skipping optional fields");
                break;
            }

            let len = self.resolve_length(f, scratch);

            if f.flags.contains(FieldFlags::SUBTREE) {
                if depth + 1 >= self.ctx.config.max_depth {
                    let mut node = DecodedNode::new(f.label, pos, 0, NodeKind::Subtree);
                    node.annotate(Diagnostic::DepthExceeded { limit: self.ctx.config.max_depth });
                    nodes.push(node);
                    incomplete = true;
                    break;
                }
                let inner = self.walk_fields(buf, pos, f.subfields, 0, scratch, depth + 1);
                let consumed = inner.end_offset - pos;
                let mut node = DecodedNode::new(f.label, pos, if consumed > 0 { consumed } else { len }, NodeKind::Subtree);
                node.children = inner.nodes;
                pos = inner.end_offset;
                nodes.push(node);
                if inner.incomplete {
                    incomplete = true;
                    break;
                }
                continue;
            }

            let bytes = match buf.bytes(pos, len) {
                Ok(b) => b,
                Err(e) => {
                    tracing::debug!(field = f.label, error = %e, "field runs past end of buffer");
                    let present = buf.bytes_clamped(pos, len);
                    let mut node = DecodedNode::new(f.label, pos, present.len(), NodeKind::Field)
                        .with_summary(hex_string(present))
                        .with_value(DecodedValue::Bytes(present.to_vec()));
                    node.annotate(Diagnostic::Truncated { needed: e.needed, available: e.available });
                    nodes.push(node);
                    pos += present.len();
                    incomplete = true;
                    break;
                }
            };

            let numeric = uint_from_slice(bytes, self.endianness);
            let node = if f.flags.contains(FieldFlags::STRING) {
                let text = if is_unicode(f, scratch) { utf16le_z(bytes) } else { ansi_z(bytes) };
                DecodedNode::new(f.label, pos, len, NodeKind::Field)
                    .with_summary(text.clone())
                    .with_value(DecodedValue::Text(text))
            } else {
                self.numeric_node(f, bytes, numeric, pos)
            };

            if f.flags.contains(FieldFlags::INFO_FLAGS) {
                if let Some(v) = numeric {
                    scratch.info_flags = Some(v);
                }
            }
            if f.writes_cell() {
                if let (Some(cell), Some(v)) = (f.length_cell, numeric) {
                    let adjusted = (v as i64 + f.offset_adjust as i64).clamp(0, u32::MAX as i64) as u32;
                    scratch.set_cell(cell, adjusted);
                }
            }
            nodes.push(node);
            if !f.flags.contains(FieldFlags::NO_ADVANCE) {
                pos += len;
            }
        }

        FieldOutcome { nodes, end_offset: pos, incomplete }
    }

    fn resolve_length(&self, f: &FieldDescriptor<'_>, scratch: &FieldScratch) -> usize {
        if f.fixed_length != 0 {
            return f.fixed_length as usize;
        }
        match f.length_cell {
            Some(cell) => match scratch.cell(cell) {
                Some(v) if f.flags.contains(FieldFlags::NUL_EXCLUDED) => {
                    v as usize + if is_unicode(f, scratch) { 2 } else { 1 }
                }
                Some(v) => v as usize,
                None => {
                    tracing::warn!(field = f.label, cell = cell.0, "length cell read before it was written");
                    0
                }
            },
            None => 0,
        }
    }

    fn numeric_node(&self, f: &FieldDescriptor<'_>, bytes: &[u8], numeric: Option<u32>, pos: usize) -> DecodedNode {
        let node = DecodedNode::new(f.label, pos, bytes.len(), NodeKind::Field);
        let v = match (f.format, numeric) {
            (FieldFormat::Bytes, _) | (_, None) => {
                let summary = if bytes.is_empty() { "<empty>".to_string() } else { hex_string(bytes) };
                return node.with_summary(summary).with_value(DecodedValue::Bytes(bytes.to_vec()));
            }
            (_, Some(v)) => v,
        };
        let digits = bytes.len() * 2;
        let mut node = node.with_value(DecodedValue::Unsigned(v));
        match f.format {
            FieldFormat::Unsigned => node.summary = v.to_string(),
            FieldFormat::Hex => node.summary = format!("0x{:0w$x}", v, w = digits),
            FieldFormat::Enum(table) => {
                node.summary = match lookup(table, v) {
                    Some(name) => format!("{} ({})", name, v),
                    None => format!("Unknown ({})", v),
                };
            }
            FieldFormat::BitFlags(table) => {
                let mut names = Vec::new();
                for bit in (0..bytes.len() * 8).rev() {
                    let mask = 1u32 << bit;
                    if v & mask == 0 {
                        continue;
                    }
                    let name = lookup(table, mask).unwrap_or("Unknown");
                    names.push(name);
                    node.push_child(
                        DecodedNode::new(name, pos, bytes.len(), NodeKind::Item)
                            .with_summary(format!("0x{:0w$x}", mask, w = digits))
                            .with_value(DecodedValue::Unsigned(mask)),
                    );
                }
                node.summary = if names.is_empty() {
                    format!("0x{:0w$x}", v, w = digits)
                } else {
                    format!("0x{:0w$x} ({})", v, names.join(", "), w = digits)
                };
            }
            FieldFormat::Bytes => {}
        }
        node
    }
}

/// `UNICODE` and `ANSI` win over the captured info flags; no flags means 8-bit.
fn is_unicode(f: &FieldDescriptor<'_>, scratch: &FieldScratch) -> bool {
    if f.flags.contains(FieldFlags::UNICODE) {
        true
    } else if f.flags.contains(FieldFlags::ANSI) {
        false
    } else {
        scratch.info_flags.map(|v| v & INFO_UNICODE != 0).unwrap_or(false)
    }
}

fn lookup<'t>(table: &[(u32, &'t str)], v: u32) -> Option<&'t str> {
    table.iter().find(|(k, _)| *k == v).map(|(_, n)| *n)
}

/// 8-bit text up to the first NUL.
fn ansi_z(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// UTF-16LE text up to the first NUL code unit; a trailing odd byte is ignored.
fn utf16le_z(bytes: &[u8]) -> String {
    let units = bytes.chunks_exact(2).map(LittleEndian::read_u16).take_while(|&u| u != 0);
    char::decode_utf16(units).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_union_and_contains() {
        let f = FieldFlags::STRING | FieldFlags::UNICODE;
        assert!(f.contains(FieldFlags::STRING));
        assert!(f.contains(FieldFlags::UNICODE));
        assert!(!f.contains(FieldFlags::ANSI));
        assert!(f.contains(FieldFlags::NONE));
    }

    #[test]
    fn string_helpers_stop_at_nul() {
        assert_eq!(ansi_z(b"abc\0def"), "abc");
        assert_eq!(ansi_z(b""), "");
        assert_eq!(utf16le_z(&[b'h', 0, b'i', 0, 0, 0, b'x', 0]), "hi");
        assert_eq!(utf16le_z(&[b'a', 0, b'b']), "a");
    }

    #[test]
    fn const_builders_compose() {
        const CELL: CellId = CellId(3);
        const F: FieldDescriptor<'static> = FieldDescriptor::length("cb", 2, CELL, 2).peek();
        assert_eq!(F.fixed_length, 2);
        assert_eq!(F.length_cell, Some(CELL));
        assert_eq!(F.offset_adjust, 2);
        assert!(F.flags.contains(FieldFlags::NO_ADVANCE));
        assert!(F.writes_cell());
        assert!(!FieldDescriptor::variable("s", CELL).writes_cell());
    }

    #[test]
    fn nul_excluded_width_follows_encoding() {
        const CELL: CellId = CellId(0);
        let ctx = DecodeContext::default();
        let walker = FieldWalker::new(ctx, Endianness::Little);
        let f = FieldDescriptor::variable("s", CELL).nul_excluded();
        assert!(f.flags.contains(FieldFlags::STRING));

        let mut scratch = FieldScratch::new();
        scratch.set_cell(CELL, 4);
        assert_eq!(walker.resolve_length(&f, &scratch), 5);
        scratch.set_info_flags(INFO_UNICODE);
        assert_eq!(walker.resolve_length(&f, &scratch), 6);
        let forced = f.with_flags(FieldFlags::ANSI);
        assert_eq!(walker.resolve_length(&forced, &scratch), 5);

        let plain = FieldDescriptor::variable("p", CELL);
        assert_eq!(walker.resolve_length(&plain, &scratch), 4);
    }
}
