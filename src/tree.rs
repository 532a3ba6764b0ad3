//! Output tree: labeled nodes with byte ranges, display text and diagnostics.

use crate::registry::DecodeKind;
use crate::value::DecodedValue;
use std::fmt;

/// A recoverable, node-level condition. None of these abort a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    UnknownType { code: u32 },
    LengthMismatch { kind: DecodeKind, expected: String, actual: usize },
    Truncated { needed: usize, available: usize },
    EmptyCompound,
    /// Not an error: records which interpretation a length-ambiguous value got.
    AmbiguousLengthResolved { length: usize, resolved_as: &'static str },
    DepthExceeded { limit: usize },
}

impl Diagnostic {
    /// Truncation-class conditions mark the node as incomplete.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Diagnostic::Truncated { .. } | Diagnostic::DepthExceeded { .. })
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Diagnostic::AmbiguousLengthResolved { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownType { code } => write!(f, "unknown type {}", code),
            Diagnostic::LengthMismatch { kind, expected, actual } => {
                write!(f, "{} value length {} is not {}", kind, actual, expected)
            }
            Diagnostic::Truncated { needed, available } => {
                write!(f, "truncated: needed {} bytes, {} available", needed, available)
            }
            Diagnostic::EmptyCompound => write!(f, "compound TLV with zero length"),
            Diagnostic::AmbiguousLengthResolved { length, resolved_as } => {
                write!(f, "length {} decoded as {}", length, resolved_as)
            }
            Diagnostic::DepthExceeded { limit } => write!(f, "nesting deeper than {}", limit),
        }
    }
}

/// What produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Message,
    Header,
    Tlv(DecodeKind),
    Field,
    Subtree,
    /// List entries, set bits and other children synthesized by a decoder.
    Item,
}

/// One node of the decoded tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNode {
    pub label: String,
    /// TLV type code, when the node came from a TLV header.
    pub code: Option<u32>,
    pub offset: usize,
    pub length: usize,
    pub summary: String,
    pub kind: NodeKind,
    pub value: DecodedValue,
    pub diagnostics: Vec<Diagnostic>,
    pub children: Vec<DecodedNode>,
}

impl DecodedNode {
    pub fn new(label: impl Into<String>, offset: usize, length: usize, kind: NodeKind) -> Self {
        DecodedNode {
            label: label.into(),
            code: None,
            offset,
            length,
            summary: String::new(),
            kind,
            value: DecodedValue::None,
            diagnostics: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_value(mut self, value: DecodedValue) -> Self {
        self.value = value;
        self
    }

    pub fn push_child(&mut self, child: DecodedNode) {
        self.children.push(child);
    }

    pub fn annotate(&mut self, d: Diagnostic) {
        self.diagnostics.push(d);
    }

    /// Byte range `[offset, offset + length)`.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.length
    }

    pub fn is_incomplete(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_truncation)
    }

    /// First direct child with the given label.
    pub fn child(&self, label: &str) -> Option<&DecodedNode> {
        self.children.iter().find(|c| c.label == label)
    }

    /// Depth-first search over this node and all descendants.
    pub fn find(&self, label: &str) -> Option<&DecodedNode> {
        if self.label == label {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(label))
    }

    /// Move this subtree by `delta` bytes (rebasing a sub-dissector's output).
    pub fn shift(&mut self, delta: usize) {
        self.offset += delta;
        for c in &mut self.children {
            c.shift(delta);
        }
    }

    /// All diagnostics in this subtree, depth first.
    pub fn all_diagnostics(&self) -> Vec<&Diagnostic> {
        let mut out: Vec<&Diagnostic> = self.diagnostics.iter().collect();
        for c in &self.children {
            out.extend(c.all_diagnostics());
        }
        out
    }
}
