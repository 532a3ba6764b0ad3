//! TLV type registry: code → descriptor, built once and shared read-only.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Mutex;

/// How a TLV payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeKind {
    Compound,
    FixedBytes,
    Enum8,
    Enum16,
    Enum32,
    BitFlags8,
    BitFlags16,
    BitFlags32,
    Dec8,
    Dec16,
    Dec32,
    Hex8,
    Hex16,
    Hex32,
    AsciiString,
    Flag0,
    Ether,
    IdAmbiguousByLength,
    Ipv4,
    IpAddress,
    ProtocolList,
    PortRangeList,
    IpAddressMaskList,
    VendorSpecific,
    Eap,
}

/// Byte-length contract of a decode kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Any,
    Exact(usize),
    MultipleOf(usize),
    AtLeast(usize),
    /// One of a few exact lengths (ambiguous kinds).
    OneOf(&'static [usize]),
}

impl LengthRule {
    pub fn accepts(&self, len: usize) -> bool {
        match *self {
            LengthRule::Any => true,
            LengthRule::Exact(n) => len == n,
            LengthRule::MultipleOf(n) => n != 0 && len % n == 0,
            LengthRule::AtLeast(n) => len >= n,
            LengthRule::OneOf(set) => set.contains(&len),
        }
    }
}

impl fmt::Display for LengthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthRule::Any => write!(f, "any length"),
            LengthRule::Exact(n) => write!(f, "exactly {}", n),
            LengthRule::MultipleOf(n) => write!(f, "a multiple of {}", n),
            LengthRule::AtLeast(n) => write!(f, "at least {}", n),
            LengthRule::OneOf(set) => {
                let parts: Vec<String> = set.iter().map(|n| n.to_string()).collect();
                write!(f, "one of {}", parts.join("/"))
            }
        }
    }
}

impl DecodeKind {
    pub const ALL: [DecodeKind; 25] = [
        DecodeKind::Compound,
        DecodeKind::FixedBytes,
        DecodeKind::Enum8,
        DecodeKind::Enum16,
        DecodeKind::Enum32,
        DecodeKind::BitFlags8,
        DecodeKind::BitFlags16,
        DecodeKind::BitFlags32,
        DecodeKind::Dec8,
        DecodeKind::Dec16,
        DecodeKind::Dec32,
        DecodeKind::Hex8,
        DecodeKind::Hex16,
        DecodeKind::Hex32,
        DecodeKind::AsciiString,
        DecodeKind::Flag0,
        DecodeKind::Ether,
        DecodeKind::IdAmbiguousByLength,
        DecodeKind::Ipv4,
        DecodeKind::IpAddress,
        DecodeKind::ProtocolList,
        DecodeKind::PortRangeList,
        DecodeKind::IpAddressMaskList,
        DecodeKind::VendorSpecific,
        DecodeKind::Eap,
    ];

    pub fn length_rule(self) -> LengthRule {
        match self {
            DecodeKind::Compound | DecodeKind::FixedBytes | DecodeKind::AsciiString => LengthRule::Any,
            DecodeKind::Enum8 | DecodeKind::BitFlags8 | DecodeKind::Dec8 | DecodeKind::Hex8 => LengthRule::Exact(1),
            DecodeKind::Enum16 | DecodeKind::BitFlags16 | DecodeKind::Dec16 | DecodeKind::Hex16 => LengthRule::Exact(2),
            DecodeKind::Enum32 | DecodeKind::BitFlags32 | DecodeKind::Dec32 | DecodeKind::Hex32 => LengthRule::Exact(4),
            DecodeKind::Flag0 => LengthRule::Exact(0),
            DecodeKind::Ether => LengthRule::Exact(6),
            DecodeKind::Ipv4 => LengthRule::Exact(4),
            DecodeKind::IdAmbiguousByLength => LengthRule::OneOf(&[4, 6, 16]),
            DecodeKind::IpAddress => LengthRule::OneOf(&[4, 16]),
            DecodeKind::ProtocolList => LengthRule::MultipleOf(2),
            DecodeKind::PortRangeList => LengthRule::MultipleOf(4),
            DecodeKind::IpAddressMaskList => LengthRule::MultipleOf(8),
            DecodeKind::VendorSpecific => LengthRule::AtLeast(3),
            DecodeKind::Eap => LengthRule::AtLeast(4),
        }
    }

    /// Keyword used in dictionary files.
    pub fn keyword(self) -> &'static str {
        match self {
            DecodeKind::Compound => "compound",
            DecodeKind::FixedBytes => "bytes",
            DecodeKind::Enum8 => "enum8",
            DecodeKind::Enum16 => "enum16",
            DecodeKind::Enum32 => "enum32",
            DecodeKind::BitFlags8 => "bitflags8",
            DecodeKind::BitFlags16 => "bitflags16",
            DecodeKind::BitFlags32 => "bitflags32",
            DecodeKind::Dec8 => "dec8",
            DecodeKind::Dec16 => "dec16",
            DecodeKind::Dec32 => "dec32",
            DecodeKind::Hex8 => "hex8",
            DecodeKind::Hex16 => "hex16",
            DecodeKind::Hex32 => "hex32",
            DecodeKind::AsciiString => "ascii_string",
            DecodeKind::Flag0 => "flag0",
            DecodeKind::Ether => "ether",
            DecodeKind::IdAmbiguousByLength => "id",
            DecodeKind::Ipv4 => "ipv4_address",
            DecodeKind::IpAddress => "ip_address",
            DecodeKind::ProtocolList => "protocol_list",
            DecodeKind::PortRangeList => "port_range_list",
            DecodeKind::IpAddressMaskList => "ip_address_mask_list",
            DecodeKind::VendorSpecific => "vendor_specific",
            DecodeKind::Eap => "eap",
        }
    }

    pub fn from_keyword(s: &str) -> Option<DecodeKind> {
        DecodeKind::ALL.iter().copied().find(|k| k.keyword() == s)
    }

    /// Kinds whose rendering consults a symbol table.
    pub fn uses_symbols(self) -> bool {
        matches!(
            self,
            DecodeKind::Enum8
                | DecodeKind::Enum16
                | DecodeKind::Enum32
                | DecodeKind::BitFlags8
                | DecodeKind::BitFlags16
                | DecodeKind::BitFlags32
        )
    }
}

impl fmt::Display for DecodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Ordered numeric value → name table (enumerations and bit-flag names).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    entries: Vec<(u32, String)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (u32, S)>) -> Self {
        let mut t = SymbolTable::new();
        for (v, name) in pairs {
            t.insert(v, name);
        }
        t
    }

    /// Insert or replace the name for `value`; keeps entries sorted by value.
    pub fn insert<S: Into<String>>(&mut self, value: u32, name: S) {
        match self.entries.binary_search_by_key(&value, |(v, _)| *v) {
            Ok(i) => self.entries[i].1 = name.into(),
            Err(i) => self.entries.insert(i, (value, name.into())),
        }
    }

    pub fn get(&self, value: u32) -> Option<&str> {
        self.entries
            .binary_search_by_key(&value, |(v, _)| *v)
            .ok()
            .map(|i| self.entries[i].1.as_str())
    }

    /// Name for `value`, or `Unknown (N)`.
    pub fn name_or_unknown(&self, value: u32) -> String {
        match self.get(value) {
            Some(name) => name.to_string(),
            None => format!("Unknown ({})", value),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(v, n)| (*v, n.as_str()))
    }
}

/// Registry entry: one TLV type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub code: u32,
    pub name: String,
    pub kind: DecodeKind,
    pub symbols: Option<SymbolTable>,
}

impl TypeDescriptor {
    pub fn new(code: u32, name: impl Into<String>, kind: DecodeKind) -> Self {
        TypeDescriptor { code, name: name.into(), kind, symbols: None }
    }

    pub fn with_symbols(mut self, symbols: SymbolTable) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_NAME && self.kind == DecodeKind::FixedBytes
    }
}

pub const UNKNOWN_NAME: &str = "Unknown";

/// Duplicate code at registry build time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate TLV code {code} ({first} / {second})")]
pub struct DuplicateCode {
    pub code: u32,
    pub first: String,
    pub second: String,
}

/// Immutable code → descriptor map. Lookups never fail.
#[derive(Debug)]
pub struct TypeRegistry {
    by_code: HashMap<u32, TypeDescriptor>,
    unknown: TypeDescriptor,
    log_unknown: bool,
    seen_unknown: Mutex<BTreeSet<u32>>,
}

impl TypeRegistry {
    /// Build from descriptors; rejects duplicate codes.
    pub fn from_entries(entries: impl IntoIterator<Item = TypeDescriptor>) -> Result<Self, DuplicateCode> {
        let mut by_code: HashMap<u32, TypeDescriptor> = HashMap::new();
        for d in entries {
            if let Some(prev) = by_code.get(&d.code) {
                return Err(DuplicateCode { code: d.code, first: prev.name.clone(), second: d.name });
            }
            by_code.insert(d.code, d);
        }
        Ok(TypeRegistry {
            by_code,
            unknown: TypeDescriptor::new(0, UNKNOWN_NAME, DecodeKind::FixedBytes),
            log_unknown: false,
            seen_unknown: Mutex::new(BTreeSet::new()),
        })
    }

    /// Emit a debug event the first time each unmapped code is looked up.
    pub fn with_unknown_logging(mut self, on: bool) -> Self {
        self.log_unknown = on;
        self
    }

    /// Total lookup: unmapped codes resolve to the synthetic "Unknown" raw-bytes descriptor.
    pub fn lookup(&self, code: u32) -> &TypeDescriptor {
        match self.by_code.get(&code) {
            Some(d) => d,
            None => {
                if self.log_unknown {
                    self.note_unknown(code);
                }
                &self.unknown
            }
        }
    }

    pub fn get(&self, code: u32) -> Option<&TypeDescriptor> {
        self.by_code.get(&code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Descriptors sorted by code.
    pub fn descriptors(&self) -> Vec<&TypeDescriptor> {
        let mut v: Vec<&TypeDescriptor> = self.by_code.values().collect();
        v.sort_by_key(|d| d.code);
        v
    }

    fn note_unknown(&self, code: u32) {
        // A poisoned set only costs us a repeated log line.
        let first = match self.seen_unknown.lock() {
            Ok(mut seen) => seen.insert(code),
            Err(poisoned) => poisoned.into_inner().insert(code),
        };
        if first {
            tracing::debug!(code, "unmapped TLV type code");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_total() {
        let reg = TypeRegistry::from_entries(vec![TypeDescriptor::new(1, "Flag", DecodeKind::Enum8)]).unwrap();
        assert_eq!(reg.lookup(1).name, "Flag");
        let unknown = reg.lookup(999);
        assert_eq!(unknown.name, "Unknown");
        assert_eq!(unknown.kind, DecodeKind::FixedBytes);
        assert!(unknown.is_unknown());
    }

    /// Collects formatted events for one test.
    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn unknown_events(log_unknown: bool) -> usize {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let reg = TypeRegistry::from_entries(vec![TypeDescriptor::new(1, "Flag", DecodeKind::Enum8)])
            .unwrap()
            .with_unknown_logging(log_unknown);
        tracing::subscriber::with_default(subscriber, || {
            reg.lookup(0x4242);
            reg.lookup(0x4242);
            reg.lookup(1);
        });
        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        text.lines().filter(|l| l.contains("unmapped TLV type code")).count()
    }

    #[test]
    fn unknown_code_logged_once_when_enabled() {
        assert_eq!(unknown_events(true), 1);
        assert_eq!(unknown_events(false), 0);
    }

    #[test]
    fn duplicate_codes_rejected() {
        let err = TypeRegistry::from_entries(vec![
            TypeDescriptor::new(7, "A", DecodeKind::Dec8),
            TypeDescriptor::new(7, "B", DecodeKind::Dec16),
        ])
        .unwrap_err();
        assert_eq!(err.code, 7);
        assert_eq!(err.first, "A");
    }

    #[test]
    fn symbol_table_sorted_and_replaces() {
        let mut t = SymbolTable::from_pairs([(3, "c"), (1, "a")]);
        t.insert(2, "b");
        t.insert(1, "A");
        let names: Vec<_> = t.iter().map(|(_, n)| n.to_string()).collect();
        assert_eq!(names, vec!["A", "b", "c"]);
        assert_eq!(t.name_or_unknown(9), "Unknown (9)");
    }

    #[test]
    fn keywords_round_trip() {
        for k in DecodeKind::ALL {
            assert_eq!(DecodeKind::from_keyword(k.keyword()), Some(k));
        }
        assert_eq!(DecodeKind::from_keyword("float"), None);
    }

    #[test]
    fn length_rules() {
        assert!(DecodeKind::Enum16.length_rule().accepts(2));
        assert!(!DecodeKind::Enum16.length_rule().accepts(3));
        assert!(DecodeKind::IdAmbiguousByLength.length_rule().accepts(6));
        assert!(!DecodeKind::IdAmbiguousByLength.length_rule().accepts(8));
        assert!(DecodeKind::AsciiString.length_rule().accepts(0));
        assert!(!DecodeKind::VendorSpecific.length_rule().accepts(2));
    }
}
