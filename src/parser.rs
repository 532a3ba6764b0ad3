//! Parse TLV dictionaries into a [`TypeRegistry`] using PEST.
//!
//! The dictionary declares named enumerations and one line per TLV type:
//!
//! ```text
//! enum AcceptReject {
//!     0 = "Accept";
//!     1 = "Reject";
//! }
//!
//! tlv 0x0001 "Accept/Reject Indicator" : enum8 (AcceptReject);
//! tlv 0x0008 "Authentication Result" : enum8 { 0 = "Success"; 1 = "Failure"; };
//! tlv 0x001a "Context Delivery Info" : compound;
//! ```
//!
//! Enumerations may be referenced before they are declared.

use crate::registry::{DecodeKind, DuplicateCode, SymbolTable, TypeDescriptor, TypeRegistry};
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::collections::HashMap;
use std::path::Path;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct DictionaryParser;

#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Syntax(String),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("TLV code {0:#x} does not fit the 16-bit type field")]
    CodeOutOfRange(u64),
    #[error("TLV {code:#06x}: unknown decode kind '{keyword}'")]
    UnknownKind { code: u32, keyword: String },
    #[error("TLV {code:#06x}: unknown enum '{name}'")]
    UnknownEnum { code: u32, name: String },
    #[error("duplicate enum name: {0}")]
    DuplicateEnum(String),
    #[error("TLV {code:#06x}: decode kind {kind} takes no symbol table")]
    SymbolsNotAllowed { code: u32, kind: DecodeKind },
    #[error(transparent)]
    Duplicate(#[from] DuplicateCode),
}

/// Parsed (unresolved) dictionary.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    pub enums: Vec<(String, SymbolTable)>,
    pub entries: Vec<TlvEntry>,
}

#[derive(Debug, Clone)]
pub struct TlvEntry {
    pub code: u32,
    pub name: String,
    pub kind_keyword: String,
    pub symbols: Option<SymbolSource>,
}

#[derive(Debug, Clone)]
pub enum SymbolSource {
    Named(String),
    Inline(SymbolTable),
}

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/// Parse dictionary source (syntax only; see [`Dictionary::resolve`]).
pub fn parse_dictionary(source: &str) -> Result<Dictionary, DictionaryError> {
    let pairs = DictionaryParser::parse(Rule::dictionary, source)
        .map_err(|e| DictionaryError::Syntax(e.to_string()))?;
    let root = pairs.into_iter().next().ok_or_else(|| DictionaryError::Syntax("empty parse".to_string()))?;
    let mut dict = Dictionary::default();
    for inner in root.into_inner() {
        match inner.as_rule() {
            Rule::enum_def => dict.enums.push(build_enum(inner)?),
            Rule::tlv_def => dict.entries.push(build_tlv(inner)?),
            _ => {}
        }
    }
    Ok(dict)
}

/// Parse and resolve in one step.
pub fn load_registry(source: &str) -> Result<TypeRegistry, DictionaryError> {
    parse_dictionary(source)?.resolve()
}

pub fn load_registry_file(path: impl AsRef<Path>) -> Result<TypeRegistry, DictionaryError> {
    let src = std::fs::read_to_string(path)?;
    load_registry(&src)
}

impl Dictionary {
    /// Resolve kind keywords and enum references, then build the registry.
    pub fn resolve(self) -> Result<TypeRegistry, DictionaryError> {
        let mut enums: HashMap<String, SymbolTable> = HashMap::new();
        for (name, table) in self.enums {
            if enums.contains_key(&name) {
                return Err(DictionaryError::DuplicateEnum(name));
            }
            enums.insert(name, table);
        }
        let mut descriptors = Vec::with_capacity(self.entries.len());
        for e in self.entries {
            let kind = DecodeKind::from_keyword(&e.kind_keyword)
                .ok_or_else(|| DictionaryError::UnknownKind { code: e.code, keyword: e.kind_keyword.clone() })?;
            let symbols = match e.symbols {
                None => None,
                Some(_) if !kind.uses_symbols() => {
                    return Err(DictionaryError::SymbolsNotAllowed { code: e.code, kind })
                }
                Some(SymbolSource::Inline(t)) => Some(t),
                Some(SymbolSource::Named(n)) => match enums.get(&n) {
                    Some(t) => Some(t.clone()),
                    None => return Err(DictionaryError::UnknownEnum { code: e.code, name: n }),
                },
            };
            let mut d = TypeDescriptor::new(e.code, e.name, kind);
            d.symbols = symbols;
            descriptors.push(d);
        }
        Ok(TypeRegistry::from_entries(descriptors)?)
    }
}

fn build_enum(pair: Pair<'_>) -> Result<(String, SymbolTable), DictionaryError> {
    let mut name = String::new();
    let mut table = SymbolTable::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::symbol => {
                let (v, s) = build_symbol(inner)?;
                table.insert(v, s);
            }
            _ => {}
        }
    }
    Ok((name, table))
}

fn build_symbol(pair: Pair<'_>) -> Result<(u32, String), DictionaryError> {
    let mut it = pair.into_inner();
    let num = it.next().ok_or_else(|| DictionaryError::Syntax("symbol: value".to_string()))?;
    let text = it.next().ok_or_else(|| DictionaryError::Syntax("symbol: name".to_string()))?;
    let v = parse_number(num.as_str())?;
    let v = u32::try_from(v).map_err(|_| DictionaryError::InvalidNumber(num.as_str().to_string()))?;
    Ok((v, unescape(text)))
}

fn build_tlv(pair: Pair<'_>) -> Result<TlvEntry, DictionaryError> {
    let mut code = None;
    let mut name = None;
    let mut kind_keyword = String::new();
    let mut symbols = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::number => {
                let raw = parse_number(inner.as_str())?;
                if raw > u16::MAX as u64 {
                    return Err(DictionaryError::CodeOutOfRange(raw));
                }
                code = Some(raw as u32);
            }
            Rule::string => name = Some(unescape(inner)),
            Rule::kind => kind_keyword = inner.as_str().to_string(),
            Rule::symbols_ref => symbols = Some(build_symbols_ref(inner)?),
            _ => {}
        }
    }
    let code = code.ok_or_else(|| DictionaryError::Syntax("tlv: missing code".to_string()))?;
    let name = name.ok_or_else(|| DictionaryError::Syntax("tlv: missing name".to_string()))?;
    Ok(TlvEntry { code, name, kind_keyword, symbols })
}

fn build_symbols_ref(pair: Pair<'_>) -> Result<SymbolSource, DictionaryError> {
    let inner = pair.into_inner().next().ok_or_else(|| DictionaryError::Syntax("empty symbol reference".to_string()))?;
    match inner.as_rule() {
        Rule::enum_ref => {
            let ident = inner
                .into_inner()
                .next()
                .ok_or_else(|| DictionaryError::Syntax("enum reference: name".to_string()))?;
            Ok(SymbolSource::Named(ident.as_str().to_string()))
        }
        _ => {
            let mut table = SymbolTable::new();
            for sym in inner.into_inner() {
                let (v, s) = build_symbol(sym)?;
                table.insert(v, s);
            }
            Ok(SymbolSource::Inline(table))
        }
    }
}

fn parse_number(s: &str) -> Result<u64, DictionaryError> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    };
    parsed.map_err(|_| DictionaryError::InvalidNumber(s.to_string()))
}

/// `string` pair → its unescaped contents.
fn unescape(pair: Pair<'_>) -> String {
    let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_hex_and_decimal() {
        assert_eq!(parse_number("0x1f").unwrap(), 31);
        assert_eq!(parse_number("0X10").unwrap(), 16);
        assert_eq!(parse_number("42").unwrap(), 42);
    }

    #[test]
    fn escaped_quotes_in_names() {
        let d = parse_dictionary(r#"tlv 1 "say \"hi\"" : bytes;"#).unwrap();
        assert_eq!(d.entries[0].name, "say \"hi\"");
    }

    #[test]
    fn forward_enum_reference() {
        let reg = load_registry(
            r#"
tlv 5 "Mode" : enum8 (Mode);
enum Mode { 0 = "Idle"; 1 = "Active"; }
"#,
        )
        .unwrap();
        let d = reg.lookup(5);
        assert_eq!(d.symbols.as_ref().and_then(|t| t.get(1)), Some("Active"));
    }
}
