//! Dictionary DSL tests: syntax, kind keywords, enum references and registry errors.

use asncp_dissect::{asncp, load_registry, load_registry_file, parse_dictionary, DecodeKind, DictionaryError};
use std::io::Write;

// ==================== Valid dictionaries ====================

#[test]
fn parse_empty_dictionary() {
    let d = parse_dictionary("").expect("empty dictionary parses");
    assert!(d.enums.is_empty());
    assert!(d.entries.is_empty());
    let reg = load_registry("// nothing here\n").expect("comment-only dictionary");
    assert!(reg.is_empty());
}

#[test]
fn parse_every_kind_keyword() {
    let mut src = String::new();
    for (i, kind) in DecodeKind::ALL.iter().enumerate() {
        src.push_str(&format!("tlv {} \"T{}\" : {};\n", i + 1, i, kind.keyword()));
    }
    let reg = load_registry(&src).expect("all keywords resolve");
    assert_eq!(reg.len(), DecodeKind::ALL.len());
    for (i, kind) in DecodeKind::ALL.iter().enumerate() {
        assert_eq!(reg.lookup(i as u32 + 1).kind, *kind);
    }
}

#[test]
fn named_and_inline_symbols() {
    let src = r#"
/* shared tables */
enum AcceptReject {
    0 = "Accept";
    1 = "Reject";
}

tlv 0x0001 "Accept/Reject Indicator" : enum8 (AcceptReject);
tlv 0x0008 "Authentication Result" : enum8 { 0 = "Success"; 1 = "Failure"; };
tlv 0x008a "Reservation Action" : bitflags16 { 0x8000 = "Create"; 0x4000 = "Admit"; };
tlv 0x001a "Context Delivery Info" : compound;
"#;
    let reg = load_registry(src).expect("resolve");
    assert_eq!(reg.len(), 4);
    let accept = reg.lookup(1);
    assert_eq!(accept.name, "Accept/Reject Indicator");
    assert_eq!(accept.symbols.as_ref().and_then(|t| t.get(1)), Some("Reject"));
    let auth = reg.lookup(8);
    assert_eq!(auth.symbols.as_ref().and_then(|t| t.get(0)), Some("Success"));
    let action = reg.lookup(0x8a);
    assert_eq!(action.kind, DecodeKind::BitFlags16);
    assert_eq!(action.symbols.as_ref().and_then(|t| t.get(0x4000)), Some("Admit"));
    assert!(reg.lookup(0x1a).symbols.is_none());
}

#[test]
fn unmapped_code_resolves_to_unknown() {
    let reg = load_registry(r#"tlv 1 "One" : dec8;"#).expect("resolve");
    let d = reg.lookup(0x7777);
    assert!(d.is_unknown());
    assert_eq!(d.name, "Unknown");
    assert_eq!(d.kind, DecodeKind::FixedBytes);
    assert!(reg.get(0x7777).is_none());
}

#[test]
fn descriptors_sorted_by_code() {
    let reg = load_registry(
        r#"
tlv 0x0030 "C" : bytes;
tlv 0x0002 "A" : bytes;
tlv 0x0010 "B" : bytes;
"#,
    )
    .expect("resolve");
    let codes: Vec<u32> = reg.descriptors().iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![0x02, 0x10, 0x30]);
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "enum E {{ 1 = \"one\"; }}").expect("write");
    writeln!(file, "tlv 0x0100 \"From File\" : enum16 (E);").expect("write");
    let reg = load_registry_file(file.path()).expect("load file");
    assert_eq!(reg.lookup(0x100).name, "From File");
    assert_eq!(reg.lookup(0x100).kind, DecodeKind::Enum16);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = load_registry_file(dir.path().join("absent.dict")).expect_err("missing file");
    assert!(matches!(err, DictionaryError::Io(_)));
}

#[test]
fn bundled_dictionary_covers_common_types() {
    let reg = asncp::default_registry().expect("bundled dictionary");
    assert_eq!(reg.lookup(0x0001).kind, DecodeKind::Enum8);
    assert_eq!(reg.lookup(0x0005).kind, DecodeKind::Compound);
    assert_eq!(reg.lookup(0x0048).kind, DecodeKind::IpAddressMaskList);
    assert_eq!(reg.lookup(0x005c).kind, DecodeKind::Ether);
    assert_eq!(reg.lookup(0xffff).kind, DecodeKind::VendorSpecific);
}

// ==================== Errors ====================

#[test]
fn syntax_error_missing_semicolon() {
    let err = load_registry(r#"tlv 1 "One" : dec8"#).expect_err("missing ;");
    assert!(matches!(err, DictionaryError::Syntax(_)));
}

#[test]
fn syntax_error_unquoted_name() {
    let err = parse_dictionary("tlv 1 One : dec8;").expect_err("unquoted name");
    assert!(matches!(err, DictionaryError::Syntax(_)));
}

#[test]
fn unknown_kind_keyword() {
    let err = load_registry(r#"tlv 0x0002 "Two" : float64;"#).expect_err("unknown kind");
    match err {
        DictionaryError::UnknownKind { code, keyword } => {
            assert_eq!(code, 2);
            assert_eq!(keyword, "float64");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn unknown_enum_reference() {
    let err = load_registry(r#"tlv 3 "Three" : enum8 (Missing);"#).expect_err("unknown enum");
    match err {
        DictionaryError::UnknownEnum { code, name } => {
            assert_eq!(code, 3);
            assert_eq!(name, "Missing");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn duplicate_enum_name() {
    let err = load_registry("enum E { 0 = \"a\"; }\nenum E { 1 = \"b\"; }\n").expect_err("duplicate enum");
    assert!(matches!(err, DictionaryError::DuplicateEnum(ref n) if n == "E"));
}

#[test]
fn duplicate_code() {
    let err = load_registry(
        r#"
tlv 0x0010 "First" : dec8;
tlv 16 "Second" : dec16;
"#,
    )
    .expect_err("duplicate code");
    match err {
        DictionaryError::Duplicate(d) => {
            assert_eq!(d.code, 16);
            assert_eq!(d.first, "First");
            assert_eq!(d.second, "Second");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn code_out_of_range() {
    let err = load_registry(r#"tlv 0x10000 "Wide" : bytes;"#).expect_err("code > 0xffff");
    assert!(matches!(err, DictionaryError::CodeOutOfRange(0x10000)));
}

#[test]
fn symbols_on_non_symbolic_kind() {
    let err = load_registry(r#"tlv 4 "Text" : ascii_string { 0 = "x"; };"#).expect_err("symbols on string");
    match err {
        DictionaryError::SymbolsNotAllowed { code, kind } => {
            assert_eq!(code, 4);
            assert_eq!(kind, DecodeKind::AsciiString);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn error_messages_name_the_code() {
    let err = load_registry(r#"tlv 0x0002 "Two" : float64;"#).expect_err("unknown kind");
    assert_eq!(err.to_string(), "TLV 0x0002: unknown decode kind 'float64'");
}
