//! # asncp-dissect: table-driven TLV and field-table dissectors
//!
//! Two interpreters turn `(descriptor table, bytes)` into a tree of decoded
//! nodes with per-node diagnostics. Neither ever fails a whole message:
//! malformed input shows up as raw nodes carrying a [`Diagnostic`].
//!
//! ## TLV walker
//!
//! 4-byte aligned `type(2) | length(2) | value | pad` records, big-endian.
//! A [`TypeRegistry`] maps each type code to a name and a [`DecodeKind`];
//! compound TLVs recurse, everything else goes to a value decoder. Registries
//! are usually loaded from a dictionary:
//!
//! ```text
//! enum AcceptReject { 0 = "Accept"; 1 = "Reject"; }
//!
//! tlv 0x0001 "Accept/Reject Indicator" : enum8 (AcceptReject);
//! tlv 0x0005 "AK Context" : compound;
//! tlv 0x0048 "IP Destination Address and Mask" : ip_address_mask_list;
//! ```
//!
//! ## Field-table walker
//!
//! Static [`FieldDescriptor`] slices evaluated with one cursor: length cells
//! written by earlier fields, peeking fields, subtrees sharing the cursor,
//! strings whose encoding depends on a captured info-flags word, and an
//! optional total length budget.
//!
//! ## Protocols
//!
//! - [`asncp`]: WiMAX ASN Control Plane messages (header table + TLV body).
//! - [`rdp`]: RDP GCC user data, Client Info PDU and virtual channel PDUs.
//!
//! ## Usage
//!
//! ```no_run
//! use asncp_dissect::{asncp, DecodeContext};
//!
//! let registry = asncp::default_registry().unwrap();
//! let payload: &[u8] = &[];
//! let msg = asncp::dissect_message(payload, &registry, DecodeContext::default());
//! println!("{}", asncp_dissect::dump::tree_to_dump(&msg, 0));
//! ```

pub mod asncp;
pub mod buffer;
pub mod config;
pub mod decoders;
pub mod dump;
pub mod fields;
pub mod parser;
pub mod rdp;
pub mod registry;
pub mod resolve;
pub mod session;
pub mod tree;
pub mod value;
pub mod walk;

pub use buffer::{BoundsError, Buffer, Endianness};
pub use config::{DecodeContext, DissectConfig, DEFAULT_MAX_DEPTH};
pub use fields::{CellId, FieldDescriptor, FieldFlags, FieldFormat, FieldOutcome, FieldScratch, FieldWalker};
pub use parser::{load_registry, load_registry_file, parse_dictionary, DictionaryError};
pub use registry::{DecodeKind, LengthRule, SymbolTable, TypeDescriptor, TypeRegistry};
pub use resolve::{NameResolver, NoResolver, StaticResolver};
pub use session::{ConnectionKey, DissectorTable, MemorySessionStore, SessionState, SessionStore};
pub use tree::{DecodedNode, Diagnostic, NodeKind};
pub use value::DecodedValue;
pub use walk::{pad_for, tlv_extent, walk_tlvs, TlvWalker, WalkOutcome};
