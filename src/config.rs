//! Walk configuration and per-call decode context.

use crate::resolve::{NameResolver, NoResolver};

/// Nesting limit for compound TLVs and field subtrees.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// TLV alignment in bytes.
pub const TLV_ALIGNMENT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DissectConfig {
    /// Deeper nesting is reported as [`Diagnostic::DepthExceeded`](crate::tree::Diagnostic::DepthExceeded).
    pub max_depth: usize,
}

impl Default for DissectConfig {
    fn default() -> Self {
        DissectConfig { max_depth: DEFAULT_MAX_DEPTH }
    }
}

/// Everything a walk borrows besides the bytes: configuration and name resolver.
#[derive(Clone, Copy)]
pub struct DecodeContext<'r> {
    pub config: DissectConfig,
    pub resolver: &'r dyn NameResolver,
}

impl<'r> DecodeContext<'r> {
    pub fn new(config: DissectConfig, resolver: &'r dyn NameResolver) -> Self {
        DecodeContext { config, resolver }
    }
}

impl Default for DecodeContext<'static> {
    fn default() -> Self {
        DecodeContext { config: DissectConfig::default(), resolver: &NoResolver }
    }
}

impl std::fmt::Debug for DecodeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeContext").field("config", &self.config).finish_non_exhaustive()
    }
}
