//! Optional name resolution used only to enrich display text.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Host/vendor name lookups. Decoding never depends on an answer.
pub trait NameResolver {
    fn ether(&self, _addr: &[u8; 6]) -> Option<String> {
        None
    }

    fn ipv4(&self, _addr: Ipv4Addr) -> Option<String> {
        None
    }

    fn ipv6(&self, _addr: Ipv6Addr) -> Option<String> {
        None
    }

    /// IANA enterprise / OUI vendor name for a 24-bit vendor id.
    fn vendor(&self, _id: u32) -> Option<String> {
        None
    }
}

/// Resolver that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl NameResolver for NoResolver {}

/// Fixed-table resolver, handy for tests and offline captures.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    pub ether: HashMap<[u8; 6], String>,
    pub hosts_v4: HashMap<Ipv4Addr, String>,
    pub hosts_v6: HashMap<Ipv6Addr, String>,
    pub vendors: HashMap<u32, String>,
}

impl NameResolver for StaticResolver {
    fn ether(&self, addr: &[u8; 6]) -> Option<String> {
        self.ether.get(addr).cloned()
    }

    fn ipv4(&self, addr: Ipv4Addr) -> Option<String> {
        self.hosts_v4.get(&addr).cloned()
    }

    fn ipv6(&self, addr: Ipv6Addr) -> Option<String> {
        self.hosts_v6.get(&addr).cloned()
    }

    fn vendor(&self, id: u32) -> Option<String> {
        self.vendors.get(&id).cloned()
    }
}
