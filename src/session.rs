//! Conversation state and sub-dissector dispatch.
//!
//! Both are collaborators of the walkers, never ambient globals: callers own a
//! store / table and pass it in explicitly.

use crate::tree::DecodedNode;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::net::SocketAddr;

/// Connection identity, direction independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    lo: SocketAddr,
    hi: SocketAddr,
}

impl ConnectionKey {
    pub fn new(a: SocketAddr, b: SocketAddr) -> Self {
        if a <= b {
            ConnectionKey { lo: a, hi: b }
        } else {
            ConnectionKey { lo: b, hi: a }
        }
    }
}

/// Protocol state negotiated earlier on a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub encryption_method: u32,
    pub encryption_level: u32,
    /// Virtual channel id → channel name.
    pub channels: BTreeMap<u16, String>,
    /// Channel names in the order the client requested them.
    pub requested_channels: Vec<String>,
    pub info_flags: Option<u32>,
}

impl SessionState {
    pub fn is_encrypted(&self) -> bool {
        self.encryption_level != 0 && self.encryption_method != 0
    }

    pub fn channel_name(&self, id: u16) -> Option<&str> {
        self.channels.get(&id).map(String::as_str)
    }
}

/// Per-connection state store.
pub trait SessionStore {
    /// State for `key`; an unseen connection yields the default state.
    fn get(&self, key: &ConnectionKey) -> SessionState;
    fn set(&mut self, key: ConnectionKey, state: SessionState);
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: HashMap<ConnectionKey, SessionState>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        MemorySessionStore::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &ConnectionKey) -> SessionState {
        self.sessions.get(key).cloned().unwrap_or_default()
    }

    fn set(&mut self, key: ConnectionKey, state: SessionState) {
        self.sessions.insert(key, state);
    }
}

/// Payload handler: bytes in, tree out (offsets relative to the payload).
pub type Handler = Box<dyn Fn(&[u8]) -> DecodedNode + Send + Sync>;

/// Key → handler table used to hand a payload to another protocol.
pub struct DissectorTable<K> {
    handlers: HashMap<K, Handler>,
}

impl<K: Eq + Hash> Default for DissectorTable<K> {
    fn default() -> Self {
        DissectorTable { handlers: HashMap::new() }
    }
}

impl<K: Eq + Hash> DissectorTable<K> {
    pub fn new() -> Self {
        DissectorTable::default()
    }

    /// Register `handler` for `key`, replacing any previous one.
    pub fn register<F>(&mut self, key: K, handler: F)
    where
        F: Fn(&[u8]) -> DecodedNode + Send + Sync + 'static,
    {
        self.handlers.insert(key, Box::new(handler));
    }

    pub fn contains(&self, key: &K) -> bool {
        self.handlers.contains_key(key)
    }

    /// Run the handler for `key`, if any.
    pub fn dispatch(&self, key: &K, bytes: &[u8]) -> Option<DecodedNode> {
        self.handlers.get(key).map(|h| h(bytes))
    }
}

impl<K> std::fmt::Debug for DissectorTable<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DissectorTable").field("handlers", &self.handlers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    #[test]
    fn connection_key_is_direction_independent() {
        let a: SocketAddr = "10.0.0.1:3389".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:50000".parse().unwrap();
        assert_eq!(ConnectionKey::new(a, b), ConnectionKey::new(b, a));
    }

    #[test]
    fn store_defaults_for_unseen_connections() {
        let a: SocketAddr = "10.0.0.1:3389".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:50000".parse().unwrap();
        let key = ConnectionKey::new(a, b);
        let mut store = MemorySessionStore::new();
        assert_eq!(store.get(&key), SessionState::default());
        let st = SessionState { encryption_level: 2, encryption_method: 1, ..Default::default() };
        store.set(key, st.clone());
        assert_eq!(store.get(&ConnectionKey::new(b, a)), st);
        assert!(store.get(&key).is_encrypted());
    }

    #[test]
    fn dispatch_unknown_key_is_none() {
        let mut table: DissectorTable<&'static str> = DissectorTable::new();
        table.register("echo", |b: &[u8]| DecodedNode::new("Echo", 0, b.len(), NodeKind::Message));
        assert_eq!(table.dispatch(&"echo", &[1, 2]).map(|n| n.length), Some(2));
        assert!(table.dispatch(&"other", &[1]).is_none());
    }
}
