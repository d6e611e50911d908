use std::{
    collections::{BTreeMap, HashMap, btree_map},
    net::SocketAddr,
};

use crate::event::{ClientHandle, ClientId};

/// Clients that have joined and not yet left.
///
/// Iteration follows join order because ids are handed out monotonically.
#[derive(Debug, Default)]
pub struct Registry {
    clients: BTreeMap<ClientId, ClientHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the id was already present; the existing handle is kept.
    pub fn insert(&mut self, handle: ClientHandle) -> bool {
        match self.clients.entry(handle.id()) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Removing an absent id is a no-op.
    pub fn remove(&mut self, id: ClientId) -> Option<ClientHandle> {
        self.clients.remove(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied()
    }

    pub fn handles(&self) -> impl Iterator<Item = &ClientHandle> {
        self.clients.values()
    }

    /// Empties the registry, handing back every handle.
    pub fn drain(&mut self) -> Vec<ClientHandle> {
        std::mem::take(&mut self.clients).into_values().collect()
    }
}

/// Display names keyed by the peer address that chose them.
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: HashMap<SocketAddr, String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First write wins; a later name for the same address is ignored.
    pub fn record(&mut self, addr: SocketAddr, name: impl Into<String>) -> bool {
        if self.names.contains_key(&addr) {
            return false;
        }
        self.names.insert(addr, name.into());
        true
    }

    pub fn name_of(&self, addr: &SocketAddr) -> Option<&str> {
        self.names.get(addr).map(String::as_str)
    }

    pub fn forget(&mut self, addr: &SocketAddr) -> Option<String> {
        self.names.remove(addr)
    }
}
