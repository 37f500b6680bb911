use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Opaque identifier for one connected broadcast client.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        write!(f, "client-{}", &simple[..8])
    }
}

/// Edge between "no clients" and "at least one client".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    BecameNonEmpty,
    BecameEmpty,
}

/// The set of currently connected clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashSet<ClientId>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Returns `BecameNonEmpty` when this is the first one.
    pub fn add(&mut self, client: ClientId) -> Option<Transition> {
        let was_empty = self.clients.is_empty();
        if !self.clients.insert(client) {
            debug!(%client, "client registered twice");
            return None;
        }
        was_empty.then_some(Transition::BecameNonEmpty)
    }

    /// Unregister a client. Returns `BecameEmpty` when it was the last one.
    pub fn remove(&mut self, client: ClientId) -> Option<Transition> {
        if !self.clients.remove(&client) {
            debug!(%client, "removing unknown client");
            return None;
        }
        self.clients.is_empty().then_some(Transition::BecameEmpty)
    }

    pub fn contains(&self, client: ClientId) -> bool {
        self.clients.contains(&client)
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.iter().copied()
    }
}
