use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::protocol::ClientSummary;

/// A connected client. `peer` is shared with the handler task reading from
/// the same connection.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub address: String,
    pub peer: Peer,
}

impl Client {
    pub fn summary(&self) -> ClientSummary {
        ClientSummary {
            id: self.id.clone(),
            address: self.address.clone(),
        }
    }
}

/// Live clients keyed by id.
///
/// Entries are cloned out of the map before any await, so no shard lock is
/// ever held across a write to a peer.
///
/// Mutations share `gate`; `snapshot` takes it exclusively, so a snapshot is
/// a single point in time and never shows part of a `drain`. Lookups only
/// touch shard locks.
#[derive(Clone, Default)]
pub struct Registry {
    clients: Arc<DashMap<String, Client>>,
    gate: Arc<RwLock<()>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutating(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a client. A previous entry under the same id is replaced and
    /// its connection closed.
    pub async fn add(&self, id: String, address: String, peer: Peer) -> Client {
        let client = Client { id, address, peer };

        let replaced = {
            let _gate = self.mutating();
            self.clients.insert(client.id.clone(), client.clone())
        };

        if let Some(old) = replaced {
            if !old.peer.same_connection(&client.peer) {
                if let Err(e) = old.peer.close().await {
                    tracing::warn!(id = %old.id, error = %e, "failed to close replaced connection");
                }
            }
        }

        client
    }

    pub fn remove(&self, id: &str) -> Option<Client> {
        let _gate = self.mutating();
        self.clients.remove(id).map(|(_, c)| c)
    }

    /// Removes `client` only if its id still maps to the same connection.
    pub fn remove_connection(&self, client: &Client) -> bool {
        let _gate = self.mutating();
        self.clients
            .remove_if(&client.id, |_, stored| stored.peer.same_connection(&client.peer))
            .is_some()
    }

    pub fn lookup_by_id(&self, id: &str) -> Result<Client> {
        self.clients
            .get(id)
            .map(|guard| guard.clone())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// First client whose remote address equals `address`. Which one wins
    /// when several share an address is unspecified.
    pub fn lookup_by_address(&self, address: &str) -> Result<Client> {
        self.clients
            .iter()
            .find(|e| e.value().address == address)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(address.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    /// Copy of every entry, ordered by id.
    pub fn snapshot(&self) -> Vec<ClientSummary> {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);

        let mut list: Vec<ClientSummary> = self
            .clients
            .iter()
            .map(|e| e.value().summary())
            .collect();

        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Removes and returns every client.
    pub fn drain(&self) -> Vec<Client> {
        let _gate = self.mutating();

        let ids: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();

        ids.iter()
            .filter_map(|id| self.clients.remove(id).map(|(_, c)| c))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
