//! Bounded pool of HTTP clients.
//!
//! Every outgoing call holds a [`ClientLease`] for its duration. The lease
//! returns its slot on drop, so early returns and cancellation cannot leak
//! capacity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ClientError;

/// A fixed set of [`reqwest::Client`]s behind a semaphore.
pub struct ClientPool {
    clients: Vec<reqwest::Client>,
    permits: Arc<Semaphore>,
    next: AtomicUsize,
}

/// Scoped access to one pooled client.
#[derive(Debug)]
pub struct ClientLease {
    client: reqwest::Client,
    _permit: OwnedSemaphorePermit,
}

impl ClientLease {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl ClientPool {
    /// Create a pool with `size` clients. A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        Self::with_clients((0..size.max(1)).map(|_| reqwest::Client::new()).collect())
    }

    /// Build a pool around existing clients, one slot per client.
    pub fn with_clients(clients: Vec<reqwest::Client>) -> Self {
        let clients = if clients.is_empty() {
            vec![reqwest::Client::new()]
        } else {
            clients
        };
        Self {
            permits: Arc::new(Semaphore::new(clients.len())),
            clients,
            next: AtomicUsize::new(0),
        }
    }

    /// Wait for a free slot and lease a client.
    pub async fn lease(&self) -> Result<ClientLease, ClientError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ClientError::PoolClosed)?;
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        Ok(ClientLease {
            client: self.clients[idx].clone(),
            _permit: permit,
        })
    }

    /// Number of slots not currently leased.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.clients.len()
    }

    /// Refuse further leases. Outstanding leases stay valid.
    pub fn close(&self) {
        self.permits.close();
    }
}
