//! Fixed pool of backend connections with advisory workload counters.
//!
//! The backend caps throughput per connection, so spreading streams across
//! the pool raises aggregate throughput and confines a misbehaving session
//! to the streams it is serving. Workloads only steer routing; nothing here
//! refuses a stream because a connection is busy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::backend::BackendConnection;

/// A backend connection registered in the pool.
pub struct PooledConnection {
    index: usize,
    connection: Arc<dyn BackendConnection>,
    workload: AtomicUsize,
}

impl PooledConnection {
    /// Registration index, stable for the life of the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Underlying backend session.
    pub fn connection(&self) -> &Arc<dyn BackendConnection> {
        &self.connection
    }

    /// Streams currently attributed to this connection.
    pub fn workload(&self) -> usize {
        self.workload.load(Ordering::Acquire)
    }

    /// Attributes one more stream to this connection until the lease drops.
    pub fn lease(self: &Arc<Self>) -> WorkloadLease {
        let previous = self.workload.fetch_add(1, Ordering::AcqRel);
        trace!(
            "Connection {} workload {} -> {}",
            self.index,
            previous,
            previous + 1
        );
        WorkloadLease {
            connection: Arc::clone(self),
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("index", &self.index)
            .field("name", &self.connection.name())
            .field("workload", &self.workload())
            .finish()
    }
}

/// Scoped workload increment; decrements on drop.
///
/// Dropping covers every way a stream ends: body finished, backend error,
/// or the client hanging up and the response body being discarded.
#[derive(Debug)]
pub struct WorkloadLease {
    connection: Arc<PooledConnection>,
}

impl WorkloadLease {
    /// Connection this lease is counted against.
    pub fn connection(&self) -> &Arc<PooledConnection> {
        &self.connection
    }
}

impl Drop for WorkloadLease {
    fn drop(&mut self) {
        let previous = self.connection.workload.fetch_sub(1, Ordering::AcqRel);
        trace!(
            "Connection {} workload {} -> {}",
            self.connection.index,
            previous,
            previous.saturating_sub(1)
        );
    }
}

/// Fixed set of backend connections, owned for the process lifetime.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: Vec<Arc<PooledConnection>>,
}

impl ConnectionPool {
    /// Creates a pool; registration order decides tie-breaks.
    pub fn new(connections: Vec<Arc<dyn BackendConnection>>) -> Self {
        let connections = connections
            .into_iter()
            .enumerate()
            .map(|(index, connection)| {
                Arc::new(PooledConnection {
                    index,
                    connection,
                    workload: AtomicUsize::new(0),
                })
            })
            .collect();
        Self { connections }
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the pool has no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connection registered at `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<PooledConnection>> {
        self.connections.get(index)
    }

    /// Returns the connection with the smallest workload.
    ///
    /// Ties go to the lowest registration index. Returns `None` for an
    /// empty pool.
    pub fn select_least_loaded(&self) -> Option<&Arc<PooledConnection>> {
        // min_by_key keeps the first of equal minima
        self.connections.iter().min_by_key(|c| c.workload())
    }

    /// Selects the least-loaded connection and leases it for one stream.
    pub fn acquire(&self) -> Option<WorkloadLease> {
        self.select_least_loaded().map(PooledConnection::lease)
    }

    /// Snapshot of `(index, workload)` for every connection.
    pub fn workloads(&self) -> Vec<(usize, usize)> {
        self.connections
            .iter()
            .map(|c| (c.index, c.workload()))
            .collect()
    }
}
