//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Connection manager
//!
//! Tracks every live connection accepted by the server, removes each one
//! once it reaches `Disconnected`, and coordinates broadcast and shutdown.

use crate::{Result, ServerError, ServerHandler, ServerMetrics};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tcplink_connection::{Connection, ConnectionId};
use tracing::{debug, info, warn};

/// Result of a broadcast operation
#[derive(Debug, Clone, Default)]
pub struct BroadcastResult {
    /// Number of connections attempted
    pub total: usize,
    /// Number of connections that queued the data
    pub succeeded: usize,
    /// Connections that were no longer accepting data
    pub failed: Vec<ConnectionId>,
}

impl BroadcastResult {
    /// Check if every connection queued the data
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Connection manager
pub struct ConnectionManager {
    connections: Arc<DashMap<ConnectionId, Arc<Connection>>>,
    metrics: Arc<ServerMetrics>,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            metrics,
        }
    }

    /// Track `connection` until it disconnects
    ///
    /// Spawns a watcher that reports the connection to `handler` and removes
    /// it again once its state reaches `Disconnected`.
    pub fn add(&self, connection: Connection, handler: Arc<dyn ServerHandler>) -> Arc<Connection> {
        let connection = Arc::new(connection);
        let id = connection.id();
        self.connections.insert(id, connection.clone());
        self.metrics.connection_accepted();

        let connections = self.connections.clone();
        let metrics = self.metrics.clone();
        let watched = connection.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            handler.on_connect(watched.clone()).await;
            watched.closed().await;

            connections.remove(&id);
            metrics.connection_closed(start.elapsed());
            debug!(connection_id = %id, "Connection removed");
            drop(watched);
            handler.on_disconnect(id).await;
        });

        connection
    }

    /// Get a connection by ID
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Get all connection IDs
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Get the number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queue `data` on a specific connection
    pub fn send_to(&self, id: ConnectionId, data: &[u8]) -> Result<()> {
        let connection = self.get(id).ok_or(ServerError::ConnectionNotFound(id))?;
        if connection.send(data) {
            Ok(())
        } else {
            Err(ServerError::SendRejected(id))
        }
    }

    /// Queue `data` on every live connection
    pub fn broadcast(&self, data: &[u8]) -> BroadcastResult {
        self.broadcast_filtered(data, |_| true)
    }

    /// Queue `data` on every live connection matching `filter`
    pub fn broadcast_filtered<F>(&self, data: &[u8], filter: F) -> BroadcastResult
    where
        F: Fn(&Connection) -> bool,
    {
        let mut result = BroadcastResult::default();
        // Snapshot first so no map shard stays locked while sending
        let targets: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for connection in targets.iter().filter(|connection| filter(connection)) {
            result.total += 1;
            if connection.send(data) {
                result.succeeded += 1;
            } else {
                result.failed.push(connection.id());
            }
        }
        result
    }

    /// Disconnect every connection and wait for them to drain
    ///
    /// Connections still open after `timeout` are closed abruptly.
    pub async fn shutdown(&self, timeout: Duration) {
        let connections: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        info!(count = connections.len(), "Disconnecting all connections");
        for connection in &connections {
            connection.disconnect();
        }

        let drained = join_all(connections.iter().map(|connection| connection.closed()));
        if tokio::time::timeout(timeout, drained).await.is_err() {
            warn!(?timeout, "Connections did not drain in time, closing");
            for connection in &connections {
                connection.close();
            }
        }
        join_all(connections.iter().map(|connection| connection.wait_loop())).await;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_count", &self.connection_count())
            .finish()
    }
}
