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

//! TCP server
//!
//! The [`TcpServer`] owns the listener, wraps every accepted socket into a
//! [`Connection`] and hands it to the [`ConnectionManager`].

use crate::{
    ConnectionManager, MetricsSnapshot, Result, ServerConfig, ServerError, ServerHandler,
    ServerMetrics,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tcplink_connection::Connection;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// TCP server accepting [`Connection`]s
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use std::net::SocketAddr;
/// use std::sync::Arc;
/// use tcplink_connection::{ConnectionSender, ProtocolDecoder, decode_fn};
/// use tcplink_server::{ServerConfig, ServerHandler, TcpServer};
///
/// struct Discard;
///
/// #[async_trait]
/// impl ServerHandler for Discard {
///     fn decoder(&self, _peer: SocketAddr, _sender: ConnectionSender) -> Box<dyn ProtocolDecoder> {
///         Box::new(decode_fn(|data: &[u8]| Ok(data.len())))
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = TcpServer::bind(ServerConfig::default()).await?;
///     server.start(Arc::new(Discard))?;
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct TcpServer {
    config: ServerConfig,
    manager: Arc<ConnectionManager>,
    metrics: Arc<ServerMetrics>,
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    running: AtomicBool,
    shutdown: Mutex<CancellationToken>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TcpServer {
    /// Bind to the configured address without accepting yet
    ///
    /// Call [`TcpServer::start`] to begin accepting connections.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(ServerError::InvalidConfig)?;
        let listener = TcpListener::bind(config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        let metrics = Arc::new(ServerMetrics::new());
        let manager = Arc::new(ConnectionManager::new(metrics.clone()));

        info!(%local_addr, "Server bound");

        Ok(Self {
            config,
            manager,
            metrics,
            listener: Arc::new(listener),
            local_addr,
            running: AtomicBool::new(false),
            shutdown: Mutex::new(CancellationToken::new()),
            accept_handle: Mutex::new(None),
        })
    }

    /// Start accepting connections for `handler`
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(local_addr = %self.local_addr))]
    pub fn start(&self, handler: Arc<dyn ServerHandler>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *self.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();

        let acceptor = Acceptor {
            listener: self.listener.clone(),
            manager: self.manager.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            handler,
        };
        let handle = tokio::spawn(acceptor.run(token));
        *self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!("Server started");
        Ok(())
    }

    /// Stop accepting and gracefully disconnect every connection
    ///
    /// Connections still draining after the configured shutdown timeout are
    /// closed abruptly.
    #[instrument(skip_all, fields(local_addr = %self.local_addr))]
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ServerError::NotRunning);
        }

        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        let handle = self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "Accept loop failed");
            }
        }

        self.manager.shutdown(self.config.shutdown_timeout).await;
        info!("Server shutdown complete");
        Ok(())
    }

    /// Check if the server is accepting connections
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the number of live connections
    pub fn connection_count(&self) -> usize {
        self.manager.connection_count()
    }

    /// Get the connection manager
    pub fn manager(&self) -> Arc<ConnectionManager> {
        self.manager.clone()
    }

    /// Get the server metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("connection_count", &self.connection_count())
            .finish()
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("TcpServer dropped while still running");
            self.shutdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cancel();
        }
    }
}

/// State owned by the accept loop task
struct Acceptor {
    listener: Arc<TcpListener>,
    manager: Arc<ConnectionManager>,
    metrics: Arc<ServerMetrics>,
    config: ServerConfig,
    handler: Arc<dyn ServerHandler>,
}

impl Acceptor {
    async fn run(self, token: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer)) => self.admit(socket, peer),
                Err(err) => {
                    error!(error = %err, "Failed to accept connection");
                    self.metrics.accept_error();
                    // Back off so a persistent error does not spin
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        info!("Accept loop terminated");
    }

    fn admit(&self, socket: TcpStream, peer: SocketAddr) {
        if self.manager.connection_count() >= self.config.max_connections {
            let err = ServerError::MaxConnectionsReached(self.config.max_connections);
            warn!(%peer, error = %err, "Rejecting connection");
            self.metrics.connection_rejected();
            return;
        }

        let handler = self.handler.clone();
        let made = Connection::from_stream_with(socket, self.config.connection.clone(), |sender| {
            handler.decoder(peer, sender)
        });
        match made {
            Ok(connection) => {
                let connection = self.manager.add(connection, self.handler.clone());
                debug!(%peer, connection_id = %connection.id(), "Connection accepted");
            }
            Err(err) => {
                error!(%peer, error = %err, "Failed to set up connection");
                self.metrics.accept_error();
            }
        }
    }
}
