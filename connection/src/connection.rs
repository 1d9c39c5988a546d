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

//! Buffered TCP connection
//!
//! A [`Connection`] owns one socket, one send queue, one receive buffer and
//! at most one worker task. Callers on any thread queue outbound bytes and
//! request state changes; the worker moves bytes between the buffers and the
//! socket and feeds the protocol decoder.

use crate::decoder::BoxedDecoder;
use crate::stats::ConnectionMetrics;
use crate::state::Link;
use crate::worker::Worker;
use crate::{
    ByteBuffer, ConnectionConfig, ConnectionError, ConnectionId, ConnectionState,
    ConnectionStats, ProtocolDecoder, Result, SendQueue,
};
use metrics::{counter, gauge};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::net::TcpStream;
use tokio::sync::{Notify, watch};
use tracing::{debug, info, instrument, trace, warn};

/// Receive buffer together with the decoder that drains it
#[derive(Debug)]
pub(crate) struct Inbound {
    pub(crate) buffer: ByteBuffer,
    pub(crate) decoder: BoxedDecoder,
}

/// State shared between the connection handle and its worker
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: ConnectionId,
    pub(crate) config: ConnectionConfig,
    link: Mutex<Link<TcpStream>>,
    pub(crate) send_queue: SendQueue,
    inbound: Mutex<Inbound>,
    /// Held by the worker for as long as it runs
    loop_running: Arc<tokio::sync::Mutex<()>>,
    pub(crate) wakeup: Notify,
    pub(crate) metrics: ConnectionMetrics,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link<TcpStream>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn inbound(&self) -> MutexGuard<'_, Inbound> {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.link().state()
    }

    pub(crate) fn stream(&self) -> Option<Arc<TcpStream>> {
        self.link().stream().cloned()
    }

    fn begin_connect(self: &Arc<Self>, addr: SocketAddr) -> Result<ConnectAttempt> {
        let id = self
            .link()
            .begin_connect(addr)
            .map_err(|state| ConnectionError::InvalidState { state })?;
        Ok(ConnectAttempt {
            shared: self.clone(),
            id,
            addr,
        })
    }

    async fn open(&self, addr: SocketAddr) -> Result<TcpStream> {
        let attempt = TcpStream::connect(addr);
        let stream = match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| ConnectionError::ConnectTimeout(addr))?,
            None => attempt.await,
        }
        .map_err(|source| ConnectionError::ConnectFailed { addr, source })?;
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(stream)
    }

    fn opened(&self) {
        counter!("tcplink.connections.total").increment(1);
        gauge!("tcplink.connections.active").increment(1.0);
    }

    /// Spawn the worker unless one is already running
    pub(crate) fn start_loop(self: &Arc<Self>) -> bool {
        let Ok(running) = self.loop_running.clone().try_lock_owned() else {
            trace!(connection_id = %self.id, "Worker loop already running");
            return false;
        };
        self.metrics.loop_started();
        tokio::spawn(Worker::new(self.clone(), running).run());
        true
    }

    pub(crate) async fn wait_loop(&self) {
        let _running = self.loop_running.lock().await;
    }

    fn is_loop_running(&self) -> bool {
        self.loop_running.try_lock().is_err()
    }

    /// Queue data while holding the link lock so no send slips past a
    /// state change
    fn enqueue(&self, push: impl FnOnce(&SendQueue)) -> bool {
        let link = self.link();
        if !link.state().accepts_sends() {
            return false;
        }
        push(&self.send_queue);
        drop(link);
        self.wakeup.notify_one();
        true
    }

    fn request_disconnect(&self) -> bool {
        if !self.link().request_disconnect() {
            return false;
        }
        info!(connection_id = %self.id, "Disconnect requested");
        self.wakeup.notify_one();
        true
    }

    /// Force `Disconnected`, release the socket and drop queued output
    ///
    /// Returns false if the connection was already disconnected.
    pub(crate) fn teardown(&self) -> bool {
        let mut link = self.link();
        let Some(stream) = link.close() else {
            return false;
        };
        self.send_queue.clear();
        drop(link);

        if stream.is_some() {
            gauge!("tcplink.connections.active").decrement(1.0);
        }
        self.wakeup.notify_one();
        true
    }
}

/// One connect attempt, from `Connecting` to its outcome
///
/// Dropping an attempt that has not reached `Connected`, whether it failed
/// or its future was cancelled, returns the connection to `Disconnected`
/// unless a newer attempt has taken over.
struct ConnectAttempt {
    shared: Arc<Shared>,
    id: u64,
    addr: SocketAddr,
}

impl ConnectAttempt {
    async fn run(self) -> Result<()> {
        let shared = &self.shared;
        let addr = self.addr;
        // A worker from the previous session may still be winding down.
        shared.wait_loop().await;

        let stream = match shared.open(addr).await {
            Ok(stream) => stream,
            Err(err) => {
                counter!("tcplink.errors.connect").increment(1);
                warn!(%addr, error = %err, "Connect failed");
                return Err(err);
            }
        };

        if shared.link().establish(self.id, stream).is_err() {
            debug!(%addr, "Connect attempt superseded or closed");
            return Err(ConnectionError::Aborted);
        }
        shared.opened();
        info!(%addr, "Connected");

        if !shared.start_loop() {
            shared.teardown();
            return Err(ConnectionError::LoopBusy);
        }
        Ok(())
    }
}

impl Drop for ConnectAttempt {
    fn drop(&mut self) {
        if self.shared.link().abort_connect(self.id) {
            debug!(connection_id = %self.shared.id, addr = %self.addr, "Connect attempt abandoned");
        }
    }
}

/// A buffered, thread-safe TCP connection
///
/// # Example
///
/// ```no_run
/// use tcplink_connection::{decode_fn, Connection, ConnectionConfig};
/// use std::net::Ipv4Addr;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let decoder = decode_fn(|data: &[u8]| {
///         println!("received {} bytes", data.len());
///         Ok(data.len())
///     });
///     let connection = Connection::new(decoder, ConnectionConfig::default())?;
///     connection.connect((Ipv4Addr::LOCALHOST, 7000)).await?;
///     connection.send(b"hello");
///     connection.disconnect();
///     connection.closed().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Create a disconnected connection that feeds received data to `decoder`
    pub fn new<D: ProtocolDecoder>(decoder: D, config: ConnectionConfig) -> Result<Self> {
        Self::new_with(config, |_| decoder)
    }

    /// Create a disconnected connection whose decoder can send on it
    ///
    /// `make_decoder` receives a [`ConnectionSender`] for the connection
    /// being built, letting the decoder answer what it receives.
    pub fn new_with<D, F>(config: ConnectionConfig, make_decoder: F) -> Result<Self>
    where
        D: ProtocolDecoder,
        F: FnOnce(ConnectionSender) -> D,
    {
        config.validate()?;
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let sender = ConnectionSender {
                shared: weak.clone(),
            };
            let inbound = Inbound {
                buffer: ByteBuffer::with_capacity(config.recv_chunk_size)
                    .with_limit(config.recv_buffer_limit),
                decoder: BoxedDecoder(Box::new(make_decoder(sender))),
            };
            Shared {
                id: ConnectionId::next(),
                send_queue: SendQueue::with_capacity(config.send_buffer_capacity),
                config,
                link: Mutex::new(Link::new()),
                inbound: Mutex::new(inbound),
                loop_running: Arc::new(tokio::sync::Mutex::new(())),
                wakeup: Notify::new(),
                metrics: ConnectionMetrics::default(),
            }
        });
        Ok(Self { shared })
    }

    /// Wrap an already connected socket, such as one returned by `accept`
    ///
    /// The connection starts out `Connected` with its worker running. Must be
    /// called from within a Tokio runtime.
    pub fn from_stream<D: ProtocolDecoder>(
        stream: TcpStream,
        decoder: D,
        config: ConnectionConfig,
    ) -> Result<Self> {
        Self::from_stream_with(stream, config, |_| decoder)
    }

    /// Wrap an already connected socket with a decoder that can send on it
    #[instrument(skip_all)]
    pub fn from_stream_with<D, F>(
        stream: TcpStream,
        config: ConnectionConfig,
        make_decoder: F,
    ) -> Result<Self>
    where
        D: ProtocolDecoder,
        F: FnOnce(ConnectionSender) -> D,
    {
        let remote = stream.peer_addr()?;
        if config.nodelay {
            stream.set_nodelay(true)?;
        }
        let connection = Self::new_with(config, make_decoder)?;
        connection.adopt(stream, remote)?;
        connection.shared.opened();
        info!(connection_id = %connection.id(), %remote, "Adopted connected socket");

        if !connection.start_loop() {
            return Err(ConnectionError::LoopBusy);
        }
        Ok(connection)
    }

    fn adopt(&self, stream: TcpStream, remote: SocketAddr) -> Result<()> {
        self.shared
            .link()
            .adopt(stream, remote)
            .map_err(|state| ConnectionError::InvalidState { state })
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Get the configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Remote address of the current or most recent connect attempt
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.shared.link().remote()
    }

    /// Remote address formatted as `ip:port`
    pub fn address(&self) -> Option<String> {
        self.remote_address().map(|addr| addr.to_string())
    }

    /// Connect to `addr`, waiting until the outcome is known
    ///
    /// On success the connection is `Connected` and its worker is running.
    /// On failure it is `Disconnected` again. Connecting while not
    /// `Disconnected` is rejected with [`ConnectionError::InvalidState`].
    #[instrument(skip(self, addr), fields(connection_id = %self.shared.id))]
    pub async fn connect(&self, addr: impl Into<SocketAddr>) -> Result<()> {
        self.shared.begin_connect(addr.into())?.run().await
    }

    /// Start connecting to `addr` in the background and return immediately
    ///
    /// The connection is `Connecting` when this returns; the outcome is only
    /// observable through [`Connection::state`] or [`Connection::subscribe`].
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self, addr), fields(connection_id = %self.shared.id))]
    pub fn async_connect(&self, addr: impl Into<SocketAddr>) -> Result<()> {
        let attempt = self.shared.begin_connect(addr.into())?;
        tokio::spawn(async move {
            // Failures are logged and leave the connection disconnected.
            let _ = attempt.run().await;
        });
        Ok(())
    }

    /// Request a graceful disconnect
    ///
    /// Only acts on a `Connected` connection. Already queued data is still
    /// transmitted; the socket is closed once the send queue is empty.
    #[instrument(skip(self), fields(connection_id = %self.shared.id))]
    pub fn disconnect(&self) {
        self.shared.request_disconnect();
    }

    /// Tear the connection down immediately, discarding queued data
    #[instrument(skip(self), fields(connection_id = %self.shared.id))]
    pub fn close(&self) {
        if self.shared.teardown() {
            info!("Connection closed");
        }
    }

    /// Queue `data` for transmission
    ///
    /// Returns false, without queueing, unless the connection is `Connected`.
    pub fn send(&self, data: &[u8]) -> bool {
        self.shared.enqueue(|queue| queue.push_back(data))
    }

    /// Queue `header` immediately followed by `body`
    pub fn send_framed(&self, header: &[u8], body: &[u8]) -> bool {
        self.shared
            .enqueue(|queue| queue.push_back_framed(header, body))
    }

    /// Queue `data` ahead of everything already queued
    pub fn send_urgent(&self, data: &[u8]) -> bool {
        self.shared.enqueue(|queue| queue.push_front(data))
    }

    /// A send handle that does not keep the connection alive
    pub fn sender(&self) -> ConnectionSender {
        ConnectionSender {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Bytes waiting in the send queue
    pub fn queued_bytes(&self) -> usize {
        self.shared.send_queue.len()
    }

    pub(crate) fn start_loop(&self) -> bool {
        self.shared.start_loop()
    }

    /// Wait until no worker loop is running
    pub async fn wait_loop(&self) {
        self.shared.wait_loop().await
    }

    /// True while a worker loop is running
    pub fn is_loop_running(&self) -> bool {
        self.shared.is_loop_running()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.link().subscribe()
    }

    /// Wait until the connection is `Disconnected`
    pub async fn closed(&self) {
        let mut states = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = states
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    }

    /// Get a snapshot of the connection counters
    pub fn stats(&self) -> ConnectionStats {
        self.shared.metrics.snapshot()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.shared.teardown() {
            debug!(connection_id = %self.shared.id, "Connection dropped while open");
        }
    }
}

/// Sending half of a [`Connection`]
///
/// Holds only a weak reference: once the connection is dropped every
/// operation fails as if the connection were disconnected.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    shared: Weak<Shared>,
}

impl ConnectionSender {
    fn with(&self, op: impl FnOnce(&Shared) -> bool) -> bool {
        self.shared.upgrade().is_some_and(|shared| op(&shared))
    }

    /// Queue `data` for transmission, see [`Connection::send`]
    pub fn send(&self, data: &[u8]) -> bool {
        self.with(|shared| shared.enqueue(|queue| queue.push_back(data)))
    }

    /// Queue `header` immediately followed by `body`
    pub fn send_framed(&self, header: &[u8], body: &[u8]) -> bool {
        self.with(|shared| shared.enqueue(|queue| queue.push_back_framed(header, body)))
    }

    /// Queue `data` ahead of everything already queued
    pub fn send_urgent(&self, data: &[u8]) -> bool {
        self.with(|shared| shared.enqueue(|queue| queue.push_front(data)))
    }

    /// Request a graceful disconnect, see [`Connection::disconnect`]
    pub fn disconnect(&self) -> bool {
        self.with(Shared::request_disconnect)
    }

    /// Current state, `Disconnected` once the connection is gone
    pub fn state(&self) -> ConnectionState {
        self.shared
            .upgrade()
            .map_or(ConnectionState::Disconnected, |shared| shared.state())
    }

    /// ID of the connection this sender belongs to
    pub fn id(&self) -> Option<ConnectionId> {
        self.shared.upgrade().map(|shared| shared.id)
    }
}
