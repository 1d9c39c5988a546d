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

//! Connection worker loop
//!
//! One worker task runs per active connection. Each iteration it:
//! 1. drains as much of the send queue as the socket accepts,
//! 2. reads whatever the socket has available into the receive buffer,
//! 3. hands the receive buffer to the protocol decoder once if anything arrived,
//! 4. tears the connection down on a fatal error or peer close,
//! 5. completes a pending graceful disconnect once the send queue is empty,
//! 6. idles for the loop granularity if no data moved.
//!
//! I/O errors never leave this task; the only outward signal is the
//! connection dropping to `Disconnected`.

use crate::connection::{Inbound, Shared};
use crate::{ConnectionError, ConnectionState, Result};
use metrics::counter;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, trace, warn};

/// Why the worker stopped
#[derive(Debug)]
enum Exit {
    /// Connection was torn down from outside
    Closed,
    /// Graceful disconnect finished
    Drained,
    /// Peer closed its end or an error ended the connection
    Ended(ConnectionError),
}

/// Outcome of a single iteration
enum Step {
    Continue { active: bool },
    Exit(Exit),
}

/// Background task driving a single connection
pub(crate) struct Worker {
    shared: Arc<Shared>,
    scratch: Vec<u8>,
    disconnect_started: Option<Instant>,
    /// Released when the worker is dropped
    _running: OwnedMutexGuard<()>,
}

impl Worker {
    pub(crate) fn new(shared: Arc<Shared>, running: OwnedMutexGuard<()>) -> Self {
        let scratch = vec![0; shared.config.recv_chunk_size];
        Self {
            shared,
            scratch,
            disconnect_started: None,
            _running: running,
        }
    }

    /// Run until the connection is torn down
    #[instrument(name = "worker", skip(self), fields(connection_id = %self.shared.id))]
    pub(crate) async fn run(mut self) {
        debug!("Worker loop started");
        let exit = loop {
            let Some(stream) = self.shared.stream() else {
                break Exit::Closed;
            };
            match self.process(&stream) {
                Ok(Step::Continue { active: true }) => tokio::task::yield_now().await,
                Ok(Step::Continue { active: false }) => self.idle(&stream).await,
                Ok(Step::Exit(exit)) => break exit,
                Err(err) => break Exit::Ended(err),
            }
        };
        self.finish(exit);
    }

    fn process(&mut self, stream: &TcpStream) -> Result<Step> {
        let sent = self.send_pending(stream)?;
        let (received, peer_closed) = self.receive_available(stream)?;
        if peer_closed {
            return Ok(Step::Exit(Exit::Ended(ConnectionError::PeerClosed)));
        }

        if self.shared.state() == ConnectionState::Disconnecting {
            if self.shared.send_queue.is_empty() {
                return Ok(Step::Exit(Exit::Drained));
            }
            let started = *self.disconnect_started.get_or_insert_with(Instant::now);
            if let Some(limit) = self.shared.config.disconnect_timeout {
                if started.elapsed() >= limit {
                    return Err(ConnectionError::DisconnectTimeout);
                }
            }
        }

        Ok(Step::Continue {
            active: sent || received,
        })
    }

    /// Write queued bytes until the queue is empty or the socket is full
    fn send_pending(&self, stream: &TcpStream) -> Result<bool> {
        let Some(pending) = self.shared.send_queue.try_pop() else {
            return Ok(false);
        };

        let mut written = 0;
        let outcome = loop {
            if written == pending.len() {
                break Ok(());
            }
            match stream.try_write(&pending[written..]) {
                Ok(0) => break Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(count) => written += count,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => break Err(err),
            }
        };
        outcome?;

        if written < pending.len() {
            // Whatever the socket refused goes back ahead of newer data.
            self.shared.send_queue.push_front(&pending[written..]);
        }
        if written > 0 {
            trace!(bytes = written, queued = pending.len() - written, "Sent data");
            self.shared.metrics.bytes_sent(written);
        }
        Ok(written > 0)
    }

    /// Read everything available, then run the decoder once
    ///
    /// Returns whether anything arrived and whether the peer closed.
    fn receive_available(&mut self, stream: &TcpStream) -> Result<(bool, bool)> {
        let mut inbound = self.shared.inbound();
        let mut received = 0;
        let mut peer_closed = false;

        loop {
            let room = inbound
                .buffer
                .remaining()
                .unwrap_or(usize::MAX)
                .min(self.scratch.len());
            if room == 0 {
                break;
            }
            match stream.try_read(&mut self.scratch[..room]) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(count) => {
                    inbound.buffer.append(&self.scratch[..count])?;
                    received += count;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        if received == 0 {
            return Ok((false, peer_closed));
        }
        trace!(bytes = received, buffered = inbound.buffer.len(), "Received data");
        self.shared.metrics.bytes_received(received);

        let Inbound { buffer, decoder } = &mut *inbound;
        let available = buffer.len();
        self.shared.metrics.decoder_called();
        let consumed = decoder.0.on_data_received(buffer.as_slice())?;
        if consumed > available {
            return Err(ConnectionError::DecoderOverrun {
                consumed,
                available,
            });
        }
        buffer.consume(consumed);

        // A full buffer the decoder could not make room in holds a message
        // larger than the limit.
        if buffer.remaining() == Some(0) {
            return Err(ConnectionError::ReceiveOverflow {
                limit: self.shared.config.recv_buffer_limit,
            });
        }
        Ok((true, peer_closed))
    }

    /// Wait out the loop granularity, waking early on socket or queue activity
    async fn idle(&self, stream: &TcpStream) {
        let pending_send = !self.shared.send_queue.is_empty();
        tokio::select! {
            _ = tokio::time::sleep(self.shared.config.loop_granularity) => {}
            _ = stream.readable() => {}
            _ = stream.writable(), if pending_send => {}
            _ = self.shared.wakeup.notified() => {}
        }
    }

    fn finish(self, exit: Exit) {
        match &exit {
            Exit::Closed => debug!("Connection torn down, worker exiting"),
            Exit::Drained => info!("Send queue drained, disconnecting"),
            Exit::Ended(err) if err.is_protocol_error() => {
                counter!("tcplink.errors.protocol").increment(1);
                warn!(error = %err, "Protocol violation, closing connection");
            }
            Exit::Ended(err) if err.is_fatal() => {
                counter!("tcplink.errors.worker").increment(1);
                warn!(error = %err, "Connection failed");
            }
            Exit::Ended(err) => info!(reason = %err, "Connection ended"),
        }

        self.shared.teardown();

        let mut inbound = self.shared.inbound();
        inbound.buffer.clear();
        inbound.decoder.0.on_disconnect();
        drop(inbound);
        debug!(?exit, "Worker loop stopped");
    }
}
