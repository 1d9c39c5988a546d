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

//! Connection lifecycle state machine
//!
//! ```text
//!                connect             success
//! Disconnected ──────────▶ Connecting ───────▶ Connected
//!      ▲  ▲                    │                  │  │
//!      │  └────── failure ─────┘      disconnect  │  │ peer closed / error
//!      │                                          ▼  │
//!      └──────── queue drained ───────── Disconnecting
//! ```
//!
//! Any state may be forced to `Disconnected`. The state and the socket it
//! governs live together in a [`Link`] so that one lock covers both.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection
    #[default]
    Disconnected,
    /// Connect attempt in flight
    Connecting,
    /// Connection established, transferring data
    Connected,
    /// Disconnect pending, waiting for the send queue to drain
    Disconnecting,
}

impl ConnectionState {
    /// Check whether moving from `self` to `next` is legal
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (_, Disconnected) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connected, Disconnecting) => true,
            _ => false,
        }
    }

    /// True while the connection is bound to a socket or a connect attempt
    pub fn has_socket(self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// True if application data may be queued
    pub fn accepts_sends(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// True while the worker loop is expected to be moving data
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connected | Self::Disconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// State, socket and remote address guarded as one unit
///
/// The stream is present exactly while the state is `Connected` or
/// `Disconnecting`. While `Connecting` the pending socket is owned by the
/// connect attempt and only lands here once the attempt succeeds.
///
/// Every attempt gets a fresh id from [`Link::begin_connect`]; only the
/// attempt holding the current id may complete or abort it.
#[derive(Debug)]
pub(crate) struct Link<S> {
    state: ConnectionState,
    stream: Option<Arc<S>>,
    remote: Option<SocketAddr>,
    attempt: u64,
    notify: watch::Sender<ConnectionState>,
}

impl<S> Link<S> {
    pub(crate) fn new() -> Self {
        let (notify, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state: ConnectionState::Disconnected,
            stream: None,
            remote: None,
            attempt: 0,
            notify,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub(crate) fn stream(&self) -> Option<&Arc<S>> {
        self.stream.as_ref()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.notify.subscribe()
    }

    fn set(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Connection state transition");
        self.state = next;
        self.notify.send_replace(next);
    }

    /// `Disconnected -> Connecting`, recording the target address
    ///
    /// Returns the id of the new attempt, or the current state if a
    /// connection is already in progress.
    pub(crate) fn begin_connect(&mut self, remote: SocketAddr) -> Result<u64, ConnectionState> {
        if self.state != ConnectionState::Disconnected {
            return Err(self.state);
        }
        self.attempt += 1;
        self.remote = Some(remote);
        self.set(ConnectionState::Connecting);
        Ok(self.attempt)
    }

    fn is_pending(&self, attempt: u64) -> bool {
        self.state == ConnectionState::Connecting && self.attempt == attempt
    }

    /// `Connecting -> Connected` for the current attempt
    ///
    /// Hands the stream back if the attempt was torn down or superseded in
    /// the meantime.
    pub(crate) fn establish(&mut self, attempt: u64, stream: S) -> Result<(), S> {
        if !self.is_pending(attempt) {
            return Err(stream);
        }
        self.stream = Some(Arc::new(stream));
        self.set(ConnectionState::Connected);
        Ok(())
    }

    /// `Connecting -> Disconnected` if `attempt` is still the one in flight
    pub(crate) fn abort_connect(&mut self, attempt: u64) -> bool {
        if !self.is_pending(attempt) {
            return false;
        }
        self.set(ConnectionState::Disconnected);
        true
    }

    /// Bind an already connected stream, going straight to `Connected`
    pub(crate) fn adopt(&mut self, stream: S, remote: SocketAddr) -> Result<(), ConnectionState> {
        let attempt = self.begin_connect(remote)?;
        self.establish(attempt, stream)
            .map_err(|_| ConnectionState::Disconnected)
    }

    /// `Connected -> Disconnecting`; anything else is left alone
    pub(crate) fn request_disconnect(&mut self) -> bool {
        if self.state == ConnectionState::Connected {
            self.set(ConnectionState::Disconnecting);
            true
        } else {
            false
        }
    }

    /// Force `Disconnected`, releasing the stream
    ///
    /// Returns `None` without side effects if already disconnected.
    pub(crate) fn close(&mut self) -> Option<Option<Arc<S>>> {
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        let stream = self.stream.take();
        self.set(ConnectionState::Disconnected);
        Some(stream)
    }
}
