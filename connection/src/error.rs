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

//! Error types for connection operations

use crate::{BufferOverflow, ConnectionState, DecodeError};
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for connection operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Connection error types
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect attempt failed
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        /// Target address
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Connect attempt did not complete in time
    #[error("Connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    /// Operation is not allowed in the current state
    #[error("Operation not allowed while {state}")]
    InvalidState {
        /// State the connection was in
        state: ConnectionState,
    },

    /// Connection was torn down while a connect attempt was in flight
    #[error("Connect attempt aborted")]
    Aborted,

    /// Unconsumed received bytes exceeded the configured limit
    #[error("Receive buffer limit of {limit} bytes exceeded")]
    ReceiveOverflow {
        /// Configured limit
        limit: usize,
    },

    /// Protocol decoder rejected the received data
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Protocol decoder claimed more bytes than it was given
    #[error("Decoder consumed {consumed} bytes but only {available} were available")]
    DecoderOverrun {
        /// Bytes the decoder reported as consumed
        consumed: usize,
        /// Bytes that were offered
        available: usize,
    },

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    PeerClosed,

    /// Graceful disconnect did not drain the send queue in time
    #[error("Graceful disconnect timed out")]
    DisconnectTimeout,

    /// Another worker loop is already running for this connection
    #[error("Worker loop already running")]
    LoopBusy,

    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<BufferOverflow> for ConnectionError {
    fn from(overflow: BufferOverflow) -> Self {
        ConnectionError::ReceiveOverflow {
            limit: overflow.limit,
        }
    }
}

impl ConnectionError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors leave the connection usable, or usable again after
    /// a fresh connect attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConnectionError::ConnectFailed { .. }
                | ConnectionError::ConnectTimeout(_)
                | ConnectionError::InvalidState { .. }
                | ConnectionError::Aborted
                | ConnectionError::LoopBusy
        )
    }

    /// Check if the error forces the connection down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectionError::Io(_)
                | ConnectionError::ReceiveOverflow { .. }
                | ConnectionError::Decode(_)
                | ConnectionError::DecoderOverrun { .. }
                | ConnectionError::DisconnectTimeout
        )
    }

    /// Check if the error came from the protocol layer
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ConnectionError::Decode(_)
                | ConnectionError::DecoderOverrun { .. }
                | ConnectionError::ReceiveOverflow { .. }
        )
    }
}
