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

//! Error types for the Tcplink server

use tcplink_connection::{ConnectionError, ConnectionId};
use thiserror::Error;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error from the listener
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from an individual connection
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Connection with the given ID was not found
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// Connection exists but no longer accepts data
    #[error("Connection {0} is not accepting data")]
    SendRejected(ConnectionId),

    /// Maximum number of connections reached
    #[error("Maximum connections ({0}) reached")]
    MaxConnectionsReached(usize),

    /// Server is not running
    #[error("Server not running")]
    NotRunning,

    /// Server is already running
    #[error("Server already running")]
    AlreadyRunning,

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServerError {
    /// Check if the error only affects a single connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ServerError::Connection(_)
                | ServerError::ConnectionNotFound(_)
                | ServerError::SendRejected(_)
        )
    }
}
