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

//! Connection configuration
//!
//! # Example
//!
//! ```
//! use tcplink_connection::ConnectionConfig;
//! use std::time::Duration;
//!
//! let config = ConnectionConfig::default()
//!     .with_recv_buffer_limit(1024 * 1024)
//!     .with_loop_granularity(Duration::from_millis(2))
//!     .with_disconnect_timeout(Some(Duration::from_secs(30)));
//! assert!(config.validate().is_ok());
//! ```

use crate::{ConnectionError, Result};
use std::time::Duration;

/// Default hard bound on unconsumed received bytes
pub const DEFAULT_RECV_BUFFER_LIMIT: usize = 16 * 1024 * 1024;
/// Default size of a single non-blocking read
pub const DEFAULT_RECV_CHUNK_SIZE: usize = 4096;
/// Default idle interval between worker iterations
pub const DEFAULT_LOOP_GRANULARITY: Duration = Duration::from_millis(5);

/// Per-connection settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Hard bound on received bytes the decoder has not consumed yet
    ///
    /// Exceeding it tears the connection down.
    pub recv_buffer_limit: usize,

    /// Size of a single non-blocking read
    pub recv_chunk_size: usize,

    /// Idle interval between worker iterations that moved no data
    pub loop_granularity: Duration,

    /// Initial allocation of the send queue
    pub send_buffer_capacity: usize,

    /// Bound on a connect attempt (None waits for the operating system)
    pub connect_timeout: Option<Duration>,

    /// Set TCP_NODELAY on the socket
    pub nodelay: bool,

    /// Bound on a graceful disconnect (None waits until the queue drains)
    pub disconnect_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            recv_buffer_limit: DEFAULT_RECV_BUFFER_LIMIT,
            recv_chunk_size: DEFAULT_RECV_CHUNK_SIZE,
            loop_granularity: DEFAULT_LOOP_GRANULARITY,
            send_buffer_capacity: 4096,
            connect_timeout: Some(Duration::from_secs(10)),
            nodelay: true,
            disconnect_timeout: None,
        }
    }
}

impl ConnectionConfig {
    /// Set the receive buffer limit
    pub fn with_recv_buffer_limit(mut self, limit: usize) -> Self {
        self.recv_buffer_limit = limit;
        self
    }

    /// Set the read chunk size
    pub fn with_recv_chunk_size(mut self, size: usize) -> Self {
        self.recv_chunk_size = size;
        self
    }

    /// Set the worker idle interval
    pub fn with_loop_granularity(mut self, granularity: Duration) -> Self {
        self.loop_granularity = granularity;
        self
    }

    /// Set the initial send queue allocation
    pub fn with_send_buffer_capacity(mut self, capacity: usize) -> Self {
        self.send_buffer_capacity = capacity;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn with_nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Set the graceful disconnect timeout
    pub fn with_disconnect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.recv_buffer_limit == 0 {
            return Err(ConnectionError::InvalidConfig(
                "recv_buffer_limit must be greater than 0".to_string(),
            ));
        }
        if self.recv_chunk_size == 0 {
            return Err(ConnectionError::InvalidConfig(
                "recv_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.loop_granularity.is_zero() {
            return Err(ConnectionError::InvalidConfig(
                "loop_granularity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.recv_buffer_limit, DEFAULT_RECV_BUFFER_LIMIT);
        assert_eq!(config.loop_granularity, Duration::from_millis(5));
        assert!(config.disconnect_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::default()
            .with_recv_buffer_limit(64)
            .with_recv_chunk_size(16)
            .with_send_buffer_capacity(0)
            .with_connect_timeout(None)
            .with_nodelay(false);
        assert_eq!(config.recv_buffer_limit, 64);
        assert_eq!(config.recv_chunk_size, 16);
        assert_eq!(config.send_buffer_capacity, 0);
        assert!(config.connect_timeout.is_none());
        assert!(!config.nodelay);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(
            ConnectionConfig::default()
                .with_recv_buffer_limit(0)
                .validate()
                .is_err()
        );
        assert!(
            ConnectionConfig::default()
                .with_recv_chunk_size(0)
                .validate()
                .is_err()
        );
        let err = ConnectionConfig::default()
            .with_loop_granularity(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidConfig(_)));
    }
}
