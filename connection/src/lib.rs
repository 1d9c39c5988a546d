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

//! Buffered TCP Connection
//!
//! This crate provides a generic, bidirectional TCP connection that sits
//! between a raw socket and an application protocol. It owns the connection
//! lifecycle, a background worker task, an outbound send queue and an inbound
//! receive buffer:
//!
//! - Any thread may queue data, request a disconnect or query state
//! - A single worker task per connection moves bytes and drives the decoder
//! - Graceful disconnect transmits everything already queued before closing
//! - A decoder can answer through a [`ConnectionSender`] handed to it at
//!   construction ([`Connection::new_with`], [`Connection::from_stream_with`])
//!
//! # Architecture
//!
//! ```text
//! caller ──send──▶ SendQueue ──▶ Worker ──▶ socket
//! socket ──▶ Worker ──▶ receive buffer ──▶ ProtocolDecoder
//! caller ──connect/disconnect──▶ state machine ◀── Worker
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tcplink_connection::{Connection, ConnectionConfig, DecodeError, ProtocolDecoder};
//! use std::net::Ipv4Addr;
//!
//! struct Printer;
//!
//! impl ProtocolDecoder for Printer {
//!     fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
//!         println!("{}", String::from_utf8_lossy(data));
//!         Ok(data.len())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::new(Printer, ConnectionConfig::default())?;
//!     connection.connect((Ipv4Addr::LOCALHOST, 7000)).await?;
//!     connection.send(b"ping");
//!     connection.disconnect();
//!     connection.closed().await;
//!     Ok(())
//! }
//! ```

mod buffer;
mod config;
mod connection;
mod decoder;
mod error;
mod queue;
mod state;
mod stats;
mod types;
mod worker;

pub use buffer::{BufferOverflow, ByteBuffer};
pub use config::{
    ConnectionConfig, DEFAULT_LOOP_GRANULARITY, DEFAULT_RECV_BUFFER_LIMIT,
    DEFAULT_RECV_CHUNK_SIZE,
};
pub use connection::{Connection, ConnectionSender};
pub use decoder::{DecodeError, FnDecoder, ProtocolDecoder, decode_fn};
pub use error::{ConnectionError, Result};
pub use queue::SendQueue;
pub use state::ConnectionState;
pub use stats::ConnectionStats;
pub use types::ConnectionId;
