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

//! Length-Prefixed Framing for Tcplink
//!
//! A protocol layer for [`tcplink_connection::Connection`]: each message
//! travels as a 4-byte little-endian length followed by the payload.
//!
//! - [`LengthPrefixedDecoder`] plugs into a connection as its decoder and
//!   hands every complete payload to a [`FrameHandler`]
//! - [`FrameSender`] queues frames using the connection's header + body push
//!
//! # Example
//!
//! ```no_run
//! use tcplink_connection::{Connection, ConnectionConfig};
//! use tcplink_framing::{FrameSender, LengthPrefixedDecoder};
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (frames_tx, mut frames) = tokio::sync::mpsc::unbounded_channel();
//!     let decoder = LengthPrefixedDecoder::new(frames_tx);
//!     let connection = Connection::new(decoder, ConnectionConfig::default())?;
//!     connection.connect((Ipv4Addr::LOCALHOST, 7000)).await?;
//!
//!     connection.send_frame(b"request");
//!     if let Some(reply) = frames.recv().await {
//!         println!("reply: {:?}", reply);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod decoder;
mod encode;

pub use config::{DEFAULT_MAX_FRAME_LENGTH, FramingConfig};
pub use decoder::{FrameHandler, LengthPrefixedDecoder};
pub use encode::{FrameSender, HEADER_LEN, encode_frame, frame_header};
