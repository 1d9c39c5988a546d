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

//! Handler trait for the Tcplink server

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tcplink_connection::{Connection, ConnectionId, ConnectionSender, ProtocolDecoder};

/// Server event handler trait
///
/// The server asks the handler for a decoder for every accepted socket and
/// reports connection lifecycle events.
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use std::net::SocketAddr;
/// use tcplink_connection::{ConnectionSender, DecodeError, ProtocolDecoder, decode_fn};
/// use tcplink_server::ServerHandler;
///
/// struct Echo;
///
/// #[async_trait]
/// impl ServerHandler for Echo {
///     fn decoder(&self, _peer: SocketAddr, sender: ConnectionSender) -> Box<dyn ProtocolDecoder> {
///         Box::new(decode_fn(move |data: &[u8]| {
///             sender.send(data);
///             Ok(data.len())
///         }))
///     }
/// }
/// ```
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    /// Build the decoder for a socket accepted from `peer`
    ///
    /// `sender` writes to the connection the decoder will be attached to.
    fn decoder(&self, peer: SocketAddr, sender: ConnectionSender) -> Box<dyn ProtocolDecoder>;

    /// Called once the connection is registered with the server
    async fn on_connect(&self, _connection: Arc<Connection>) {}

    /// Called after the connection has been removed from the server
    async fn on_disconnect(&self, _id: ConnectionId) {}
}
