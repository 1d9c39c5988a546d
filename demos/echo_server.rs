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

//! Echo Server Example
//!
//! Accepts connections on port 7000 and writes every received byte back to
//! its sender.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example echo_server
//! ```
//!
//! Then run the `framed_client` example, or connect with `nc localhost 7000`.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tcplink_connection::{Connection, ConnectionId, ConnectionSender, ProtocolDecoder, decode_fn};
use tcplink_server::{ServerConfig, ServerHandler, TcpServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::new("127.0.0.1:7000".parse()?).with_max_connections(100);
    let server = TcpServer::bind(config).await?;
    server.start(Arc::new(EchoHandler))?;
    println!("Echo server listening on {}", server.local_addr());
    println!("Press Ctrl+C to stop the server\n");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down server...");
    server.shutdown().await?;
    println!("Server stopped");

    Ok(())
}

struct EchoHandler;

#[async_trait]
impl ServerHandler for EchoHandler {
    fn decoder(&self, peer: SocketAddr, sender: ConnectionSender) -> Box<dyn ProtocolDecoder> {
        Box::new(decode_fn(move |data: &[u8]| {
            if !sender.send(data) {
                tracing::debug!(%peer, "Dropping echo for closing connection");
            }
            Ok(data.len())
        }))
    }

    async fn on_connect(&self, connection: Arc<Connection>) {
        println!(
            "[{}] connected from {}",
            connection.id(),
            connection.address().unwrap_or_default()
        );
    }

    async fn on_disconnect(&self, id: ConnectionId) {
        println!("[{}] disconnected", id);
    }
}
