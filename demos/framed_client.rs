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

//! Framed Client Example
//!
//! Connects to the `echo_server` example, sends a few length-prefixed
//! frames from several threads and prints the frames echoed back.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example echo_server
//! cargo run --example framed_client
//! ```

use std::time::Duration;
use tcplink_connection::{Connection, ConnectionConfig};
use tcplink_framing::{FrameSender, LengthPrefixedDecoder};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let (frames_tx, mut frames) = mpsc::unbounded_channel();
    let connection = Connection::new(
        LengthPrefixedDecoder::new(frames_tx),
        ConnectionConfig::default().with_connect_timeout(Some(Duration::from_secs(5))),
    )?;
    connection.connect("127.0.0.1:7000".parse::<std::net::SocketAddr>()?).await?;
    println!("Connected to {}", connection.address().unwrap_or_default());

    const SENDERS: usize = 4;
    const PER_SENDER: usize = 5;
    std::thread::scope(|scope| {
        for sender in 0..SENDERS {
            let connection = &connection;
            scope.spawn(move || {
                for seq in 0..PER_SENDER {
                    let message = format!("sender {} message {}", sender, seq);
                    connection.send_frame(message.as_bytes());
                }
            });
        }
    });
    connection.send_urgent_frame(b"urgent hello");

    for _ in 0..SENDERS * PER_SENDER + 1 {
        match tokio::time::timeout(Duration::from_secs(5), frames.recv()).await {
            Ok(Some(frame)) => println!("echo: {}", String::from_utf8_lossy(&frame)),
            _ => break,
        }
    }

    connection.disconnect();
    connection.closed().await;
    println!("Stats: {:?}", connection.stats());
    Ok(())
}
