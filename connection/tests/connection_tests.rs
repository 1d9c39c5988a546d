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

//! End-to-end tests for Connection over loopback sockets

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tcplink_connection::{
    Connection, ConnectionConfig, ConnectionError, ConnectionSender, ConnectionState, DecodeError,
    ProtocolDecoder, decode_fn,
};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tracing_test::traced_test;

const WAIT: Duration = Duration::from_secs(10);

/// Records every received byte and consumes everything
#[derive(Clone, Default)]
struct Recorder {
    bytes: Arc<Mutex<Vec<u8>>>,
    disconnects: Arc<AtomicUsize>,
}

impl Recorder {
    fn received(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }
}

impl ProtocolDecoder for Recorder {
    fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
        self.bytes.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn on_disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Splits the stream into fixed-size messages
#[derive(Clone)]
struct FixedMessages {
    size: usize,
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FixedMessages {
    fn new(size: usize) -> Self {
        Self {
            size,
            messages: Arc::default(),
        }
    }

    fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().unwrap().clone()
    }
}

impl ProtocolDecoder for FixedMessages {
    fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
        let complete = data.len() / self.size * self.size;
        let mut messages = self.messages.lock().unwrap();
        for message in data[..complete].chunks(self.size) {
            messages.push(message.to_vec());
        }
        Ok(complete)
    }
}

/// Counts received bytes and checks them against a repeating pattern
#[derive(Clone, Default)]
struct PatternCounter {
    received: Arc<AtomicUsize>,
}

fn pattern(offset: usize) -> u8 {
    (offset % 251) as u8
}

impl ProtocolDecoder for PatternCounter {
    fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
        let start = self.received.load(Ordering::SeqCst);
        for (i, byte) in data.iter().enumerate() {
            if *byte != pattern(start + i) {
                return Err(DecodeError::new(format!("corrupt byte at {}", start + i)));
            }
        }
        self.received.fetch_add(data.len(), Ordering::SeqCst);
        Ok(data.len())
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig::default().with_loop_granularity(Duration::from_millis(2))
}

async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Accept one socket and wrap it into a connection driven by `decoder`
async fn accept<D: ProtocolDecoder>(listener: &TcpListener, decoder: D) -> Connection {
    let (stream, _) = listener.accept().await.unwrap();
    Connection::from_stream(stream, decoder, config()).unwrap()
}

/// Connect a fresh connection to `addr` and accept it on `listener`
async fn connected_pair<A, B>(
    listener: &TcpListener,
    addr: SocketAddr,
    a: A,
    b: B,
) -> (Connection, Connection)
where
    A: ProtocolDecoder,
    B: ProtocolDecoder,
{
    let client = Connection::new(a, config()).unwrap();
    let (connected, server) = tokio::join!(client.connect(addr), accept(listener, b));
    connected.unwrap();
    (client, server)
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let result = timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

async fn wait_closed(connection: &Connection) {
    assert!(
        timeout(WAIT, connection.closed()).await.is_ok(),
        "connection {} never disconnected",
        connection.id()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connect_and_exchange() {
    let (listener, addr) = listener().await;
    let client_rx = Recorder::default();
    let server_rx = Recorder::default();
    let (client, server) = connected_pair(&listener, addr, client_rx.clone(), server_rx.clone()).await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.remote_address(), Some(addr));
    assert_eq!(client.address(), Some(addr.to_string()));
    assert!(client.is_loop_running());

    assert!(client.send(b"hello "));
    assert!(client.send(b"world"));
    wait_until("server to receive", || server_rx.len() == 11).await;
    assert_eq!(server_rx.received(), b"hello world");

    assert!(server.send(b"pong"));
    wait_until("client to receive", || client_rx.len() == 4).await;
    assert_eq!(client_rx.received(), b"pong");

    let stats = client.stats();
    assert_eq!(stats.bytes_sent, 11);
    assert_eq!(stats.bytes_received, 4);
    assert!(stats.decoder_calls >= 1);
    assert_eq!(stats.loops_started, 1);
}

#[tokio::test]
#[traced_test]
async fn test_connect_refused_reports_error() {
    let (listener, addr) = listener().await;
    drop(listener);

    let client = Connection::new(Recorder::default(), config()).unwrap();
    let err = client.connect(addr).await.unwrap_err();
    assert!(matches!(err, ConnectionError::ConnectFailed { .. }), "{err}");
    assert!(err.is_recoverable());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.remote_address(), Some(addr));
    assert!(!client.is_loop_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_rejected_while_connected() {
    let (listener, addr) = listener().await;
    let (client, _server) =
        connected_pair(&listener, addr, Recorder::default(), Recorder::default()).await;

    let err = client.connect(addr).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::InvalidState {
            state: ConnectionState::Connected
        }
    ));
    assert!(client.async_connect(addr).is_err());
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.stats().loops_started, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_connect() {
    let (listener, addr) = listener().await;
    let client = Connection::new(Recorder::default(), config()).unwrap();
    let mut states = client.subscribe();

    client.async_connect(addr).unwrap();
    assert_ne!(client.state(), ConnectionState::Disconnected);
    assert!(client.async_connect(addr).is_err());

    let server_rx = Recorder::default();
    let _server = accept(&listener, server_rx.clone()).await;
    timeout(WAIT, states.wait_for(|state| *state == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    assert!(client.send(b"async"));
    wait_until("server to receive", || server_rx.len() == 5).await;
}

#[tokio::test]
async fn test_async_connect_failure_ends_disconnected() {
    let (listener, addr) = listener().await;
    drop(listener);

    let client = Connection::new(Recorder::default(), config()).unwrap();
    client.async_connect(addr).unwrap();
    wait_closed(&client).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.send(b"too late"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_graceful_disconnect_delivers_queued_megabyte() {
    const TOTAL: usize = 1024 * 1024;
    let (listener, addr) = listener().await;
    let counter = PatternCounter::default();
    let (client, server) =
        connected_pair(&listener, addr, Recorder::default(), counter.clone()).await;

    let payload: Vec<u8> = (0..TOTAL).map(pattern).collect();
    for chunk in payload.chunks(16 * 1024) {
        assert!(client.send(chunk));
    }
    client.disconnect();
    assert!(!client.send(b"after disconnect"));

    wait_closed(&client).await;
    assert_eq!(client.stats().bytes_sent, TOTAL as u64);
    assert_eq!(client.queued_bytes(), 0);

    wait_until("server to receive 1 MiB", || {
        counter.received.load(Ordering::SeqCst) == TOTAL
    })
    .await;
    wait_closed(&server).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_send_after_disconnect_fails() {
    let (listener, addr) = listener().await;
    let server_rx = Recorder::default();
    let (client, _server) = connected_pair(&listener, addr, Recorder::default(), server_rx.clone()).await;

    assert!(client.send(b"before"));
    client.disconnect();
    assert!(!client.send(b"during"));
    assert!(!client.send_framed(b"h", b"b"));
    assert!(!client.send_urgent(b"u"));

    wait_closed(&client).await;
    assert!(!client.send(b"after"));
    assert_eq!(client.queued_bytes(), 0);

    wait_until("server to receive", || server_rx.len() == 6).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(server_rx.received(), b"before");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_keep_messages_whole() {
    let (listener, addr) = listener().await;
    let messages = FixedMessages::new(64);
    let (client, _server) =
        connected_pair(&listener, addr, Recorder::default(), messages.clone()).await;

    std::thread::scope(|scope| {
        for id in 0..10u8 {
            let client = &client;
            scope.spawn(move || {
                assert!(client.send(&[id; 64]));
            });
        }
    });

    wait_until("ten messages", || messages.messages().len() == 10).await;
    let mut received = messages.messages();
    received.sort();
    let expected: Vec<Vec<u8>> = (0..10u8).map(|id| vec![id; 64]).collect();
    assert_eq!(received, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_urgent_and_framed_sends() {
    let (listener, addr) = listener().await;
    let server_rx = Recorder::default();
    let (client, _server) = connected_pair(&listener, addr, Recorder::default(), server_rx.clone()).await;

    assert!(client.send_urgent(b"!"));
    wait_until("urgent byte", || server_rx.len() == 1).await;
    assert!(client.send_framed(&[3, 0, 0, 0], b"abc"));
    wait_until("framed message", || server_rx.len() == 8).await;
    assert_eq!(server_rx.received(), b"!\x03\x00\x00\x00abc");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_small_chunks_arrive_in_order() {
    let (listener, addr) = listener().await;
    let server_rx = Recorder::default();
    let (client, _server) = connected_pair(&listener, addr, Recorder::default(), server_rx.clone()).await;

    let text = b"the quick brown fox jumps over the lazy dog";
    for byte in text {
        assert!(client.send(std::slice::from_ref(byte)));
        sleep(Duration::from_millis(1)).await;
    }
    wait_until("whole text", || server_rx.len() == text.len()).await;
    assert_eq!(server_rx.received(), text);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_receive_overflow_tears_down() {
    let (listener, addr) = listener().await;
    let client = Connection::new(Recorder::default(), config()).unwrap();
    let never_consumes = decode_fn(|_: &[u8]| Ok(0));
    let (connected, accepted) = tokio::join!(client.connect(addr), listener.accept());
    connected.unwrap();
    let server = Connection::from_stream(
        accepted.unwrap().0,
        never_consumes,
        config().with_recv_buffer_limit(64),
    )
    .unwrap();

    assert!(client.send(&[7u8; 128]));
    wait_closed(&server).await;
    wait_closed(&client).await;
    server.wait_loop().await;
    assert!(!server.is_loop_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[traced_test]
async fn test_decoder_error_tears_down() {
    let (listener, addr) = listener().await;
    let rejecting = decode_fn(|data: &[u8]| {
        if data.contains(&0xFF) {
            Err(DecodeError::new("forbidden byte"))
        } else {
            Ok(data.len())
        }
    });
    let (client, server) = connected_pair(&listener, addr, Recorder::default(), rejecting).await;

    assert!(client.send(b"fine"));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(server.state(), ConnectionState::Connected);

    assert!(client.send(&[0xFF]));
    wait_closed(&server).await;
    wait_closed(&client).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decoder_overrun_tears_down() {
    let (listener, addr) = listener().await;
    let greedy = decode_fn(|data: &[u8]| Ok(data.len() + 1));
    let (client, server) = connected_pair(&listener, addr, Recorder::default(), greedy).await;

    assert!(client.send(b"x"));
    wait_closed(&server).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_peer_close_disconnects() {
    let (listener, addr) = listener().await;
    let client_rx = Recorder::default();
    let (client, server) = connected_pair(&listener, addr, client_rx.clone(), Recorder::default()).await;

    server.close();
    assert_eq!(server.state(), ConnectionState::Disconnected);
    wait_closed(&client).await;
    client.wait_loop().await;
    assert_eq!(client_rx.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_closes_socket() {
    let (listener, addr) = listener().await;
    let (client, server) =
        connected_pair(&listener, addr, Recorder::default(), Recorder::default()).await;

    drop(client);
    wait_closed(&server).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_is_immediate_and_idempotent() {
    let (listener, addr) = listener().await;
    let (client, _server) =
        connected_pair(&listener, addr, Recorder::default(), Recorder::default()).await;

    client.close();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.queued_bytes(), 0);
    client.close();
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    timeout(WAIT, client.wait_loop()).await.unwrap();
    assert!(!client.is_loop_running());
    assert_eq!(client.remote_address(), Some(addr));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_after_disconnect() {
    let (listener, addr) = listener().await;
    let (client, _first) =
        connected_pair(&listener, addr, Recorder::default(), Recorder::default()).await;

    client.disconnect();
    wait_closed(&client).await;

    let server_rx = Recorder::default();
    let (connected, second) = tokio::join!(client.connect(addr), accept(&listener, server_rx.clone()));
    connected.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.stats().loops_started, 2);

    assert!(client.send(b"again"));
    wait_until("second session data", || server_rx.len() == 5).await;
    drop(second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_timeout_forces_teardown() {
    const TOTAL: usize = 64 * 1024 * 1024;
    let (listener, addr) = listener().await;
    let client = Connection::new(
        Recorder::default(),
        config().with_disconnect_timeout(Some(Duration::from_millis(200))),
    )
    .unwrap();
    let (connected, accepted) = tokio::join!(client.connect(addr), listener.accept());
    connected.unwrap();
    // Peer that never reads
    let (_stalled, _) = accepted.unwrap();

    assert!(client.send(&vec![0u8; TOTAL]));
    client.disconnect();
    wait_closed(&client).await;
    assert!(client.stats().bytes_sent < TOTAL as u64);
    assert_eq!(client.queued_bytes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_raw_peer_sees_bytes_in_order() {
    let (listener, addr) = listener().await;
    let client = Connection::new(Recorder::default(), config()).unwrap();
    let (connected, accepted) = tokio::join!(client.connect(addr), listener.accept());
    connected.unwrap();
    let (mut peer, _): (TcpStream, _) = accepted.unwrap();

    let expected: Vec<u8> = (0..100u8).collect();
    for chunk in expected.chunks(7) {
        assert!(client.send(chunk));
    }
    client.disconnect();

    let mut received = Vec::new();
    timeout(WAIT, peer.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, expected);
    wait_closed(&client).await;
}

/// Writes every received byte straight back
struct Echo(ConnectionSender);

impl ProtocolDecoder for Echo {
    fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
        if !self.0.send(data) {
            return Err(DecodeError::new("echo target gone"));
        }
        Ok(data.len())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decoder_replies_through_sender() {
    let (listener, addr) = listener().await;
    let recorder = Recorder::default();
    let client = Connection::new(recorder.clone(), config()).unwrap();
    let (connected, accepted) = tokio::join!(client.connect(addr), listener.accept());
    connected.unwrap();
    let (stream, _) = accepted.unwrap();
    let server = Connection::from_stream_with(stream, config(), Echo).unwrap();

    assert!(client.send(b"marco"));
    wait_until("echo", || recorder.len() == 5).await;
    assert_eq!(recorder.received(), b"marco");
    assert_eq!(server.stats().bytes_sent, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_then_reconnect_ignores_abandoned_attempt() {
    let (listener_a, addr_a) = listener().await;
    let (listener_b, addr_b) = listener().await;
    let client = Connection::new(Recorder::default(), config()).unwrap();

    client.async_connect(addr_a).unwrap();
    client.close();
    tokio::task::yield_now().await;

    let result = client.connect(addr_b).await;
    assert!(result.is_ok(), "reconnect failed: {result:?}");
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.remote_address(), Some(addr_b));

    let server_rx = Recorder::default();
    let _server = accept(&listener_b, server_rx.clone()).await;
    assert!(client.send(b"to b"));
    wait_until("second listener to receive", || server_rx.len() == 4).await;

    // The abandoned attempt still reaches the first listener, but its socket
    // is released instead of replacing the live one.
    let (mut stale, _) = timeout(WAIT, listener_a.accept()).await.unwrap().unwrap();
    let mut leftover = Vec::new();
    timeout(WAIT, stale.read_to_end(&mut leftover))
        .await
        .unwrap()
        .unwrap();
    assert!(leftover.is_empty());
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.remote_address(), Some(addr_b));
}

#[tokio::test]
async fn test_cancelled_connect_leaves_no_partial_state() {
    let (_listener, addr) = listener().await;
    let client = Connection::new(Recorder::default(), config()).unwrap();

    {
        let mut attempt = std::pin::pin!(client.connect(addr));
        tokio::select! {
            biased;
            _ = &mut attempt => {}
            _ = std::future::ready(()) => {}
        }
    }

    // Either the first poll finished the attempt or dropping it undid it
    let state = client.state();
    assert!(
        matches!(state, ConnectionState::Disconnected | ConnectionState::Connected),
        "left in {state}"
    );

    client.close();
    client.wait_loop().await;
    client.connect(addr).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.remote_address(), Some(addr));
}

#[tokio::test]
async fn test_drop_during_async_connect_releases_socket() {
    let (listener, addr) = listener().await;
    let client = Connection::new(Recorder::default(), config()).unwrap();
    let states = client.subscribe();

    client.async_connect(addr).unwrap();
    drop(client);

    let (mut peer, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut received = Vec::new();
    timeout(WAIT, peer.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert!(received.is_empty());
    assert_eq!(*states.borrow(), ConnectionState::Disconnected);
}
