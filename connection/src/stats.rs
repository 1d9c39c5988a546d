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

//! Lock-free per-connection counters

use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free connection counters
///
/// Every update is mirrored to the global `metrics` recorder, if one is
/// installed.
#[derive(Debug, Default)]
pub(crate) struct ConnectionMetrics {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    decoder_calls: AtomicU64,
    loops_started: AtomicU64,
}

impl ConnectionMetrics {
    pub(crate) fn bytes_sent(&self, count: usize) {
        self.bytes_sent.fetch_add(count as u64, Ordering::Relaxed);
        counter!("tcplink.bytes.sent").increment(count as u64);
    }

    pub(crate) fn bytes_received(&self, count: usize) {
        self.bytes_received
            .fetch_add(count as u64, Ordering::Relaxed);
        counter!("tcplink.bytes.received").increment(count as u64);
    }

    pub(crate) fn decoder_called(&self) {
        self.decoder_calls.fetch_add(1, Ordering::Relaxed);
        counter!("tcplink.decoder.calls").increment(1);
    }

    pub(crate) fn loop_started(&self) {
        self.loops_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            decoder_calls: self.decoder_calls.load(Ordering::Relaxed),
            loops_started: self.loops_started.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a connection's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStats {
    /// Bytes handed to the socket
    pub bytes_sent: u64,
    /// Bytes read from the socket
    pub bytes_received: u64,
    /// Times the protocol decoder was invoked
    pub decoder_calls: u64,
    /// Worker loops started over the connection's lifetime
    pub loops_started: u64,
}
