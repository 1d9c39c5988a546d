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

//! Lock-free metrics for the Tcplink server
//!
//! Every update is also reported through the `metrics` facade so an
//! installed recorder sees the same numbers.

use metrics::{counter, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
#[derive(Debug)]
pub struct ServerMetrics {
    accepted: AtomicU64,
    rejected: AtomicU64,
    active: AtomicU64,
    accept_errors: AtomicU64,
    total_connection_duration_ns: AtomicU64,
    closed: AtomicU64,
    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            active: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            closed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record an accepted connection
    pub fn connection_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        counter!("tcplink.server.accepted").increment(1);
    }

    /// Record a connection turned away at the connection limit
    pub fn connection_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        counter!("tcplink.server.rejected").increment(1);
    }

    /// Record a connection leaving the server
    pub fn connection_closed(&self, duration: Duration) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.closed.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        histogram!("tcplink.server.connection_duration").record(duration.as_secs_f64());
    }

    /// Record a failed `accept` or socket setup
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
        counter!("tcplink.errors.accept").increment(1);
    }

    /// Current number of connections
    pub fn active_connections(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Connections accepted since server start
    pub fn total_connections(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Get a point-in-time view of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Connections accepted since server start
    pub accepted: u64,
    /// Connections turned away at the limit
    pub rejected: u64,
    /// Current connections
    pub active: u64,
    /// Failed accepts
    pub accept_errors: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average lifetime of closed connections
    pub avg_connection_duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let metrics = ServerMetrics::new();
        metrics.connection_accepted();
        metrics.connection_accepted();
        metrics.connection_rejected();
        metrics.connection_closed(Duration::from_secs(2));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.active, 1);
        assert_eq!(snapshot.avg_connection_duration, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_average() {
        let metrics = ServerMetrics::default();
        assert_eq!(metrics.snapshot().avg_connection_duration, Duration::ZERO);
        assert_eq!(metrics.total_connections(), 0);
    }
}
