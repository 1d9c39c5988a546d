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

//! Tcplink Server
//!
//! Accepts TCP sockets and runs each one as a
//! [`tcplink_connection::Connection`]. A [`ServerHandler`] supplies the
//! protocol decoder for every socket and observes connection lifecycles;
//! the [`ConnectionManager`] tracks live connections for lookup, broadcast
//! and graceful shutdown.
//!
//! ```text
//! TcpServer ── accept ──> Connection::from_stream_with(handler.decoder)
//!     │                              │
//!     └── ConnectionManager <── add ─┘ (removed again once Disconnected)
//! ```

mod config;
mod error;
mod handler;
mod manager;
mod metrics;
mod server;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use handler::ServerHandler;
pub use manager::{BroadcastResult, ConnectionManager};
pub use crate::metrics::{MetricsSnapshot, ServerMetrics};
pub use server::TcpServer;
