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

//! Length-prefixed frame decoder
//!
//! Every frame is a 4-byte little-endian payload length followed by the
//! payload itself. The decoder hands each complete payload to a
//! [`FrameHandler`] and leaves partial frames in the connection's receive
//! buffer until the rest arrives.

use crate::{FramingConfig, HEADER_LEN};
use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use tcplink_connection::{DecodeError, ProtocolDecoder};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Receives decoded frame payloads
pub trait FrameHandler: Send + 'static {
    /// Handle one complete frame payload
    ///
    /// Returning an error tears the connection down.
    fn on_frame(&mut self, frame: Bytes) -> Result<(), DecodeError>;

    /// Called when the underlying connection has gone away
    fn on_disconnect(&mut self) {}
}

impl FrameHandler for mpsc::UnboundedSender<Bytes> {
    fn on_frame(&mut self, frame: Bytes) -> Result<(), DecodeError> {
        self.send(frame)
            .map_err(|_| DecodeError::new("frame receiver dropped"))
    }
}

impl FrameHandler for Box<dyn FrameHandler> {
    fn on_frame(&mut self, frame: Bytes) -> Result<(), DecodeError> {
        (**self).on_frame(frame)
    }

    fn on_disconnect(&mut self) {
        (**self).on_disconnect()
    }
}

/// Splits a byte stream into length-prefixed frames
#[derive(Debug)]
pub struct LengthPrefixedDecoder<H> {
    handler: H,
    config: FramingConfig,
    frames_decoded: u64,
}

impl<H: FrameHandler> LengthPrefixedDecoder<H> {
    /// Create a decoder with the default configuration
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, FramingConfig::default())
    }

    /// Create a decoder with the given configuration
    pub fn with_config(handler: H, config: FramingConfig) -> Self {
        Self {
            handler,
            config,
            frames_decoded: 0,
        }
    }

    /// Number of frames handed to the handler so far
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Get the handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Get the handler mutably
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consume the decoder, returning the handler
    pub fn into_handler(self) -> H {
        self.handler
    }
}

impl<H: FrameHandler> ProtocolDecoder for LengthPrefixedDecoder<H> {
    fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
        let mut consumed = 0;
        while data.len() - consumed >= HEADER_LEN {
            let length = LittleEndian::read_u32(&data[consumed..consumed + HEADER_LEN]) as usize;
            if length > self.config.max_frame_length {
                return Err(DecodeError::new(format!(
                    "frame of {} bytes exceeds limit of {} bytes",
                    length, self.config.max_frame_length
                )));
            }
            let end = consumed + HEADER_LEN + length;
            if data.len() < end {
                trace!(needed = end - data.len(), "Partial frame buffered");
                break;
            }
            let payload = Bytes::copy_from_slice(&data[consumed + HEADER_LEN..end]);
            self.handler.on_frame(payload)?;
            self.frames_decoded += 1;
            consumed = end;
        }
        Ok(consumed)
    }

    fn on_disconnect(&mut self) {
        debug!(frames = self.frames_decoded, "Framed connection ended");
        self.handler.on_disconnect();
    }
}
