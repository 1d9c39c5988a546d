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

//! Frame encoding and sending

use byteorder::{ByteOrder, LittleEndian};
use tcplink_connection::Connection;
use tracing::warn;

/// Size of the length prefix in front of every frame
pub const HEADER_LEN: usize = 4;

/// Length prefix for a payload of `length` bytes
///
/// Returns `None` if the length does not fit in the header.
pub fn frame_header(length: usize) -> Option<[u8; HEADER_LEN]> {
    let length = u32::try_from(length).ok()?;
    let mut header = [0; HEADER_LEN];
    LittleEndian::write_u32(&mut header, length);
    Some(header)
}

/// Header and payload as one contiguous frame
pub fn encode_frame(payload: &[u8]) -> Option<Vec<u8>> {
    let header = frame_header(payload.len())?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Some(frame)
}

/// Sends length-prefixed frames over a connection
pub trait FrameSender {
    /// Queue `payload` as one frame behind everything already queued
    fn send_frame(&self, payload: &[u8]) -> bool;

    /// Queue `payload` as one frame ahead of everything already queued
    fn send_urgent_frame(&self, payload: &[u8]) -> bool;
}

impl FrameSender for Connection {
    fn send_frame(&self, payload: &[u8]) -> bool {
        let Some(header) = frame_header(payload.len()) else {
            warn!(connection_id = %self.id(), bytes = payload.len(), "Frame too large");
            return false;
        };
        self.send_framed(&header, payload)
    }

    fn send_urgent_frame(&self, payload: &[u8]) -> bool {
        let Some(frame) = encode_frame(payload) else {
            warn!(connection_id = %self.id(), bytes = payload.len(), "Frame too large");
            return false;
        };
        self.send_urgent(&frame)
    }
}
