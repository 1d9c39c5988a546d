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

//! Protocol decoder capability
//!
//! The connection core never interprets payload bytes. Whatever protocol sits
//! on top implements [`ProtocolDecoder`] and is injected when the connection
//! is built. The worker calls it synchronously each time new bytes arrive.

use std::fmt;

/// Protocol layer reported malformed input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("decode error: {message}")]
pub struct DecodeError {
    message: String,
}

impl DecodeError {
    /// Create a decode error with a description
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Description of what went wrong
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Interprets accumulated inbound bytes
///
/// # Example
///
/// ```
/// use tcplink_connection::{DecodeError, ProtocolDecoder};
///
/// /// Splits the stream into newline-terminated lines.
/// struct Lines(Vec<String>);
///
/// impl ProtocolDecoder for Lines {
///     fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
///         let mut consumed = 0;
///         while let Some(end) = data[consumed..].iter().position(|b| *b == b'\n') {
///             let line = &data[consumed..consumed + end];
///             self.0.push(String::from_utf8_lossy(line).into_owned());
///             consumed += end + 1;
///         }
///         Ok(consumed)
///     }
/// }
///
/// let mut lines = Lines(Vec::new());
/// assert_eq!(lines.on_data_received(b"a\nb\npartial").unwrap(), 4);
/// assert_eq!(lines.0, vec!["a", "b"]);
/// ```
pub trait ProtocolDecoder: Send + 'static {
    /// Consume as many complete messages from `data` as are present
    ///
    /// Returns how many leading bytes were consumed. Unconsumed trailing
    /// bytes are offered again, with anything new appended, on the next
    /// call. Returning an error tears the connection down. Must not block.
    fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError>;

    /// Called after the connection has been torn down and buffers cleared
    fn on_disconnect(&mut self) {}
}

impl ProtocolDecoder for Box<dyn ProtocolDecoder> {
    fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
        (**self).on_data_received(data)
    }

    fn on_disconnect(&mut self) {
        (**self).on_disconnect()
    }
}

/// Decoder backed by a closure, see [`decode_fn`]
pub struct FnDecoder<F>(F);

/// Build a decoder from a closure
///
/// ```
/// use tcplink_connection::{decode_fn, ProtocolDecoder};
///
/// let mut total = 0;
/// let mut decoder = decode_fn(move |data: &[u8]| {
///     total += data.len();
///     Ok(data.len())
/// });
/// assert_eq!(decoder.on_data_received(b"abc").unwrap(), 3);
/// ```
pub fn decode_fn<F>(f: F) -> FnDecoder<F>
where
    F: FnMut(&[u8]) -> Result<usize, DecodeError> + Send + 'static,
{
    FnDecoder(f)
}

impl<F> ProtocolDecoder for FnDecoder<F>
where
    F: FnMut(&[u8]) -> Result<usize, DecodeError> + Send + 'static,
{
    fn on_data_received(&mut self, data: &[u8]) -> Result<usize, DecodeError> {
        (self.0)(data)
    }
}

/// Boxed decoder held by a connection
pub(crate) struct BoxedDecoder(pub(crate) Box<dyn ProtocolDecoder>);

impl fmt::Debug for BoxedDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProtocolDecoder")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_decoder() {
        let mut seen = 0usize;
        let mut decoder = decode_fn(move |data: &[u8]| {
            seen += data.len();
            if seen > 8 {
                Err(DecodeError::new("too much"))
            } else {
                Ok(data.len())
            }
        });
        assert_eq!(decoder.on_data_received(b"1234").unwrap(), 4);
        let err = decoder.on_data_received(b"56789").unwrap_err();
        assert_eq!(err.message(), "too much");
        assert_eq!(err.to_string(), "decode error: too much");
    }
}

