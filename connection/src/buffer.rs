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

//! Growable byte storage used by both the send queue and the receive path
//!
//! A [`ByteBuffer`] is a contiguous run of bytes with a used length and an
//! allocated capacity. Growth is amortized by the underlying [`BytesMut`].
//! A buffer may optionally carry a hard upper bound; appending past that
//! bound fails with [`BufferOverflow`] instead of truncating.

use bytes::{Bytes, BytesMut};

/// Appending would push a bounded buffer past its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("buffer limit of {limit} bytes exceeded ({requested} bytes requested)")]
pub struct BufferOverflow {
    /// Configured upper bound of the buffer
    pub limit: usize,
    /// Total length the buffer would have reached
    pub requested: usize,
}

/// Growable byte buffer with optional hard limit
#[derive(Debug, Default)]
pub struct ByteBuffer {
    data: BytesMut,
    limit: Option<usize>,
}

impl ByteBuffer {
    /// Create an empty, unbounded buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty, unbounded buffer with preallocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            limit: None,
        }
    }

    /// Bound the buffer to at most `limit` unconsumed bytes
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Configured upper bound, if any
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Number of bytes currently held
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if no bytes are held
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// View of the held bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Bytes that can still be appended before the limit is hit
    pub fn remaining(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_sub(self.data.len()))
    }

    fn check(&self, additional: usize) -> Result<(), BufferOverflow> {
        let requested = self.data.len().saturating_add(additional);
        match self.limit {
            Some(limit) if requested > limit => Err(BufferOverflow { limit, requested }),
            _ => Ok(()),
        }
    }

    /// Append `data` to the tail
    pub fn append(&mut self, data: &[u8]) -> Result<(), BufferOverflow> {
        self.check(data.len())?;
        self.data.extend_from_slice(data);
        Ok(())
    }

    /// Append `head` immediately followed by `body`
    ///
    /// Either both spans are stored or neither is.
    pub fn append_pair(&mut self, head: &[u8], body: &[u8]) -> Result<(), BufferOverflow> {
        self.check(head.len().saturating_add(body.len()))?;
        self.data.reserve(head.len() + body.len());
        self.data.extend_from_slice(head);
        self.data.extend_from_slice(body);
        Ok(())
    }

    /// Insert `data` ahead of everything currently held
    pub fn prepend(&mut self, data: &[u8]) -> Result<(), BufferOverflow> {
        if data.is_empty() {
            return Ok(());
        }
        self.check(data.len())?;
        if self.data.is_empty() {
            self.data.extend_from_slice(data);
            return Ok(());
        }
        let mut joined = BytesMut::with_capacity(data.len() + self.data.len());
        joined.extend_from_slice(data);
        joined.extend_from_slice(&self.data);
        self.data = joined;
        Ok(())
    }

    /// Drop up to `count` bytes from the front, returning how many were dropped
    pub fn consume(&mut self, count: usize) -> usize {
        let count = count.min(self.data.len());
        let _ = self.data.split_to(count);
        count
    }

    /// Hand out every held byte and reset the used length to zero
    pub fn take(&mut self) -> Bytes {
        self.data.split().freeze()
    }

    /// Discard every held byte
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
