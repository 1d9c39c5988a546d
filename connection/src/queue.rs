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

//! Outbound send queue
//!
//! Normal sends are appended to the tail. Priority sends are pushed to the
//! head and jump every byte that is currently queued. The worker drains the
//! queue with [`SendQueue::try_pop`], which never waits on a contended lock;
//! teardown paths use [`SendQueue::pop`], which does.

use crate::buffer::ByteBuffer;
use bytes::Bytes;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// Mutex guarded outbound byte queue
#[derive(Debug, Default)]
pub struct SendQueue {
    buffer: Mutex<ByteBuffer>,
}

impl SendQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue with preallocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(ByteBuffer::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ByteBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `data` to the tail
    pub fn push_back(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        // The queue is unbounded, so appending cannot overflow.
        let _ = self.lock().append(data);
    }

    /// Append `head` followed by `body` as one contiguous unit
    pub fn push_back_framed(&self, head: &[u8], body: &[u8]) {
        let _ = self.lock().append_pair(head, body);
    }

    /// Insert `data` ahead of everything currently queued
    pub fn push_front(&self, data: &[u8]) {
        let _ = self.lock().prepend(data);
    }

    /// Take every queued byte if the lock is free right now
    ///
    /// Returns `None` when the queue is empty or another thread holds it.
    pub fn try_pop(&self) -> Option<Bytes> {
        let mut buffer = match self.buffer.try_lock() {
            Ok(buffer) => buffer,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Self::take(&mut buffer)
    }

    /// Take every queued byte, waiting for the lock if needed
    pub fn pop(&self) -> Option<Bytes> {
        Self::take(&mut self.lock())
    }

    fn take(buffer: &mut ByteBuffer) -> Option<Bytes> {
        if buffer.is_empty() {
            None
        } else {
            Some(buffer.take())
        }
    }

    /// Number of queued bytes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop everything queued
    pub fn clear(&self) {
        self.lock().clear();
    }
}
