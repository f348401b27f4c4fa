//! Pending-send queue.
//!
//! Outbound messages wait here until the connection's `do_work` pump writes
//! them. The queue owns each entry from `enqueue` until its completion
//! callback fires; removing an entry drops its buffer.
//!
//! # Ordering
//!
//! Strictly FIFO. Only the head entry is ever written, so partial progress on
//! the head never lets a later entry start.

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;

use crate::{
    completion::{Completion, OnSendComplete},
    error::{Result, TlsIoError},
    timeout::Deadline,
};

/// A single queued outbound message.
pub struct PendingSend<I> {
    buffer: Bytes,
    unsent: usize,
    deadline: Option<Deadline<I>>,
    on_complete: OnSendComplete,
}

impl<I> PendingSend<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Total size of the message in bytes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes not yet accepted by the transport.
    #[must_use]
    pub fn unsent(&self) -> usize {
        self.unsent
    }

    /// The unsent tail of the message.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.buffer[self.total() - self.unsent..]
    }

    /// Record that `written` more bytes were accepted by the transport.
    pub fn advance(&mut self, written: usize) {
        debug_assert!(written <= self.unsent, "wrote {written} of {} unsent", self.unsent);
        self.unsent -= written.min(self.unsent);
    }

    /// Arm the send deadline if this is the first time the entry is serviced.
    ///
    /// Later calls return the deadline armed on first touch.
    pub fn activate(&mut self, now: I, window: Duration) -> Deadline<I> {
        *self.deadline.get_or_insert_with(|| Deadline::start(now, window))
    }

    /// Deadline armed on first touch, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<&Deadline<I>> {
        self.deadline.as_ref()
    }
}

impl<I> std::fmt::Debug for PendingSend<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSend")
            .field("total", &self.buffer.len())
            .field("unsent", &self.unsent)
            .field("active", &self.deadline.is_some())
            .finish()
    }
}

/// FIFO of pending sends.
pub struct SendQueue<I> {
    entries: VecDeque<PendingSend<I>>,
}

impl<I> SendQueue<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { entries: VecDeque::new() }
    }

    /// Copy `bytes` into an owned buffer and append it to the tail.
    ///
    /// # Errors
    ///
    /// Returns `Allocation` if the buffer or the queue slot cannot be
    /// reserved. Nothing is queued and `on_complete` is dropped unfired.
    pub fn enqueue(&mut self, bytes: &[u8], on_complete: OnSendComplete) -> Result<()> {
        let buffer = if bytes.is_empty() {
            Bytes::new()
        } else {
            let mut owned = Vec::new();
            owned
                .try_reserve_exact(bytes.len())
                .map_err(|_| TlsIoError::Allocation { size: bytes.len() })?;
            owned.extend_from_slice(bytes);
            Bytes::from(owned)
        };

        self.entries.try_reserve(1).map_err(|_| TlsIoError::Allocation {
            size: std::mem::size_of::<PendingSend<I>>(),
        })?;

        let unsent = buffer.len();
        self.entries.push_back(PendingSend { buffer, unsent, deadline: None, on_complete });
        Ok(())
    }

    /// Peek at the oldest pending send.
    pub fn head_mut(&mut self) -> Option<&mut PendingSend<I>> {
        self.entries.front_mut()
    }

    /// Remove the head entry and fire its callback with `result`.
    ///
    /// Returns `false` and does nothing if the queue is empty.
    pub fn pop_and_complete(&mut self, result: Completion) -> bool {
        match self.entries.pop_front() {
            Some(entry) => {
                (entry.on_complete)(result);
                true
            },
            None => false,
        }
    }

    /// Complete every entry with `result`, oldest first.
    ///
    /// Returns how many entries were completed.
    pub fn drain_with(&mut self, result: Completion) -> usize {
        let mut drained = 0;
        while self.pop_and_complete(result) {
            drained += 1;
        }
        drained
    }

    /// Number of queued sends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I> Default for SendQueue<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}
