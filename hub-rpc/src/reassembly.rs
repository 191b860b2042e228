//! Fragment reassembly
//!
//! Turns the transport's physical reads into complete logical messages. A
//! read that is a whole message by itself is passed through without copying;
//! anything else is accumulated in a pooled buffer until the end-of-message
//! marker arrives.

use std::ops::Deref;

use bytes::Bytes;
use hub_transport::Fragment;

use crate::error::ReassemblyError;
use crate::pool::{BufferPool, PooledBuf};

/// A complete logical message
#[derive(Debug)]
pub enum Message {
    /// Delivered by a single read
    Direct(Bytes),
    /// Assembled from several reads
    Pooled(PooledBuf),
}

impl Deref for Message {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Message::Direct(bytes) => &bytes[..],
            Message::Pooled(buf) => &buf[..],
        }
    }
}

/// Accumulates fragments of one connection's inbound stream
#[derive(Debug)]
pub struct Reassembler {
    pool: BufferPool,
    scratch: Option<PooledBuf>,
    max_message_size: usize,
    /// Dropping the rest of an oversized message
    discarding: bool,
}

impl Reassembler {
    pub fn new(pool: BufferPool, max_message_size: usize) -> Self {
        Self {
            pool,
            scratch: None,
            max_message_size,
            discarding: false,
        }
    }

    /// Feed one read
    ///
    /// Returns the completed message when `fragment` carries the end-of-message
    /// marker. An oversized message yields an error once, and its remaining
    /// fragments are swallowed; the stream then continues with the next message.
    pub fn push(&mut self, fragment: Fragment) -> Result<Option<Message>, ReassemblyError> {
        let Fragment {
            data,
            end_of_message,
        } = fragment;

        if self.discarding {
            if end_of_message {
                self.discarding = false;
            }
            return Ok(None);
        }

        let buffered = self.scratch.as_ref().map_or(0, |buf| buf.len());
        let size = buffered + data.len();
        if size > self.max_message_size {
            self.scratch = None;
            self.discarding = !end_of_message;
            return Err(ReassemblyError::MessageTooLarge {
                size,
                limit: self.max_message_size,
            });
        }

        if end_of_message && self.scratch.is_none() {
            return Ok(Some(Message::Direct(data)));
        }

        let scratch = self.scratch.get_or_insert_with(|| self.pool.get());
        scratch.extend_from_slice(&data);

        if end_of_message {
            Ok(self.scratch.take().map(Message::Pooled))
        } else {
            Ok(None)
        }
    }

    /// Drop any partially assembled message
    ///
    /// Called when the connection is lost mid-message.
    pub fn discard_partial(&mut self) -> bool {
        self.discarding = false;
        self.scratch.take().is_some()
    }

    /// Whether a message is partially assembled
    pub fn has_partial(&self) -> bool {
        self.scratch.is_some()
    }
}
