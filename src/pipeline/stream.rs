//! Per-consumer packet queues.
//!
//! Every consumer port owns its own [`Stream`] queue; a producer fanning out
//! to several consumers pushes a clone of the packet (sharing the payload)
//! into each one.
//!
//! Besides the packets themselves a stream tracks a *bound*: the smallest
//! timestamp a future packet may still carry. The bound advances past every
//! pushed packet, can be raised by upstream timestamp offsets, and becomes
//! [`Timestamp::DONE`] on close. The scheduler uses it to decide that no
//! packet will arrive at a given timestamp.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::packet::Packet;
use crate::pipeline::timestamp::Timestamp;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct Stream {
    name: String,
    queue: VecDeque<Packet>,
    last_pushed: Timestamp,
    bound: Timestamp,
    closed: bool,
}

impl Stream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: VecDeque::new(),
            last_pushed: Timestamp::UNSET,
            bound: Timestamp::UNSTARTED,
            closed: false,
        }
    }

    /// A stream that is closed before it ever carries a packet. Used for
    /// optional ports left unconnected.
    pub fn closed(name: impl Into<String>) -> Self {
        let mut stream = Self::new(name);
        stream.close();
        stream
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a packet. Its timestamp must be a range value strictly after
    /// the previous packet and not below the current bound.
    pub fn push(&mut self, packet: Packet) -> PipelineResult<()> {
        let ts = packet.timestamp();
        if self.closed {
            return Err(PipelineError::StreamClosed(self.name.clone()));
        }
        if !ts.is_range_value() {
            return Err(PipelineError::InvalidTimestamp {
                stream: self.name.clone(),
                timestamp: ts,
            });
        }
        if ts < self.bound {
            let last = if self.last_pushed.is_unset() {
                self.bound
            } else {
                self.last_pushed
            };
            return Err(PipelineError::OrderingViolation {
                stream: self.name.clone(),
                timestamp: ts,
                last,
            });
        }
        self.last_pushed = ts;
        self.bound = ts.next();
        self.queue.push_back(packet);
        Ok(())
    }

    /// Marks the stream as finished. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
        self.bound = Timestamp::DONE;
    }

    /// Raises the bound to `bound`. Returns `true` if the bound moved.
    pub fn advance_bound(&mut self, bound: Timestamp) -> bool {
        if self.closed || bound <= self.bound {
            return false;
        }
        self.bound = bound;
        true
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed and no packet left to consume.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.closed && self.queue.is_empty()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn bound(&self) -> Timestamp {
        self.bound
    }

    #[inline]
    pub fn last_pushed(&self) -> Timestamp {
        self.last_pushed
    }

    /// Timestamp of the oldest queued packet.
    pub fn front_timestamp(&self) -> Option<Timestamp> {
        self.queue.front().map(Packet::timestamp)
    }

    /// Lower bound on the timestamp of the next packet this stream will
    /// deliver: the queued front if any, the bound otherwise.
    pub fn next_timestamp_bound(&self) -> Timestamp {
        self.front_timestamp().unwrap_or(self.bound)
    }

    /// Pops the front packet if it is stamped `ts`, otherwise returns an
    /// empty marker.
    pub fn pop_at(&mut self, ts: Timestamp) -> Packet {
        if self.front_timestamp() == Some(ts) {
            if let Some(packet) = self.queue.pop_front() {
                return packet;
            }
        }
        Packet::empty()
    }

    /// Drops every queued packet. Returns how many were discarded.
    pub fn discard_all(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        n
    }
}
