//! Input synchronization for a single node.
//!
//! An [`InputSyncSet`] holds one [`Stream`] per input port and answers the
//! scheduler's question: *at which timestamp, if any, can this node run?*
//!
//! The candidate timestamp `T` is the smallest queued front across the
//! inputs. The node is ready at `T` once every input is *settled* for `T`:
//!
//! - it has a queued packet (its front is `T` or later), or
//! - it is empty and its bound is past `T` (a later packet was seen, an
//!   upstream offset promised nothing earlier, or the stream is closed).
//!
//! Inputs without a packet at `T` are handed to the node as empty markers.
//! Because `T` always comes from a queued packet, at least one input is
//! non-empty in every invocation.

use crate::pipeline::error::PipelineResult;
use crate::pipeline::packet::Packet;
use crate::pipeline::stream::Stream;
use crate::pipeline::timestamp::Timestamp;

/// Outcome of evaluating a node's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The node can run at this timestamp.
    Ready(Timestamp),
    /// Some input may still deliver a packet at the candidate timestamp.
    Waiting,
    /// Every input is closed and drained.
    Exhausted,
}

#[derive(Debug, Default)]
pub struct InputSyncSet {
    streams: Vec<Stream>,
}

impl InputSyncSet {
    pub fn new(streams: Vec<Stream>) -> Self {
        Self { streams }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn stream(&self, port: usize) -> Option<&Stream> {
        self.streams.get(port)
    }

    pub fn push(&mut self, port: usize, packet: Packet) -> PipelineResult<()> {
        match self.streams.get_mut(port) {
            Some(stream) => stream.push(packet),
            None => Ok(()),
        }
    }

    pub fn close(&mut self, port: usize) {
        if let Some(stream) = self.streams.get_mut(port) {
            stream.close();
        }
    }

    pub fn advance_bound(&mut self, port: usize, bound: Timestamp) -> bool {
        self.streams
            .get_mut(port)
            .is_some_and(|s| s.advance_bound(bound))
    }

    /// Number of packets queued on `port`.
    pub fn queue_len(&self, port: usize) -> usize {
        self.streams.get(port).map_or(0, Stream::len)
    }

    /// Smallest queued front timestamp.
    pub fn min_front(&self) -> Option<Timestamp> {
        self.streams.iter().filter_map(Stream::front_timestamp).min()
    }

    /// Lower bound on the timestamp of any packet this node will still
    /// receive. Output bounds derived from a timestamp offset start here.
    pub fn settled_bound(&self) -> Timestamp {
        self.streams
            .iter()
            .map(Stream::next_timestamp_bound)
            .min()
            .unwrap_or(Timestamp::DONE)
    }

    pub fn all_drained(&self) -> bool {
        self.streams.iter().all(Stream::is_drained)
    }

    pub fn readiness(&self) -> Readiness {
        let Some(candidate) = self.min_front() else {
            return if self.all_drained() {
                Readiness::Exhausted
            } else {
                Readiness::Waiting
            };
        };
        let settled = self
            .streams
            .iter()
            .all(|s| !s.is_empty() || s.bound() > candidate);
        if settled {
            Readiness::Ready(candidate)
        } else {
            Readiness::Waiting
        }
    }

    /// Takes the packet at `ts` from every input, substituting empty markers.
    pub fn pop_at(&mut self, ts: Timestamp) -> Vec<Packet> {
        self.streams.iter_mut().map(|s| s.pop_at(ts)).collect()
    }

    /// Drops every queued packet on every input.
    pub fn discard_all(&mut self) -> usize {
        self.streams.iter_mut().map(Stream::discard_all).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_set(n: usize) -> InputSyncSet {
        InputSyncSet::new((0..n).map(|i| Stream::new(format!("in{i}"))).collect())
    }

    fn push(set: &mut InputSyncSet, port: usize, ts: i64) {
        set.push(port, Packet::new(ts).at(ts)).unwrap();
    }

    #[test]
    fn test_waits_for_open_empty_input() {
        let mut set = sync_set(2);
        push(&mut set, 0, 0);
        assert_eq!(set.readiness(), Readiness::Waiting);
    }

    #[test]
    fn test_ready_when_all_present() {
        let mut set = sync_set(2);
        push(&mut set, 0, 0);
        push(&mut set, 1, 0);
        assert_eq!(set.readiness(), Readiness::Ready(Timestamp::new(0)));
        let packets = set.pop_at(Timestamp::new(0));
        assert!(packets.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn test_later_packet_settles_earlier_timestamp() {
        let mut set = sync_set(2);
        push(&mut set, 0, 5);
        push(&mut set, 1, 10);
        assert_eq!(set.readiness(), Readiness::Ready(Timestamp::new(5)));
        let packets = set.pop_at(Timestamp::new(5));
        assert!(!packets[0].is_empty());
        assert!(packets[1].is_empty());
        // 10 is only on input 1 and input 0 has moved past 5 but not past 10.
        assert_eq!(set.readiness(), Readiness::Waiting);
    }

    #[test]
    fn test_closed_input_reads_as_empty() {
        let mut set = sync_set(2);
        push(&mut set, 0, 10);
        set.close(1);
        assert_eq!(set.readiness(), Readiness::Ready(Timestamp::new(10)));
        let packets = set.pop_at(Timestamp::new(10));
        assert!(packets[1].is_empty());
    }

    #[test]
    fn test_bound_settles_empty_input() {
        let mut set = sync_set(2);
        push(&mut set, 0, 3);
        assert!(set.advance_bound(1, Timestamp::new(3)));
        assert_eq!(set.readiness(), Readiness::Waiting);
        assert!(set.advance_bound(1, Timestamp::new(4)));
        assert_eq!(set.readiness(), Readiness::Ready(Timestamp::new(3)));
    }

    #[test]
    fn test_exhausted_after_drain() {
        let mut set = sync_set(2);
        push(&mut set, 0, 1);
        set.close(0);
        set.close(1);
        assert_eq!(set.readiness(), Readiness::Ready(Timestamp::new(1)));
        set.pop_at(Timestamp::new(1));
        assert_eq!(set.readiness(), Readiness::Exhausted);
        assert_eq!(set.settled_bound(), Timestamp::DONE);
    }

    #[test]
    fn test_settled_bound() {
        let mut set = sync_set(2);
        push(&mut set, 0, 7);
        set.advance_bound(1, Timestamp::new(4));
        assert_eq!(set.settled_bound(), Timestamp::new(4));
    }
}
