//! Graph boundary: how packets enter and leave a running graph.
//!
//! - [`GraphInputHandle`] pushes packets into graph input streams from any
//!   thread. It is cheap to clone.
//! - [`OutputStreamPoller`] blocks until the next packet on a graph output
//!   stream, or until the stream closes.
//! - [`OutputObserver`] callbacks see every packet on a graph output stream
//!   as it is emitted.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::{panic_message, Shared};
use crate::pipeline::packet::Packet;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked for every packet on an observed output stream.
///
/// Observers run on worker threads while the scheduler lock is held. They
/// must return quickly and must not call back into the graph. An error or a
/// panic aborts the run.
pub type OutputObserver = Box<dyn FnMut(&Packet) -> PipelineResult<()> + Send>;

/// Delivery side of one graph output stream.
pub(crate) struct OutputChannel {
    name: String,
    /// One sender per poller. Dropping them ends the pollers' streams.
    senders: Vec<Sender<Packet>>,
    observers: Vec<OutputObserver>,
}

impl OutputChannel {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            senders: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Creates the receiving end for a new poller.
    pub(crate) fn subscribe(&mut self) -> Receiver<Packet> {
        // Unbounded: a full channel would block a worker holding the lock.
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    pub(crate) fn add_observer(&mut self, observer: OutputObserver) {
        self.observers.push(observer);
    }

    pub(crate) fn emit(&mut self, packet: &Packet) -> PipelineResult<()> {
        for observer in &mut self.observers {
            catch_unwind(AssertUnwindSafe(|| observer(packet))).unwrap_or_else(|panic| {
                Err(PipelineError::Node(format!(
                    "observer of '{}' panicked: {}",
                    self.name,
                    panic_message(&*panic)
                )))
            })?;
        }
        // A dropped poller only loses its own copy.
        self.senders.retain(|tx| tx.send(packet.clone()).is_ok());
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.senders.clear();
    }
}

/// Blocking reader of a graph output stream.
///
/// Created with [`Graph::add_output_stream_poller`](super::Graph::add_output_stream_poller)
/// before the run starts.
pub struct OutputStreamPoller {
    receiver: Receiver<Packet>,
    name: String,
}

impl OutputStreamPoller {
    pub(crate) fn new(receiver: Receiver<Packet>, name: String) -> Self {
        Self { receiver, name }
    }

    pub fn stream_name(&self) -> &str {
        &self.name
    }

    /// Blocks until the next packet arrives. Returns `None` once the stream
    /// is closed and drained, or the run has ended.
    pub fn next(&self) -> Option<Packet> {
        self.receiver.recv().ok()
    }

    /// Like [`next`](Self::next), giving up after `timeout`.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Packet> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Returns a queued packet without blocking.
    pub fn try_next(&self) -> Option<Packet> {
        self.receiver.try_recv().ok()
    }

    /// Number of packets waiting to be read.
    pub fn queue_len(&self) -> usize {
        self.receiver.len()
    }

    /// Blocking iterator over the remaining packets.
    pub fn iter(&self) -> impl Iterator<Item = Packet> + '_ {
        self.receiver.iter()
    }
}

/// Thread-safe handle for feeding graph input streams.
///
/// Obtained from [`Graph::input_handle`](super::Graph::input_handle).
#[derive(Clone)]
pub struct GraphInputHandle {
    shared: Arc<Shared>,
}

impl GraphInputHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Pushes `packet` into input stream `stream`. The packet's timestamp
    /// must be after the previous one on that stream.
    pub fn add_packet(&self, stream: &str, packet: Packet) -> PipelineResult<()> {
        self.shared.add_packet(stream, packet)
    }

    /// Closes input stream `stream`. Closing twice is allowed.
    pub fn close(&self, stream: &str) -> PipelineResult<()> {
        self.shared.close_input(stream)
    }

    /// Closes every graph input stream.
    pub fn close_all(&self) -> PipelineResult<()> {
        self.shared.close_all_inputs()
    }
}
