//! Graph executor: the run lifecycle and the timestamp scheduler.
//!
//! A run goes through these steps:
//! 1. `initialize` compiles the config into a [`CompiledGraph`].
//! 2. `start_run` resolves side packets, then calls `open` on every node in
//!    topological order on the caller thread and spawns the worker pool.
//! 3. Workers pull node tasks from a channel. A task re-evaluates the node's
//!    inputs under the lock, runs the calculator outside it, then delivers
//!    the outputs and wakes the consumers.
//! 4. A node whose inputs are all closed and drained (or a source that
//!    returned `Stop`) is closed. The run ends when every node is closed.
//!
//! All run state lives behind one `parking_lot::Mutex`. A node is queued at
//! most once at a time, so it never runs concurrently with itself and sees
//! its timestamps in increasing order.

use crate::config::RuntimeConfig;
use crate::pipeline::bridge::{
    GraphInputHandle, OutputChannel, OutputObserver, OutputStreamPoller,
};
use crate::pipeline::compiled_plan::{CompiledGraph, CompiledNode};
use crate::pipeline::compiler::GraphCompiler;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::frontier::{InputSyncSet, Readiness};
use crate::pipeline::graph_config::GraphConfig;
use crate::pipeline::id::StreamId;
use crate::pipeline::node::{AnyCalculator, CalculatorContext, NodeLifecycle, ProcessStatus};
use crate::pipeline::packet::Packet;
use crate::pipeline::port::port_label;
use crate::pipeline::registry::CalculatorRegistry;
use crate::pipeline::stream::Stream;
use crate::pipeline::timestamp::{Timestamp, TimestampDiff};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Work item for the worker pool.
#[derive(Debug, Clone, Copy)]
enum Task {
    Run(usize),
    Shutdown,
}

/// What a node does when it gets a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Process(Timestamp),
    Poll,
    Close,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// `process` calls, source polls included
    pub process_calls: u64,
    /// Packets accepted from node outputs and graph inputs
    pub packets_delivered: u64,
    /// Extra polls granted to throttled sources while the graph was idle
    pub forced_polls: u64,
}

/// Per-output bookkeeping of a node.
#[derive(Debug, Clone, Copy)]
struct OutputState {
    last: Timestamp,
    bound: Timestamp,
    closed: bool,
}

impl Default for OutputState {
    fn default() -> Self {
        Self {
            last: Timestamp::UNSET,
            bound: Timestamp::UNSTARTED,
            closed: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct GraphInputState {
    last: Timestamp,
    closed: bool,
}

struct NodeRuntime {
    /// `None` while the calculator is running on a worker
    calculator: Option<AnyCalculator>,
    inputs: InputSyncSet,
    outputs: Vec<OutputState>,
    lifecycle: NodeLifecycle,
    offset: Option<TimestampDiff>,
    side_packets: Arc<[Packet]>,
    is_source: bool,
    stopped: bool,
    /// In the task channel or running
    queued: bool,
    force_once: bool,
}

impl NodeRuntime {
    fn new(
        plan: &CompiledGraph,
        node: &CompiledNode,
        side_packets: &[Packet],
    ) -> PipelineResult<Self> {
        let calculator = node.registration.create().ok_or_else(|| {
            PipelineError::Config(format!("'{}' does not create a calculator", node.calculator))
        })?;
        let streams = node
            .inputs
            .iter()
            .zip(node.contract.inputs.iter())
            .map(|(stream, port)| match stream {
                Some(id) => Stream::new(plan.stream(*id).name.clone()),
                None => Stream::closed(format!("{}:{}", node.name, port.label())),
            })
            .collect();
        let side: Vec<Packet> = node
            .side_inputs
            .iter()
            .map(|slot| slot.map_or_else(Packet::empty, |i| side_packets[i].clone()))
            .collect();
        Ok(Self {
            calculator: Some(calculator),
            inputs: InputSyncSet::new(streams),
            outputs: vec![OutputState::default(); node.outputs.len()],
            lifecycle: NodeLifecycle::Constructed,
            offset: node.contract.timestamp_offset,
            side_packets: side.into(),
            is_source: node.is_source(),
            stopped: false,
            queued: false,
            force_once: false,
        })
    }

    fn is_live(&self) -> bool {
        matches!(self.lifecycle, NodeLifecycle::Opened | NodeLifecycle::Running)
    }
}

/// Mutable state of a run, guarded by `Shared::state`.
#[derive(Default)]
pub(crate) struct RunState {
    nodes: Vec<NodeRuntime>,
    graph_inputs: Vec<GraphInputState>,
    outputs: Vec<OutputChannel>,
    closed_nodes: usize,
    /// Nodes queued or running
    pending: usize,
    started: bool,
    finished: bool,
    joined: bool,
    error: Option<PipelineError>,
    stats: RunStats,
}

/// A calculator call prepared under the lock and run outside it.
struct Invocation {
    action: Action,
    calculator: AnyCalculator,
    inputs: Vec<Packet>,
    side_packets: Arc<[Packet]>,
    offset: Option<TimestampDiff>,
}

struct Outcome {
    action: Action,
    calculator: AnyCalculator,
    result: PipelineResult<ProcessStatus>,
    outputs: Vec<(usize, Packet)>,
    offset: Option<TimestampDiff>,
}

/// State shared between the graph, its workers, pollers and input handles.
pub(crate) struct Shared {
    plan: Arc<CompiledGraph>,
    state: Mutex<RunState>,
    changed: Condvar,
    tasks: Sender<Task>,
    num_workers: usize,
    max_queue_size: usize,
    sources: Vec<usize>,
}

impl Shared {
    // ── Scheduling ──

    fn next_action(&self, st: &RunState, idx: usize) -> Option<Action> {
        let rt = &st.nodes[idx];
        if rt.calculator.is_none() || !rt.is_live() {
            return None;
        }
        if rt.is_source {
            if rt.stopped {
                return Some(Action::Close);
            }
            if self.is_throttled(st, idx) && !rt.force_once {
                return None;
            }
            return Some(Action::Poll);
        }
        if rt.stopped {
            return rt.inputs.all_drained().then_some(Action::Close);
        }
        match rt.inputs.readiness() {
            Readiness::Ready(ts) => Some(Action::Process(ts)),
            Readiness::Exhausted => Some(Action::Close),
            Readiness::Waiting => None,
        }
    }

    /// A source is throttled while any consumer queue it feeds is full.
    fn is_throttled(&self, st: &RunState, idx: usize) -> bool {
        if self.max_queue_size == 0 {
            return false;
        }
        self.plan.nodes[idx].outputs.iter().flatten().any(|sid| {
            self.plan.stream(*sid).consumers.iter().any(|c| {
                st.nodes[c.node.index()].inputs.queue_len(c.port_index()) >= self.max_queue_size
            })
        })
    }

    fn schedule(&self, st: &mut RunState, idx: usize) {
        if st.finished || st.nodes[idx].queued || self.next_action(st, idx).is_none() {
            return;
        }
        st.nodes[idx].queued = true;
        st.pending += 1;
        tracing::trace!("Scheduled '{}'", self.plan.nodes[idx].name);
        if self.tasks.send(Task::Run(idx)).is_err() {
            tracing::error!("Task channel closed, dropping '{}'", self.plan.nodes[idx].name);
        }
    }

    fn unqueue(&self, st: &mut RunState, idx: usize) {
        if st.nodes[idx].queued {
            st.nodes[idx].queued = false;
            st.pending -= 1;
        }
    }

    /// Called whenever no node is queued. A throttled source gets one extra
    /// poll so the graph cannot stall on its own flow control.
    fn check_idle(&self, st: &mut RunState) {
        if st.pending == 0 && !st.finished {
            let throttled = self.sources.iter().copied().find(|&idx| {
                let rt = &st.nodes[idx];
                rt.is_live()
                    && !rt.stopped
                    && rt.calculator.is_some()
                    && self.is_throttled(st, idx)
            });
            if let Some(idx) = throttled {
                tracing::warn!(
                    "Graph is idle while '{}' is throttled; polling it past max_queue_size {}",
                    self.plan.nodes[idx].name,
                    self.max_queue_size
                );
                st.nodes[idx].force_once = true;
                st.stats.forced_polls += 1;
                self.schedule(st, idx);
            }
        }
        self.changed.notify_all();
    }

    // ── Worker side ──

    fn run_node(&self, idx: usize) {
        let invocation = {
            let mut st = self.state.lock();
            match self.prepare(&mut st, idx) {
                Some(invocation) => invocation,
                None => {
                    self.unqueue(&mut st, idx);
                    self.check_idle(&mut st);
                    return;
                }
            }
        };
        let outcome = self.invoke(idx, invocation);
        let mut st = self.state.lock();
        self.complete(&mut st, idx, outcome);
    }

    fn prepare(&self, st: &mut RunState, idx: usize) -> Option<Invocation> {
        if st.finished {
            return None;
        }
        let action = self.next_action(st, idx)?;
        let rt = &mut st.nodes[idx];
        let calculator = rt.calculator.take()?;
        let inputs = match action {
            Action::Process(ts) => rt.inputs.pop_at(ts),
            Action::Poll | Action::Close => Vec::new(),
        };
        if action == Action::Poll {
            rt.force_once = false;
        }
        if action != Action::Close {
            rt.lifecycle = NodeLifecycle::Running;
            st.stats.process_calls += 1;
        }
        Some(Invocation {
            action,
            calculator,
            inputs,
            side_packets: Arc::clone(&rt.side_packets),
            offset: rt.offset,
        })
    }

    fn invoke(&self, idx: usize, invocation: Invocation) -> Outcome {
        let Invocation {
            action,
            mut calculator,
            inputs,
            side_packets,
            offset,
        } = invocation;
        let node = &self.plan.nodes[idx];
        let input_ts = match action {
            Action::Process(ts) => ts,
            Action::Poll | Action::Close => Timestamp::UNSET,
        };
        let mut ctx =
            CalculatorContext::new(&node.name, &node.contract, &node.options, &side_packets)
                .with_inputs(input_ts, &inputs)
                .with_offset(offset);

        tracing::trace!("Running '{}' ({:?})", node.name, action);
        let result = catch_unwind(AssertUnwindSafe(|| match action {
            Action::Process(_) | Action::Poll => calculator.process(&mut ctx),
            Action::Close => calculator.close(&mut ctx).map(|()| ProcessStatus::Stop),
        }))
        .unwrap_or_else(|panic| Err(calculator_panic(&*panic)));

        let (outputs, offset) = ctx.into_parts();
        Outcome {
            action,
            calculator,
            result,
            outputs,
            offset,
        }
    }

    fn complete(&self, st: &mut RunState, idx: usize, outcome: Outcome) {
        let Outcome {
            action,
            calculator,
            result,
            outputs,
            offset,
        } = outcome;
        st.nodes[idx].calculator = Some(calculator);
        st.nodes[idx].offset = offset;

        if !st.finished {
            let input_ts = match action {
                Action::Process(ts) => ts,
                Action::Poll | Action::Close => Timestamp::UNSET,
            };
            let step = result
                .map_err(|e| PipelineError::node_failed(&self.plan.nodes[idx].name, e))
                .and_then(|status| {
                    self.deliver(st, idx, input_ts, outputs)?;
                    Ok(status)
                });
            match step {
                Err(e) => self.fail(st, e),
                Ok(_) if action == Action::Close => self.finish_node(st, idx),
                Ok(ProcessStatus::Stop) => self.stop_node(st, idx),
                Ok(ProcessStatus::Continue) => self.propagate_offset(st, idx),
            }
        }

        self.unqueue(st, idx);
        self.schedule(st, idx);
        for &source in &self.sources {
            self.schedule(st, source);
        }
        self.check_idle(st);
    }

    // ── Packet flow ──

    /// Validates and forwards packets emitted by node `idx`.
    fn deliver(
        &self,
        st: &mut RunState,
        idx: usize,
        input_ts: Timestamp,
        outputs: Vec<(usize, Packet)>,
    ) -> PipelineResult<()> {
        let node = &self.plan.nodes[idx];
        let offset_floor = match st.nodes[idx].offset {
            Some(k) if input_ts.is_range_value() => input_ts.offset_bound(k),
            _ => Timestamp::UNSTARTED,
        };
        for (port, packet) in outputs {
            let ts = packet.timestamp();
            let state = &mut st.nodes[idx].outputs[port];
            let stream_name = || match node.outputs[port] {
                Some(sid) => self.plan.stream(sid).name.clone(),
                None => {
                    let label = node
                        .contract
                        .outputs
                        .get(port)
                        .map_or_else(String::new, |p| p.label());
                    format!("{}:{}", node.name, label)
                }
            };
            if state.closed {
                return Err(PipelineError::StreamClosed(stream_name()));
            }
            let floor = state.bound.max(offset_floor);
            if ts < floor {
                return Err(PipelineError::OrderingViolation {
                    stream: stream_name(),
                    timestamp: ts,
                    last: if state.last.is_unset() { floor } else { state.last },
                });
            }
            state.last = ts;
            state.bound = ts.next();
            if let Some(sid) = node.outputs[port] {
                self.push_stream(st, sid, packet)?;
            }
        }
        Ok(())
    }

    /// Fans a packet out to every consumer of `sid` and to the graph output.
    fn push_stream(&self, st: &mut RunState, sid: StreamId, packet: Packet) -> PipelineResult<()> {
        let info = self.plan.stream(sid);
        st.stats.packets_delivered += 1;
        for consumer in &info.consumers {
            let node = consumer.node.index();
            if st.nodes[node].stopped {
                continue;
            }
            st.nodes[node]
                .inputs
                .push(consumer.port_index(), packet.clone())?;
            self.propagate_offset(st, node);
            self.schedule(st, node);
        }
        if let Some(output) = info.graph_output {
            st.outputs[output].emit(&packet)?;
        }
        Ok(())
    }

    fn close_stream(&self, st: &mut RunState, sid: StreamId) {
        let info = self.plan.stream(sid);
        for consumer in &info.consumers {
            let node = consumer.node.index();
            st.nodes[node].inputs.close(consumer.port_index());
            self.propagate_offset(st, node);
            self.schedule(st, node);
        }
        if let Some(output) = info.graph_output {
            st.outputs[output].close();
        }
    }

    /// Raises output bounds of node `idx` to its settled input bound plus
    /// its offset, so consumers stop waiting for packets that cannot come.
    fn propagate_offset(&self, st: &mut RunState, idx: usize) {
        let rt = &st.nodes[idx];
        // Not while running: the in-flight call may still emit at its own floor
        let Some(offset) = rt.offset else { return };
        if rt.calculator.is_none() || rt.stopped || rt.is_source {
            return;
        }
        let settled = rt.inputs.settled_bound();
        if !settled.is_range_value() {
            return;
        }
        let bound = settled.offset_bound(offset);
        for port in 0..rt.outputs.len() {
            let state = &mut st.nodes[idx].outputs[port];
            if state.closed || bound <= state.bound {
                continue;
            }
            state.bound = bound;
            if let Some(sid) = self.plan.nodes[idx].outputs[port] {
                for consumer in &self.plan.stream(sid).consumers {
                    let node = consumer.node.index();
                    if st.nodes[node].inputs.advance_bound(consumer.port_index(), bound) {
                        self.propagate_offset(st, node);
                        self.schedule(st, node);
                    }
                }
            }
        }
    }

    fn close_outputs(&self, st: &mut RunState, idx: usize) {
        for port in 0..st.nodes[idx].outputs.len() {
            let state = &mut st.nodes[idx].outputs[port];
            if state.closed {
                continue;
            }
            state.closed = true;
            state.bound = Timestamp::DONE;
            if let Some(sid) = self.plan.nodes[idx].outputs[port] {
                self.close_stream(st, sid);
            }
        }
    }

    /// `process` returned `Stop`: queued inputs are dropped and `close` is
    /// scheduled. Outputs close after `close` returns, as for any node.
    fn stop_node(&self, st: &mut RunState, idx: usize) {
        let rt = &mut st.nodes[idx];
        rt.stopped = true;
        let discarded = rt.inputs.discard_all();
        for port in 0..rt.inputs.len() {
            rt.inputs.close(port);
        }
        tracing::debug!(
            "'{}' stopped, {} queued packets discarded",
            self.plan.nodes[idx].name,
            discarded
        );
    }

    fn finish_node(&self, st: &mut RunState, idx: usize) {
        self.close_outputs(st, idx);
        st.nodes[idx].lifecycle = NodeLifecycle::Closed;
        st.closed_nodes += 1;
        tracing::debug!(
            "'{}' closed ({}/{})",
            self.plan.nodes[idx].name,
            st.closed_nodes,
            st.nodes.len()
        );
        self.maybe_finish(st);
    }

    /// The run is complete once every node is closed and no graph input
    /// can deliver anything more.
    fn maybe_finish(&self, st: &mut RunState) {
        if st.finished
            || st.closed_nodes < st.nodes.len()
            || st.graph_inputs.iter().any(|i| !i.closed)
        {
            return;
        }
        tracing::info!(
            "Graph run finished: {} process calls, {} packets delivered",
            st.stats.process_calls,
            st.stats.packets_delivered
        );
        self.end_run(st);
    }

    /// Aborts the run. Only the first error is kept.
    fn fail(&self, st: &mut RunState, error: PipelineError) {
        if st.finished {
            return;
        }
        tracing::error!("Graph run aborted: {}", error);
        st.error = Some(error);
        self.end_run(st);
    }

    fn end_run(&self, st: &mut RunState) {
        st.finished = true;
        for output in &mut st.outputs {
            output.close();
        }
        for _ in 0..self.num_workers {
            let _ = self.tasks.send(Task::Shutdown);
        }
        self.changed.notify_all();
    }

    // ── Open / teardown (caller thread) ──

    fn open_node(&self, st: &mut RunState, idx: usize) -> PipelineResult<()> {
        let node = &self.plan.nodes[idx];
        let Some(mut calculator) = st.nodes[idx].calculator.take() else {
            return Ok(());
        };
        let side_packets = Arc::clone(&st.nodes[idx].side_packets);
        let mut ctx =
            CalculatorContext::new(&node.name, &node.contract, &node.options, &side_packets)
                .with_offset(st.nodes[idx].offset);
        let result = catch_unwind(AssertUnwindSafe(|| calculator.open(&mut ctx)))
            .unwrap_or_else(|panic| Err(calculator_panic(&*panic)));
        let (outputs, offset) = ctx.into_parts();
        st.nodes[idx].calculator = Some(calculator);
        result.map_err(|e| PipelineError::node_failed(&node.name, e))?;

        st.nodes[idx].offset = offset;
        st.nodes[idx].lifecycle = NodeLifecycle::Opened;
        tracing::debug!("Opened '{}' (offset {:?})", node.name, offset);
        self.deliver(st, idx, Timestamp::UNSET, outputs)
    }

    /// Closes every node that was opened but not closed, in topological
    /// order. Used after an aborted run.
    fn teardown(&self, st: &mut RunState) {
        for id in &self.plan.topological_order {
            let idx = id.index();
            if !st.nodes[idx].is_live() {
                continue;
            }
            let node = &self.plan.nodes[idx];
            let side_packets = Arc::clone(&st.nodes[idx].side_packets);
            let offset = st.nodes[idx].offset;
            if let Some(calculator) = st.nodes[idx].calculator.as_mut() {
                let mut ctx =
                    CalculatorContext::new(&node.name, &node.contract, &node.options, &side_packets)
                        .with_offset(offset);
                let result = catch_unwind(AssertUnwindSafe(|| calculator.close(&mut ctx)))
                    .unwrap_or_else(|panic| Err(calculator_panic(&*panic)));
                if let Err(e) = result {
                    tracing::warn!("Error closing '{}' during teardown: {}", node.name, e);
                }
            }
            st.nodes[idx].lifecycle = NodeLifecycle::Closed;
            st.closed_nodes += 1;
        }
    }

    // ── Graph inputs ──

    pub(crate) fn add_packet(&self, stream: &str, packet: Packet) -> PipelineResult<()> {
        let position = self
            .plan
            .graph_input_position(stream)
            .ok_or_else(|| PipelineError::UnknownStream(stream.to_string()))?;
        let mut st = self.state.lock();
        if !st.started || st.finished {
            return Err(PipelineError::NotRunning);
        }
        let input = st.graph_inputs[position];
        let ts = packet.timestamp();
        if input.closed {
            return Err(PipelineError::StreamClosed(stream.to_string()));
        }
        if !ts.is_range_value() {
            return Err(PipelineError::InvalidTimestamp {
                stream: stream.to_string(),
                timestamp: ts,
            });
        }
        if !input.last.is_unset() && ts <= input.last {
            let violation = || PipelineError::OrderingViolation {
                stream: stream.to_string(),
                timestamp: ts,
                last: input.last,
            };
            self.fail(&mut st, violation());
            return Err(violation());
        }
        st.graph_inputs[position].last = ts;
        let sid = self.plan.graph_inputs[position];
        if let Err(e) = self.push_stream(&mut st, sid, packet) {
            // The caller gets the error itself, the run records what happened.
            self.fail(
                &mut st,
                PipelineError::Node(format!("input '{stream}' rejected a packet: {e}")),
            );
            return Err(e);
        }
        self.check_idle(&mut st);
        Ok(())
    }

    pub(crate) fn close_input(&self, stream: &str) -> PipelineResult<()> {
        let position = self
            .plan
            .graph_input_position(stream)
            .ok_or_else(|| PipelineError::UnknownStream(stream.to_string()))?;
        let mut st = self.state.lock();
        if !st.started {
            return Err(PipelineError::NotRunning);
        }
        self.close_input_at(&mut st, position);
        Ok(())
    }

    pub(crate) fn close_all_inputs(&self) -> PipelineResult<()> {
        let mut st = self.state.lock();
        if !st.started {
            return Err(PipelineError::NotRunning);
        }
        for position in 0..st.graph_inputs.len() {
            self.close_input_at(&mut st, position);
        }
        Ok(())
    }

    fn close_input_at(&self, st: &mut RunState, position: usize) {
        if st.finished || st.graph_inputs[position].closed {
            return;
        }
        st.graph_inputs[position].closed = true;
        let sid = self.plan.graph_inputs[position];
        tracing::debug!("Closed graph input '{}'", self.plan.stream(sid).name);
        self.close_stream(st, sid);
        self.maybe_finish(st);
        self.check_idle(st);
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn calculator_panic(panic: &(dyn std::any::Any + Send)) -> PipelineError {
    PipelineError::Node(format!("calculator panicked: {}", panic_message(panic)))
}

fn worker_loop(shared: Arc<Shared>, tasks: Receiver<Task>) {
    while let Ok(task) = tasks.recv() {
        match task {
            Task::Run(idx) => shared.run_node(idx),
            Task::Shutdown => break,
        }
    }
    tracing::trace!("Worker exiting");
}

/// A dataflow graph: compile once, run once.
///
/// ```ignore
/// let mut graph = Graph::new(Arc::new(CalculatorRegistry::with_builtins()));
/// graph.initialize(config)?;
/// let poller = graph.add_output_stream_poller("out")?;
/// graph.start_run(HashMap::new())?;
/// graph.add_packet_to_input_stream("in", Packet::new(1.0f64).at(0))?;
/// graph.close_all_input_streams()?;
/// while let Some(packet) = poller.next() { /* ... */ }
/// graph.wait_until_done()?;
/// ```
pub struct Graph {
    registry: Arc<CalculatorRegistry>,
    runtime: RuntimeConfig,
    shared: Option<Arc<Shared>>,
    receiver: Option<Receiver<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl Graph {
    pub fn new(registry: Arc<CalculatorRegistry>) -> Self {
        Self {
            registry,
            runtime: RuntimeConfig::default(),
            shared: None,
            receiver: None,
            workers: Vec::new(),
        }
    }

    /// Defaults for thread count and queue limits. Graph config fields
    /// override these per graph.
    pub fn with_runtime_config(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Compiles and validates `config`. Nothing runs yet.
    pub fn initialize(&mut self, config: GraphConfig) -> PipelineResult<()> {
        if self.shared.is_some() {
            return Err(PipelineError::AlreadyStarted);
        }
        let plan = Arc::new(GraphCompiler::compile(&config, &self.registry)?);
        let num_workers = self
            .runtime
            .resolve_threads(plan.num_threads)
            .min(plan.nodes.len().max(1));
        let max_queue_size = plan.max_queue_size.unwrap_or(self.runtime.max_queue_size);
        let sources = plan
            .topological_order
            .iter()
            .map(|id| id.index())
            .filter(|&idx| plan.nodes[idx].is_source())
            .collect();

        let state = RunState {
            outputs: plan
                .graph_outputs
                .iter()
                .map(|sid| OutputChannel::new(plan.stream(*sid).name.clone()))
                .collect(),
            graph_inputs: vec![GraphInputState::default(); plan.graph_inputs.len()],
            ..Default::default()
        };
        let (tx, rx) = unbounded();
        tracing::info!(
            "Initialized graph: {} nodes, {} workers, max_queue_size {}",
            plan.nodes.len(),
            num_workers,
            max_queue_size
        );
        self.shared = Some(Arc::new(Shared {
            plan,
            state: Mutex::new(state),
            changed: Condvar::new(),
            tasks: tx,
            num_workers,
            max_queue_size,
            sources,
        }));
        self.receiver = Some(rx);
        Ok(())
    }

    fn shared(&self) -> PipelineResult<&Arc<Shared>> {
        self.shared.as_ref().ok_or(PipelineError::NotInitialized)
    }

    /// The compiled plan, once initialized.
    pub fn plan(&self) -> Option<&CompiledGraph> {
        self.shared.as_deref().map(|s| s.plan.as_ref())
    }

    fn output_position(&self, shared: &Shared, stream: &str) -> PipelineResult<usize> {
        shared
            .plan
            .graph_output_position(stream)
            .ok_or_else(|| PipelineError::UnknownStream(stream.to_string()))
    }

    /// Creates a blocking reader for output stream `stream`. Must be called
    /// before `start_run`.
    pub fn add_output_stream_poller(
        &mut self,
        stream: &str,
    ) -> PipelineResult<OutputStreamPoller> {
        let shared = self.shared()?;
        let position = self.output_position(shared, stream)?;
        let mut st = shared.state.lock();
        if st.started {
            return Err(PipelineError::AlreadyStarted);
        }
        let receiver = st.outputs[position].subscribe();
        Ok(OutputStreamPoller::new(receiver, stream.to_string()))
    }

    /// Registers a callback for every packet on output stream `stream`.
    /// Must be called before `start_run`.
    pub fn observe_output_stream<F>(&mut self, stream: &str, observer: F) -> PipelineResult<()>
    where
        F: FnMut(&Packet) -> PipelineResult<()> + Send + 'static,
    {
        let shared = self.shared()?;
        let position = self.output_position(shared, stream)?;
        let mut st = shared.state.lock();
        if st.started {
            return Err(PipelineError::AlreadyStarted);
        }
        let observer: OutputObserver = Box::new(observer);
        st.outputs[position].add_observer(observer);
        Ok(())
    }

    /// Resolves side packets, opens every node and starts the workers.
    ///
    /// # Errors
    /// `MissingSidePacket` or a type mismatch for side packets; `NodeFailed`
    /// if an `open` fails, in which case already opened nodes are closed.
    pub fn start_run(&mut self, side_packets: HashMap<String, Packet>) -> PipelineResult<()> {
        let shared = Arc::clone(self.shared()?);
        let plan = Arc::clone(&shared.plan);
        let mut st = shared.state.lock();
        if st.started {
            return Err(PipelineError::AlreadyStarted);
        }
        let resolved = resolve_side_packets(&plan, side_packets)?;
        st.nodes = plan
            .nodes
            .iter()
            .map(|node| NodeRuntime::new(&plan, node, &resolved))
            .collect::<PipelineResult<_>>()?;
        st.started = true;

        for id in &plan.topological_order {
            if let Err(e) = shared.open_node(&mut st, id.index()) {
                tracing::error!("Failed to start graph: {}", e);
                st.finished = true;
                st.joined = true;
                for output in &mut st.outputs {
                    output.close();
                }
                shared.teardown(&mut st);
                shared.changed.notify_all();
                return Err(e);
            }
        }

        for id in &plan.topological_order {
            shared.schedule(&mut st, id.index());
        }
        shared.maybe_finish(&mut st);
        drop(st);

        let receiver = self.receiver.clone().ok_or(PipelineError::NotInitialized)?;
        for i in 0..shared.num_workers {
            let worker_shared = Arc::clone(&shared);
            let worker_rx = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("flowgraph-worker-{i}"))
                .spawn(move || worker_loop(worker_shared, worker_rx));
            match handle {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    let mut st = shared.state.lock();
                    shared.fail(&mut st, PipelineError::Cancelled);
                    return Err(PipelineError::Io(e));
                }
            }
        }
        tracing::info!("Graph run started with {} workers", self.workers.len());
        Ok(())
    }

    /// Pushes a packet into graph input stream `stream`.
    pub fn add_packet_to_input_stream(&self, stream: &str, packet: Packet) -> PipelineResult<()> {
        self.shared()?.add_packet(stream, packet)
    }

    pub fn close_input_stream(&self, stream: &str) -> PipelineResult<()> {
        self.shared()?.close_input(stream)
    }

    pub fn close_all_input_streams(&self) -> PipelineResult<()> {
        self.shared()?.close_all_inputs()
    }

    /// A cloneable handle for feeding inputs from other threads.
    pub fn input_handle(&self) -> PipelineResult<GraphInputHandle> {
        Ok(GraphInputHandle::new(Arc::clone(self.shared()?)))
    }

    /// Closes all graph inputs and blocks until the run ends. Returns the
    /// first error of the run, if any.
    pub fn wait_until_done(&mut self) -> PipelineResult<()> {
        let shared = Arc::clone(self.shared()?);
        {
            let mut st = shared.state.lock();
            if !st.started || st.joined {
                return Err(PipelineError::NotRunning);
            }
            for position in 0..st.graph_inputs.len() {
                shared.close_input_at(&mut st, position);
            }
            while !st.finished {
                shared.changed.wait(&mut st);
            }
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }

        let mut st = shared.state.lock();
        shared.teardown(&mut st);
        st.joined = true;
        match st.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Blocks until no node is queued or running, or the run has ended.
    pub fn wait_until_idle(&self) -> PipelineResult<()> {
        let shared = self.shared()?;
        let mut st = shared.state.lock();
        if !st.started {
            return Err(PipelineError::NotRunning);
        }
        while st.pending > 0 && !st.finished {
            shared.changed.wait(&mut st);
        }
        Ok(())
    }

    /// Aborts the run. In-flight calls finish; `wait_until_done` then
    /// returns `Cancelled`.
    pub fn cancel(&self) {
        if let Some(shared) = &self.shared {
            let mut st = shared.state.lock();
            if st.started {
                shared.fail(&mut st, PipelineError::Cancelled);
            }
        }
    }

    /// Starts the run, closes all inputs and waits for completion.
    pub fn run(&mut self, side_packets: HashMap<String, Packet>) -> PipelineResult<()> {
        self.start_run(side_packets)?;
        self.wait_until_done()
    }

    /// `true` once the run has ended, successfully or not.
    pub fn is_done(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|s| s.state.lock().finished)
    }

    pub fn run_stats(&self) -> RunStats {
        self.shared
            .as_ref()
            .map(|s| s.state.lock().stats)
            .unwrap_or_default()
    }

    /// Lifecycle of node `name`, once the run has started.
    pub fn node_lifecycle(&self, name: &str) -> Option<NodeLifecycle> {
        let shared = self.shared.as_ref()?;
        let idx = shared.plan.nodes.iter().position(|n| n.name == name)?;
        shared.state.lock().nodes.get(idx).map(|rt| rt.lifecycle)
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.cancel();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Matches supplied side packets to the graph's declarations and checks
/// their types against every reader.
fn resolve_side_packets(
    plan: &CompiledGraph,
    mut supplied: HashMap<String, Packet>,
) -> PipelineResult<Vec<Packet>> {
    let mut resolved = Vec::with_capacity(plan.side_packets.len());
    for info in &plan.side_packets {
        let packet = match supplied.remove(&info.name) {
            Some(packet) => packet,
            None => {
                let required = info.consumers.iter().any(|(node, port, _)| {
                    plan.node(*node)
                        .contract
                        .side_inputs
                        .get(*port)
                        .is_some_and(|p| !p.optional)
                });
                if required {
                    return Err(PipelineError::MissingSidePacket(info.name.clone()));
                }
                Packet::empty()
            }
        };
        for (node, port, packet_type) in &info.consumers {
            if !packet.matches(packet_type) {
                tracing::error!(
                    "Side packet '{}' does not fit '{}' port {}",
                    info.name,
                    plan.node(*node).name,
                    port_label(
                        plan.node(*node)
                            .contract
                            .side_inputs
                            .get(*port)
                            .map_or("", |p| p.tag.as_str()),
                        *port
                    )
                );
                return Err(PipelineError::PacketTypeMismatch {
                    expected: packet_type.name(),
                    actual: packet.type_name(),
                });
            }
        }
        resolved.push(packet);
    }
    for name in supplied.keys() {
        tracing::warn!("Side packet '{}' is not used by the graph", name);
    }
    Ok(resolved)
}
