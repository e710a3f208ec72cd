//! Mock calculators for exercising the scheduler
//!
//! Each mock records what it observed into shared state the test keeps a
//! handle to.

use flowgraph_rs::pipeline::{
    Calculator, CalculatorContext, CalculatorRegistry, Contract, Packet, PacketType,
    PipelineError, PipelineResult, ProcessStatus, TimestampDiff,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One `process` call: timestamp plus which inputs carried a packet
pub type Invocation = (i64, Vec<bool>);

/// Records every invocation of a two-input sink (`IN:0`, `IN:1`).
pub struct RecordingJoin {
    log: Arc<Mutex<Vec<Invocation>>>,
}

impl RecordingJoin {
    pub const NAME: &'static str = "RecordingJoin";

    pub fn contract() -> Contract {
        Contract::new()
            .input("IN", 0, PacketType::any())
            .input("IN", 1, PacketType::any())
    }

    /// Registers the calculator; returns the shared invocation log.
    pub fn register(registry: &mut CalculatorRegistry) -> Arc<Mutex<Vec<Invocation>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&log);
        registry
            .register_calculator(
                Self::NAME,
                |_| Ok(Self::contract()),
                move || {
                    Box::new(RecordingJoin {
                        log: Arc::clone(&shared),
                    })
                },
            )
            .expect("register RecordingJoin");
        log
    }
}

impl Calculator for RecordingJoin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        let present = (0..ctx.input_count())
            .map(|i| ctx.input_at(i).map(|p| !p.is_empty()))
            .collect::<PipelineResult<Vec<_>>>()?;
        self.log
            .lock()
            .push((ctx.input_timestamp().value(), present));
        Ok(ProcessStatus::Continue)
    }
}

/// Counters shared with a [`CountingSource`]
#[derive(Default)]
pub struct SourceCounts {
    pub polls: AtomicUsize,
    pub polls_after_stop: AtomicUsize,
    pub closes: AtomicUsize,
}

/// Emits `i64` packets at `0..limit` on `OUT`, then returns `Stop`.
pub struct CountingSource {
    limit: i64,
    next: i64,
    stopped: bool,
    counts: Arc<SourceCounts>,
}

impl CountingSource {
    pub const NAME: &'static str = "CountingSource";

    pub fn register(registry: &mut CalculatorRegistry, limit: i64) -> Arc<SourceCounts> {
        let counts = Arc::new(SourceCounts::default());
        let shared = Arc::clone(&counts);
        registry
            .register_calculator(
                Self::NAME,
                |_| Ok(Contract::new().output("OUT", 0, PacketType::of::<i64>())),
                move || {
                    Box::new(CountingSource {
                        limit,
                        next: 0,
                        stopped: false,
                        counts: Arc::clone(&shared),
                    })
                },
            )
            .expect("register CountingSource");
        counts
    }
}

impl Calculator for CountingSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        self.counts.polls.fetch_add(1, Ordering::SeqCst);
        if self.stopped {
            self.counts.polls_after_stop.fetch_add(1, Ordering::SeqCst);
        }
        if self.next >= self.limit {
            self.stopped = true;
            return Ok(ProcessStatus::Stop);
        }
        ctx.output("OUT", 0, Packet::new(self.next).at(self.next))?;
        self.next += 1;
        Ok(ProcessStatus::Continue)
    }

    fn close(&mut self, _ctx: &mut CalculatorContext) -> PipelineResult<()> {
        self.counts.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reads side packet `SCALE` in `open` and on every `process` call.
pub struct SidePacketReader {
    seen: Arc<Mutex<Vec<f64>>>,
}

impl SidePacketReader {
    pub const NAME: &'static str = "SidePacketReader";

    pub fn register(registry: &mut CalculatorRegistry) -> Arc<Mutex<Vec<f64>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&seen);
        registry
            .register_calculator(
                Self::NAME,
                |_| {
                    Ok(Contract::new()
                        .input("", 0, PacketType::any())
                        .side_input("SCALE", 0, PacketType::of::<f64>()))
                },
                move || {
                    Box::new(SidePacketReader {
                        seen: Arc::clone(&shared),
                    })
                },
            )
            .expect("register SidePacketReader");
        seen
    }

    fn record(&self, ctx: &CalculatorContext) -> PipelineResult<()> {
        let scale = *ctx.side_packet("SCALE", 0)?.get::<f64>()?;
        self.seen.lock().push(scale);
        Ok(())
    }
}

impl Calculator for SidePacketReader {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        self.record(ctx)
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        self.record(ctx)?;
        Ok(ProcessStatus::Continue)
    }
}

/// How a [`FaultyCalculator`] misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    FailOpen,
    FailAt(i64),
    PanicAt(i64),
    /// Emits at `input - 1`, violating its zero offset
    EmitEarly,
}

/// Pass-through on `""` that fails in the configured way.
pub struct FaultyCalculator {
    fault: Fault,
}

impl FaultyCalculator {
    pub const NAME: &'static str = "FaultyCalculator";

    pub fn register(registry: &mut CalculatorRegistry, fault: Fault) {
        registry
            .register_calculator(
                Self::NAME,
                |_| {
                    Ok(Contract::new()
                        .input("", 0, PacketType::any())
                        .output("", 0, PacketType::any())
                        .with_offset(TimestampDiff(0)))
                },
                move || Box::new(FaultyCalculator { fault }),
            )
            .expect("register FaultyCalculator");
    }
}

impl Calculator for FaultyCalculator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&mut self, _ctx: &mut CalculatorContext) -> PipelineResult<()> {
        if self.fault == Fault::FailOpen {
            return Err(PipelineError::Node("open refused".into()));
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        let ts = ctx.input_timestamp();
        match self.fault {
            Fault::FailAt(t) if ts.value() == t => {
                return Err(PipelineError::Node(format!("bad packet at {t}")));
            }
            Fault::PanicAt(t) if ts.value() == t => panic!("boom at {t}"),
            Fault::EmitEarly => {
                let packet = ctx.input_index(0)?.clone();
                ctx.output_index(0, packet.at(ts.value() - 1))?;
                return Ok(ProcessStatus::Continue);
            }
            _ => {}
        }
        let packet = ctx.input_index(0)?.clone();
        ctx.output_index(0, packet)?;
        Ok(ProcessStatus::Continue)
    }
}

/// Consumes `""` and never emits. Declares a zero offset, so its output
/// bound still follows its input.
pub struct SilentFilter;

impl SilentFilter {
    pub const NAME: &'static str = "SilentFilter";

    pub fn register(registry: &mut CalculatorRegistry) {
        registry
            .register_calculator(
                Self::NAME,
                |_| {
                    Ok(Contract::new()
                        .input("", 0, PacketType::any())
                        .output("", 0, PacketType::any())
                        .with_offset(TimestampDiff(0)))
                },
                || Box::new(SilentFilter),
            )
            .expect("register SilentFilter");
    }
}

impl Calculator for SilentFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, _ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        Ok(ProcessStatus::Continue)
    }
}

/// Names of nodes in the order their `close` ran
pub type CloseLog = Arc<Mutex<Vec<String>>>;

/// Pass-through on `""` (or a source of `i64` packets when `source` is set)
/// that appends its node name to a [`CloseLog`] when closed.
pub struct CloseRecorder {
    source: Option<i64>,
    next: i64,
    log: CloseLog,
}

impl CloseRecorder {
    pub const SOURCE: &'static str = "CloseRecordingSource";
    pub const PASS: &'static str = "CloseRecordingPass";

    /// Registers both variants; the source emits `limit` packets, then stops.
    pub fn register(registry: &mut CalculatorRegistry, limit: i64) -> CloseLog {
        let log: CloseLog = Arc::new(Mutex::new(Vec::new()));
        let source_log = Arc::clone(&log);
        registry
            .register_calculator(
                Self::SOURCE,
                |_| Ok(Contract::new().output("", 0, PacketType::of::<i64>())),
                move || {
                    Box::new(CloseRecorder {
                        source: Some(limit),
                        next: 0,
                        log: Arc::clone(&source_log),
                    })
                },
            )
            .expect("register CloseRecordingSource");
        let pass_log = Arc::clone(&log);
        registry
            .register_calculator(
                Self::PASS,
                |_| {
                    Ok(Contract::new()
                        .input("", 0, PacketType::any())
                        .output("", 0, PacketType::any()))
                },
                move || {
                    Box::new(CloseRecorder {
                        source: None,
                        next: 0,
                        log: Arc::clone(&pass_log),
                    })
                },
            )
            .expect("register CloseRecordingPass");
        log
    }
}

impl Calculator for CloseRecorder {
    fn name(&self) -> &str {
        if self.source.is_some() {
            Self::SOURCE
        } else {
            Self::PASS
        }
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        match self.source {
            Some(limit) if self.next >= limit => Ok(ProcessStatus::Stop),
            Some(_) => {
                ctx.output_index(0, Packet::new(self.next).at(self.next))?;
                self.next += 1;
                Ok(ProcessStatus::Continue)
            }
            None => {
                let packet = ctx.input_index(0)?.clone();
                ctx.output_index(0, packet)?;
                Ok(ProcessStatus::Continue)
            }
        }
    }

    fn close(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<()> {
        self.log.lock().push(ctx.node_name().to_string());
        Ok(())
    }
}

/// Pass-through on `""` that returns `Stop` after forwarding timestamp `at`.
pub struct StopAt {
    at: i64,
}

impl StopAt {
    pub const NAME: &'static str = "StopAt";

    pub fn register(registry: &mut CalculatorRegistry, at: i64) {
        registry
            .register_calculator(
                Self::NAME,
                |_| {
                    Ok(Contract::new()
                        .input("", 0, PacketType::any())
                        .output("", 0, PacketType::any()))
                },
                move || Box::new(StopAt { at }),
            )
            .expect("register StopAt");
    }
}

impl Calculator for StopAt {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        let packet = ctx.input_index(0)?.clone();
        ctx.output_index(0, packet)?;
        if ctx.input_timestamp().value() >= self.at {
            return Ok(ProcessStatus::Stop);
        }
        Ok(ProcessStatus::Continue)
    }
}

/// Counters shared by every [`ReentryGuard`] instance
#[derive(Default)]
pub struct ReentryStats {
    pub calls: AtomicUsize,
    pub overlaps: AtomicUsize,
    pub out_of_order: AtomicUsize,
}

/// Sink on `""` that detects overlapping or out-of-order `process` calls on
/// the same node.
pub struct ReentryGuard {
    in_flight: Arc<AtomicBool>,
    last: Option<i64>,
    stats: Arc<ReentryStats>,
}

impl ReentryGuard {
    pub const NAME: &'static str = "ReentryGuard";

    pub fn register(registry: &mut CalculatorRegistry) -> Arc<ReentryStats> {
        let stats = Arc::new(ReentryStats::default());
        let shared = Arc::clone(&stats);
        registry
            .register_calculator(
                Self::NAME,
                |_| Ok(Contract::new().input("", 0, PacketType::any())),
                move || {
                    Box::new(ReentryGuard {
                        in_flight: Arc::new(AtomicBool::new(false)),
                        last: None,
                        stats: Arc::clone(&shared),
                    })
                },
            )
            .expect("register ReentryGuard");
        stats
    }
}

impl Calculator for ReentryGuard {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.stats.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let ts = ctx.input_timestamp().value();
        if self.last.is_some_and(|last| ts <= last) {
            self.stats.out_of_order.fetch_add(1, Ordering::SeqCst);
        }
        self.last = Some(ts);
        // Widen the window in which a second call could slip in.
        std::thread::yield_now();
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(ProcessStatus::Continue)
    }
}
