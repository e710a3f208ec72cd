//! Integration tests for timestamp synchronization
//!
//! These tests validate end-to-end scheduling behavior:
//! - Per-timestamp joins with missing inputs
//! - Source completion after `Stop`
//! - Pass-through chains preserving timestamps and payloads
//! - Empty-input placeholders in string joins
//! - Side packet visibility and stability
//! - Offset-driven bound propagation
//! - Close order, mid-stream `Stop` and per-node serialization

mod common;

use common::builders::{string_join_graph, ChainBuilder};
use common::mock_helpers::{
    CloseRecorder, CountingSource, RecordingJoin, ReentryGuard, SidePacketReader, SilentFilter,
    StopAt,
};
use common::{assert_float_eq, collect_packets, initialized_graph, values};
use flowgraph_rs::pipeline::{
    CalculatorRegistry, GraphConfig, NodeConfig, NodeLifecycle, Packet,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;

#[test]
fn test_join_invoked_once_per_timestamp() -> anyhow::Result<()> {
    let mut registry = CalculatorRegistry::with_builtins();
    let log = RecordingJoin::register(&mut registry);
    let config = GraphConfig::new()
        .with_input_stream("a")
        .with_input_stream("b")
        .with_node(
            NodeConfig::new(RecordingJoin::NAME)
                .with_input_stream("IN:0:a")
                .with_input_stream("IN:1:b"),
        );
    let mut graph = initialized_graph(registry, config);
    graph.start_run(HashMap::new())?;

    for t in [0, 5, 10] {
        graph.add_packet_to_input_stream("a", Packet::new(t).at(t))?;
    }
    for t in [0, 5] {
        graph.add_packet_to_input_stream("b", Packet::new(t).at(t))?;
    }
    graph.close_input_stream("b")?;
    graph.close_input_stream("a")?;
    graph.wait_until_done()?;

    let log = log.lock();
    assert_eq!(
        *log,
        vec![
            (0, vec![true, true]),
            (5, vec![true, true]),
            (10, vec![true, false]),
        ]
    );
    Ok(())
}

#[test]
fn test_join_waits_for_slower_input() -> anyhow::Result<()> {
    let mut registry = CalculatorRegistry::with_builtins();
    let log = RecordingJoin::register(&mut registry);
    let config = GraphConfig::new()
        .with_input_stream("a")
        .with_input_stream("b")
        .with_node(
            NodeConfig::new(RecordingJoin::NAME)
                .with_input_stream("IN:0:a")
                .with_input_stream("IN:1:b"),
        );
    let mut graph = initialized_graph(registry, config);
    graph.start_run(HashMap::new())?;

    graph.add_packet_to_input_stream("a", Packet::new(1i64).at(1))?;
    graph.add_packet_to_input_stream("a", Packet::new(2i64).at(2))?;
    graph.wait_until_idle()?;
    assert!(log.lock().is_empty(), "b has not settled timestamp 1 yet");

    // A packet at 2 on b settles 1 (b is empty there) and 2.
    graph.add_packet_to_input_stream("b", Packet::new(2i64).at(2))?;
    graph.wait_until_idle()?;
    assert_eq!(
        *log.lock(),
        vec![(1, vec![true, false]), (2, vec![true, true])]
    );

    graph.wait_until_done()?;
    Ok(())
}

#[test]
fn test_source_stop_completes_graph() -> anyhow::Result<()> {
    let mut registry = CalculatorRegistry::with_builtins();
    let counts = CountingSource::register(&mut registry, 7);
    let config = GraphConfig::new()
        .with_output_stream("out")
        .with_node(NodeConfig::new(CountingSource::NAME).with_output_stream("OUT:numbers"))
        .with_node(
            NodeConfig::new("PassThroughCalculator")
                .with_input_stream("numbers")
                .with_output_stream("out"),
        );
    let mut graph = initialized_graph(registry, config);
    let poller = graph.add_output_stream_poller("out")?;
    graph.start_run(HashMap::new())?;

    let packets = collect_packets(&poller);
    graph.wait_until_done()?;

    let expected: Vec<(i64, i64)> = (0..7).map(|i| (i, i)).collect();
    assert_eq!(values::<i64>(&packets), expected);
    // Seven emitting polls plus the one that returned Stop.
    assert_eq!(counts.polls.load(Ordering::SeqCst), 8);
    assert_eq!(counts.polls_after_stop.load(Ordering::SeqCst), 0);
    assert_eq!(counts.closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_string_source_join() -> anyhow::Result<()> {
    let config = GraphConfig::parse_text(
        r#"
        output_stream: "joined"
        node {
          calculator: "StringSourceCalculator"
          output_stream: "STR:gen"
          options { [mediapipe.StringSourceCalculatorOptions.ext] { count: 3 prefix: "gen: " } }
        }
        node {
          calculator: "StringSourceCalculator"
          output_stream: "STR:odd"
          options {
            [mediapipe.StringSourceCalculatorOptions.ext] { count: 1 start: 1 prefix: "odd: " }
          }
        }
        node {
          calculator: "StringJoinCalculator"
          input_stream: "STR:0:gen"
          input_stream: "STR:1:odd"
          output_stream: "STR:joined"
          options { [mediapipe.StringJoinCalculatorOptions.ext] { separator: " | " } }
        }
        "#,
    )?;
    let mut graph = initialized_graph(CalculatorRegistry::with_builtins(), config);
    let poller = graph.add_output_stream_poller("joined")?;
    graph.start_run(HashMap::new())?;
    let packets = collect_packets(&poller);
    graph.wait_until_done()?;

    assert_eq!(
        values::<String>(&packets),
        vec![
            (0, "gen: 0 | <EMPTY>".to_string()),
            (1, "gen: 1 | odd: 1".to_string()),
            (2, "gen: 2 | <EMPTY>".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn test_empty_placeholder_from_graph_inputs() -> anyhow::Result<()> {
    let mut graph = initialized_graph(CalculatorRegistry::with_builtins(), string_join_graph());
    let poller = graph.add_output_stream_poller("joined")?;
    graph.start_run(HashMap::new())?;

    graph.add_packet_to_input_stream("a", Packet::new("left".to_string()).at(3))?;
    graph.add_packet_to_input_stream("b", Packet::new("right".to_string()).at(4))?;
    graph.close_all_input_streams()?;
    let packets = collect_packets(&poller);
    graph.wait_until_done()?;

    assert_eq!(
        values::<String>(&packets),
        vec![
            (3, "left<EMPTY>".to_string()),
            (4, "<EMPTY>right".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn test_pass_through_chain_preserves_packets() -> anyhow::Result<()> {
    let config = ChainBuilder::new("PassThroughCalculator").length(4).build();
    let mut graph = initialized_graph(CalculatorRegistry::with_builtins(), config);
    let poller = graph.add_output_stream_poller("out")?;
    graph.start_run(HashMap::new())?;

    let mut sent = Vec::new();
    for i in 0..13i64 {
        let packet = Packet::new(i as f64 * 0.1).at(i);
        sent.push(packet.clone());
        graph.add_packet_to_input_stream("in", packet)?;
    }
    graph.close_input_stream("in")?;
    let received = collect_packets(&poller);
    graph.wait_until_done()?;

    assert_eq!(received.len(), 13);
    for (i, (got, original)) in received.iter().zip(&sent).enumerate() {
        assert_eq!(got.timestamp().value(), i as i64);
        assert_float_eq(*got.get::<f64>()?, i as f64 * 0.1, 1e-12);
        assert!(got.shares_payload_with(original));
    }
    Ok(())
}

#[test]
fn test_side_packets_stable_across_process() -> anyhow::Result<()> {
    let mut registry = CalculatorRegistry::with_builtins();
    let seen = SidePacketReader::register(&mut registry);
    let config = GraphConfig::new()
        .with_input_stream("in")
        .with_input_side_packet("scale")
        .with_node(
            NodeConfig::new(SidePacketReader::NAME)
                .with_input_stream("in")
                .with_input_side_packet("SCALE:scale"),
        );
    let mut graph = initialized_graph(registry, config);
    graph.start_run(HashMap::from([("scale".to_string(), Packet::new(1.5f64))]))?;
    for t in 0..5 {
        graph.add_packet_to_input_stream("in", Packet::new(t).at(t))?;
    }
    graph.wait_until_done()?;

    let seen = seen.lock();
    assert_eq!(seen.len(), 6, "open plus five process calls");
    assert!(seen.iter().all(|&s| s == 1.5));
    Ok(())
}

#[test]
fn test_affine_side_packets_override_options() -> anyhow::Result<()> {
    let config = GraphConfig::new()
        .with_input_stream("x")
        .with_output_stream("y")
        .with_input_side_packet("a")
        .with_input_side_packet("b")
        .with_node(
            NodeConfig::new("AffineCalculator")
                .with_input_stream("x")
                .with_output_stream("y")
                .with_input_side_packet("a")
                .with_input_side_packet("b")
                .with_option("a", 10.0),
        );
    let mut graph = initialized_graph(CalculatorRegistry::with_builtins(), config);
    let poller = graph.add_output_stream_poller("y")?;
    graph.start_run(HashMap::from([
        ("a".to_string(), Packet::new(3.0f64)),
        ("b".to_string(), Packet::new(1.0f64)),
    ]))?;
    graph.add_packet_to_input_stream("x", Packet::new(2.0f64).at(0))?;
    graph.add_packet_to_input_stream("x", Packet::new(-1.0f64).at(1))?;
    graph.close_all_input_streams()?;
    let packets = collect_packets(&poller);
    graph.wait_until_done()?;

    assert_eq!(values::<f64>(&packets), vec![(0, 7.0), (1, -2.0)]);
    Ok(())
}

#[test]
fn test_offset_bound_unblocks_join() -> anyhow::Result<()> {
    // b reaches the join only through a node that never emits. Its zero
    // offset still moves the bound of b_filtered, so the join runs at t=1
    // while b is open.
    let mut registry = CalculatorRegistry::with_builtins();
    let log = RecordingJoin::register(&mut registry);
    SilentFilter::register(&mut registry);
    let config = GraphConfig::new()
        .with_input_stream("a")
        .with_input_stream("b")
        .with_node(
            NodeConfig::new(SilentFilter::NAME)
                .with_input_stream("b")
                .with_output_stream("b_filtered"),
        )
        .with_node(
            NodeConfig::new(RecordingJoin::NAME)
                .with_input_stream("IN:0:a")
                .with_input_stream("IN:1:b_filtered"),
        );
    let mut graph = initialized_graph(registry, config);
    graph.start_run(HashMap::new())?;

    graph.add_packet_to_input_stream("a", Packet::new(1i64).at(1))?;
    graph.add_packet_to_input_stream("a", Packet::new(8i64).at(8))?;
    graph.add_packet_to_input_stream("b", Packet::new(5i64).at(5))?;
    graph.wait_until_idle()?;
    assert_eq!(*log.lock(), vec![(1, vec![true, false])]);

    graph.wait_until_done()?;
    assert_eq!(
        *log.lock(),
        vec![(1, vec![true, false]), (8, vec![true, false])]
    );
    Ok(())
}

#[test]
fn test_observer_sees_every_packet() -> anyhow::Result<()> {
    let config = ChainBuilder::new("PassThroughCalculator").length(2).build();
    let mut graph = initialized_graph(CalculatorRegistry::with_builtins(), config);
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    graph.observe_output_stream("out", move |packet| {
        sink.lock().push(packet.timestamp().value());
        Ok(())
    })?;

    graph.start_run(HashMap::new())?;
    let input = graph.input_handle()?;
    let feeder = std::thread::spawn(move || -> flowgraph_rs::PipelineResult<()> {
        for t in 0..20 {
            input.add_packet("in", Packet::new(t).at(t))?;
        }
        input.close_all()
    });
    feeder.join().expect("feeder thread panicked")?;
    graph.wait_until_done()?;

    assert_eq!(*seen.lock(), (0..20).collect::<Vec<i64>>());
    Ok(())
}

fn recorder(calculator: &str, name: &str, input: Option<&str>, output: &str) -> NodeConfig {
    let node = NodeConfig::new(calculator)
        .with_name(name)
        .with_output_stream(output);
    match input {
        Some(input) => node.with_input_stream(input),
        None => node,
    }
}

#[test]
fn test_close_order_follows_dataflow() -> anyhow::Result<()> {
    // Source-driven: the source stops on its own.
    let mut registry = CalculatorRegistry::with_builtins();
    let log = CloseRecorder::register(&mut registry, 2);
    let config = GraphConfig::new()
        .with_num_threads(1)
        .with_node(recorder(CloseRecorder::SOURCE, "src", None, "a"))
        .with_node(recorder(CloseRecorder::PASS, "mid", Some("a"), "b"))
        .with_node(recorder(CloseRecorder::PASS, "sink", Some("b"), "c"));
    let mut graph = initialized_graph(registry, config);
    graph.run(HashMap::new())?;
    assert_eq!(*log.lock(), vec!["src", "mid", "sink"]);

    // Input-driven: closing the graph input ends the run.
    let mut registry = CalculatorRegistry::with_builtins();
    let log = CloseRecorder::register(&mut registry, 0);
    let config = GraphConfig::new()
        .with_input_stream("in")
        .with_num_threads(1)
        .with_node(recorder(CloseRecorder::PASS, "first", Some("in"), "a"))
        .with_node(recorder(CloseRecorder::PASS, "second", Some("a"), "b"));
    let mut graph = initialized_graph(registry, config);
    graph.start_run(HashMap::new())?;
    for t in 0..3 {
        graph.add_packet_to_input_stream("in", Packet::new(t).at(t))?;
    }
    graph.wait_until_done()?;
    assert_eq!(*log.lock(), vec!["first", "second"]);
    Ok(())
}

#[test]
fn test_stop_mid_stream_discards_later_input() -> anyhow::Result<()> {
    let mut registry = CalculatorRegistry::with_builtins();
    StopAt::register(&mut registry, 2);
    let config = GraphConfig::new()
        .with_input_stream("in")
        .with_output_stream("out")
        .with_node(
            NodeConfig::new(StopAt::NAME)
                .with_name("stopper")
                .with_input_stream("in")
                .with_output_stream("stopped"),
        )
        .with_node(
            NodeConfig::new("PassThroughCalculator")
                .with_input_stream("stopped")
                .with_output_stream("out"),
        );
    let mut graph = initialized_graph(registry, config);
    let poller = graph.add_output_stream_poller("out")?;
    graph.start_run(HashMap::new())?;

    // Packets after the stop are dropped, not rejected.
    for t in 0..6i64 {
        graph.add_packet_to_input_stream("in", Packet::new(t).at(t))?;
    }
    let packets = collect_packets(&poller);
    graph.wait_until_done()?;

    let expected: Vec<(i64, i64)> = (0..3).map(|t| (t, t)).collect();
    assert_eq!(values::<i64>(&packets), expected);
    assert_eq!(graph.node_lifecycle("stopper"), Some(NodeLifecycle::Closed));
    Ok(())
}

#[test]
fn test_node_never_runs_concurrently_with_itself() -> anyhow::Result<()> {
    const PACKETS: i64 = 500;
    const GUARDS: usize = 4;

    let mut registry = CalculatorRegistry::with_builtins();
    let stats = ReentryGuard::register(&mut registry);
    let mut config = GraphConfig::new()
        .with_input_stream("in")
        .with_num_threads(4);
    for i in 0..GUARDS {
        config = config.with_node(
            NodeConfig::new(ReentryGuard::NAME)
                .with_name(format!("guard_{i}"))
                .with_input_stream("in"),
        );
    }
    let mut graph = initialized_graph(registry, config);
    graph.start_run(HashMap::new())?;
    for t in 0..PACKETS {
        graph.add_packet_to_input_stream("in", Packet::new(t).at(t))?;
    }
    graph.wait_until_done()?;

    assert_eq!(
        stats.calls.load(Ordering::SeqCst),
        PACKETS as usize * GUARDS
    );
    assert_eq!(stats.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(stats.out_of_order.load(Ordering::SeqCst), 0);
    Ok(())
}
