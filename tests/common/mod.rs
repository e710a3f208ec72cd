//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use flowgraph_rs::pipeline::{CalculatorRegistry, Graph, GraphConfig, OutputStreamPoller, Packet};
use std::sync::Arc;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Initialize a graph against `registry`, panicking on config errors
pub fn initialized_graph(registry: CalculatorRegistry, config: GraphConfig) -> Graph {
    let mut graph = Graph::new(Arc::new(registry));
    graph
        .initialize(config)
        .expect("graph config should be valid");
    graph
}

/// Drain a poller until its stream closes, with a per-packet timeout
pub fn collect_packets(poller: &OutputStreamPoller) -> Vec<Packet> {
    let mut packets = Vec::new();
    while let Some(packet) = poller.next_timeout(test_timeout()) {
        packets.push(packet);
    }
    packets
}

/// `(timestamp, value)` pairs of packets carrying `T`
pub fn values<T: Clone + 'static>(packets: &[Packet]) -> Vec<(i64, T)> {
    packets
        .iter()
        .map(|p| {
            (
                p.timestamp().value(),
                p.get::<T>().expect("unexpected payload type").clone(),
            )
        })
        .collect()
}
