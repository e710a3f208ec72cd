//! Test data builders for creating graph configs

use flowgraph_rs::pipeline::{GraphConfig, NodeConfig};

/// Builder for linear chains of single-input, single-output nodes
pub struct ChainBuilder {
    calculator: String,
    length: usize,
    input: String,
    output: String,
}

impl ChainBuilder {
    pub fn new(calculator: &str) -> Self {
        Self {
            calculator: calculator.to_string(),
            length: 1,
            input: "in".to_string(),
            output: "out".to_string(),
        }
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn input(mut self, name: &str) -> Self {
        self.input = name.to_string();
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.output = name.to_string();
        self
    }

    /// Streams are named `in -> s1 -> s2 -> ... -> out`.
    pub fn build(self) -> GraphConfig {
        let mut config = GraphConfig::new()
            .with_input_stream(&self.input)
            .with_output_stream(&self.output);
        let mut upstream = self.input.clone();
        for i in 0..self.length {
            let downstream = if i + 1 == self.length {
                self.output.clone()
            } else {
                format!("s{}", i + 1)
            };
            config = config.with_node(
                NodeConfig::new(&self.calculator)
                    .with_input_stream(&upstream)
                    .with_output_stream(&downstream),
            );
            upstream = downstream;
        }
        config
    }
}

/// Graph joining inputs `a` and `b` with a `StringJoinCalculator` into `joined`
pub fn string_join_graph() -> GraphConfig {
    GraphConfig::new()
        .with_input_stream("a")
        .with_input_stream("b")
        .with_output_stream("joined")
        .with_node(
            NodeConfig::new("StringJoinCalculator")
                .with_input_stream("STR:0:a")
                .with_input_stream("STR:1:b")
                .with_output_stream("STR:joined"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_builder() {
        let config = ChainBuilder::new("PassThroughCalculator").length(3).build();
        assert_eq!(config.node.len(), 3);
        assert_eq!(config.node[0].input_stream, vec!["in"]);
        assert_eq!(config.node[1].input_stream, vec!["s1"]);
        assert_eq!(config.node[2].output_stream, vec!["out"]);
    }
}
