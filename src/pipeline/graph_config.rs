//! Graph definitions.
//!
//! A [`GraphConfig`] lists the graph's input/output streams, side packets and
//! nodes. It can be written in the protobuf-like text format (see
//! [`text_format`](super::text_format)), deserialized from JSON/TOML, or built
//! programmatically:
//!
//! ```ignore
//! let config = GraphConfig::new()
//!     .with_input_stream("in")
//!     .with_output_stream("out")
//!     .with_node(
//!         NodeConfig::new("PassThroughCalculator")
//!             .with_input_stream("in")
//!             .with_output_stream("out"),
//!     );
//! ```

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::text_format;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A parsed `TAG:index:name`, `TAG:name` or `name` stream reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRef {
    pub tag: String,
    /// Explicit index, if one was written.
    pub index: Option<usize>,
    pub name: String,
}

impl StreamRef {
    pub fn parse(text: &str) -> PipelineResult<Self> {
        let parts: Vec<&str> = text.split(':').collect();
        let (tag, index, name) = match parts.as_slice() {
            [name] => ("", None, *name),
            [tag, name] => (*tag, None, *name),
            [tag, index, name] => {
                let index = index.parse::<usize>().map_err(|_| {
                    PipelineError::Config(format!("invalid index in stream reference '{text}'"))
                })?;
                (*tag, Some(index), *name)
            }
            _ => {
                return Err(PipelineError::Config(format!(
                    "malformed stream reference '{text}'"
                )))
            }
        };
        if !is_valid_tag(tag) {
            return Err(PipelineError::Config(format!(
                "invalid tag '{tag}' in '{text}': tags are upper-case letters, digits and '_'"
            )));
        }
        if !is_valid_name(name) {
            return Err(PipelineError::Config(format!(
                "invalid stream name in '{text}'"
            )));
        }
        Ok(Self {
            tag: tag.to_string(),
            index,
            name: name.to_string(),
        })
    }

    /// Same reference pointing at a different stream name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            tag: self.tag.clone(),
            index: self.index,
            name: name.into(),
        }
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.tag.is_empty(), self.index) {
            (true, None) => write!(f, "{}", self.name),
            (true, Some(i)) => write!(f, ":{i}:{}", self.name),
            (false, None) => write!(f, "{}:{}", self.tag, self.name),
            (false, Some(i)) => write!(f, "{}:{i}:{}", self.tag, self.name),
        }
    }
}

fn is_valid_tag(tag: &str) -> bool {
    tag.is_empty()
        || (tag.starts_with(|c: char| c.is_ascii_uppercase() || c == '_')
            && tag
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'))
}

/// Parses a list of references and assigns indices: explicit indices are
/// kept, the rest count up per tag in order of appearance.
pub fn resolve_refs(refs: &[String]) -> PipelineResult<Vec<(String, usize, String)>> {
    let mut next_index: std::collections::HashMap<String, usize> = Default::default();
    refs.iter()
        .map(|text| {
            let r = StreamRef::parse(text)?;
            let counter = next_index.entry(r.tag.clone()).or_insert(0);
            let index = r.index.unwrap_or(*counter);
            *counter = index + 1;
            Ok((r.tag, index, r.name))
        })
        .collect()
}

/// Calculator-specific options.
///
/// In the text format an options block either holds plain fields or a single
/// extension `[TypeName.ext] { ... }`; the extension name is kept so the
/// compiler can check it against the calculator's declared options type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOptions {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(flatten)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl NodeOptions {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(serde_json::Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(serde_json::Value::as_str)
    }

    /// Short type name of the extension: `mediapipe.FooOptions.ext` → `FooOptions`.
    pub fn extension_type(&self) -> Option<&str> {
        self.extension.as_deref().map(|ext| {
            let ext = ext.strip_suffix(".ext").unwrap_or(ext);
            ext.rsplit(['.', '/']).next().unwrap_or(ext)
        })
    }

    /// Decodes the options into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> PipelineResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.values.clone()))
            .map_err(|e| PipelineError::Config(format!("invalid options: {e}")))
    }
}

/// One node entry of a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub calculator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub input_stream: Vec<String>,
    pub output_stream: Vec<String>,
    pub input_side_packet: Vec<String>,
    pub options: NodeOptions,
}

impl NodeConfig {
    pub fn new(calculator: impl Into<String>) -> Self {
        Self {
            calculator: calculator.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_input_stream(mut self, stream: impl Into<String>) -> Self {
        self.input_stream.push(stream.into());
        self
    }

    pub fn with_output_stream(mut self, stream: impl Into<String>) -> Self {
        self.output_stream.push(stream.into());
        self
    }

    pub fn with_input_side_packet(mut self, side_packet: impl Into<String>) -> Self {
        self.input_side_packet.push(side_packet.into());
        self
    }

    pub fn with_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.options.values.insert(key.into(), value.into());
        self
    }

    pub fn with_options_extension(mut self, extension: impl Into<String>) -> Self {
        self.options.extension = Some(extension.into());
        self
    }

    /// Name used in logs and errors: the explicit name, or
    /// `<calculator>_<position>`.
    pub fn display_name(&self, position: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{position}", self.calculator))
    }
}

/// A complete graph definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Registered name when the graph is used as a subgraph.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub input_stream: Vec<String>,
    pub output_stream: Vec<String>,
    pub input_side_packet: Vec<String>,
    pub node: Vec<NodeConfig>,
    /// Overrides `RuntimeConfig::num_threads` for this graph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<usize>,
    /// Overrides `RuntimeConfig::max_queue_size` for this graph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue_size: Option<usize>,
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the protobuf-like text format.
    pub fn parse_text(text: &str) -> PipelineResult<Self> {
        text_format::parse_graph(text)
    }

    pub fn from_json(text: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_toml(text: &str) -> PipelineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a graph file, choosing the format by extension: `.json`,
    /// `.toml`, anything else is read as text format.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content)?,
            Some("toml") => Self::from_toml(&content)?,
            _ => Self::parse_text(&content)?,
        };
        tracing::debug!(
            "Loaded graph config from {:?}: {} nodes",
            path,
            config.node.len()
        );
        Ok(config)
    }

    pub fn to_json(&self) -> PipelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn with_input_stream(mut self, stream: impl Into<String>) -> Self {
        self.input_stream.push(stream.into());
        self
    }

    pub fn with_output_stream(mut self, stream: impl Into<String>) -> Self {
        self.output_stream.push(stream.into());
        self
    }

    pub fn with_input_side_packet(mut self, side_packet: impl Into<String>) -> Self {
        self.input_side_packet.push(side_packet.into());
        self
    }

    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.node.push(node);
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = Some(max_queue_size);
        self
    }
}
