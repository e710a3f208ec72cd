//! Port descriptors and calculator contracts.
//!
//! Each calculator declares its ports through a [`Contract`]. Ports are
//! addressed by `(tag, index)`; untagged ports use the empty tag. The graph
//! compiler matches a node's configured stream references against the
//! contract and type-checks every connection before the graph starts.

use crate::pipeline::packet::PacketType;
use crate::pipeline::timestamp::TimestampDiff;
use std::fmt;

/// Which side of a node a port is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
    SideInput,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
            Self::SideInput => write!(f, "side input"),
        }
    }
}

/// Declaration of a single port.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub tag: String,
    pub index: usize,
    pub direction: PortDirection,
    pub packet_type: PacketType,
    /// An optional port may be left unconnected. For inputs it also documents
    /// that the packet may be absent at a given timestamp.
    pub optional: bool,
}

impl PortDescriptor {
    pub fn input(tag: &str, index: usize, packet_type: PacketType) -> Self {
        Self::new(tag, index, PortDirection::Input, packet_type)
    }

    pub fn output(tag: &str, index: usize, packet_type: PacketType) -> Self {
        Self::new(tag, index, PortDirection::Output, packet_type)
    }

    pub fn side_input(tag: &str, index: usize, packet_type: PacketType) -> Self {
        Self::new(tag, index, PortDirection::SideInput, packet_type)
    }

    fn new(tag: &str, index: usize, direction: PortDirection, packet_type: PacketType) -> Self {
        Self {
            tag: tag.to_string(),
            index,
            direction,
            packet_type,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// `TAG:index` label used in error messages.
    pub fn label(&self) -> String {
        port_label(&self.tag, self.index)
    }
}

pub(crate) fn port_label(tag: &str, index: usize) -> String {
    if tag.is_empty() {
        format!("#{index}")
    } else {
        format!("{tag}:{index}")
    }
}

/// Ordered set of ports of one direction. A port's position in the map is
/// the slot it occupies in `CalculatorContext` input/output arrays.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    ports: Vec<PortDescriptor>,
}

impl TagMap {
    pub fn push(&mut self, port: PortDescriptor) {
        self.ports.push(port);
    }

    /// Position of the port with `tag` and `index`.
    pub fn position(&self, tag: &str, index: usize) -> Option<usize> {
        self.ports
            .iter()
            .position(|p| p.tag == tag && p.index == index)
    }

    pub fn get(&self, position: usize) -> Option<&PortDescriptor> {
        self.ports.get(position)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.iter()
    }

    /// Number of ports carrying `tag`.
    pub fn count_tag(&self, tag: &str) -> usize {
        self.ports.iter().filter(|p| p.tag == tag).count()
    }
}

/// Static declaration of a calculator's ports and timing behavior.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    pub inputs: TagMap,
    pub outputs: TagMap,
    pub side_inputs: TagMap,
    /// Default timestamp offset; a calculator may override it in `open`.
    pub timestamp_offset: Option<TimestampDiff>,
    /// Name of the options message the calculator accepts, if any.
    pub options_type: Option<&'static str>,
}

impl Contract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, tag: &str, index: usize, packet_type: PacketType) -> Self {
        self.inputs
            .push(PortDescriptor::input(tag, index, packet_type));
        self
    }

    pub fn optional_input(mut self, tag: &str, index: usize, packet_type: PacketType) -> Self {
        self.inputs
            .push(PortDescriptor::input(tag, index, packet_type).optional());
        self
    }

    pub fn output(mut self, tag: &str, index: usize, packet_type: PacketType) -> Self {
        self.outputs
            .push(PortDescriptor::output(tag, index, packet_type));
        self
    }

    pub fn optional_output(mut self, tag: &str, index: usize, packet_type: PacketType) -> Self {
        self.outputs
            .push(PortDescriptor::output(tag, index, packet_type).optional());
        self
    }

    pub fn side_input(mut self, tag: &str, index: usize, packet_type: PacketType) -> Self {
        self.side_inputs
            .push(PortDescriptor::side_input(tag, index, packet_type));
        self
    }

    pub fn optional_side_input(mut self, tag: &str, index: usize, packet_type: PacketType) -> Self {
        self.side_inputs
            .push(PortDescriptor::side_input(tag, index, packet_type).optional());
        self
    }

    pub fn with_offset(mut self, offset: TimestampDiff) -> Self {
        self.timestamp_offset = Some(offset);
        self
    }

    pub fn with_options_type(mut self, name: &'static str) -> Self {
        self.options_type = Some(name);
        self
    }

    /// A calculator without input ports is a source and is polled.
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn ports(&self, direction: PortDirection) -> &TagMap {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
            PortDirection::SideInput => &self.side_inputs,
        }
    }
}
