//! Identity types for the pipeline system.
//!
//! All IDs are newtypes over `u32` that serve as direct array indices
//! into their respective storage vectors in a compiled graph, providing O(1)
//! lookup.

use std::fmt;

/// Index into `CompiledGraph::nodes`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into `CompiledGraph::streams`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId(pub u32);

impl StreamId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An input port of a specific node: the node plus the port's position in its
/// contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputPortId {
    pub node: NodeId,
    pub port: u16,
}

impl InputPortId {
    pub fn new(node: NodeId, port: usize) -> Self {
        debug_assert!(port <= u16::MAX as usize);
        Self {
            node,
            port: port as u16,
        }
    }

    #[inline]
    pub fn port_index(self) -> usize {
        self.port as usize
    }
}

impl fmt::Debug for InputPortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputPortId(node={}, port={})", self.node.0, self.port)
    }
}
