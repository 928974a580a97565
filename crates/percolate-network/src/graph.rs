//! Undirected graph with attribute maps on nodes, edges, and the graph
//! itself.
//!
//! Node and edge identity is positional and stable: generators build the
//! topology once, and the simulation only rewrites attribute maps. The
//! double-buffering the driver relies on is `copy_states_from`, which copies
//! attribute maps between two structurally identical graphs without touching
//! adjacency.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute map attached to a node, edge, or the graph itself
pub type AttrMap = IndexMap<String, String>;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

/// Unique identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge {}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Edge {
    endpoints: (NodeId, NodeId),
    attrs: AttrMap,
}

/// Undirected graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<AttrMap>,
    edges: Vec<Edge>,
    /// Per-node list of (neighbor, connecting edge)
    adjacency: Vec<Vec<(NodeId, EdgeId)>>,
    /// Network-level attributes (aggregates, bookkeeping)
    graph_attrs: AttrMap,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph with `n` nodes and no edges
    pub fn with_nodes(n: usize) -> Self {
        Self {
            nodes: vec![AttrMap::new(); n],
            edges: Vec::new(),
            adjacency: vec![Vec::new(); n],
            graph_attrs: AttrMap::new(),
        }
    }

    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(AttrMap::new());
        self.adjacency.push(Vec::new());
        id
    }

    /// Add an undirected edge. Self-loops and parallel edges are not
    /// prevented here; generators are responsible for avoiding them.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            endpoints: (a, b),
            attrs: AttrMap::new(),
        });
        self.adjacency[a.0].push((b, id));
        self.adjacency[b.0].push((a, id));
        id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + use<> {
        (0..self.edges.len()).map(EdgeId)
    }

    pub fn node_attrs(&self, id: NodeId) -> &AttrMap {
        &self.nodes[id.0]
    }

    pub fn node_attrs_mut(&mut self, id: NodeId) -> &mut AttrMap {
        &mut self.nodes[id.0]
    }

    pub fn edge_attrs(&self, id: EdgeId) -> &AttrMap {
        &self.edges[id.0].attrs
    }

    pub fn edge_attrs_mut(&mut self, id: EdgeId) -> &mut AttrMap {
        &mut self.edges[id.0].attrs
    }

    pub fn edge_endpoints(&self, id: EdgeId) -> (NodeId, NodeId) {
        self.edges[id.0].endpoints
    }

    /// Neighbors of a node with the connecting edge
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = (NodeId, EdgeId)> + '_ {
        self.adjacency[id.0].iter().copied()
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.adjacency[id.0].len()
    }

    pub fn graph_attrs(&self) -> &AttrMap {
        &self.graph_attrs
    }

    pub fn graph_attrs_mut(&mut self) -> &mut AttrMap {
        &mut self.graph_attrs
    }

    /// True if both graphs have identical node and edge counts
    pub fn same_shape(&self, other: &Graph) -> bool {
        self.nodes.len() == other.nodes.len() && self.edges.len() == other.edges.len()
    }

    /// Copy all attribute maps from `other` without touching topology.
    ///
    /// Both graphs must have the same shape; this is the constant-topology
    /// fast path for double buffering.
    pub fn copy_states_from(&mut self, other: &Graph) {
        debug_assert!(self.same_shape(other));
        for (dst, src) in self.nodes.iter_mut().zip(&other.nodes) {
            dst.clone_from(src);
        }
        for (dst, src) in self.edges.iter_mut().zip(&other.edges) {
            dst.attrs.clone_from(&src.attrs);
        }
        self.graph_attrs.clone_from(&other.graph_attrs);
    }
}
