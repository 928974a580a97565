//! Graph structure and network generators.
//!
//! The simulation core treats the network as a collaborator: a mutable graph
//! whose nodes and edges carry string attribute maps, plus a generic
//! attribute map on the graph itself for network-level aggregates. Named
//! generators build initial topologies from typed parameter maps.

pub mod generators;
pub mod graph;

pub use generators::{GeneratorError, GeneratorParams, ParamValue, build};
pub use graph::{AttrMap, EdgeId, Graph, NodeId};
