//! Depth-first walks over a graph and every subgraph nested in its nodes'
//! attributes (`If` branches, `Loop` and `Scan` bodies).
//!
//! Node order within a graph is preserved. A node's callback fires before
//! the traversal descends into that node's subgraphs. The `args` value is
//! handed unchanged to every callback invocation.
//!
//! Callbacks given mutable access may rewrite node or graph contents, but
//! must not add or remove entries of a node list that is still being
//! iterated. Doing so from a per-graph callback is fine since the callback
//! returns before that graph's nodes are walked.

use crate::attribute::{nested_graphs, nested_graphs_mut};
use crate::onnx;

/// Call `per_node` for every node in `graph` and its subgraphs.
pub fn traverse_nodes<'a, A, F>(graph: &'a onnx::GraphProto, per_node: &mut F, args: &A)
where
    A: ?Sized,
    F: FnMut(&'a onnx::NodeProto, &A),
{
    for node in &graph.node {
        per_node(node, args);
        for subgraph in nested_graphs(node) {
            traverse_nodes(subgraph, per_node, args);
        }
    }
}

pub fn traverse_nodes_mut<A, F>(graph: &mut onnx::GraphProto, per_node: &mut F, args: &A)
where
    A: ?Sized,
    F: FnMut(&mut onnx::NodeProto, &A),
{
    for node in &mut graph.node {
        per_node(node, args);
        for subgraph in nested_graphs_mut(node) {
            traverse_nodes_mut(subgraph, per_node, args);
        }
    }
}

/// Call `per_graph` once for `graph` and once for every nested graph, parents
/// before the graphs reachable through their nodes.
pub fn traverse_graphs<'a, A, F>(graph: &'a onnx::GraphProto, per_graph: &mut F, args: &A)
where
    A: ?Sized,
    F: FnMut(&'a onnx::GraphProto, &A),
{
    per_graph(graph, args);
    for node in &graph.node {
        for subgraph in nested_graphs(node) {
            traverse_graphs(subgraph, per_graph, args);
        }
    }
}

pub fn traverse_graphs_mut<A, F>(graph: &mut onnx::GraphProto, per_graph: &mut F, args: &A)
where
    A: ?Sized,
    F: FnMut(&mut onnx::GraphProto, &A),
{
    per_graph(graph, args);
    for node in &mut graph.node {
        for subgraph in nested_graphs_mut(node) {
            traverse_graphs_mut(subgraph, per_graph, args);
        }
    }
}
