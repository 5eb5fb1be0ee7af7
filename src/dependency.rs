//! Producer/consumer maps between the nodes of a graph and its subgraphs.
//!
//! Nodes have no structural identity (names may be empty or repeated), so
//! every node is registered in an arena as it is reached and referred to by
//! its index from then on. Indices follow the same pre-order as
//! [`traverse_nodes`](crate::traversal::traverse_nodes).
//!
//! Scoping: a value name resolves inside a graph if it is a graph input, an
//! initializer, or the output of an earlier node of that graph, with later
//! producers shadowing earlier ones. Names a subgraph cannot resolve become
//! implicit inputs of the node owning the subgraph, and are resolved in the
//! owner's graph like any other input of that node.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::attribute::{has_nested_graphs, nested_graphs};
use crate::onnx;

pub type NodeId = usize;

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("This appears to be an invalid model with missing inputs of {}", .0.join(","))]
    MissingInputs(Vec<String>),
}

/// Result of analysing a single graph scope.
#[derive(Debug, Default)]
struct ScopeAnalysis {
    /// `(producer, consumer)` pairs found in this scope and its subgraphs.
    edges: Vec<(NodeId, NodeId)>,
    implicit_inputs: BTreeSet<String>,
}

fn analyze_scope<'a>(
    graph: &'a onnx::GraphProto,
    arena: &mut Vec<&'a onnx::NodeProto>,
    scope_path: &str,
) -> ScopeAnalysis {
    let graph_inputs: HashSet<&str> = graph.input.iter().map(|x| x.name.as_str()).collect();
    let initializers: HashSet<&str> = graph.initializer.iter().map(|x| x.name.as_str()).collect();

    let mut producers_by_name: HashMap<&'a str, NodeId> = HashMap::new();
    let mut analysis = ScopeAnalysis::default();

    for node in &graph.node {
        let node_id = arena.len();
        arena.push(node);

        let mut inputs: Vec<&str> = node.input.iter().map(String::as_str).collect();

        let mut subgraph_implicit_inputs = BTreeSet::new();
        if has_nested_graphs(node) {
            let subgraph_path = format!("{scope_path}/{}", node_label(node, node_id));
            for subgraph in nested_graphs(node) {
                let sub_analysis = analyze_scope(subgraph, arena, &subgraph_path);
                analysis.edges.extend(sub_analysis.edges);
                subgraph_implicit_inputs.extend(sub_analysis.implicit_inputs);
            }
        }
        inputs.extend(subgraph_implicit_inputs.iter().map(String::as_str));

        for input in inputs {
            if input.is_empty() {
                // omitted optional input
                continue;
            }
            if let Some(producer) = producers_by_name.get(input) {
                analysis.edges.push((*producer, node_id));
            } else if !graph_inputs.contains(input) && !initializers.contains(input) {
                if analysis.implicit_inputs.insert(input.to_string()) {
                    log::debug!("{scope_path}: \"{input}\" is not defined in this scope");
                }
            }
        }

        for output in &node.output {
            if !output.is_empty() {
                producers_by_name.insert(output.as_str(), node_id);
            }
        }
    }

    analysis
}

fn node_label(node: &onnx::NodeProto, node_id: NodeId) -> String {
    if node.name.is_empty() {
        format!("{}#{}", node.op_type, node_id)
    } else {
        node.name.clone()
    }
}

/// Links between the nodes of a graph, including nodes of nested subgraphs.
///
/// `consumer ∈ producers[x]` holds exactly when `x ∈ consumers[consumer]`.
/// A node only has entries once it is linked to something.
#[derive(Debug, Clone)]
pub struct DependencyMaps<'a> {
    nodes: Vec<&'a onnx::NodeProto>,
    producers: HashMap<NodeId, HashSet<NodeId>>,
    consumers: HashMap<NodeId, HashSet<NodeId>>,
}

impl<'a> DependencyMaps<'a> {
    fn from_edges(nodes: Vec<&'a onnx::NodeProto>, edges: Vec<(NodeId, NodeId)>) -> Self {
        let mut maps = Self {
            nodes,
            producers: HashMap::new(),
            consumers: HashMap::new(),
        };
        for (producer, consumer) in edges {
            maps.link(producer, consumer);
        }
        maps
    }

    fn link(&mut self, producer: NodeId, consumer: NodeId) {
        self.producers.entry(consumer).or_default().insert(producer);
        self.consumers.entry(producer).or_default().insert(consumer);
    }

    /// Every node reached during analysis, indexed by [`NodeId`].
    pub fn nodes(&self) -> &[&'a onnx::NodeProto] {
        &self.nodes
    }

    pub fn node(&self, node_id: NodeId) -> Option<&'a onnx::NodeProto> {
        self.nodes.get(node_id).copied()
    }

    /// Look up the id of a node by instance. Nodes that compare equal but are
    /// distinct instances get distinct ids.
    pub fn node_id(&self, node: &onnx::NodeProto) -> Option<NodeId> {
        self.nodes.iter().position(|x| std::ptr::eq(*x, node))
    }

    pub fn producers(&self) -> &HashMap<NodeId, HashSet<NodeId>> {
        &self.producers
    }

    pub fn consumers(&self) -> &HashMap<NodeId, HashSet<NodeId>> {
        &self.consumers
    }

    /// Nodes producing a value consumed by `node_id`.
    pub fn producers_of(&self, node_id: NodeId) -> Option<&HashSet<NodeId>> {
        self.producers.get(&node_id)
    }

    /// Nodes consuming a value produced by `node_id`.
    pub fn consumers_of(&self, node_id: NodeId) -> Option<&HashSet<NodeId>> {
        self.consumers.get(&node_id)
    }

    pub fn num_edges(&self) -> usize {
        self.consumers.values().map(HashSet::len).sum()
    }

    pub fn node_label(&self, node_id: NodeId) -> Option<String> {
        self.node(node_id).map(|node| node_label(node, node_id))
    }

    pub fn report(&self) -> DependencyReport {
        let sorted_labels = |ids: Option<&HashSet<NodeId>>| -> Vec<String> {
            let mut ids: Vec<_> = ids.into_iter().flatten().copied().collect();
            ids.sort_unstable();
            ids.into_iter()
                .map(|id| node_label(self.nodes[id], id))
                .collect()
        };
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(id, node)| NodeDependencies {
                id,
                label: node_label(node, id),
                op_type: node.op_type.clone(),
                producers: sorted_labels(self.producers_of(id)),
                consumers: sorted_labels(self.consumers_of(id)),
            })
            .collect();
        DependencyReport {
            num_nodes: self.nodes.len(),
            num_edges: self.num_edges(),
            nodes,
        }
    }
}

/// Printable summary of a [`DependencyMaps`], in node id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub num_nodes: usize,
    pub num_edges: usize,
    pub nodes: Vec<NodeDependencies>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDependencies {
    pub id: NodeId,
    pub label: String,
    pub op_type: String,
    pub producers: Vec<String>,
    pub consumers: Vec<String>,
}

/// Build the producer and consumer maps for `graph` and all its subgraphs.
///
/// Fails if the top level graph references values nobody defines.
pub fn compute_dependency_maps(
    graph: &onnx::GraphProto,
) -> Result<DependencyMaps<'_>, DependencyError> {
    let mut arena = Vec::new();
    let root_path = if graph.name.is_empty() {
        "graph".to_string()
    } else {
        graph.name.clone()
    };
    let analysis = analyze_scope(graph, &mut arena, &root_path);

    if !analysis.implicit_inputs.is_empty() {
        return Err(DependencyError::MissingInputs(
            analysis.implicit_inputs.into_iter().collect(),
        ));
    }

    log::debug!(
        "Mapped {} nodes with {} producer/consumer links",
        arena.len(),
        analysis.edges.len()
    );
    Ok(DependencyMaps::from_edges(arena, analysis.edges))
}

/// Same as [`compute_dependency_maps`], returned as the two raw maps.
#[allow(clippy::type_complexity)]
pub fn get_producer_consumer_maps(
    graph: &onnx::GraphProto,
) -> Result<
    (
        HashMap<NodeId, HashSet<NodeId>>,
        HashMap<NodeId, HashSet<NodeId>>,
    ),
    DependencyError,
> {
    let maps = compute_dependency_maps(graph)?;
    Ok((maps.producers, maps.consumers))
}
