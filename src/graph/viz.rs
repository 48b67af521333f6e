//! Graphviz export of the graph registry, for debugging.

use std::fmt::{Display, Formatter};

use anyhow::Result;
use petgraph::dot::Dot;
use petgraph::graph::{EdgeReference, NodeIndex};

use crate::{GpuDevice, Graph, Node, Pass, Resource, ShaderLoader};

/// Trait that is implemented for the frame graph to help with debugging and visualizing the graph.
pub trait GraphViz {
    /// Get the string representation of this graph in `dot` format.
    fn dot(&self) -> Result<String>;
}

struct VizNode {
    node: Node,
    name: String,
    valid: bool,
}

impl Display for VizNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.node {
            Node::Resource(_) => f.write_fmt(format_args!("Resource: {}", self.name)),
            Node::Pass(_) => f.write_fmt(format_args!("Pass: {}", self.name)),
        }
    }
}

type VizGraph = petgraph::Graph<VizNode, &'static str>;

fn edge_attributes(_: &VizGraph, _: EdgeReference<&'static str>) -> String {
    String::from("")
}

fn node_attributes(_: &VizGraph, (_, node): (NodeIndex, &VizNode)) -> String {
    let shape = match node.node {
        Node::Resource(_) => "shape=box",
        Node::Pass(_) => "shape=ellipse",
    };
    let color = if node.valid {
        match node.node {
            Node::Resource(_) => "#f7c95e",
            Node::Pass(_) => "#5e6df7",
        }
    } else {
        "#d0d0d0"
    };
    format!("style=filled fillcolor = \"{color}\" {shape}")
}

impl<D: GpuDevice, S: ShaderLoader> GraphViz for Graph<D, S> {
    /// Every registered resource and pass is exported. Nodes reachable from the last compile target are colored,
    /// unreachable ones are grey. Edges point from writers to resources and from resources to readers.
    fn dot(&self) -> Result<String> {
        let mut graph = VizGraph::new();
        let mut resource_nodes = vec![];
        let mut index = 0;
        while let Some(info) = self.resource(Resource(index)) {
            let resource = Resource(index);
            resource_nodes.push(graph.add_node(VizNode {
                node: Node::Resource(resource),
                name: info.name.clone(),
                valid: self.valid_resources().contains(&resource),
            }));
            index += 1;
        }

        let mut index = 0;
        while let Some(info) = self.pass(Pass(index)) {
            let pass = Pass(index);
            let node = graph.add_node(VizNode {
                node: Node::Pass(pass),
                name: info.name.clone(),
                valid: self.valid_passes().contains(&pass),
            });
            for read in &info.reads {
                if let Some(&resource) = resource_nodes.get(read.index()) {
                    graph.add_edge(resource, node, "read");
                }
            }
            for write in &info.writes {
                if let Some(&resource) = resource_nodes.get(write.index()) {
                    graph.add_edge(node, resource, "write");
                }
            }
            index += 1;
        }

        Ok(format!(
            "{}",
            Dot::with_attr_getters(&graph, &[], &edge_attributes, &node_attributes)
        ))
    }
}
