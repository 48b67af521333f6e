//! Kahn style ordering of the reachable passes.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::{Error, Node, Pass};
use crate::graph::resolve::{Dependencies, Topology};

/// Order the passes in `deps` so that every pass comes after all writers of the resources it reads.
///
/// Resources start with one degree per valid writer, passes with one degree per read. Every round removes all
/// nodes with degree zero, resources before passes, and releases their successors. Passes are emitted in
/// the order they are removed. A round that removes nothing means the remaining nodes form a cycle.
pub(crate) fn order_passes(topology: &Topology, deps: &Dependencies) -> Result<Vec<Pass>> {
    let mut degrees = BTreeMap::<Node, usize>::new();
    for &resource in &deps.resources {
        let writers = topology.writers[resource.0]
            .iter()
            .filter(|pass| deps.passes.contains(pass))
            .count();
        degrees.insert(Node::Resource(resource), writers);
    }
    for &pass in &deps.passes {
        degrees.insert(Node::Pass(pass), topology.reads[pass.0].len());
    }

    let mut order = Vec::with_capacity(deps.passes.len());
    while !degrees.is_empty() {
        let ready = degrees
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&node, _)| node)
            .collect::<Vec<_>>();
        if ready.is_empty() {
            let remaining = degrees.keys().map(|node| node.to_string()).collect::<Vec<_>>();
            error!("Circular dependency between {}", remaining.join(", "));
            return Err(Error::GraphHasCycle.into());
        }

        for node in ready {
            degrees.remove(&node);
            let successors = match node {
                Node::Resource(resource) => topology.readers[resource.0].iter().map(|&pass| Node::Pass(pass)).collect::<Vec<_>>(),
                Node::Pass(pass) => {
                    order.push(pass);
                    topology.writes[pass.0].iter().map(|&resource| Node::Resource(resource)).collect()
                }
            };
            for successor in successors {
                if let Some(degree) = degrees.get_mut(&successor) {
                    *degree = degree.saturating_sub(1);
                }
            }
        }
    }
    Ok(order)
}
