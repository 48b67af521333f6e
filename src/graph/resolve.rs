//! Reverse reachability from the compile target.

use std::collections::{BTreeSet, HashSet};

use anyhow::Result;

use crate::{Error, Node, Pass, Resource};

/// Read/write relationships of the registry, with the derived writer and reader lists of every resource.
#[derive(Debug, Default, Clone)]
pub(crate) struct Topology {
    pub writers: Vec<Vec<Pass>>,
    pub readers: Vec<Vec<Pass>>,
    pub reads: Vec<Vec<Resource>>,
    pub writes: Vec<Vec<Resource>>,
}

impl Topology {
    /// Derive writer and reader lists for `resource_count` resources from the read and write sets of every pass.
    /// Fails if a pass names a resource that is not registered.
    pub fn new<'a>(
        resource_count: usize,
        passes: impl IntoIterator<Item = (&'a str, &'a [Resource], &'a [Resource])>,
    ) -> Result<Self> {
        let mut topology = Topology {
            writers: vec![vec![]; resource_count],
            readers: vec![vec![]; resource_count],
            ..Default::default()
        };
        for (index, (name, reads, writes)) in passes.into_iter().enumerate() {
            let pass = Pass(index);
            for &resource in reads.iter().chain(writes.iter()) {
                if resource.0 >= resource_count {
                    return Err(Error::InvalidHandle(format!("{resource} used by pass `{name}`")).into());
                }
            }
            for &resource in reads {
                topology.readers[resource.0].push(pass);
            }
            for &resource in writes {
                topology.writers[resource.0].push(pass);
            }
            topology.reads.push(reads.to_vec());
            topology.writes.push(writes.to_vec());
        }
        Ok(topology)
    }

    pub fn resource_count(&self) -> usize {
        self.writers.len()
    }
}

/// The subset of the registry that contributes to the compile target.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Dependencies {
    pub resources: BTreeSet<Resource>,
    pub passes: BTreeSet<Pass>,
}

struct Resolver<'t> {
    topology: &'t Topology,
    deps: Dependencies,
    visiting: HashSet<Node>,
    finished: HashSet<Node>,
}

/// Walk backwards from `target`. A resource pulls in its writers, a pass pulls in the resources it writes (without
/// visiting them) and visits the resources it reads. Entering a node that is still being visited is a cycle.
pub(crate) fn find_dependencies(topology: &Topology, target: Resource) -> Result<Dependencies> {
    if target.0 >= topology.resource_count() {
        return Err(Error::InvalidHandle(format!("target {target}")).into());
    }
    let mut resolver = Resolver {
        topology,
        deps: Dependencies::default(),
        visiting: HashSet::new(),
        finished: HashSet::new(),
    };
    resolver.visit_resource(target)?;
    Ok(resolver.deps)
}

impl Resolver<'_> {
    fn enter(&mut self, node: Node) -> Result<bool> {
        if self.visiting.contains(&node) {
            error!("Dependency cycle through {node}");
            return Err(Error::GraphHasCycle.into());
        }
        if self.finished.contains(&node) {
            return Ok(false);
        }
        self.visiting.insert(node);
        Ok(true)
    }

    fn leave(&mut self, node: Node) {
        self.visiting.remove(&node);
        self.finished.insert(node);
    }

    fn visit_resource(&mut self, resource: Resource) -> Result<()> {
        let node = Node::Resource(resource);
        if !self.enter(node)? {
            return Ok(());
        }
        self.deps.resources.insert(resource);
        let topology = self.topology;
        for &writer in &topology.writers[resource.0] {
            self.visit_pass(writer)?;
        }
        self.leave(node);
        Ok(())
    }

    fn visit_pass(&mut self, pass: Pass) -> Result<()> {
        let node = Node::Pass(pass);
        if !self.enter(node)? {
            return Ok(());
        }
        self.deps.passes.insert(pass);
        let topology = self.topology;
        self.deps.resources.extend(topology.writes[pass.0].iter().copied());
        for &read in &topology.reads[pass.0] {
            self.visit_resource(read)?;
        }
        self.leave(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(resources: usize, passes: &[(&[usize], &[usize])]) -> Topology {
        let passes = passes
            .iter()
            .map(|(reads, writes)| {
                (
                    reads.iter().map(|&r| Resource(r)).collect::<Vec<_>>(),
                    writes.iter().map(|&r| Resource(r)).collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>();
        Topology::new(
            resources,
            passes.iter().map(|(reads, writes)| ("pass", reads.as_slice(), writes.as_slice())),
        )
        .unwrap()
    }

    fn is_cycle(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<Error>(), Some(Error::GraphHasCycle))
    }

    #[test]
    fn chain_is_fully_reachable() {
        // 0 -> A -> r0 -> B -> r1
        let topology = topology(2, &[(&[], &[0]), (&[0], &[1])]);
        let deps = find_dependencies(&topology, Resource(1)).unwrap();
        assert_eq!(deps.resources, BTreeSet::from([Resource(0), Resource(1)]));
        assert_eq!(deps.passes, BTreeSet::from([Pass(0), Pass(1)]));
    }

    #[test]
    fn unrelated_declarations_are_ignored() {
        let topology = topology(4, &[(&[], &[0]), (&[0], &[1]), (&[], &[2]), (&[2], &[3])]);
        let deps = find_dependencies(&topology, Resource(1)).unwrap();
        assert_eq!(deps.resources, BTreeSet::from([Resource(0), Resource(1)]));
        assert_eq!(deps.passes, BTreeSet::from([Pass(0), Pass(1)]));
    }

    #[test]
    fn leaf_target_has_no_passes() {
        let topology = topology(1, &[]);
        let deps = find_dependencies(&topology, Resource(0)).unwrap();
        assert_eq!(deps.resources, BTreeSet::from([Resource(0)]));
        assert!(deps.passes.is_empty());
    }

    #[test]
    fn written_siblings_are_valid() {
        // A writes color and depth, only color is the target.
        let topology = topology(2, &[(&[], &[0, 1])]);
        let deps = find_dependencies(&topology, Resource(0)).unwrap();
        assert_eq!(deps.resources, BTreeSet::from([Resource(0), Resource(1)]));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        // r0 is read by two passes that both feed the final pass.
        let topology = topology(4, &[(&[], &[0]), (&[0], &[1]), (&[0], &[2]), (&[1, 2], &[3])]);
        let deps = find_dependencies(&topology, Resource(3)).unwrap();
        assert_eq!(deps.passes.len(), 4);
        assert_eq!(deps.resources.len(), 4);
    }

    #[test]
    fn self_cycle_is_rejected() {
        let topology = topology(1, &[(&[0], &[0])]);
        let err = find_dependencies(&topology, Resource(0)).unwrap_err();
        assert!(is_cycle(&err));
    }

    #[test]
    fn longer_cycle_is_rejected() {
        // A reads r1 writes r0, B reads r0 writes r1.
        let topology = topology(2, &[(&[1], &[0]), (&[0], &[1])]);
        let err = find_dependencies(&topology, Resource(1)).unwrap_err();
        assert!(is_cycle(&err));
    }

    #[test]
    fn unknown_resources_are_rejected() {
        let reads = [Resource(5)];
        let writes: [Resource; 0] = [];
        let result = Topology::new(1, [("broken", reads.as_slice(), writes.as_slice())]);
        let err = result.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidHandle(_))));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let topology = topology(1, &[]);
        let err = find_dependencies(&topology, Resource(1)).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidHandle(_))));
    }
}
