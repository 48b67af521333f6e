//! Strongly typed handles into the graph registries.

use std::fmt::{Display, Formatter};

/// Handle to a resource registered with [`Graph::new_resource()`](crate::Graph::new_resource).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resource(pub(crate) usize);

/// Handle to a pass registered with [`Graph::new_pass()`](crate::Graph::new_pass).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pass(pub(crate) usize);

impl Resource {
    /// Index of this resource in the registry.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Pass {
    /// Index of this pass in the registry.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A node in the bipartite resource/pass dependency graph.
/// Resources order before passes, and both order by index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    Resource(Resource),
    Pass(Pass),
}

impl From<Resource> for Node {
    fn from(value: Resource) -> Self {
        Node::Resource(value)
    }
}

impl From<Pass> for Node {
    fn from(value: Pass) -> Self {
        Node::Pass(value)
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Resource({})", self.0)
    }
}

impl Display for Pass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pass({})", self.0)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Resource(resource) => resource.fmt(f),
            Node::Pass(pass) => pass.fmt(f),
        }
    }
}
