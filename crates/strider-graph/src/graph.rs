//! [`Graph`] – node storage and the resolved link set.
//!
//! Nodes are initialized on insertion (port shapes must be fixed before any
//! link touching the node is attempted) and stored in insertion order, which
//! is also the per-cycle execution order. Each destination input port is
//! bound to at most one source output port; the builder enforces this
//! single-writer property at assembly time.

use std::collections::HashMap;

use strider_types::StriderError;

use crate::node::{InitContext, Node};

/// A resolved directed edge: source output port → destination input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub src: usize,
    pub src_port: String,
    pub dst: usize,
    pub dst_port: String,
}

/// The assembled pipeline: nodes in execution order plus resolved links.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Box<dyn Node>>,
    index: HashMap<String, usize>,
    links: Vec<Link>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize `node` with `ctx` and insert it. Execution order is
    /// insertion order, so callers add nodes in dependency order
    /// (estimators before controllers before arbitration).
    ///
    /// # Errors
    ///
    /// `StriderError::Config` when initialization fails or when a node with
    /// the same name already exists.
    pub fn add_node(
        &mut self,
        mut node: Box<dyn Node>,
        ctx: &InitContext,
    ) -> Result<(), StriderError> {
        let name = node.name().to_string();
        if self.index.contains_key(&name) {
            return Err(StriderError::Config(format!(
                "node '{name}' is already part of the graph"
            )));
        }
        node.initialize(ctx)?;
        self.index.insert(name, self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the named node, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Borrow the named node.
    pub fn node(&self, name: &str) -> Option<&dyn Node> {
        self.index_of(name).map(|i| self.nodes[i].as_ref())
    }

    /// Mutably borrow the named node.
    pub fn node_mut(&mut self, name: &str) -> Option<&mut (dyn Node + 'static)> {
        let idx = self.index_of(name)?;
        Some(self.nodes[idx].as_mut())
    }

    /// Borrow a node by index.
    pub fn node_at(&self, idx: usize) -> &dyn Node {
        self.nodes[idx].as_ref()
    }

    /// Mutably borrow a node by index.
    pub fn node_at_mut(&mut self, idx: usize) -> &mut (dyn Node + 'static) {
        self.nodes[idx].as_mut()
    }

    /// All resolved links.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// The link currently bound to (`dst`, `dst_port`), if any. The single
    /// writer per destination port makes this unique.
    pub fn binding(&self, dst: usize, dst_port: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.dst == dst && l.dst_port == dst_port)
    }

    /// Record a resolved link. The builder has already validated ports,
    /// shapes, and the single-writer property.
    pub(crate) fn push_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Links targeting the node at `dst`, cloned so the caller can walk
    /// them while mutating nodes.
    pub(crate) fn links_into(&self, dst: usize) -> Vec<Link> {
        self.links.iter().filter(|l| l.dst == dst).cloned().collect()
    }
}
