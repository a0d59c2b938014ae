//! Effects Rack
//!
//! Ordered serial chain of nodes: every rack input feeds the first module,
//! module `i` feeds module `i + 1`, and the last module feeds the rack
//! output. An empty rack wires its inputs straight to its output.
//!
//! The rack owns its modules (they live in the graph arena under handles
//! only the rack hands out). Structural edits must run under the same lock
//! as rendering; see [`crate::song::SharedSong`].

use crate::error::{Result, SongrackError};
use crate::graph::module::Module;
use crate::graph::node_graph::{ModuleGraph, NodeId, Target};

/// Serial chain of modules between a set of inputs and one output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectsRack {
    modules: Vec<NodeId>,
    inputs: Vec<NodeId>,
    output: Option<Target>,
}

impl EffectsRack {
    /// Create an empty, unwired rack
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules in chain order
    pub fn modules(&self) -> &[NodeId] {
        &self.modules
    }

    /// Nodes feeding the rack
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Where the rack's signal ends up
    pub fn output(&self) -> Option<Target> {
        self.output
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Handle of the module at `index`
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.modules.get(index).copied()
    }

    /// Position of a module in the chain
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.modules.iter().position(|&m| m == id)
    }

    // ========================================================================
    // Structural edits
    // ========================================================================

    /// Append a module to the end of the chain.
    pub fn insert(&mut self, graph: &mut ModuleGraph, module: Box<dyn Module>) -> Result<NodeId> {
        let index = self.modules.len();
        self.insert_at(graph, module, index)
    }

    /// Splice a module in at `index` (clamped to the chain length).
    pub fn insert_at(
        &mut self,
        graph: &mut ModuleGraph,
        module: Box<dyn Module>,
        index: usize,
    ) -> Result<NodeId> {
        let id = graph.add(module);
        let index = index.min(self.modules.len());
        self.attach(graph, id, index)?;
        tracing::debug!(node = %id, index, len = self.modules.len(), "rack insert");
        Ok(id)
    }

    /// Take the module at `index` out of the chain and hand ownership back.
    ///
    /// Its former neighbours are rewired to bypass it.
    pub fn remove(&mut self, graph: &mut ModuleGraph, index: usize) -> Result<Box<dyn Module>> {
        let id = self.detach(graph, index)?;
        tracing::debug!(node = %id, index, len = self.modules.len(), "rack remove");
        graph.remove(id).ok_or_else(|| SongrackError::MissingNode {
            node: id.to_string(),
        })
    }

    /// Swap the modules at `a` and `b` by removing and reinserting both.
    pub fn swap(&mut self, graph: &mut ModuleGraph, a: usize, b: usize) -> Result<()> {
        let len = self.modules.len();
        for index in [a, b] {
            if index >= len {
                return Err(SongrackError::out_of_range("rack slot", index, len));
            }
        }
        if a == b {
            return Ok(());
        }

        let (min, max) = if a < b { (a, b) } else { (b, a) };
        let first = self.detach(graph, min)?;
        self.attach(graph, first, max)?;
        let second = self.detach(graph, max - 1)?;
        self.attach(graph, second, min)
    }

    /// Move the module at `from` so it ends up at `to`.
    pub fn move_module(&mut self, graph: &mut ModuleGraph, from: usize, to: usize) -> Result<()> {
        let id = self.detach(graph, from)?;
        let to = to.min(self.modules.len());
        self.attach(graph, id, to)
    }

    /// Remove every module, returning them in chain order.
    pub fn clear(&mut self, graph: &mut ModuleGraph) -> Result<Vec<Box<dyn Module>>> {
        let mut removed = Vec::with_capacity(self.modules.len());
        while !self.modules.is_empty() {
            removed.push(self.remove(graph, 0)?);
        }
        Ok(removed)
    }

    fn detach(&mut self, graph: &mut ModuleGraph, index: usize) -> Result<NodeId> {
        if index >= self.modules.len() {
            return Err(SongrackError::out_of_range(
                "rack slot",
                index,
                self.modules.len(),
            ));
        }
        let id = self.modules.remove(index);
        graph.remove_all_connections(id);
        self.wire_into(graph, index)?;
        Ok(id)
    }

    fn attach(&mut self, graph: &mut ModuleGraph, id: NodeId, index: usize) -> Result<()> {
        self.modules.insert(index, id);
        self.wire_into(graph, index)?;
        self.wire_into(graph, index + 1)
    }

    /// What position `index` of the chain delivers into.
    fn target_at(&self, index: usize) -> Option<Target> {
        match self.modules.get(index) {
            Some(&id) => Some(Target::Node(id)),
            None => self.output,
        }
    }

    /// Connect whatever sits upstream of position `index` to the node at
    /// `index`, or to the rack output past the end.
    fn wire_into(&self, graph: &mut ModuleGraph, index: usize) -> Result<()> {
        let target = self.target_at(index);
        if index == 0 {
            for &input in &self.inputs {
                link(graph, input, target)?;
            }
            Ok(())
        } else {
            link(graph, self.modules[index - 1], target)
        }
    }

    // ========================================================================
    // External wiring
    // ========================================================================

    /// Feed `node` into the head of the chain.
    pub fn connect_input(&mut self, graph: &mut ModuleGraph, node: NodeId) -> Result<()> {
        link(graph, node, self.target_at(0))?;
        if !self.inputs.contains(&node) {
            self.inputs.push(node);
        }
        Ok(())
    }

    /// Stop feeding `node` into the rack. Returns false if it was not an input.
    pub fn disconnect_input(&mut self, graph: &mut ModuleGraph, node: NodeId) -> bool {
        let Some(pos) = self.inputs.iter().position(|&n| n == node) else {
            return false;
        };
        self.inputs.remove(pos);
        graph.disconnect(node);
        true
    }

    /// Disconnect every input node.
    pub fn disconnect_all_inputs(&mut self, graph: &mut ModuleGraph) {
        for node in self.inputs.drain(..) {
            graph.disconnect(node);
        }
    }

    /// Route the tail of the chain to `target`.
    pub fn connect_output(&mut self, graph: &mut ModuleGraph, target: Target) -> Result<()> {
        let previous = self.output.replace(target);
        let len = self.modules.len();
        if let Err(err) = self.wire_into(graph, len) {
            self.output = previous;
            self.wire_into(graph, len)?;
            return Err(err);
        }
        Ok(())
    }

    /// Leave the tail of the chain unconnected.
    pub fn disconnect_output(&mut self, graph: &mut ModuleGraph) -> Result<()> {
        self.output = None;
        self.wire_into(graph, self.modules.len())
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Check that the graph edges form exactly this rack's chain: no
    /// duplicate, missing, or dangling links.
    pub fn is_consistent(&self, graph: &ModuleGraph) -> bool {
        for (i, &id) in self.modules.iter().enumerate() {
            if !graph.contains(id) || self.modules[..i].contains(&id) {
                return false;
            }
            if graph.output(id) != self.target_at(i + 1) {
                return false;
            }
            let expected: &[NodeId] = if i == 0 {
                &self.inputs
            } else {
                std::slice::from_ref(&self.modules[i - 1])
            };
            let actual = graph.inputs(Target::Node(id));
            if actual.len() != expected.len() || !expected.iter().all(|n| actual.contains(n)) {
                return false;
            }
        }

        let head = self.target_at(0);
        self.inputs.iter().all(|&input| graph.output(input) == head)
    }
}

fn link(graph: &mut ModuleGraph, from: NodeId, target: Option<Target>) -> Result<()> {
    match target {
        Some(target) => graph.connect(from, target),
        None => {
            graph.disconnect(from);
            Ok(())
        }
    }
}
