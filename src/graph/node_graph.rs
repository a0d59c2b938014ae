//! Module Graph
//!
//! Owner-held arena of processing nodes. Edges are [`NodeId`] lookups, so a
//! node never holds a pointer to another node: each node knows its input
//! list and at most one output [`Target`]. Rendering is pull-based; pulling
//! a node first pulls everything feeding it.

use std::fmt;

use crate::engine::buffer::AudioFrameBuffer;
use crate::error::{Result, SongrackError};
use crate::graph::module::{Inputs, Module, NoteEvent, ProcessContext};

// ============================================================================
// Constants
// ============================================================================

/// Pre-reserved note events per node, so queueing rarely allocates
const EVENT_QUEUE_CAPACITY: usize = 64;

// ============================================================================
// Identifiers
// ============================================================================

/// Handle to a node in a [`ModuleGraph`].
///
/// Generational: a handle to a removed node never aliases a node created
/// later in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}.{}", self.index, self.generation)
    }
}

/// Where a node's output goes: another node, or the graph root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Node(NodeId),
    Destination,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(id) => id.fmt(f),
            Target::Destination => write!(f, "destination"),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

pub(crate) struct NodeSlot {
    module: Box<dyn Module>,
    inputs: Vec<NodeId>,
    output: Option<Target>,
    events: Vec<NoteEvent>,
    pub(crate) buffer: AudioFrameBuffer,
}

pub(crate) struct NodeEntry {
    pub(crate) generation: u32,
    /// `None` when the slot is free, or while the node is being rendered
    pub(crate) node: Option<NodeSlot>,
}

/// Arena of nodes plus the input list of the graph root.
#[derive(Default)]
pub struct ModuleGraph {
    entries: Vec<NodeEntry>,
    free: Vec<u32>,
    root_inputs: Vec<NodeId>,
}

impl fmt::Debug for ModuleGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleGraph")
            .field("nodes", &self.len())
            .field("root_inputs", &self.root_inputs)
            .finish()
    }
}

impl ModuleGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node lifecycle
    // ========================================================================

    /// Take ownership of a module and return its handle. The node starts
    /// with no edges.
    pub fn add(&mut self, module: Box<dyn Module>) -> NodeId {
        let slot = NodeSlot {
            module,
            inputs: Vec::with_capacity(4),
            output: None,
            events: Vec::with_capacity(EVENT_QUEUE_CAPACITY),
            buffer: AudioFrameBuffer::default(),
        };

        let id = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.node = Some(slot);
                NodeId {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                self.entries.push(NodeEntry {
                    generation: 0,
                    node: Some(slot),
                });
                NodeId {
                    index: (self.entries.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        tracing::debug!(node = %id, "node added");
        id
    }

    /// Remove a node, severing every edge that mentions it, and hand the
    /// module back to the caller.
    pub fn remove(&mut self, id: NodeId) -> Option<Box<dyn Module>> {
        if !self.contains(id) {
            return None;
        }
        self.remove_all_connections(id);

        let entry = &mut self.entries[id.index()];
        let slot = entry.node.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
        tracing::debug!(node = %id, module = slot.module.module_id(), "node removed");
        Some(slot.module)
    }

    /// True if `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.node.is_some()).count()
    }

    /// True when the graph holds no nodes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of every live node
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.node.is_some())
            .map(|(i, e)| NodeId {
                index: i as u32,
                generation: e.generation,
            })
            .collect()
    }

    fn slot(&self, id: NodeId) -> Option<&NodeSlot> {
        let entry = self.entries.get(id.index())?;
        if entry.generation != id.generation {
            return None;
        }
        entry.node.as_ref()
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut NodeSlot> {
        let entry = self.entries.get_mut(id.index())?;
        if entry.generation != id.generation {
            return None;
        }
        entry.node.as_mut()
    }

    fn require(&self, id: NodeId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(SongrackError::MissingNode {
                node: id.to_string(),
            })
        }
    }

    // ========================================================================
    // Module access
    // ========================================================================

    /// Borrow a node's module
    pub fn module(&self, id: NodeId) -> Option<&dyn Module> {
        self.slot(id).map(|slot| slot.module.as_ref())
    }

    /// Mutably borrow a node's module
    pub fn module_mut(&mut self, id: NodeId) -> Option<&mut (dyn Module + 'static)> {
        self.slot_mut(id).map(|slot| slot.module.as_mut())
    }

    /// Borrow a node's module as its concrete type.
    pub fn get<T: Module>(&self, id: NodeId) -> Option<&T> {
        self.module(id)?.as_any().downcast_ref::<T>()
    }

    /// Mutably borrow a node's module as its concrete type.
    pub fn get_mut<T: Module>(&mut self, id: NodeId) -> Option<&mut T> {
        self.module_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Last rendered block of a node
    pub fn buffer(&self, id: NodeId) -> Option<&[f32]> {
        self.slot(id).map(|slot| slot.buffer.as_slice())
    }

    /// Queue a note event for delivery before the node's next render.
    pub fn send_event(&mut self, id: NodeId, event: NoteEvent) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.events.push(event);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Nodes feeding `target`
    pub fn inputs(&self, target: Target) -> &[NodeId] {
        match target {
            Target::Destination => &self.root_inputs,
            Target::Node(id) => self.slot(id).map(|s| s.inputs.as_slice()).unwrap_or(&[]),
        }
    }

    /// Where a node's output goes
    pub fn output(&self, id: NodeId) -> Option<Target> {
        self.slot(id).and_then(|slot| slot.output)
    }

    /// Point `id`'s output at `target`, replacing any previous output edge.
    ///
    /// Rejects edges that would close a cycle; the graph is unchanged on
    /// error.
    pub fn connect(&mut self, id: NodeId, target: Target) -> Result<()> {
        self.require(id)?;
        if let Target::Node(to) = target {
            self.require(to)?;
            if self.reaches(to, id) {
                return Err(SongrackError::WouldCreateCycle {
                    from: id.to_string(),
                    to: to.to_string(),
                });
            }
        }

        if self.output(id) == Some(target) {
            return Ok(());
        }
        self.disconnect(id);

        if let Some(slot) = self.slot_mut(id) {
            slot.output = Some(target);
        }
        match target {
            Target::Destination => self.root_inputs.push(id),
            Target::Node(to) => {
                if let Some(slot) = self.slot_mut(to) {
                    slot.inputs.push(id);
                }
            }
        }
        Ok(())
    }

    /// Clear `id`'s output edge.
    pub fn disconnect(&mut self, id: NodeId) {
        let Some(target) = self.slot_mut(id).and_then(|slot| slot.output.take()) else {
            return;
        };
        self.remove_input(target, id);
    }

    /// Sever every edge touching `id`: its output, its inputs, and any input
    /// list anywhere in the graph that still lists it.
    pub fn remove_all_connections(&mut self, id: NodeId) {
        self.disconnect(id);

        let inputs = match self.slot_mut(id) {
            Some(slot) => std::mem::take(&mut slot.inputs),
            None => Vec::new(),
        };
        for input in inputs {
            if let Some(slot) = self.slot_mut(input) {
                slot.output = None;
            }
        }

        self.root_inputs.retain(|&n| n != id);
        for entry in &mut self.entries {
            if let Some(slot) = entry.node.as_mut() {
                slot.inputs.retain(|&n| n != id);
                if slot.output == Some(Target::Node(id)) {
                    slot.output = None;
                }
            }
        }
    }

    fn remove_input(&mut self, target: Target, id: NodeId) {
        match target {
            Target::Destination => self.root_inputs.retain(|&n| n != id),
            Target::Node(to) => {
                if let Some(slot) = self.slot_mut(to) {
                    slot.inputs.retain(|&n| n != id);
                }
            }
        }
    }

    /// True if following output edges from `from` arrives at `to`.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut current = from;
        for _ in 0..=self.entries.len() {
            if current == to {
                return true;
            }
            match self.output(current) {
                Some(Target::Node(next)) => current = next,
                _ => return false,
            }
        }
        true
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render `id` and everything upstream of it into the node buffers.
    pub fn pull(&mut self, id: NodeId, ctx: &ProcessContext) {
        let Some(mut slot) = self.take_slot(id) else {
            return;
        };

        for &input in &slot.inputs {
            self.pull(input, ctx);
        }

        slot.buffer.ensure(ctx.frames, ctx.channels);
        for event in slot.events.drain(..) {
            slot.module.event(event);
        }

        let inputs = Inputs::from_graph(&self.entries, &slot.inputs);
        slot.module.process(&inputs, slot.buffer.as_mut_slice(), ctx);

        self.entries[id.index()].node = Some(slot);
    }

    /// Pull every root input and sum them into `out`.
    pub(crate) fn render_root(&mut self, out: &mut [f32], ctx: &ProcessContext) {
        let roots = std::mem::take(&mut self.root_inputs);
        for &id in &roots {
            self.pull(id, ctx);
        }

        out.fill(0.0);
        for &id in &roots {
            if let Some(buffer) = self.buffer(id) {
                for (o, &s) in out.iter_mut().zip(buffer) {
                    *o += s;
                }
            }
        }
        self.root_inputs = roots;
    }

    fn take_slot(&mut self, id: NodeId) -> Option<NodeSlot> {
        let entry = self.entries.get_mut(id.index())?;
        if entry.generation != id.generation {
            return None;
        }
        entry.node.take()
    }
}
