//! Module graph
//!
//! Nodes live in an arena owned by [`ModuleGraph`] and are addressed by
//! [`NodeId`]. Rendering is pull-based: the [`Destination`] pulls its
//! inputs, which pull theirs, once per block.

pub mod destination;
pub mod module;
pub mod node_graph;
pub mod rack;

pub use destination::Destination;
pub use module::{Inputs, Module, NoteEvent, ProcessContext};
pub use node_graph::{ModuleGraph, NodeId, Target};
pub use rack::EffectsRack;
