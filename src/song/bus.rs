//! FX buses
//!
//! Each bus runs its inputs through a rack and a [`crate::dsp::BusController`].
//! Bus 0 is the master and feeds the destination; every other bus feeds
//! another bus.

use crate::graph::{EffectsRack, NodeId};
use crate::song::channel::clip_name;

/// Index of the master bus
pub const MASTER_BUS: usize = 0;

#[derive(Debug, Clone)]
pub struct FxBus {
    pub name: String,
    pub solo: bool,
    pub(crate) rack: EffectsRack,
    pub(crate) controller: NodeId,
    pub(crate) target_bus: usize,
}

impl FxBus {
    pub(crate) fn new(name: &str, controller: NodeId) -> Self {
        Self {
            name: clip_name(name),
            solo: false,
            rack: EffectsRack::new(),
            controller,
            target_bus: MASTER_BUS,
        }
    }

    pub fn rack(&self) -> &EffectsRack {
        &self.rack
    }

    pub fn controller(&self) -> NodeId {
        self.controller
    }

    /// Bus this one feeds (the master feeds itself by convention)
    pub fn target_bus(&self) -> usize {
        self.target_bus
    }
}
