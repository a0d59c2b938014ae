//! Graph and rack integration tests
//!
//! Wiring invariants of the module graph and effects racks, checked
//! through rendering as well as structurally.

use approx::assert_relative_eq;
use proptest::prelude::*;

use songrack::dsp::{GainModule, ModuleRegistry};
use songrack::graph::{
    Destination, EffectsRack, Inputs, Module, ModuleGraph, NodeId, ProcessContext, Target,
};
use songrack::impl_module_common;

/// Source that outputs a constant on every sample.
struct Constant(f32);

impl Module for Constant {
    impl_module_common!("test.constant", "Constant");

    fn process(&mut self, _inputs: &Inputs<'_>, output: &mut [f32], _ctx: &ProcessContext) {
        output.fill(self.0);
    }

    fn state_size(&self) -> usize {
        0
    }

    fn save_state(&self, _out: &mut Vec<u8>) {}

    fn load_state(&mut self, blob: &[u8]) -> bool {
        blob.is_empty()
    }
}

fn render(graph: &mut ModuleGraph, frames: usize) -> Vec<f32> {
    let mut destination = Destination::new(48_000, 2);
    let mut out = vec![0.0; frames * 2];
    destination.process(graph, &mut out, 120.0);
    out
}

fn rack_with_source(value: f32) -> (ModuleGraph, EffectsRack, NodeId) {
    let mut graph = ModuleGraph::new();
    let source = graph.add(Box::new(Constant(value)));
    let mut rack = EffectsRack::new();
    rack.connect_output(&mut graph, Target::Destination).unwrap();
    rack.connect_input(&mut graph, source).unwrap();
    (graph, rack, source)
}

fn gains(graph: &ModuleGraph, rack: &EffectsRack) -> Vec<f32> {
    rack.modules()
        .iter()
        .map(|&id| graph.get::<GainModule>(id).unwrap().gain_db())
        .collect()
}

// === Graph ===

#[test]
fn test_destination_sums_roots() {
    let mut graph = ModuleGraph::new();
    let a = graph.add(Box::new(Constant(0.25)));
    let b = graph.add(Box::new(Constant(0.5)));
    graph.connect(a, Target::Destination).unwrap();
    graph.connect(b, Target::Destination).unwrap();

    let out = render(&mut graph, 16);
    assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
}

#[test]
fn test_unconnected_graph_is_silent() {
    let mut graph = ModuleGraph::new();
    graph.add(Box::new(Constant(1.0)));
    let out = render(&mut graph, 8);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn test_cycle_rejected_and_graph_unchanged() {
    let mut graph = ModuleGraph::new();
    let a = graph.add(Box::new(GainModule::new(0.0)));
    let b = graph.add(Box::new(GainModule::new(0.0)));
    let c = graph.add(Box::new(GainModule::new(0.0)));
    graph.connect(a, Target::Node(b)).unwrap();
    graph.connect(b, Target::Node(c)).unwrap();

    let err = graph.connect(c, Target::Node(a)).unwrap_err();
    assert_eq!(err.error_code(), "WOULD_CREATE_CYCLE");
    assert_eq!(graph.output(c), None);
    assert_eq!(graph.inputs(Target::Node(a)), &[] as &[NodeId]);

    let err = graph.connect(a, Target::Node(a)).unwrap_err();
    assert_eq!(err.error_code(), "WOULD_CREATE_CYCLE");
}

#[test]
fn test_remove_severs_every_edge() {
    let mut graph = ModuleGraph::new();
    let source = graph.add(Box::new(Constant(1.0)));
    let middle = graph.add(Box::new(GainModule::new(0.0)));
    graph.connect(source, Target::Node(middle)).unwrap();
    graph.connect(middle, Target::Destination).unwrap();

    assert!(graph.remove(middle).is_some());
    assert_eq!(graph.output(source), None);
    assert!(graph.inputs(Target::Destination).is_empty());
    assert!(!graph.contains(middle));
    assert!(graph.remove(middle).is_none());
}

#[test]
fn test_stale_id_after_slot_reuse() {
    let mut graph = ModuleGraph::new();
    let first = graph.add(Box::new(GainModule::new(1.0)));
    graph.remove(first);
    let second = graph.add(Box::new(GainModule::new(2.0)));
    assert!(!graph.contains(first));
    assert!(graph.get::<GainModule>(first).is_none());
    assert_eq!(graph.get::<GainModule>(second).unwrap().gain_db(), 2.0);
}

// === Racks ===

#[test]
fn test_empty_rack_passes_input_through() {
    let (mut graph, rack, source) = rack_with_source(0.5);
    assert_eq!(graph.output(source), Some(Target::Destination));
    assert!(rack.is_consistent(&graph));
    let out = render(&mut graph, 4);
    assert!(out.iter().all(|&s| s == 0.5));
}

#[test]
fn test_rack_chain_renders_in_series() {
    let (mut graph, mut rack, _) = rack_with_source(0.01);
    rack.insert(&mut graph, Box::new(GainModule::new(10.0))).unwrap();
    rack.insert(&mut graph, Box::new(GainModule::new(10.0))).unwrap();
    assert!(rack.is_consistent(&graph));

    let out = render(&mut graph, 4);
    assert_relative_eq!(out[0], 1.0, epsilon = 1e-4);

    let removed = rack.remove(&mut graph, 0).unwrap();
    assert_eq!(removed.module_id(), "effect.gain");
    assert!(rack.is_consistent(&graph));
    let out = render(&mut graph, 4);
    assert_relative_eq!(out[0], 0.1, epsilon = 1e-5);
}

#[test]
fn test_rack_out_of_range_edits() {
    let (mut graph, mut rack, _) = rack_with_source(0.0);
    rack.insert(&mut graph, Box::new(GainModule::new(0.0))).unwrap();
    assert_eq!(
        rack.remove(&mut graph, 3).err().map(|e| e.error_code()),
        Some("INDEX_OUT_OF_RANGE")
    );
    assert!(rack.swap(&mut graph, 0, 1).is_err());
    assert!(rack.is_consistent(&graph));
}

#[test]
fn test_rack_output_moves_chain_tail() {
    let (mut graph, mut rack, _) = rack_with_source(1.0);
    let tail = rack.insert(&mut graph, Box::new(GainModule::new(0.0))).unwrap();
    let sink = graph.add(Box::new(GainModule::new(0.0)));
    graph.connect(sink, Target::Destination).unwrap();

    rack.connect_output(&mut graph, Target::Node(sink)).unwrap();
    assert_eq!(graph.output(tail), Some(Target::Node(sink)));
    assert!(rack.is_consistent(&graph));
}

#[test]
fn test_registry_modules_render_silence_from_silence() {
    let registry = ModuleRegistry::new();
    let (mut graph, mut rack, _) = rack_with_source(0.0);
    for id in ["effect.delay", "effect.gain", "effect.analyzer"] {
        let module = registry.create(id, 48_000).unwrap();
        rack.insert(&mut graph, module).unwrap();
    }
    let out = render(&mut graph, 256);
    assert!(out.iter().all(|&s| s == 0.0));
}

// === Property: arbitrary rack edit sequences keep the chain intact ===

#[derive(Debug, Clone)]
enum RackOp {
    Insert(usize, i8),
    Remove(usize),
    Swap(usize, usize),
    Move(usize, usize),
}

fn rack_op() -> impl Strategy<Value = RackOp> {
    prop_oneof![
        (0..6usize, -3..4i8).prop_map(|(i, g)| RackOp::Insert(i, g)),
        (0..6usize).prop_map(RackOp::Remove),
        (0..6usize, 0..6usize).prop_map(|(a, b)| RackOp::Swap(a, b)),
        (0..6usize, 0..6usize).prop_map(|(a, b)| RackOp::Move(a, b)),
    ]
}

proptest! {
    #[test]
    fn prop_rack_edits_stay_consistent(ops in prop::collection::vec(rack_op(), 1..40)) {
        let (mut graph, mut rack, _) = rack_with_source(0.01);
        let mut model: Vec<f32> = Vec::new();

        for op in ops {
            match op {
                RackOp::Insert(index, gain) => {
                    let gain = gain as f32;
                    rack.insert_at(&mut graph, Box::new(GainModule::new(gain)), index).unwrap();
                    model.insert(index.min(model.len()), gain);
                }
                RackOp::Remove(index) => {
                    let result = rack.remove(&mut graph, index);
                    prop_assert_eq!(result.is_ok(), index < model.len());
                    if index < model.len() {
                        model.remove(index);
                    }
                }
                RackOp::Swap(a, b) => {
                    let result = rack.swap(&mut graph, a, b);
                    prop_assert_eq!(result.is_ok(), a < model.len() && b < model.len());
                    if result.is_ok() {
                        model.swap(a, b);
                    }
                }
                RackOp::Move(from, to) => {
                    let result = rack.move_module(&mut graph, from, to);
                    prop_assert_eq!(result.is_ok(), from < model.len());
                    if from < model.len() {
                        let gain = model.remove(from);
                        model.insert(to.min(model.len()), gain);
                    }
                }
            }

            prop_assert!(rack.is_consistent(&graph));
            prop_assert_eq!(gains(&graph, &rack), model.clone());
            prop_assert_eq!(graph.len(), model.len() + 1);
        }

        let expected: f32 = model.iter().map(|g| 10f32.powf(g / 10.0)).product::<f32>() * 0.01;
        let out = render(&mut graph, 4);
        prop_assert!((out[0] - expected).abs() <= expected.abs() * 1e-4 + 1e-7);
    }
}
