//! Song host
//!
//! A [`Song`] owns the module graph and everything wired into it: channels
//! (instrument, effects rack, fader), FX buses, and the destination. It also
//! sequences patterns into note events while the transport plays.
//!
//! Render and edit share one lock, [`SharedSong`]. The mixer holds it for a
//! single block; every structural edit holds it for the whole edit, so a
//! render pass never sees a half-rewired chain.

pub mod bus;
pub mod channel;
pub mod pattern;
pub mod transport;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::dsp::controller::BusController;
use crate::dsp::registry::ModuleRegistry;
use crate::dsp::synth::{self, WaveformSynth};
use crate::dsp::volume::VolumeModule;
use crate::error::{Result, SongrackError};
use crate::graph::{Destination, EffectsRack, Module, ModuleGraph, NodeId, NoteEvent, Target};
use crate::snapshot::{self, ModuleData};

pub use bus::{FxBus, MASTER_BUS};
pub use channel::Channel;
pub use pattern::{Note, Pattern};
pub use transport::{Advance, Transport, TransportState, BEATS_PER_BAR};

/// Song shared between the mixer thread and control threads
pub type SharedSong = Arc<Mutex<Song>>;

/// Velocity given to sequenced notes
pub const NOTE_ON_VOLUME: f32 = 0.8;

/// Lowest accepted tempo in BPM
pub const MIN_TEMPO: f32 = 1.0;

/// Which effects rack an edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RackTarget {
    Channel(usize),
    Bus(usize),
}

impl fmt::Display for RackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RackTarget::Channel(i) => write!(f, "channel {i}"),
            RackTarget::Bus(i) => write!(f, "bus {i}"),
        }
    }
}

#[derive(Debug, Clone)]
struct PlayingNote {
    channel: usize,
    note: Note,
}

impl PlayingNote {
    fn same_as(&self, other: &PlayingNote) -> bool {
        self.channel == other.channel && self.note.id() == other.note.id()
    }
}

fn missing(id: NodeId) -> SongrackError {
    SongrackError::MissingNode {
        node: id.to_string(),
    }
}

/// A song and the module graph that renders it.
pub struct Song {
    pub name: String,
    registry: ModuleRegistry,
    graph: ModuleGraph,
    destination: Destination,
    channels: Vec<Channel>,
    buses: Vec<FxBus>,
    tempo: f32,
    length: usize,
    max_patterns: usize,
    transport: Transport,
    prev_notes: Vec<PlayingNote>,
    cur_notes: Vec<PlayingNote>,
}

impl fmt::Debug for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Song")
            .field("name", &self.name)
            .field("channels", &self.channels.len())
            .field("buses", &self.buses.len())
            .field("nodes", &self.graph.len())
            .field("tempo", &self.tempo)
            .field("length", &self.length)
            .field("max_patterns", &self.max_patterns)
            .field("transport", &self.transport.state())
            .finish()
    }
}

impl Song {
    /// Build a song with a master bus and `config.initial_channels` channels.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut song = Self {
            name: "Untitled".to_string(),
            registry: ModuleRegistry::new(),
            graph: ModuleGraph::new(),
            destination: Destination::new(config.sample_rate, config.channels),
            channels: Vec::new(),
            buses: Vec::new(),
            tempo: config.tempo.max(MIN_TEMPO),
            length: config.song_length,
            max_patterns: config.max_patterns,
            transport: Transport::new(),
            prev_notes: Vec::new(),
            cur_notes: Vec::new(),
        };

        let controller = song.graph.add(Box::new(BusController::new()));
        let mut master = FxBus::new("Master", controller);
        master
            .rack
            .connect_output(&mut song.graph, Target::Node(controller))?;
        song.graph.connect(controller, Target::Destination)?;
        song.buses.push(master);

        for i in 0..config.initial_channels {
            song.insert_channel(i)?;
        }

        tracing::info!(
            channels = song.channels.len(),
            sample_rate = config.sample_rate,
            tempo = song.tempo,
            "song created"
        );
        Ok(song)
    }

    /// Wrap the song for sharing with the mixer thread.
    pub fn into_shared(self) -> SharedSong {
        Arc::new(Mutex::new(self))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ModuleGraph {
        &mut self.graph
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn sample_rate(&self) -> u32 {
        self.destination.sample_rate()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Result<&Channel> {
        self.channels
            .get(index)
            .ok_or_else(|| SongrackError::out_of_range("channel", index, self.channels.len()))
    }

    /// Mutable access to a channel's name, solo flag, sequence and patterns.
    pub fn channel_mut(&mut self, index: usize) -> Result<&mut Channel> {
        let len = self.channels.len();
        self.channels
            .get_mut(index)
            .ok_or_else(|| SongrackError::out_of_range("channel", index, len))
    }

    pub fn buses(&self) -> &[FxBus] {
        &self.buses
    }

    pub fn bus(&self, index: usize) -> Result<&FxBus> {
        self.buses
            .get(index)
            .ok_or_else(|| SongrackError::out_of_range("bus", index, self.buses.len()))
    }

    pub fn bus_mut(&mut self, index: usize) -> Result<&mut FxBus> {
        let len = self.buses.len();
        self.buses
            .get_mut(index)
            .ok_or_else(|| SongrackError::out_of_range("bus", index, len))
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    // ========================================================================
    // Song properties
    // ========================================================================

    pub fn tempo(&self) -> f32 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: f32) {
        self.tempo = tempo.max(MIN_TEMPO);
    }

    /// Song length in bars
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn max_patterns(&self) -> usize {
        self.max_patterns
    }

    /// Resize every channel's pattern list. Sequence cells that point past
    /// the new count are cleared.
    pub fn set_max_patterns(&mut self, count: usize) {
        for channel in &mut self.channels {
            for cell in &mut channel.sequence {
                if *cell > count {
                    *cell = 0;
                }
            }
            channel.patterns.resize_with(count, Pattern::new);
        }
        self.max_patterns = count;
    }

    /// Index of a free pattern on `channel`, growing every channel's pattern
    /// list by one if none is empty.
    pub fn new_pattern(&mut self, channel: usize) -> Result<usize> {
        if let Some(free) = self.channel(channel)?.first_empty_pattern() {
            return Ok(free);
        }
        self.set_max_patterns(self.max_patterns + 1);
        Ok(self.max_patterns - 1)
    }

    /// Frequency of `key`, or `None` outside the keyboard.
    pub fn key_frequency(&self, key: i32) -> Option<f32> {
        synth::key_frequency(key)
    }

    // ========================================================================
    // Bars and sequence
    // ========================================================================

    /// Insert an empty bar before `position` (or at the end).
    pub fn insert_bar(&mut self, position: usize) -> Result<()> {
        if position > self.length {
            return Err(SongrackError::out_of_range("bar", position, self.length + 1));
        }
        for channel in &mut self.channels {
            channel.sequence.insert(position, 0);
        }
        self.length += 1;
        Ok(())
    }

    /// Delete the bar at `position`.
    pub fn remove_bar(&mut self, position: usize) -> Result<()> {
        if position >= self.length {
            return Err(SongrackError::out_of_range("bar", position, self.length));
        }
        for channel in &mut self.channels {
            channel.sequence.remove(position);
        }
        self.length -= 1;
        self.transport.clamp_to(self.length);
        Ok(())
    }

    /// Every channel's sequence cell at `position`, in channel order.
    pub fn bar_patterns(&self, position: usize) -> Result<Vec<usize>> {
        if position >= self.length {
            return Err(SongrackError::out_of_range("bar", position, self.length));
        }
        Ok(self.channels.iter().map(|c| c.sequence[position]).collect())
    }

    /// Overwrite the sequence cells at `position`, one per channel.
    pub fn set_bar_patterns(&mut self, position: usize, cells: &[usize]) -> Result<()> {
        if position >= self.length {
            return Err(SongrackError::out_of_range("bar", position, self.length));
        }
        if cells.len() != self.channels.len() {
            return Err(SongrackError::InvalidAction {
                reason: format!(
                    "{} sequence cells for {} channels",
                    cells.len(),
                    self.channels.len()
                ),
            });
        }
        for (channel, &cell) in self.channels.iter_mut().zip(cells) {
            channel.sequence[position] = cell;
        }
        Ok(())
    }

    pub fn sequence_cell(&self, channel: usize, bar: usize) -> Result<usize> {
        let ch = self.channel(channel)?;
        ch.sequence
            .get(bar)
            .copied()
            .ok_or_else(|| SongrackError::out_of_range("bar", bar, ch.sequence.len()))
    }

    /// Schedule pattern number `value` (1-based, 0 for none) in a bar.
    pub fn set_sequence_cell(&mut self, channel: usize, bar: usize, value: usize) -> Result<()> {
        if value > self.max_patterns {
            return Err(SongrackError::out_of_range("pattern", value, self.max_patterns + 1));
        }
        let ch = self.channel_mut(channel)?;
        let len = ch.sequence.len();
        let cell = ch
            .sequence
            .get_mut(bar)
            .ok_or_else(|| SongrackError::out_of_range("bar", bar, len))?;
        *cell = value;
        Ok(())
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Create a channel at `index` with a default synth, routed to master.
    pub fn insert_channel(&mut self, index: usize) -> Result<usize> {
        if index > self.channels.len() {
            return Err(SongrackError::out_of_range(
                "channel",
                index,
                self.channels.len() + 1,
            ));
        }

        let instrument = self.graph.add(Box::new(WaveformSynth::new()));
        let volume = self.graph.add(Box::new(VolumeModule::new()));
        let name = format!("Channel {}", self.channels.len() + 1);
        let mut channel = Channel::new(&name, self.length, self.max_patterns, instrument, volume);

        channel.rack.connect_input(&mut self.graph, instrument)?;
        channel
            .rack
            .connect_output(&mut self.graph, Target::Node(volume))?;
        self.buses[MASTER_BUS]
            .rack
            .connect_input(&mut self.graph, volume)?;

        self.channels.insert(index, channel);
        for playing in self.prev_notes.iter_mut().chain(self.cur_notes.iter_mut()) {
            if playing.channel >= index {
                playing.channel += 1;
            }
        }
        tracing::debug!(index, "channel inserted");
        Ok(index)
    }

    /// Delete a channel and every node it owns.
    pub fn remove_channel(&mut self, index: usize) -> Result<()> {
        self.channel(index)?;
        let mut channel = self.channels.remove(index);

        channel.rack.disconnect_all_inputs(&mut self.graph);
        channel.rack.clear(&mut self.graph)?;
        self.graph.remove(channel.instrument);
        if let Some(bus) = self.buses.get_mut(channel.fx_target) {
            bus.rack.disconnect_input(&mut self.graph, channel.volume);
        }
        self.graph.remove(channel.volume);

        for notes in [&mut self.prev_notes, &mut self.cur_notes] {
            notes.retain(|n| n.channel != index);
            for playing in notes.iter_mut() {
                if playing.channel > index {
                    playing.channel -= 1;
                }
            }
        }
        tracing::debug!(index, "channel removed");
        Ok(())
    }

    /// Swap in a new instrument and hand back the old one.
    pub fn set_instrument(&mut self, channel: usize, module: Box<dyn Module>) -> Result<Box<dyn Module>> {
        let len = self.channels.len();
        let ch = self
            .channels
            .get_mut(channel)
            .ok_or_else(|| SongrackError::out_of_range("channel", channel, len))?;

        let old = ch.instrument;
        ch.rack.disconnect_input(&mut self.graph, old);
        let new = self.graph.add(module);
        ch.rack.connect_input(&mut self.graph, new)?;
        ch.instrument = new;
        self.graph.remove(old).ok_or_else(|| missing(old))
    }

    /// Route a channel's fader into `bus`.
    pub fn set_fx_target(&mut self, channel: usize, bus: usize) -> Result<()> {
        if bus >= self.buses.len() {
            return Err(SongrackError::out_of_range("bus", bus, self.buses.len()));
        }
        let len = self.channels.len();
        let ch = self
            .channels
            .get_mut(channel)
            .ok_or_else(|| SongrackError::out_of_range("channel", channel, len))?;
        if ch.fx_target == bus {
            return Ok(());
        }

        self.buses[ch.fx_target]
            .rack
            .disconnect_input(&mut self.graph, ch.volume);
        self.buses[bus].rack.connect_input(&mut self.graph, ch.volume)?;
        ch.fx_target = bus;
        Ok(())
    }

    fn volume_module(&self, channel: usize) -> Result<&VolumeModule> {
        let id = self.channel(channel)?.volume;
        self.graph.get::<VolumeModule>(id).ok_or_else(|| missing(id))
    }

    fn volume_module_mut(&mut self, channel: usize) -> Result<&mut VolumeModule> {
        let id = self.channel(channel)?.volume;
        self.graph.get_mut::<VolumeModule>(id).ok_or_else(|| missing(id))
    }

    pub fn channel_volume(&self, channel: usize) -> Result<f32> {
        Ok(self.volume_module(channel)?.volume())
    }

    pub fn set_channel_volume(&mut self, channel: usize, volume: f32) -> Result<()> {
        self.volume_module_mut(channel)?.set_volume(volume);
        Ok(())
    }

    pub fn channel_panning(&self, channel: usize) -> Result<f32> {
        Ok(self.volume_module(channel)?.panning())
    }

    pub fn set_channel_panning(&mut self, channel: usize, panning: f32) -> Result<()> {
        self.volume_module_mut(channel)?.set_panning(panning);
        Ok(())
    }

    pub fn channel_mute(&self, channel: usize) -> Result<bool> {
        Ok(self.volume_module(channel)?.mute)
    }

    pub fn set_channel_mute(&mut self, channel: usize, mute: bool) -> Result<()> {
        self.volume_module_mut(channel)?.mute = mute;
        Ok(())
    }

    /// Queue a note event on a channel's instrument.
    pub fn send_note(&mut self, channel: usize, event: NoteEvent) -> Result<()> {
        let id = self.channel(channel)?.instrument;
        if self.graph.send_event(id, event) {
            Ok(())
        } else {
            Err(missing(id))
        }
    }

    // ========================================================================
    // FX buses
    // ========================================================================

    /// Append a bus routed into master.
    pub fn add_bus(&mut self, name: &str) -> Result<usize> {
        let controller = self.graph.add(Box::new(BusController::new()));
        let mut bus = FxBus::new(name, controller);
        bus.rack
            .connect_output(&mut self.graph, Target::Node(controller))?;
        self.buses[MASTER_BUS]
            .rack
            .connect_input(&mut self.graph, controller)?;
        self.buses.push(bus);
        tracing::debug!(index = self.buses.len() - 1, name, "bus added");
        Ok(self.buses.len() - 1)
    }

    /// Route bus `index` into bus `target`. Rejects routes that would loop.
    pub fn set_bus_target(&mut self, index: usize, target: usize) -> Result<()> {
        if index == MASTER_BUS {
            return Err(SongrackError::MasterBusRouting);
        }
        self.bus(index)?;
        self.bus(target)?;
        let old = self.buses[index].target_bus;
        if old == target {
            return Ok(());
        }

        let controller = self.buses[index].controller;
        self.buses[old]
            .rack
            .disconnect_input(&mut self.graph, controller);
        if let Err(err) = self.buses[target]
            .rack
            .connect_input(&mut self.graph, controller)
        {
            self.buses[old]
                .rack
                .connect_input(&mut self.graph, controller)?;
            return Err(err);
        }
        self.buses[index].target_bus = target;
        Ok(())
    }

    /// Delete a bus. Channels and buses that fed it move to master and
    /// later bus indices shift down by one.
    pub fn remove_bus(&mut self, index: usize) -> Result<()> {
        if index == MASTER_BUS {
            return Err(SongrackError::MasterBusRemoval);
        }
        self.bus(index)?;

        let controller = self.buses[index].controller;
        let target = self.buses[index].target_bus;
        self.buses[target]
            .rack
            .disconnect_input(&mut self.graph, controller);

        for channel in &mut self.channels {
            if channel.fx_target == index {
                self.buses[index]
                    .rack
                    .disconnect_input(&mut self.graph, channel.volume);
                self.buses[MASTER_BUS]
                    .rack
                    .connect_input(&mut self.graph, channel.volume)?;
                channel.fx_target = MASTER_BUS;
            }
        }
        for i in 0..self.buses.len() {
            if i != index && self.buses[i].target_bus == index {
                let feeder = self.buses[i].controller;
                self.buses[index]
                    .rack
                    .disconnect_input(&mut self.graph, feeder);
                self.buses[MASTER_BUS]
                    .rack
                    .connect_input(&mut self.graph, feeder)?;
                self.buses[i].target_bus = MASTER_BUS;
            }
        }

        let mut bus = self.buses.remove(index);
        bus.rack.disconnect_all_inputs(&mut self.graph);
        bus.rack.clear(&mut self.graph)?;
        self.graph.remove(controller);

        for channel in &mut self.channels {
            if channel.fx_target > index {
                channel.fx_target -= 1;
            }
        }
        for bus in &mut self.buses {
            if bus.target_bus > index {
                bus.target_bus -= 1;
            }
        }
        tracing::debug!(index, "bus removed");
        Ok(())
    }

    fn controller_mut(&mut self, bus: usize) -> Result<&mut BusController> {
        let id = self.bus(bus)?.controller;
        self.graph.get_mut::<BusController>(id).ok_or_else(|| missing(id))
    }

    pub fn bus_gain_db(&self, bus: usize) -> Result<f32> {
        let id = self.bus(bus)?.controller;
        self.graph
            .get::<BusController>(id)
            .map(BusController::gain_db)
            .ok_or_else(|| missing(id))
    }

    pub fn set_bus_gain_db(&mut self, bus: usize, gain_db: f32) -> Result<()> {
        self.controller_mut(bus)?.set_gain_db(gain_db);
        Ok(())
    }

    pub fn set_bus_mute(&mut self, bus: usize, mute: bool) -> Result<()> {
        self.controller_mut(bus)?.mute = mute;
        Ok(())
    }

    // ========================================================================
    // Effects racks
    // ========================================================================

    pub fn rack(&self, target: RackTarget) -> Result<&EffectsRack> {
        match target {
            RackTarget::Channel(i) => Ok(&self.channel(i)?.rack),
            RackTarget::Bus(i) => Ok(&self.bus(i)?.rack),
        }
    }

    fn rack_parts(&mut self, target: RackTarget) -> Result<(&mut EffectsRack, &mut ModuleGraph)> {
        let rack = match target {
            RackTarget::Channel(i) => {
                let len = self.channels.len();
                &mut self
                    .channels
                    .get_mut(i)
                    .ok_or_else(|| SongrackError::out_of_range("channel", i, len))?
                    .rack
            }
            RackTarget::Bus(i) => {
                let len = self.buses.len();
                &mut self
                    .buses
                    .get_mut(i)
                    .ok_or_else(|| SongrackError::out_of_range("bus", i, len))?
                    .rack
            }
        };
        Ok((rack, &mut self.graph))
    }

    /// Splice an effect into a rack at `index` (clamped to its length).
    pub fn insert_effect(
        &mut self,
        target: RackTarget,
        index: usize,
        module: Box<dyn Module>,
    ) -> Result<NodeId> {
        let (rack, graph) = self.rack_parts(target)?;
        rack.insert_at(graph, module, index)
    }

    /// Take an effect out of a rack.
    pub fn remove_effect(&mut self, target: RackTarget, index: usize) -> Result<Box<dyn Module>> {
        let (rack, graph) = self.rack_parts(target)?;
        rack.remove(graph, index)
    }

    pub fn swap_effects(&mut self, target: RackTarget, a: usize, b: usize) -> Result<()> {
        let (rack, graph) = self.rack_parts(target)?;
        rack.swap(graph, a, b)
    }

    /// Node of the effect at `index` in a rack
    pub fn effect_node(&self, target: RackTarget, index: usize) -> Result<NodeId> {
        let rack = self.rack(target)?;
        rack.get(index)
            .ok_or_else(|| SongrackError::out_of_range("rack slot", index, rack.len()))
    }

    // ========================================================================
    // Module construction and snapshots
    // ========================================================================

    /// Build a fresh module of type `id` at the song's sample rate.
    pub fn create_module(&self, id: &str) -> Result<Box<dyn Module>> {
        self.registry
            .create(id, self.sample_rate())
            .ok_or_else(|| SongrackError::UnknownModule { id: id.to_string() })
    }

    /// Rebuild a module from a snapshot.
    pub fn restore_module(&self, data: &ModuleData) -> Result<Box<dyn Module>> {
        data.restore(&self.registry, self.sample_rate())
    }

    /// Snapshot the node `id`.
    pub fn capture_node(&self, id: NodeId) -> Result<ModuleData> {
        self.graph
            .module(id)
            .map(ModuleData::capture)
            .ok_or_else(|| missing(id))
    }

    /// Load a state blob into the live node `id`.
    pub fn load_node_state(&mut self, id: NodeId, blob: &[u8]) -> Result<()> {
        let module = self.graph.module_mut(id).ok_or_else(|| missing(id))?;
        snapshot::load_into(module, blob)
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Start playing from the cursor bar.
    pub fn play(&mut self) {
        self.release_notes();
        self.transport.play();
    }

    /// Stop, releasing every sequenced note.
    pub fn stop(&mut self) {
        self.transport.stop();
        self.release_notes();
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Move the cursor to `bar` (clamped to the song).
    pub fn seek_bar(&mut self, bar: usize) {
        self.transport.seek_bar(bar.min(self.length.saturating_sub(1)));
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.transport.set_looping(looping);
    }

    /// Sequence notes at the playhead, then move it by `elapsed` seconds.
    ///
    /// Notes that started since the last call get a note-on, notes that
    /// ended get a note-off. Solo flags are applied to the faders first.
    pub fn update(&mut self, elapsed: f64) {
        if !self.transport.is_playing() {
            return;
        }
        self.apply_solo();

        let bar = self.transport.bar_position();
        let beat = self.transport.position_in_bar();
        self.cur_notes.clear();
        for (i, channel) in self.channels.iter().enumerate() {
            if let Some(pattern) = channel.pattern_at_bar(bar) {
                for note in pattern.notes.iter().filter(|n| n.is_sounding_at(beat)) {
                    self.cur_notes.push(PlayingNote {
                        channel: i,
                        note: note.clone(),
                    });
                }
            }
        }

        for old in &self.prev_notes {
            if !self.cur_notes.iter().any(|n| n.same_as(old)) {
                let id = self.channels[old.channel].instrument;
                self.graph
                    .send_event(id, NoteEvent::NoteOff { key: old.note.key });
            }
        }
        for new in &self.cur_notes {
            if !self.prev_notes.iter().any(|n| n.same_as(new)) {
                let id = self.channels[new.channel].instrument;
                self.graph.send_event(
                    id,
                    NoteEvent::NoteOn {
                        key: new.note.key,
                        volume: NOTE_ON_VOLUME,
                    },
                );
            }
        }
        std::mem::swap(&mut self.prev_notes, &mut self.cur_notes);

        if self.transport.advance(elapsed, self.tempo, self.length) == Advance::Finished {
            self.release_notes();
        }
    }

    /// Render one block into `out` (interleaved) and return the frames
    /// rendered.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        self.destination.process(&mut self.graph, out, self.tempo)
    }

    fn release_notes(&mut self) {
        for playing in self.prev_notes.drain(..).chain(self.cur_notes.drain(..)) {
            if let Some(channel) = self.channels.get(playing.channel) {
                self.graph.send_event(
                    channel.instrument,
                    NoteEvent::NoteOff {
                        key: playing.note.key,
                    },
                );
            }
        }
    }

    /// Mute everything that is not soloed, or on the path from a soloed bus
    /// to master.
    fn apply_solo(&mut self) {
        let channel_solo = self.channels.iter().any(|c| c.solo);
        for channel in &self.channels {
            if let Some(volume) = self.graph.get_mut::<VolumeModule>(channel.volume) {
                volume.mute_override = channel_solo && !channel.solo;
            }
        }

        let bus_solo = self.buses.iter().any(|b| b.solo);
        for i in 0..self.buses.len() {
            let audible = !bus_solo
                || self
                    .buses
                    .iter()
                    .enumerate()
                    .any(|(j, b)| b.solo && self.bus_feeds(j, i));
            let id = self.buses[i].controller;
            if let Some(controller) = self.graph.get_mut::<BusController>(id) {
                controller.mute_override = !audible;
            }
        }
    }

    /// True if bus `from` reaches bus `to` by following bus targets.
    fn bus_feeds(&self, from: usize, to: usize) -> bool {
        let mut current = from;
        for _ in 0..=self.buses.len() {
            if current == to {
                return true;
            }
            if current == MASTER_BUS {
                return false;
            }
            current = match self.buses.get(current) {
                Some(bus) => bus.target_bus,
                None => return false,
            };
        }
        false
    }
}
