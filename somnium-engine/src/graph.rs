//! Rendering context: the node arena plus the mastering chain.
//!
//! The `Renderer` runs on the audio thread. It never builds topology on its
//! own; everything structural arrives as a [`Command`] through a lock-free SPSC
//! ring and is applied at the start of a 128-frame processing quantum, so a
//! burst of commands (a generator stopping and the next one starting) lands
//! atomically.
//!
//! Per frame:
//! - every source node (noise/tone layers, one-shots) renders, its dry output
//!   summed to the bus and its effect sends accumulated per echo bus
//! - every echo bus processes what was sent to it and adds to the bus
//! - the bus goes through the mastering chain
//!
//! Design goals
//! - No allocation or deallocation on the audio thread: arena storage is
//!   reserved up front and removed nodes travel back through a trash ring to
//!   be dropped by the orchestration side. Spawns beyond the arena capacity are
//!   turned away through the same ring. The one exception is a full trash ring
//!   (the host stopped pumping): the node is then dropped in place.
//! - Click-free removal: released nodes fade over 5 ms before they leave
//! - One-shots that reached their length are removed without being asked

use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};
use somnium_core::automation::{Curve, Param};

use crate::command::{Command, Lane, NodeId};
use crate::mastering::MasterChain;
use crate::nodes::Node;

/// Frames per processing quantum.
pub const QUANTUM: usize = 128;
/// Fade applied to released nodes before removal.
pub const DECLICK_SECS: f32 = 0.005;
/// Arena slots reserved up front.
pub const ARENA_CAPACITY: usize = 1024;

struct Entry {
    id: NodeId,
    node: Box<Node>,
    level: Param,
    releasing: bool,
}

pub struct Renderer {
    sr: f32,
    commands: HeapCons<Command>,
    trash: HeapProd<Box<Node>>,
    entries: Vec<Entry>,
    bus_acc: Vec<(f32, f32)>,
    master: MasterChain,
    quantum_pos: usize,
    dirty: bool,
    frames: u64,
    capacity: usize,
}

impl core::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Renderer")
            .field("sr", &self.sr)
            .field("nodes", &self.entries.len())
            .field("frames", &self.frames)
            .field("master", &self.master)
            .finish()
    }
}

impl Renderer {
    pub fn new(sr: f32, master: MasterChain, commands: HeapCons<Command>, trash: HeapProd<Box<Node>>) -> Self {
        Self::with_capacity(sr, master, commands, trash, ARENA_CAPACITY)
    }

    /// Like [`Renderer::new`] with room for `capacity` live nodes.
    pub fn with_capacity(
        sr: f32,
        master: MasterChain,
        commands: HeapCons<Command>,
        trash: HeapProd<Box<Node>>,
        capacity: usize,
    ) -> Self {
        Self {
            sr,
            commands,
            trash,
            entries: Vec::with_capacity(capacity),
            bus_acc: Vec::with_capacity(capacity),
            master,
            quantum_pos: 0,
            dirty: false,
            frames: 0,
            capacity,
        }
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sr }
    #[inline] pub fn master(&self) -> &MasterChain { &self.master }
    #[inline] pub fn node_count(&self) -> usize { self.entries.len() }
    #[inline] pub fn frames_rendered(&self) -> u64 { self.frames }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Ids currently in the arena, in arena order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Fill an interleaved buffer of `channels` channels. Channels beyond the
    /// first two are silent; a mono device gets the average of left and right.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let (l, r) = self.next_frame();
            match frame.len() {
                1 => frame[0] = 0.5 * (l + r),
                _ => {
                    frame[0] = l;
                    frame[1] = r;
                    for s in frame[2..].iter_mut() {
                        *s = 0.0;
                    }
                }
            }
        }
    }

    /// Render one stereo frame, applying pending commands on quantum boundaries.
    #[inline]
    pub fn next_frame(&mut self) -> (f32, f32) {
        if self.quantum_pos == 0 {
            self.begin_quantum();
        }
        self.quantum_pos = (self.quantum_pos + 1) % QUANTUM;
        self.frames += 1;
        let (l, r) = self.mix();
        self.master.process(l, r)
    }

    fn begin_quantum(&mut self) {
        while let Some(cmd) = self.commands.try_pop() {
            self.apply(cmd);
        }
        self.reap();
        if self.dirty {
            self.resolve_sends();
            self.dirty = false;
        }
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Spawn { id, node } => {
                if self.entries.len() >= self.capacity {
                    self.discard(node);
                    return;
                }
                self.entries.push(Entry { id, node, level: Param::new(1.0, self.sr), releasing: false });
                self.dirty = true;
            }
            Command::Release(id) => {
                if let Some(e) = self.entries.iter_mut().find(|e| e.id == id && !e.releasing) {
                    e.releasing = true;
                    e.level.cancel();
                    e.level.apply(&Curve::new().linear(0.0, DECLICK_SECS));
                }
            }
            Command::Automate { id, lane, curve } => {
                let Some(e) = self.entries.iter_mut().find(|e| e.id == id) else { return };
                if let (Lane::Swell, Node::Noise(layer)) = (lane, &mut *e.node) {
                    let swell = layer.swell_mut();
                    swell.cancel();
                    swell.apply(&curve);
                }
            }
            Command::SetVolume(v) => self.master.set_volume(v),
            Command::SetTone(v) => self.master.set_tone(v),
            Command::SetPan(v) => self.master.set_pan(v),
            Command::Autopan { enabled, speed, manual_pan } => self.master.set_autopan(enabled, speed, manual_pan),
            Command::SafeMode(on) => self.master.set_safe_mode(on),
            Command::Fade(curve) => self.master.fade(&curve),
            Command::FadeIn { duration, from_current } => self.master.fade_in(duration, from_current),
        }
    }

    /// Drop released nodes whose declick is over and one-shots that finished.
    fn reap(&mut self) {
        let mut i = 0;
        while i < self.entries.len() {
            let e = &self.entries[i];
            let gone = (e.releasing && e.level.is_idle()) || e.node.finished();
            if gone {
                let e = self.entries.swap_remove(i);
                self.discard(e.node);
                self.dirty = true;
            } else {
                i += 1;
            }
        }
    }

    /// Hand a node back for dropping off the audio thread. Only a full ring
    /// drops it here.
    fn discard(&mut self, node: Box<Node>) {
        let _ = self.trash.try_push(node);
    }

    fn resolve_sends(&mut self) {
        for i in 0..self.entries.len() {
            let Node::OneShot(v) = &*self.entries[i].node else { continue };
            let mut slots = [None, None];
            for (slot, send) in slots.iter_mut().zip(v.sends().iter()) {
                if let Some(s) = send {
                    *slot = self.entries.iter().position(|e| e.id == s.bus && e.node.is_bus());
                }
            }
            if let Node::OneShot(v) = &mut *self.entries[i].node {
                for (send, slot) in v.sends_mut().iter_mut().zip(slots) {
                    if let Some(s) = send {
                        s.slot = slot;
                    }
                }
            }
        }
        self.bus_acc.resize(self.entries.len(), (0.0, 0.0));
    }

    #[inline]
    fn mix(&mut self) -> (f32, f32) {
        let Self { sr, entries, bus_acc, .. } = self;
        let sr = *sr;
        for acc in bus_acc.iter_mut() {
            *acc = (0.0, 0.0);
        }

        let mut dl = 0.0;
        let mut dr = 0.0;
        for e in entries.iter_mut() {
            let (l, r) = match &mut *e.node {
                Node::Noise(n) => n.next(sr),
                Node::Tone(t) => t.next(sr),
                Node::OneShot(v) => v.next(sr),
                Node::Echo(_) => continue,
            };
            let g = e.level.next();
            let (l, r) = (l * g, r * g);
            match &*e.node {
                Node::OneShot(v) => {
                    let d = v.dry_gain();
                    dl += l * d;
                    dr += r * d;
                    for s in v.sends().iter().flatten() {
                        if let Some(acc) = s.slot.and_then(|i| bus_acc.get_mut(i)) {
                            acc.0 += l * s.gain;
                            acc.1 += r * s.gain;
                        }
                    }
                }
                _ => {
                    dl += l;
                    dr += r;
                }
            }
        }

        for (i, e) in entries.iter_mut().enumerate() {
            if let Node::Echo(bus) = &mut *e.node {
                let (il, ir) = bus_acc.get(i).copied().unwrap_or((0.0, 0.0));
                let (l, r) = bus.process(il, ir);
                let g = e.level.next();
                dl += l * g;
                dr += r * g;
            }
        }
        (dl, dr)
    }
}

// ------------------------------------ Tests --------------------------------------
