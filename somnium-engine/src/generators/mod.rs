//! Generators: one procedural synthesis algorithm per [`SoundKind`].
//!
//! Design
//! - A `Generator` is a single struct around a closed [`Patch`] variant; there is
//!   no trait object per algorithm. `start` builds the algorithm's voices,
//!   `fire_due` runs its generative events, `stop` tears everything down.
//! - Every node a generator spawns is registered in its id list, and every future
//!   event is an entry in its own [`TaskQueue`] of [`Cue`]s. `stop` releases the
//!   whole list and clears the queue, so nothing the generator created outlives it.
//! - Voices are built here, on the orchestration side, and shipped to the
//!   renderer as `Command::Spawn`. Generators never touch the renderer directly.
//! - Per-algorithm "master" levels are folded into each voice's gain.
//!
//! Contents
//! - `SoundKind`  : closed, string-keyed set of algorithms
//! - `Generator`  : lifecycle + event dispatch
//! - `Ctx`        : what the engine lends a generator while it runs code
//! - `beds`, `nature`, `cosmic`, `restored`, `pro`, `quintessence`: the algorithms

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use somnium_core::automation::Curve;
use somnium_core::dsp::cents_to_ratio;
use somnium_core::noise::{self, NoiseColor};

use crate::command::{Command, CommandQueue, Lane, NodeId};
use crate::error::EngineError;
use crate::nodes::{Node, OneShot};
use crate::scheduler::{secs, TaskQueue};

mod beds;
mod cosmic;
mod nature;
mod pro;
mod quintessence;
mod restored;

/// Q used where a layer only needs a plain, non-resonant low/high-pass.
const PLAIN_Q: f32 = 0.707;

/// Release cues land this long after a one-shot's hard length.
const RELEASE_GRACE: f32 = 0.1;

// ---------------------------------- Sound kinds -----------------------------------

/// Every algorithm the engine can play, keyed by a stable lowercase string.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    White,
    Pink,
    Brown,
    Violet,
    Drone,
    Wind,
    Rain,
    Storm,
    Cosmos,
    Celestial,
    Zen,
    Ocean,
    Lunar,
    Aurora,
    Forest,
    Quantum,
    Elysium,
    Astral,
    Somatic,
    Polyrhythm,
    Silk,
    Alchemist,
    Horizon,
    Stratus,
    StratusEvo,
    #[serde(rename = "status_ii")]
    StatusII,
    DeepSomnus,
    Cognitive,
    Void,
    Ethereal,
    Biophilic,
}

impl SoundKind {
    pub const ALL: [SoundKind; 31] = [
        SoundKind::White,
        SoundKind::Pink,
        SoundKind::Brown,
        SoundKind::Violet,
        SoundKind::Drone,
        SoundKind::Wind,
        SoundKind::Rain,
        SoundKind::Storm,
        SoundKind::Cosmos,
        SoundKind::Celestial,
        SoundKind::Zen,
        SoundKind::Ocean,
        SoundKind::Lunar,
        SoundKind::Aurora,
        SoundKind::Forest,
        SoundKind::Quantum,
        SoundKind::Elysium,
        SoundKind::Astral,
        SoundKind::Somatic,
        SoundKind::Polyrhythm,
        SoundKind::Silk,
        SoundKind::Alchemist,
        SoundKind::Horizon,
        SoundKind::Stratus,
        SoundKind::StratusEvo,
        SoundKind::StatusII,
        SoundKind::DeepSomnus,
        SoundKind::Cognitive,
        SoundKind::Void,
        SoundKind::Ethereal,
        SoundKind::Biophilic,
    ];

    /// What unknown keys play.
    pub const FALLBACK: SoundKind = SoundKind::Pink;

    pub fn key(self) -> &'static str {
        match self {
            SoundKind::White => "white",
            SoundKind::Pink => "pink",
            SoundKind::Brown => "brown",
            SoundKind::Violet => "violet",
            SoundKind::Drone => "drone",
            SoundKind::Wind => "wind",
            SoundKind::Rain => "rain",
            SoundKind::Storm => "storm",
            SoundKind::Cosmos => "cosmos",
            SoundKind::Celestial => "celestial",
            SoundKind::Zen => "zen",
            SoundKind::Ocean => "ocean",
            SoundKind::Lunar => "lunar",
            SoundKind::Aurora => "aurora",
            SoundKind::Forest => "forest",
            SoundKind::Quantum => "quantum",
            SoundKind::Elysium => "elysium",
            SoundKind::Astral => "astral",
            SoundKind::Somatic => "somatic",
            SoundKind::Polyrhythm => "polyrhythm",
            SoundKind::Silk => "silk",
            SoundKind::Alchemist => "alchemist",
            SoundKind::Horizon => "horizon",
            SoundKind::Stratus => "stratus",
            SoundKind::StratusEvo => "stratus_evo",
            SoundKind::StatusII => "status_ii",
            SoundKind::DeepSomnus => "deep_somnus",
            SoundKind::Cognitive => "cognitive",
            SoundKind::Void => "void",
            SoundKind::Ethereal => "ethereal",
            SoundKind::Biophilic => "biophilic",
        }
    }

    /// Series the kind belongs to (for listings).
    pub fn family(self) -> &'static str {
        use SoundKind::*;
        match self {
            White | Pink | Brown | Violet | Drone => "noise",
            Wind | Rain | Storm | Ocean => "nature",
            Aurora | Cosmos => "cosmic",
            Zen | Polyrhythm | Astral | Elysium | Quantum | Forest | Celestial | Lunar | Somatic => "restored",
            Silk | Alchemist | Horizon | Stratus | StratusEvo => "pro",
            StatusII => "artist",
            DeepSomnus | Cognitive | Void | Ethereal | Biophilic => "quintessence",
        }
    }

    /// Case-insensitive lookup; `None` for keys outside the set.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL.iter().copied().find(|k| k.key().eq_ignore_ascii_case(key))
    }

    /// Total mapping used by `play_key`: unknown keys resolve to [`Self::FALLBACK`].
    pub fn resolve(key: &str) -> Self {
        Self::from_key(key).unwrap_or(Self::FALLBACK)
    }
}

impl fmt::Display for SoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SoundKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| EngineError::UnknownKind(s.to_string()))
    }
}

// ----------------------------------- Plumbing -------------------------------------

/// Everything a generator borrows from the engine while its code runs.
pub struct Ctx<'a> {
    pub commands: &'a mut CommandQueue,
    pub rng: &'a mut SmallRng,
    pub now: Duration,
    pub sample_rate: f32,
}

/// A future event in a generator's queue.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Cue {
    /// Release one node (one-shot cleanup, per-event buses).
    Release(NodeId),
    /// Run event chain `n` of the active algorithm; chains re-arm themselves.
    Chain(u8),
    /// One delayed note (arpeggios, phrases, grace notes).
    Note { freq: f32, vel: f32, dur: f32 },
}

/// Running state of each algorithm: the buses its events send into.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Patch {
    Idle,
    Noise,
    Drone,
    Wind { ice: NodeId },
    Rain,
    Storm,
    Ocean,
    Aurora,
    Cosmos,
    Zen,
    Polyrhythm,
    Astral,
    Elysium,
    Quantum,
    Forest,
    Celestial { delay: NodeId },
    Lunar,
    Somatic,
    Silk,
    Alchemist { delay: NodeId },
    Horizon,
    Stratus,
    StratusEvo,
    StatusII { echo: NodeId, shimmer: NodeId },
    DeepSomnus,
    Cognitive,
    Void,
    Ethereal,
    Biophilic,
}

/// What a generator owns: node ids, pending cues, shared noise buffers.
#[derive(Debug, Default)]
struct Owned {
    nodes: Vec<NodeId>,
    tasks: TaskQueue<Cue>,
    noise: HashMap<(NoiseColor, usize), Arc<[f32]>>,
}

/// A generator's owned state together with the engine context, handed to the
/// algorithm functions.
struct Scope<'s, 'a> {
    own: &'s mut Owned,
    cx: &'s mut Ctx<'a>,
}

impl Scope<'_, '_> {
    #[inline] fn sr(&self) -> f32 { self.cx.sample_rate }

    /// Uniform in [0, 1).
    #[inline]
    fn rand(&mut self) -> f32 {
        self.cx.rng.gen::<f32>()
    }

    #[inline]
    fn uniform(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.rand()
    }

    /// Random element of a non-empty table.
    fn pick(&mut self, table: &[f32]) -> f32 {
        table[self.cx.rng.gen_range(0..table.len())]
    }

    /// Random detune within ±`spread` cents, as a frequency ratio.
    fn detune(&mut self, spread: f32) -> f32 {
        let c = self.uniform(-spread, spread);
        cents_to_ratio(c)
    }

    /// Looping noise buffer of `secs` seconds, shared by every layer that asks
    /// for the same color and length.
    fn noise(&mut self, color: NoiseColor, secs: f32) -> Arc<[f32]> {
        let frames = ((secs * self.sr()) as usize).max(1);
        if let Some(buf) = self.own.noise.get(&(color, frames)) {
            return buf.clone();
        }
        let mut data = vec![0.0f32; frames];
        let rng = &mut *self.cx.rng;
        noise::fill(color, &mut data, || rng.gen_range(-1.0f32..=1.0));
        let buf: Arc<[f32]> = data.into();
        self.own.noise.insert((color, frames), buf.clone());
        buf
    }

    fn spawn(&mut self, node: impl Into<Node>) -> NodeId {
        let id = self.cx.commands.alloc_id();
        self.cx.commands.send(Command::Spawn { id, node: Box::new(node.into()) });
        self.own.nodes.push(id);
        id
    }

    /// Spawn a one-shot and queue its release shortly after its hard length.
    fn voice(&mut self, v: OneShot) -> NodeId {
        let release_in = v.length_secs() + RELEASE_GRACE;
        let id = self.spawn(v);
        self.after(release_in, Cue::Release(id));
        id
    }

    fn release(&mut self, id: NodeId) {
        if let Some(i) = self.own.nodes.iter().position(|&n| n == id) {
            self.own.nodes.swap_remove(i);
            self.cx.commands.send(Command::Release(id));
        }
    }

    fn automate(&mut self, id: NodeId, lane: Lane, curve: Curve) {
        self.cx.commands.send(Command::Automate { id, lane, curve });
    }

    fn after(&mut self, delay_s: f32, cue: Cue) {
        let due = self.cx.now + secs(delay_s);
        self.own.tasks.schedule(due, cue);
    }
}

// ----------------------------------- Generator ------------------------------------

/// One running algorithm instance.
#[derive(Debug)]
pub struct Generator {
    kind: SoundKind,
    patch: Patch,
    own: Owned,
    running: bool,
}

impl Generator {
    pub fn new(kind: SoundKind) -> Self {
        Self { kind, patch: Patch::Idle, own: Owned::default(), running: false }
    }

    #[inline] pub fn kind(&self) -> SoundKind { self.kind }
    #[inline] pub fn is_running(&self) -> bool { self.running }
    /// Nodes currently registered with this generator.
    #[inline] pub fn node_ids(&self) -> &[NodeId] { &self.own.nodes }
    #[inline] pub fn pending_cues(&self) -> usize { self.own.tasks.len() }
    /// Deadline and sequence of the next cue, for merging with other queues.
    #[inline] pub fn next_due(&self) -> Option<Duration> { self.own.tasks.next_due() }

    /// Build the algorithm's voices and arm its event chains. A second call is a no-op.
    pub fn start(&mut self, cx: &mut Ctx<'_>) {
        if self.running {
            return;
        }
        self.running = true;
        let mut s = Scope { own: &mut self.own, cx };
        let s = &mut s;
        self.patch = match self.kind {
            SoundKind::White => beds::noise(s, NoiseColor::White),
            SoundKind::Pink => beds::noise(s, NoiseColor::Pink),
            SoundKind::Brown => beds::noise(s, NoiseColor::Brown),
            SoundKind::Violet => beds::noise(s, NoiseColor::Violet),
            SoundKind::Drone => beds::drone(s),
            SoundKind::Wind => nature::wind(s),
            SoundKind::Rain => nature::rain(s),
            SoundKind::Storm => nature::storm(s),
            SoundKind::Ocean => nature::ocean(s),
            SoundKind::Aurora => cosmic::aurora(s),
            SoundKind::Cosmos => cosmic::cosmos(s),
            SoundKind::Zen => restored::zen(s),
            SoundKind::Polyrhythm => restored::polyrhythm(s),
            SoundKind::Astral => restored::astral(s),
            SoundKind::Elysium => restored::elysium(s),
            SoundKind::Quantum => restored::quantum(s),
            SoundKind::Forest => restored::forest(s),
            SoundKind::Celestial => restored::celestial(s),
            SoundKind::Lunar => restored::lunar(s),
            SoundKind::Somatic => restored::somatic(s),
            SoundKind::Silk => pro::silk(s),
            SoundKind::Alchemist => pro::alchemist(s),
            SoundKind::Horizon => pro::horizon(s),
            SoundKind::Stratus => pro::stratus(s),
            SoundKind::StratusEvo => pro::stratus_evo(s),
            SoundKind::StatusII => pro::status_ii(s),
            SoundKind::DeepSomnus => quintessence::deep_somnus(s),
            SoundKind::Cognitive => quintessence::cognitive(s),
            SoundKind::Void => quintessence::void(s),
            SoundKind::Ethereal => quintessence::ethereal(s),
            SoundKind::Biophilic => quintessence::biophilic(s),
        };
        debug!(
            "generator {} started: {} nodes, {} cues pending",
            self.kind,
            self.own.nodes.len(),
            self.own.tasks.len()
        );
    }

    /// Release every owned node and drop every pending cue. Idempotent.
    pub fn stop(&mut self, cx: &mut Ctx<'_>) {
        if !self.running {
            return;
        }
        self.running = false;
        let released = self.own.nodes.len();
        for id in self.own.nodes.drain(..) {
            cx.commands.send(Command::Release(id));
        }
        self.own.tasks.clear();
        self.patch = Patch::Idle;
        debug!("generator {} stopped: {} nodes released", self.kind, released);
    }

    /// Run the earliest cue due at `cx.now`. Returns `false` when none is due.
    pub fn fire_due(&mut self, cx: &mut Ctx<'_>) -> bool {
        if !self.running {
            return false;
        }
        let Some((_, cue)) = self.own.tasks.pop_due(cx.now) else {
            return false;
        };
        let patch = self.patch;
        let mut s = Scope { own: &mut self.own, cx };
        match cue {
            Cue::Release(id) => s.release(id),
            Cue::Chain(n) => chain(patch, n, &mut s),
            Cue::Note { freq, vel, dur } => note(patch, freq, vel, dur, &mut s),
        }
        true
    }
}

fn chain(patch: Patch, n: u8, s: &mut Scope<'_, '_>) {
    match patch {
        Patch::Wind { ice } => nature::ice_gust(s, ice),
        Patch::Storm => nature::thunder(s),
        Patch::Zen => restored::chime(s),
        Patch::Polyrhythm => restored::pulse(s, n),
        Patch::Astral => restored::shimmer(s),
        Patch::Quantum => restored::blip(s),
        Patch::Forest => restored::chirp(s),
        Patch::Celestial { delay } => restored::bell(s, delay),
        Patch::Alchemist { delay } => pro::garden_note(s, delay),
        Patch::Stratus => pro::tide(s, n),
        Patch::StratusEvo => pro::evo_voice(s, n),
        Patch::StatusII { echo, shimmer } => pro::status_loop(s, n, echo, shimmer),
        Patch::Cognitive => quintessence::focus_blip(s),
        Patch::Void => quintessence::impact(s),
        Patch::Biophilic => quintessence::cricket(s),
        _ => {}
    }
}

fn note(patch: Patch, freq: f32, vel: f32, dur: f32, s: &mut Scope<'_, '_>) {
    match patch {
        Patch::StratusEvo => pro::piano(s, freq, vel, dur),
        Patch::StatusII { echo, shimmer } => pro::status_note(s, freq, vel, echo, shimmer),
        _ => {}
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ringbuf::traits::{Consumer, Split};
    use ringbuf::{HeapCons, HeapRb};
    use rand::SeedableRng;

    /// Command queue with the renderer end kept for inspection.
    pub(crate) struct Harness {
        pub q: CommandQueue,
        pub rx: HeapCons<Command>,
        pub rng: SmallRng,
        pub now: Duration,
    }

    impl Harness {
        pub fn new(seed: u64) -> Self {
            let (tx, rx) = HeapRb::<Command>::new(8192).split();
            Self { q: CommandQueue::new(tx), rx, rng: SmallRng::seed_from_u64(seed), now: Duration::ZERO }
        }

        pub fn cx(&mut self) -> Ctx<'_> {
            Ctx { commands: &mut self.q, rng: &mut self.rng, now: self.now, sample_rate: 8000.0 }
        }

        pub fn drain(&mut self) -> Vec<Command> {
            let mut out = vec![];
            while let Some(c) = self.rx.try_pop() {
                out.push(c);
            }
            out
        }

        /// Step time in `dt` increments, firing every due cue.
        pub fn run(&mut self, g: &mut Generator, total: Duration, dt: Duration) {
            let end = self.now + total;
            while self.now < end {
                self.now += dt;
                while g.fire_due(&mut self.cx()) {}
            }
        }
    }

    fn spawned(cmds: &[Command]) -> Vec<NodeId> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Spawn { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn released(cmds: &[Command]) -> Vec<NodeId> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Release(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn keys_are_unique_and_resolve_back() {
        let mut keys: Vec<_> = SoundKind::ALL.iter().map(|k| k.key()).collect();
        for k in SoundKind::ALL {
            assert_eq!(SoundKind::from_key(k.key()), Some(k));
            assert_eq!(k.to_string().parse::<SoundKind>().ok(), Some(k));
        }
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 31);
        assert_eq!(SoundKind::from_key(" Status_II "), Some(SoundKind::StatusII));
    }

    #[test]
    fn unknown_keys_fall_back_to_pink() {
        assert_eq!(SoundKind::from_key("hyperdrive"), None);
        assert_eq!(SoundKind::resolve("hyperdrive"), SoundKind::Pink);
        assert!(matches!("hyperdrive".parse::<SoundKind>(), Err(EngineError::UnknownKind(_))));
    }

    #[test]
    fn serde_uses_the_string_keys() {
        #[derive(Deserialize)]
        struct Doc {
            kind: SoundKind,
            other: SoundKind,
        }
        let d: Doc = toml::from_str("kind = \"status_ii\"\nother = \"stratus_evo\"").expect("parse");
        assert_eq!(d.kind, SoundKind::StatusII);
        assert_eq!(d.other, SoundKind::StratusEvo);
    }

    #[test]
    fn every_kind_starts_and_stops_cleanly() {
        for kind in SoundKind::ALL {
            let mut h = Harness::new(7);
            let mut g = Generator::new(kind);
            g.start(&mut h.cx());
            assert!(g.is_running());
            assert!(!g.node_ids().is_empty(), "{} spawned nothing", kind);

            h.run(&mut g, Duration::from_secs(12), Duration::from_millis(50));
            let live: Vec<NodeId> = g.node_ids().to_vec();
            g.stop(&mut h.cx());

            assert!(g.node_ids().is_empty());
            assert_eq!(g.pending_cues(), 0);
            let cmds = h.drain();
            let rel = released(&cmds);
            for id in live {
                assert!(rel.contains(&id), "{}: node {:?} never released", kind, id);
            }
            // every spawn is eventually released, either by a cue or by stop
            for id in spawned(&cmds) {
                assert!(rel.contains(&id), "{}: spawned {:?} leaked", kind, id);
            }
        }
    }

    #[test]
    fn stop_is_idempotent() {
        let mut h = Harness::new(1);
        let mut g = Generator::new(SoundKind::Celestial);
        g.stop(&mut h.cx());
        g.start(&mut h.cx());
        g.stop(&mut h.cx());
        h.drain();
        g.stop(&mut h.cx());
        assert!(h.drain().is_empty());
        assert!(!g.fire_due(&mut h.cx()));
    }

    #[test]
    fn event_chains_keep_firing_and_clean_up() {
        let mut h = Harness::new(3);
        let mut g = Generator::new(SoundKind::Quantum);
        g.start(&mut h.cx());
        let at_start = spawned(&h.drain()).len();
        h.run(&mut g, Duration::from_secs(30), Duration::from_millis(20));
        let later = spawned(&h.drain()).len();
        // blips every 0.2..1.0 s
        assert!(later >= 25, "only {} blips", later);
        // finished blips are released, so the registry stays small
        assert!(g.node_ids().len() <= at_start + 3, "registry grew to {}", g.node_ids().len());
    }

    #[test]
    fn wind_gusts_automate_the_ice_layer() {
        let mut h = Harness::new(5);
        let mut g = Generator::new(SoundKind::Wind);
        g.start(&mut h.cx());
        h.run(&mut g, Duration::from_secs(20), Duration::from_millis(100));
        let gusts = h
            .drain()
            .iter()
            .filter(|c| matches!(c, Command::Automate { lane: Lane::Swell, .. }))
            .count();
        // first gust at start, then every 3..8 s
        assert!((3..=8).contains(&gusts), "gusts={}", gusts);
    }

    #[test]
    fn noise_buffers_are_shared() {
        let mut h = Harness::new(9);
        let mut g = Generator::new(SoundKind::Wind);
        g.start(&mut h.cx());
        // pink for sub + gusts, white for ice
        assert_eq!(g.own.noise.len(), 2);
    }
}
