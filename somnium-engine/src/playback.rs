//! The engine facade: playback, mastering controls and the sleep timer.
//!
//! One `Engine` owns everything on the orchestration side: the command queue
//! into the renderer, the active [`Generator`], the engine's own task queue
//! (timer ticks and fade completions) and the cached mastering settings. The
//! renderer itself lives in whatever [`OutputBackend`] `init` handed it to.
//!
//! Nothing here blocks. Every call schedules its effect and returns; the host
//! calls [`Engine::pump`] from its control loop to fire whatever came due, and
//! may sleep until [`Engine::next_deadline`] in between.

use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapRb};
use somnium_core::automation::Curve;
use somnium_core::dsp::clamp;

use crate::analysis::AnalysisTap;
use crate::command::{Command, CommandQueue};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::generators::{Ctx, Generator, SoundKind};
use crate::graph::{Renderer, ARENA_CAPACITY};
use crate::mastering::{MasterChain, MasterSettings};
use crate::nodes::Node;
use crate::output::OutputBackend;
use crate::preset::PresetSettings;
use crate::reverb;
use crate::scheduler::{secs, Clock, TaskQueue};
use crate::timer::{self, CompleteFn, TimerSession, UpdateFn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EngineTask {
    TimerTick,
    /// The timer's fade-out is over; stop and notify.
    TimerFadeDone,
    /// A `fade_out` callback is due.
    FadeDone(u64),
}

/// Orchestration ends of the two rings shared with the renderer.
struct Link {
    commands: CommandQueue,
    trash: HeapCons<Box<Node>>,
}

pub struct Engine {
    config: EngineConfig,
    output: Box<dyn OutputBackend>,
    clock: Box<dyn Clock>,
    rng: SmallRng,
    link: Option<Link>,
    tap: AnalysisTap,
    settings: MasterSettings,
    tasks: TaskQueue<EngineTask>,
    fade_callbacks: Vec<(u64, Box<dyn FnOnce()>)>,
    next_fade: u64,
    generator: Option<Generator>,
    timer: Option<TimerSession>,
    timer_duration: u32,
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("initialized", &self.link.is_some())
            .field("active", &self.active_kind())
            .field("settings", &self.settings)
            .field("timer", &self.timer)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl Engine {
    /// Validate `config` and set up an idle engine. Nothing is rendered until
    /// `init` (or the first `play`) brings up the signal graph.
    pub fn new(config: EngineConfig, output: Box<dyn OutputBackend>, clock: Box<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Ok(Self {
            tap: AnalysisTap::new(&config.analysis),
            settings: MasterSettings::from(&config.initial),
            config,
            output,
            clock,
            rng,
            link: None,
            tasks: TaskQueue::new(),
            fade_callbacks: Vec::new(),
            next_fade: 0,
            generator: None,
            timer: None,
            timer_duration: timer::DEFAULT_TIMER_MINUTES,
        })
    }

    #[inline] pub fn config(&self) -> &EngineConfig { &self.config }
    #[inline] pub fn settings(&self) -> &MasterSettings { &self.settings }
    #[inline] pub fn is_initialized(&self) -> bool { self.link.is_some() }
    #[inline] pub fn now(&self) -> Duration { self.clock.now() }

    // -------------------------------- lifecycle --------------------------------

    /// Build the signal graph and attach it to the output. Idempotent.
    ///
    /// The cached settings are applied without ramps, so a rebuild after
    /// `teardown` sounds like the graph it replaces. The fade gate starts closed.
    pub fn init(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }
        let sr = self.config.sample_rate_f32();
        let rc = &self.config.reverb;
        let mut ir = reverb::synthetic_ir(rc.seconds, rc.decay, sr, &mut self.rng);
        reverb::normalize(&mut ir, sr);
        let master = MasterChain::new(&self.settings, &ir, rc, self.tap.clone(), sr);

        let (tx, rx) = HeapRb::<Command>::new(self.config.command_capacity).split();
        let (trash_tx, trash_rx) = HeapRb::<Box<Node>>::new(ARENA_CAPACITY).split();
        let renderer = Renderer::new(sr, master, rx, trash_tx);

        self.output.attach(renderer).map_err(|e| match e {
            EngineError::Unavailable(_) => e,
            other => EngineError::Unavailable(other.to_string()),
        })?;
        self.link = Some(Link { commands: CommandQueue::new(tx), trash: trash_rx });
        info!("signal graph up at {} Hz ({:.1} s reverb)", self.config.sample_rate, rc.seconds);
        Ok(())
    }

    /// Stop playback, cancel the timer and release the output. `init` or `play`
    /// bring the engine back.
    pub fn teardown(&mut self) {
        self.stop();
        self.tasks.clear();
        self.fade_callbacks.clear();
        if self.link.take().is_some() {
            self.output.detach();
            debug!("signal graph torn down");
        }
    }

    // --------------------------------- playback --------------------------------

    /// Tear down whatever plays, then fade in a fresh generator of `kind`.
    ///
    /// When something was already playing the gate re-fades from its current
    /// level, so a switch never dips to silence.
    pub fn play(&mut self, kind: SoundKind) -> Result<()> {
        let was_playing = self.is_playing();
        self.stop();
        self.init()?;

        let now = self.clock.now();
        let sample_rate = self.config.sample_rate_f32();
        let fade_in = self.config.fade_in_secs;
        let Some(link) = self.link.as_mut() else {
            return Err(EngineError::Unavailable("signal graph missing after init".into()));
        };
        let mut generator = Generator::new(kind);
        link.commands.send(Command::FadeIn { duration: fade_in, from_current: was_playing });
        generator.start(&mut Ctx { commands: &mut link.commands, rng: &mut self.rng, now, sample_rate });
        self.generator = Some(generator);
        info!("playing {} ({})", kind, kind.family());
        Ok(())
    }

    /// Like [`Engine::play`] with a string key; unknown keys play the fallback.
    pub fn play_key(&mut self, key: &str) -> Result<()> {
        let kind = SoundKind::from_key(key).unwrap_or_else(|| {
            warn!("unknown sound `{}`, playing {}", key, SoundKind::FALLBACK);
            SoundKind::FALLBACK
        });
        self.play(kind)
    }

    /// Stop the active generator and cancel any timer. A no-op when idle.
    pub fn stop(&mut self) {
        if let Some(mut generator) = self.generator.take() {
            let now = self.clock.now();
            let sample_rate = self.config.sample_rate_f32();
            if let Some(link) = self.link.as_mut() {
                generator.stop(&mut Ctx { commands: &mut link.commands, rng: &mut self.rng, now, sample_rate });
            }
        }
        self.cancel_timer();
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.generator.is_some()
    }

    pub fn active_kind(&self) -> Option<SoundKind> {
        self.generator.as_ref().map(Generator::kind)
    }

    /// The active generator, for inspection.
    pub fn generator(&self) -> Option<&Generator> {
        self.generator.as_ref()
    }

    // --------------------------------- mastering -------------------------------

    fn send(&mut self, cmd: Command) {
        if let Some(link) = self.link.as_mut() {
            link.commands.send(cmd);
        }
    }

    pub fn set_volume(&mut self, v: f32) {
        self.settings.volume = clamp(v, 0.0, 1.0);
        self.send(Command::SetVolume(self.settings.volume));
    }

    pub fn set_tone(&mut self, v: f32) {
        self.settings.tone = clamp(v, 0.0, 100.0);
        self.send(Command::SetTone(self.settings.tone));
    }

    /// Remembered as the manual pan; heard only while autopan is off.
    pub fn set_pan(&mut self, v: f32) {
        self.settings.pan = clamp(v, -1.0, 1.0);
        self.send(Command::SetPan(self.settings.pan));
    }

    pub fn toggle_autopan(&mut self, enabled: bool, speed: f32) {
        self.settings.autopan = enabled;
        self.settings.autopan_speed = clamp(speed, 0.01, 20.0);
        self.send(Command::Autopan {
            enabled,
            speed: self.settings.autopan_speed,
            manual_pan: self.settings.pan,
        });
    }

    pub fn toggle_safe_mode(&mut self, enabled: bool) {
        self.settings.safe_mode = enabled;
        self.send(Command::SafeMode(enabled));
    }

    /// Open the fade gate from silence over `secs`.
    pub fn fade_in(&mut self, secs: f32) {
        self.send(Command::FadeIn { duration: secs.max(0.0), from_current: false });
    }

    /// Close the fade gate linearly over `secs`, then call `done` from `pump`.
    pub fn fade_out(&mut self, secs: f32, done: impl FnOnce() + 'static) {
        let id = self.schedule_fade_out(secs, None);
        self.fade_callbacks.push((id, Box::new(done)));
    }

    fn schedule_fade_out(&mut self, secs_: f32, task: Option<EngineTask>) -> u64 {
        let d = secs_.max(0.0);
        self.send(Command::Fade(Curve::new().linear(0.0, d)));
        self.next_fade += 1;
        let task = task.unwrap_or(EngineTask::FadeDone(self.next_fade));
        self.tasks.schedule(self.clock.now() + secs(d), task);
        self.next_fade
    }

    /// Stereo spectrum handles for a visualiser. Brings the graph up if needed;
    /// the handles stay valid for the engine's lifetime.
    pub fn analysis_tap(&mut self) -> Result<AnalysisTap> {
        self.init()?;
        Ok(self.tap.clone())
    }

    // ----------------------------------- timer ---------------------------------

    /// Arm a sleep timer. When it runs out the gate fades over
    /// `timer_fade_secs`, playback stops, `on_complete` runs, then `on_update`
    /// hears `None`. A zero duration never creates a session; it only cancels
    /// the running one. Returns whether a session is armed.
    pub fn start_timer(
        &mut self,
        minutes: u32,
        on_update: impl FnMut(Option<u32>) + 'static,
        on_complete: impl FnOnce() + 'static,
    ) -> bool {
        self.cancel_timer();
        if minutes == 0 {
            return false;
        }
        let session = TimerSession::new(self.clock.now(), minutes, Box::new(on_update), Box::new(on_complete));
        self.arm(session);
        true
    }

    fn arm(&mut self, session: TimerSession) {
        debug!("timer armed, ends at {:?}", session.end());
        self.tasks.retain(|t| matches!(t, EngineTask::FadeDone(_)));
        self.timer = Some(session);
        self.tasks.schedule(self.clock.now(), EngineTask::TimerTick);
    }

    /// Drop the running session and tell its observer. A no-op without one.
    /// Cancelling during the closing fade reopens the gate.
    pub fn cancel_timer(&mut self) {
        self.tasks.retain(|t| matches!(t, EngineTask::FadeDone(_)));
        if let Some(session) = self.timer.take() {
            debug!("timer cancelled");
            if session.is_expiring() {
                self.reopen_gate();
            }
            session.cancel();
        }
    }

    /// Undo a timer fade that will no longer end in a stop.
    fn reopen_gate(&mut self) {
        if self.is_playing() {
            debug!("timer fade abandoned, reopening the gate");
            let duration = self.config.fade_in_secs;
            self.send(Command::FadeIn { duration, from_current: true });
        }
    }

    /// Seconds left on the running timer.
    pub fn timer_remaining(&self) -> Option<u32> {
        self.timer.as_ref().map(|t| t.remaining(self.clock.now()))
    }

    #[inline]
    pub fn timer_duration(&self) -> u32 {
        self.timer_duration
    }

    /// Change the timer duration (capped at 12 h). While playing this re-arms
    /// the running session with the new length, or cancels it for 0.
    pub fn set_timer_duration(&mut self, minutes: u32) {
        self.timer_duration = timer::clamp_minutes(minutes);
        if !self.is_playing() {
            return;
        }
        if self.timer_duration == 0 {
            self.cancel_timer();
            return;
        }
        let now = self.clock.now();
        let expiring = self.timer.as_ref().is_some_and(TimerSession::is_expiring);
        let session = match self.timer.take() {
            Some(running) => running.rearm(now, self.timer_duration),
            None => TimerSession::new(now, self.timer_duration, silent_update(), silent_complete()),
        };
        self.arm(session);
        if expiring {
            self.reopen_gate();
        }
    }

    /// Add `minutes` to the timer duration, saturating at 12 h.
    pub fn quick_add_time(&mut self, minutes: u32) {
        self.set_timer_duration(timer::quick_add(self.timer_duration, minutes));
    }

    /// Apply a preset's mastering values and timer duration. While playing, the
    /// preset's sound replaces the current one and the timer is re-armed (or
    /// cancelled) with the preset's duration, keeping its observers. The switch
    /// fades in from the gate's current level, which also undoes a timer fade.
    pub fn apply_preset(&mut self, preset: &PresetSettings) -> Result<()> {
        self.set_volume(preset.volume);
        self.set_tone(preset.tone);
        self.set_pan(preset.pan);
        self.toggle_autopan(preset.autopan, self.settings.autopan_speed);
        self.timer_duration = timer::clamp_minutes(preset.timer_duration);
        if !self.is_playing() {
            return Ok(());
        }

        let running = self.timer.take();
        self.play(preset.kind)?;
        match (running, self.timer_duration) {
            (Some(session), 0) => session.cancel(),
            (Some(session), minutes) => {
                let session = session.rearm(self.clock.now(), minutes);
                self.arm(session);
            }
            (None, 0) => {}
            (None, minutes) => {
                let session = TimerSession::new(self.clock.now(), minutes, silent_update(), silent_complete());
                self.arm(session);
            }
        }
        Ok(())
    }

    // ----------------------------------- pump ----------------------------------

    /// Fire every engine task and generator cue due now, in deadline order
    /// (engine first on ties), then push deferred commands and drop nodes the
    /// renderer handed back. Returns how many events fired.
    pub fn pump(&mut self) -> usize {
        let mut fired = 0;
        loop {
            let now = self.clock.now();
            let engine_due = self.tasks.next_due().filter(|&d| d <= now);
            let cue_due = self.generator.as_ref().and_then(Generator::next_due).filter(|&d| d <= now);
            let progressed = match (engine_due, cue_due) {
                (None, None) => false,
                (Some(e), Some(c)) if c < e => self.fire_cue(now),
                (Some(_), _) => self.fire_task(now),
                (None, Some(_)) => self.fire_cue(now),
            };
            if !progressed {
                break;
            }
            fired += 1;
        }

        if let Some(link) = self.link.as_mut() {
            link.commands.flush();
            let mut dropped = 0usize;
            while link.trash.try_pop().is_some() {
                dropped += 1;
            }
            if dropped > 0 {
                log::trace!("recycled {} nodes", dropped);
            }
        }
        fired
    }

    /// Earliest pending engine task or generator cue.
    pub fn next_deadline(&self) -> Option<Duration> {
        let cue = self.generator.as_ref().and_then(Generator::next_due);
        match (self.tasks.next_due(), cue) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Commands waiting for room in the ring.
    pub fn backlog(&self) -> usize {
        self.link.as_ref().map_or(0, |l| l.commands.pending())
    }

    fn fire_cue(&mut self, now: Duration) -> bool {
        let sample_rate = self.config.sample_rate_f32();
        let (Some(generator), Some(link)) = (self.generator.as_mut(), self.link.as_mut()) else {
            return false;
        };
        generator.fire_due(&mut Ctx { commands: &mut link.commands, rng: &mut self.rng, now, sample_rate })
    }

    fn fire_task(&mut self, now: Duration) -> bool {
        let Some((_, task)) = self.tasks.pop_due(now) else {
            return false;
        };
        match task {
            EngineTask::TimerTick => self.timer_tick(now),
            EngineTask::TimerFadeDone => {
                if let Some(session) = self.timer.take() {
                    info!("timer finished");
                    self.stop();
                    session.complete();
                }
            }
            EngineTask::FadeDone(id) => {
                if let Some(i) = self.fade_callbacks.iter().position(|(f, _)| *f == id) {
                    let (_, done) = self.fade_callbacks.swap_remove(i);
                    done();
                }
            }
        }
        true
    }

    fn timer_tick(&mut self, now: Duration) {
        let Some(session) = self.timer.as_mut() else { return };
        if session.is_expiring() {
            return;
        }
        let remaining = session.remaining(now);
        if remaining > 0 {
            session.notify(Some(remaining));
            let next = session.next_tick(remaining);
            self.tasks.schedule(next, EngineTask::TimerTick);
            return;
        }
        session.set_expiring();
        debug!("timer ran out, fading over {:.1} s", self.config.timer_fade_secs);
        self.schedule_fade_out(self.config.timer_fade_secs, Some(EngineTask::TimerFadeDone));
    }
}

/// Observers for sessions armed without a caller (duration changes, presets).
fn silent_update() -> UpdateFn {
    Box::new(|_| {})
}

fn silent_complete() -> CompleteFn {
    Box::new(|| {})
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, ReverbConfig};
    use crate::output::OfflineOutput;
    use crate::scheduler::ManualClock;

    fn small_config() -> EngineConfig {
        EngineConfig {
            sample_rate: 16_000,
            seed: Some(5),
            reverb: ReverbConfig { seconds: 0.25, partition: 256, ..ReverbConfig::default() },
            analysis: AnalysisConfig { fft_size: 512, ..AnalysisConfig::default() },
            ..EngineConfig::default()
        }
    }

    fn engine() -> (Engine, OfflineOutput, ManualClock) {
        let out = OfflineOutput::new();
        let clock = ManualClock::new();
        let e = Engine::new(small_config(), Box::new(out.clone()), Box::new(clock.clone())).unwrap();
        (e, out, clock)
    }

    struct Broken;

    impl OutputBackend for Broken {
        fn attach(&mut self, _: Renderer) -> Result<()> {
            Err(EngineError::Config("no device".into()))
        }
        fn detach(&mut self) {}
    }

    #[test]
    fn init_is_lazy_and_idempotent() {
        let (mut e, out, _) = engine();
        assert!(!out.is_attached() && !e.is_initialized());
        e.init().unwrap();
        e.init().unwrap();
        assert!(out.is_attached() && e.is_initialized());
        e.teardown();
        assert!(!out.is_attached() && !e.is_initialized());
        e.play(SoundKind::Brown).unwrap();
        assert!(out.is_attached());
    }

    #[test]
    fn failed_init_is_unavailable_and_recoverable_state() {
        let mut e = Engine::new(small_config(), Box::new(Broken), Box::new(ManualClock::new())).unwrap();
        assert!(matches!(e.play(SoundKind::White), Err(EngineError::Unavailable(_))));
        assert!(!e.is_playing());
        assert!(matches!(e.analysis_tap(), Err(EngineError::Unavailable(_))));
        e.stop();
    }

    #[test]
    fn setters_clamp_and_cache_before_init() {
        let (mut e, out, _) = engine();
        e.set_volume(3.0);
        e.set_tone(-5.0);
        e.set_pan(-9.0);
        e.toggle_autopan(true, 100.0);
        assert_eq!(e.settings().volume, 1.0);
        assert_eq!(e.settings().tone, 0.0);
        assert_eq!(e.settings().pan, -1.0);
        assert_eq!(e.settings().autopan_speed, 20.0);
        e.init().unwrap();
        // applied at build time, no ramp
        let (v, auto) = out.with_renderer(|r| (r.master().volume(), r.master().autopan())).unwrap();
        assert_eq!(v, 1.0);
        assert!(auto);
    }

    #[test]
    fn play_key_falls_back() {
        let (mut e, _, _) = engine();
        e.play_key("definitely-not-a-sound").unwrap();
        assert_eq!(e.active_kind(), Some(SoundKind::FALLBACK));
        e.play_key(" Deep_Somnus ").unwrap();
        assert_eq!(e.active_kind(), Some(SoundKind::DeepSomnus));
    }

    #[test]
    fn fade_out_callback_fires_from_pump() {
        use std::cell::Cell;
        use std::rc::Rc;

        let (mut e, _, clock) = engine();
        e.play(SoundKind::Pink).unwrap();
        let hit = Rc::new(Cell::new(0));
        let h = hit.clone();
        e.fade_out(2.0, move || h.set(h.get() + 1));
        clock.advance(Duration::from_millis(1999));
        e.pump();
        assert_eq!(hit.get(), 0);
        clock.advance(Duration::from_millis(1));
        e.pump();
        assert_eq!(hit.get(), 1);
        e.pump();
        assert_eq!(hit.get(), 1);
    }

    #[test]
    fn timer_duration_bookkeeping() {
        let (mut e, _, _) = engine();
        assert_eq!(e.timer_duration(), timer::DEFAULT_TIMER_MINUTES);
        e.quick_add_time(700);
        assert_eq!(e.timer_duration(), timer::MAX_TIMER_MINUTES);
        e.set_timer_duration(0);
        assert_eq!(e.timer_duration(), 0);
        // not playing: nothing armed
        e.set_timer_duration(30);
        assert_eq!(e.timer_remaining(), None);

        e.play(SoundKind::Rain).unwrap();
        e.set_timer_duration(2);
        assert_eq!(e.timer_remaining(), Some(120));
        e.set_timer_duration(0);
        assert_eq!(e.timer_remaining(), None);
    }

    #[test]
    fn next_deadline_tracks_both_queues() {
        let (mut e, _, _) = engine();
        assert_eq!(e.next_deadline(), None);
        e.play(SoundKind::Storm).unwrap();
        // thunder release cue
        assert!(e.next_deadline().is_some());
        e.start_timer(1, |_| {}, || {});
        assert_eq!(e.next_deadline(), Some(Duration::ZERO));
    }
}
