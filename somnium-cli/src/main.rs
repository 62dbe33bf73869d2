//! Somnium CLI: real-time player for procedural soundscapes.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info, warn};
use somnium_engine::{
    Engine, EngineConfig, EngineError, OutputBackend, PresetSettings, Renderer, SoundKind, SystemClock,
};

/// Longest the control loop sleeps between pumps.
const MAX_IDLE: Duration = Duration::from_millis(50);
/// Scratch frames converted per device callback chunk.
const SCRATCH_FRAMES: usize = 1024;

#[derive(Debug, Parser)]
#[command(name = "somnium", version, about = "Procedural soundscape player")]
struct Args {
    /// List output devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// List sound kinds and exit.
    #[arg(long)]
    list_kinds: bool,

    /// Output device name (default device otherwise).
    #[arg(long, value_name = "NAME")]
    device: Option<String>,

    #[arg(long, value_name = "HZ")]
    sample_rate: Option<u32>,

    #[arg(long)]
    channels: Option<u16>,

    /// Sound to play; unknown keys fall back to pink noise.
    #[arg(long, value_name = "KEY")]
    kind: Option<String>,

    /// Master volume, 0..1.
    #[arg(long)]
    volume: Option<f32>,

    /// Tone, 0 (dark) .. 100 (bright).
    #[arg(long)]
    tone: Option<f32>,

    /// Stereo position, -1..1.
    #[arg(long, allow_hyphen_values = true)]
    pan: Option<f32>,

    /// Drift the stereo position, optionally at the given rate (0.5 Hz when omitted).
    #[arg(long, value_name = "HZ", num_args = 0..=1, default_missing_value = "0.5")]
    autopan: Option<f32>,

    /// Bypass the hearing-safety chain.
    #[arg(long)]
    no_safe_mode: bool,

    /// Sleep timer in minutes (0 plays until stopped).
    #[arg(long, value_name = "MINUTES")]
    timer: Option<u32>,

    /// Quit after this many seconds.
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Engine configuration (TOML).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Preset bundle (TOML): kind, tone, volume, pan, autopan, timer_duration.
    #[arg(long, value_name = "FILE")]
    preset: Option<PathBuf>,
}

// ------------------------------------ Device ---------------------------------------

fn list_output_devices() -> Result<()> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn list_kinds() {
    println!("Sound kinds:");
    for kind in SoundKind::ALL {
        println!("- {:<12} ({})", kind.key(), kind.family());
    }
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name {
                return Ok(d);
            }
        }
        bail!("requested device not found: {name}");
    }
    host.default_output_device().ok_or_else(|| anyhow!("no default output device"))
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig> {
    // If nothing requested, default is already concrete.
    if req_sr.is_none() && req_ch.is_none() {
        return Ok(device.default_output_config()?);
    }

    // Pick a SupportedStreamConfigRange first.
    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs()? {
        let ch = range.channels();
        let sr_min = range.min_sample_rate().0;
        let sr_max = range.max_sample_rate().0;

        let ch_pen = match req_ch {
            Some(c) => (i64::from(ch) - i64::from(c)).unsigned_abs(),
            None => 0,
        };
        let sr_pen = match req_sr {
            Some(sr) if (sr_min..=sr_max).contains(&sr) => 0,
            Some(sr) => u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))),
            None => 0,
        };

        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }

    let (_, range) = best.ok_or_else(|| anyhow!("no supported output configs"))?;

    // Choose a concrete sample rate and convert the range into a concrete config.
    let pick_sr = match req_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };
    Ok(range.with_sample_rate(pick_sr))
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = usize::from(cfg.channels.max(1));
    let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];

    device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            for chunk in output.chunks_mut(scratch.len()) {
                let buf = &mut scratch[..chunk.len()];
                renderer.render(buf, channels);
                for (o, &s) in chunk.iter_mut().zip(buf.iter()) {
                    *o = T::from_sample(s);
                }
            }
        },
        |e| error!("stream error: {e}"),
        None,
    )
}

/// Plays the renderer on a cpal output stream.
struct CpalOutput {
    device: cpal::Device,
    config: cpal::StreamConfig,
    format: cpal::SampleFormat,
    stream: Option<cpal::Stream>,
}

impl OutputBackend for CpalOutput {
    fn attach(&mut self, renderer: Renderer) -> somnium_engine::Result<()> {
        let stream = match self.format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &self.config, renderer),
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &self.config, renderer),
            cpal::SampleFormat::U16 => build_stream::<u16>(&self.device, &self.config, renderer),
            other => {
                return Err(EngineError::Unavailable(format!("unsupported device sample format: {other:?}")));
            }
        }
        .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        stream.play().map_err(|e| EngineError::Unavailable(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn detach(&mut self) {
        self.stream.take();
    }
}

// ------------------------------------- Main ----------------------------------------

fn format_time(secs: u32) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_devices {
        return list_output_devices();
    }
    if args.list_kinds {
        list_kinds();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let preset = match &args.preset {
        Some(path) => Some(PresetSettings::load(path).with_context(|| format!("loading {}", path.display()))?),
        None => None,
    };

    let device = pick_device(args.device.as_deref())?;
    let sup_cfg = choose_config(&device, args.sample_rate, args.channels)?;
    let format = sup_cfg.sample_format();
    let mut stream_cfg = sup_cfg.config();
    if let Some(ch) = args.channels {
        stream_cfg.channels = ch;
    }
    config.sample_rate = stream_cfg.sample_rate.0;

    info!("device: {}", device.name()?);
    info!("stream config: {:?} (sample_format: {:?})", stream_cfg, format);

    let output = CpalOutput { device, config: stream_cfg, format, stream: None };
    let mut engine = Engine::new(config, Box::new(output), Box::new(SystemClock::new()))?;

    if let Some(p) = &preset {
        engine.apply_preset(p)?;
    }
    if let Some(v) = args.volume {
        engine.set_volume(v);
    }
    if let Some(t) = args.tone {
        engine.set_tone(t);
    }
    if let Some(p) = args.pan {
        engine.set_pan(p);
    }
    if let Some(speed) = args.autopan {
        engine.toggle_autopan(true, speed);
    }
    if args.no_safe_mode {
        engine.toggle_safe_mode(false);
    }
    if let Some(m) = args.timer {
        engine.set_timer_duration(m);
    }

    match (&args.kind, &preset) {
        (Some(key), _) => engine.play_key(key)?,
        (None, Some(p)) => engine.play(p.kind)?,
        (None, None) => engine.play(SoundKind::Ethereal)?,
    }

    let finished = Rc::new(Cell::new(false));
    let minutes = engine.timer_duration();
    if minutes > 0 {
        let done = finished.clone();
        engine.start_timer(
            minutes,
            |left| match left {
                Some(s) if s % 60 == 0 || s <= 10 => info!("timer: {} left", format_time(s)),
                Some(_) => {}
                None => info!("timer off"),
            },
            move || done.set(true),
        );
    }

    let s = engine.settings();
    info!(
        "volume {:.2} | tone {:.0} | pan {:+.2} | autopan {} | safe mode {}",
        s.volume,
        s.tone,
        s.pan,
        if s.autopan { "on" } else { "off" },
        if s.safe_mode { "on" } else { "off" }
    );
    if let Some(d) = args.duration {
        info!("auto-stop after {d} seconds");
    }
    println!("Press Ctrl+C to stop…");

    let tap = engine.analysis_tap()?;
    let mut window = vec![0.0f32; tap.left.fft_size()];
    let started = Instant::now();
    let mut last_meter = Instant::now();
    let stop_at = args.duration.map(Duration::from_secs);

    loop {
        engine.pump();
        if finished.get() {
            info!("timer finished");
            break;
        }
        if stop_at.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        if engine.backlog() > 0 {
            warn!("{} commands waiting for the audio thread", engine.backlog());
        }

        if last_meter.elapsed() >= Duration::from_secs(1) {
            last_meter = Instant::now();
            tap.left.float_time_domain_data(&mut window);
            let peak = window.iter().fold(0.0f32, |p, s| p.max(s.abs()));
            log::debug!("peak ~ {:.3}", peak);
        }

        let now = engine.now();
        let idle = engine.next_deadline().map_or(MAX_IDLE, |d| d.saturating_sub(now).min(MAX_IDLE));
        std::thread::sleep(idle);
    }

    engine.teardown();
    Ok(())
}

// ------------------------------------ Tests --------------------------------------
