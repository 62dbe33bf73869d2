//! Engine configuration.
//!
//! Every field has a default matching the product behaviour, so an empty TOML
//! document (or `EngineConfig::default()`) yields a fully working engine:
//!
//! ```toml
//! sample_rate = 48000
//!
//! [reverb]
//! seconds = 5.0
//! decay = 2.0
//! mix = 0.6
//!
//! [initial]
//! volume = 0.6
//! tone = 50.0
//! safe_mode = true
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, Result};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Rendering sample rate in Hz. Hosts overwrite it with the device rate.
    pub sample_rate: u32,
    /// Fade-in applied by `play`.
    pub fade_in_secs: f32,
    /// Fade-out applied when a sleep timer runs out.
    pub timer_fade_secs: f32,
    /// Capacity of the orchestration → rendering command ring.
    pub command_capacity: usize,
    /// Seed for every random choice (IR, noise buffers, generative timing).
    /// `None` seeds from the OS.
    pub seed: Option<u64>,
    pub reverb: ReverbConfig,
    pub analysis: AnalysisConfig,
    pub initial: InitialParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fade_in_secs: 4.0,
            timer_fade_secs: 5.0,
            command_capacity: 4096,
            seed: None,
            reverb: ReverbConfig::default(),
            analysis: AnalysisConfig::default(),
            initial: InitialParams::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReverbConfig {
    /// Length of the synthetic impulse response.
    pub seconds: f32,
    /// Exponent of the `(1 - n/len)^decay` envelope.
    pub decay: f32,
    /// Wet return gain summed with the dry path.
    pub mix: f32,
    /// FFT partition size of the convolver (power of two).
    pub partition: usize,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self { seconds: 5.0, decay: 2.0, mix: 0.6, partition: 1024 }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub fft_size: usize,
    /// Temporal smoothing of magnitudes between reads, in [0, 1).
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { fft_size: 4096, smoothing: 0.92, min_db: -100.0, max_db: -30.0 }
    }
}

/// Mastering values used when the signal graph is first built.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InitialParams {
    pub volume: f32,
    pub tone: f32,
    pub pan: f32,
    pub autopan: bool,
    pub autopan_speed: f32,
    pub safe_mode: bool,
}

impl Default for InitialParams {
    fn default() -> Self {
        Self { volume: 0.6, tone: 50.0, pan: 0.0, autopan: false, autopan_speed: 0.5, safe_mode: true }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| EngineError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with. Control values in `initial`
    /// are not checked here; they are clamped like any other setter input.
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=384_000).contains(&self.sample_rate) {
            return Err(EngineError::Config(format!("sample_rate {} out of range", self.sample_rate)));
        }
        if !(self.reverb.seconds > 0.0 && self.reverb.seconds <= 20.0) {
            return Err(EngineError::Config(format!("reverb.seconds {} out of range", self.reverb.seconds)));
        }
        if !(self.reverb.decay.is_finite() && self.reverb.decay >= 0.0) {
            return Err(EngineError::Config(format!("reverb.decay {} must be finite and >= 0", self.reverb.decay)));
        }
        if !(0.0..=1.0).contains(&self.reverb.mix) {
            return Err(EngineError::Config(format!("reverb.mix {} out of 0..=1", self.reverb.mix)));
        }
        if !self.reverb.partition.is_power_of_two() || self.reverb.partition < 64 {
            return Err(EngineError::Config(format!(
                "reverb.partition {} must be a power of two >= 64",
                self.reverb.partition
            )));
        }
        if !self.analysis.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.analysis.fft_size) {
            return Err(EngineError::Config(format!(
                "analysis.fft_size {} must be a power of two in 32..=32768",
                self.analysis.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.analysis.smoothing) {
            return Err(EngineError::Config(format!("analysis.smoothing {} out of range", self.analysis.smoothing)));
        }
        if self.analysis.min_db >= self.analysis.max_db {
            return Err(EngineError::Config("analysis.min_db must be below max_db".into()));
        }
        if self.command_capacity < 64 {
            return Err(EngineError::Config("command_capacity must be at least 64".into()));
        }
        if ![self.fade_in_secs, self.timer_fade_secs].iter().all(|s| s.is_finite() && *s >= 0.0) {
            return Err(EngineError::Config("fade durations must be finite and not negative".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn sample_rate_f32(&self) -> f32 {
        self.sample_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_default() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.analysis.fft_size, 4096);
        assert!(cfg.initial.safe_mode);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = EngineConfig::from_toml_str("seed = 7\n[reverb]\nseconds = 1.5\n").unwrap();
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.reverb.seconds, 1.5);
        assert_eq!(cfg.reverb.mix, 0.6);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("[analysis]\nfft_size = 1000\n"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(EngineConfig::from_toml_str("sample_rate = 12"), Err(EngineError::Config(_))));
        assert!(matches!(EngineConfig::from_toml_str("volume = 1"), Err(EngineError::Toml(_))));
    }

    #[test]
    fn reverb_shape_is_checked() {
        for doc in ["mix = 1.5", "mix = -0.1", "mix = nan", "decay = -1.0", "decay = inf", "decay = nan"] {
            let toml = format!("[reverb]\n{}\n", doc);
            assert!(matches!(EngineConfig::from_toml_str(&toml), Err(EngineError::Config(_))), "{}", doc);
        }
        assert!(EngineConfig::from_toml_str("[reverb]\nmix = 0.0\ndecay = 0.0\n").is_ok());
        assert!(matches!(EngineConfig::from_toml_str("fade_in_secs = nan"), Err(EngineError::Config(_))));
    }
}
