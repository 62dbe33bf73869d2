//! Preset bundles: a sound kind plus the mastering values it was designed with.
//!
//! ```toml
//! kind = "ethereal"
//! tone = 50
//! volume = 0.55
//! autopan = true
//! timer_duration = 60
//! ```
//!
//! Values are not validated here; the engine clamps them when the preset is
//! applied. Unknown kinds fall back like any other sound key.

use std::path::Path;

use log::warn;
use serde::{Deserialize, Deserializer};

use crate::error::{EngineError, Result};
use crate::generators::SoundKind;
use crate::timer::DEFAULT_TIMER_MINUTES;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PresetSettings {
    #[serde(deserialize_with = "lenient_kind")]
    pub kind: SoundKind,
    pub tone: f32,
    pub volume: f32,
    pub pan: f32,
    pub autopan: bool,
    /// Minutes; 0 plays until stopped.
    pub timer_duration: u32,
}

impl Default for PresetSettings {
    fn default() -> Self {
        Self {
            kind: SoundKind::Ethereal,
            tone: 50.0,
            volume: 0.6,
            pan: 0.0,
            autopan: true,
            timer_duration: DEFAULT_TIMER_MINUTES,
        }
    }
}

fn lenient_kind<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<SoundKind, D::Error> {
    let key = String::deserialize(d)?;
    Ok(SoundKind::from_key(&key).unwrap_or_else(|| {
        warn!("preset names unknown sound `{}`, using {}", key, SoundKind::FALLBACK);
        SoundKind::FALLBACK
    }))
}

impl PresetSettings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| EngineError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bundle() {
        let p = PresetSettings::from_toml_str(
            "kind = \"deep_somnus\"\ntone = 30\nvolume = 0.5\npan = -0.2\nautopan = false\ntimer_duration = 90\n",
        )
        .unwrap();
        assert_eq!(p.kind, SoundKind::DeepSomnus);
        assert_eq!(p.tone, 30.0);
        assert_eq!(p.pan, -0.2);
        assert!(!p.autopan);
        assert_eq!(p.timer_duration, 90);
    }

    #[test]
    fn missing_fields_use_defaults_and_unknown_kinds_fall_back() {
        let p = PresetSettings::from_toml_str("kind = \"thunderdome\"").unwrap();
        assert_eq!(p.kind, SoundKind::FALLBACK);
        assert_eq!(p.volume, 0.6);
        assert_eq!(p.timer_duration, DEFAULT_TIMER_MINUTES);
    }
}
