//! Somnium Engine: procedural soundscapes, mastering chain, playback and timer.
//!
//! Crate layout:
//! - [`playback`]   : `Engine`, the one owned facade hosts talk to
//! - [`generators`] : `SoundKind` and the `Generator` running one algorithm
//! - [`graph`]      : `Renderer`, the node arena running on the audio thread
//! - [`mastering`]  : the fixed tone / reverb / fade / pan / safety chain
//! - [`nodes`]      : oscillators, layers, one-shot voices, echo buses
//! - [`reverb`]     : partitioned FFT convolution and the synthetic IR
//! - [`analysis`]   : spectrum tap for visualisers
//! - [`command`]    : orchestration → renderer messages
//! - [`scheduler`]  : clocks and task queues
//! - [`timer`]      : sleep timer sessions
//! - [`output`]     : where the renderer runs
//! - [`config`], [`preset`], [`error`]
//!
//! Two contexts exist. The renderer only applies commands and automation that
//! were already written; it never allocates or frees. Everything structural
//! happens on the orchestration side, inside `Engine` calls and `Engine::pump`.

pub mod analysis;
pub mod command;
pub mod config;
pub mod error;
pub mod generators;
pub mod graph;
pub mod mastering;
pub mod nodes;
pub mod output;
pub mod playback;
pub mod preset;
pub mod reverb;
pub mod scheduler;
pub mod timer;

// Re-export the host-facing surface.
pub use analysis::{Analyser, AnalysisTap};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use generators::SoundKind;
pub use graph::Renderer;
pub use mastering::MasterSettings;
pub use output::{OfflineOutput, OutputBackend};
pub use playback::Engine;
pub use preset::PresetSettings;
pub use scheduler::{Clock, ManualClock, SystemClock};
pub use timer::{quick_add, MAX_TIMER_MINUTES};
