//! Where the renderer runs.
//!
//! `Engine::init` builds a [`Renderer`] and hands it to an [`OutputBackend`],
//! which owns it from then on: a device stream moves it into its audio callback,
//! [`OfflineOutput`] keeps it behind a mutex and renders when asked.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::graph::Renderer;

/// A sink that drives a renderer.
pub trait OutputBackend {
    /// Take ownership of `renderer` and start pulling audio from it. Errors
    /// surface from `Engine::init` as `EngineError::Unavailable`.
    fn attach(&mut self, renderer: Renderer) -> Result<()>;

    /// Stop pulling audio and drop the renderer. A no-op when detached.
    fn detach(&mut self);
}

/// Backend without a device: the host (or a test) renders on demand.
///
/// Clones share the same slot, so one clone can be handed to the engine while
/// another is kept to pull audio.
#[derive(Clone, Default)]
pub struct OfflineOutput {
    slot: Arc<Mutex<Option<Renderer>>>,
}

impl core::fmt::Debug for OfflineOutput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OfflineOutput").field("attached", &self.is_attached()).finish()
    }
}

impl OfflineOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.with_renderer(|_| ()).is_some()
    }

    /// Fill an interleaved buffer. Writes silence and returns `false` when no
    /// renderer is attached.
    pub fn render(&self, out: &mut [f32], channels: usize) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(r) => {
                r.render(out, channels);
                true
            }
            None => {
                out.fill(0.0);
                false
            }
        }
    }

    /// Render `frames` stereo frames into a fresh interleaved buffer.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        self.render(&mut out, 2);
        out
    }

    /// Inspect the attached renderer.
    pub fn with_renderer<R>(&self, f: impl FnOnce(&Renderer) -> R) -> Option<R> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(f)
    }
}

impl OutputBackend for OfflineOutput {
    fn attach(&mut self, renderer: Renderer) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(renderer);
        Ok(())
    }

    fn detach(&mut self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisTap;
    use crate::command::Command;
    use crate::config::{AnalysisConfig, ReverbConfig};
    use crate::mastering::{MasterChain, MasterSettings};
    use crate::nodes::Node;
    use ringbuf::traits::Split;
    use ringbuf::HeapRb;

    fn renderer() -> Renderer {
        let sr = 8000.0;
        let (_tx, rx) = HeapRb::<Command>::new(64).split();
        let (ttx, _trx) = HeapRb::<Box<Node>>::new(64).split();
        let ir = [vec![0.0; 64], vec![0.0; 64]];
        let reverb = ReverbConfig { partition: 64, ..ReverbConfig::default() };
        let tap = AnalysisTap::new(&AnalysisConfig::default());
        let master = MasterChain::new(&MasterSettings::default(), &ir, &reverb, tap, sr);
        Renderer::new(sr, master, rx, ttx)
    }

    #[test]
    fn detached_output_renders_silence() {
        let out = OfflineOutput::new();
        let mut buf = vec![1.0; 32];
        assert!(!out.render(&mut buf, 2));
        assert!(buf.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn clones_share_the_renderer() {
        let out = OfflineOutput::new();
        let mut backend = out.clone();
        backend.attach(renderer()).unwrap();
        assert!(out.is_attached());
        out.render_frames(256);
        assert_eq!(out.with_renderer(|r| r.frames_rendered()), Some(256));
        backend.detach();
        assert!(!out.is_attached());
        backend.detach();
    }
}
