//! Messages from the orchestration side to the renderer.
//!
//! Structural changes (spawn/release) and parameter changes travel through the
//! same SPSC ring, so the renderer applies them in the order they were issued,
//! all at the start of one processing quantum.

use std::collections::VecDeque;

use log::warn;
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
use somnium_core::automation::Curve;

use crate::nodes::Node;

/// Handle of a node living in the renderer's arena. Ids are never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Which automation lane of a node a curve targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lane {
    /// Swell lane of a noise layer.
    Swell,
}

#[derive(Debug)]
pub enum Command {
    /// Insert a node; it plays from the next sample.
    Spawn { id: NodeId, node: Box<Node> },
    /// Declick and remove a node. Unknown or already released ids are ignored.
    Release(NodeId),
    /// Cancel-and-hold a node lane, then apply `curve`.
    Automate { id: NodeId, lane: Lane, curve: Curve },

    SetVolume(f32),
    SetTone(f32),
    SetPan(f32),
    Autopan { enabled: bool, speed: f32, manual_pan: f32 },
    SafeMode(bool),
    /// Replace the fade gate schedule (cancel-and-hold first).
    Fade(Curve),
    FadeIn { duration: f32, from_current: bool },
}

/// Orchestration end of the command ring.
///
/// When the ring is full, commands wait in a local backlog and go out, still in
/// order, on the next `send` or `flush`. Nothing is ever dropped.
pub struct CommandQueue {
    tx: HeapProd<Command>,
    backlog: VecDeque<Command>,
    next_id: u64,
}

impl core::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("backlog", &self.backlog.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl CommandQueue {
    pub fn new(tx: HeapProd<Command>) -> Self {
        Self { tx, backlog: VecDeque::new(), next_id: 1 }
    }

    /// Fresh node id.
    pub fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn send(&mut self, cmd: Command) {
        self.flush();
        if !self.backlog.is_empty() {
            self.backlog.push_back(cmd);
            return;
        }
        if let Err(cmd) = self.tx.try_push(cmd) {
            warn!("command ring full, deferring commands until the renderer drains it");
            self.backlog.push_back(cmd);
        }
    }

    /// Move as much of the backlog into the ring as fits. Returns what is left.
    pub fn flush(&mut self) -> usize {
        while let Some(cmd) = self.backlog.pop_front() {
            if let Err(cmd) = self.tx.try_push(cmd) {
                self.backlog.push_front(cmd);
                break;
            }
        }
        self.backlog.len()
    }

    #[inline] pub fn pending(&self) -> usize { self.backlog.len() }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Consumer, Split};
    use ringbuf::HeapRb;

    #[test]
    fn overflow_is_kept_in_order() {
        let (tx, mut rx) = HeapRb::<Command>::new(2).split();
        let mut q = CommandQueue::new(tx);
        for v in 0..5 {
            q.send(Command::SetVolume(v as f32));
        }
        assert_eq!(q.pending(), 3);

        let mut got = vec![];
        while q.pending() > 0 || got.len() < 5 {
            while let Some(Command::SetVolume(v)) = rx.try_pop() {
                got.push(v);
            }
            q.flush();
        }
        assert_eq!(got, [0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn ids_are_unique() {
        let (tx, _rx) = HeapRb::<Command>::new(4).split();
        let mut q = CommandQueue::new(tx);
        let a = q.alloc_id();
        let b = q.alloc_id();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
