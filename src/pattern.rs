//! Color patterns: fixed-length step sequences shared between threads
//!
//! A [`ColorPattern`] is the unit of locking. Readers (`color_at`, `encode`)
//! share a read lock; writers (`set_color_at`, `decode`) take the write lock
//! of that one pattern only. The authoring [`PatternGrid`] never locks as a
//! whole, so edits to different cells never contend.

use crate::color::Rgba;
use crate::wire::{WireError, WireMessage};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Default number of steps per pattern
pub const DEFAULT_STEPS: usize = 16;

/// What happened to a received datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The snapshot replaced every step of the pattern
    Applied,
    /// Tagged for another channel, discarded
    ForeignChannel(u64),
    /// Shorter than one full message, discarded
    Truncated { len: usize },
}

/// Fixed-length sequence of RGBA steps
#[derive(Debug)]
pub struct ColorPattern {
    steps: RwLock<Vec<Rgba>>,
}

impl ColorPattern {
    /// Create a pattern of `steps` opaque black steps
    pub fn new(steps: usize) -> Self {
        Self {
            steps: RwLock::new(vec![Rgba::BLACK; steps]),
        }
    }

    /// Create a pattern with every step set to `color`
    pub fn filled(steps: usize, color: Rgba) -> Self {
        Self {
            steps: RwLock::new(vec![color; steps]),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Color at `step`, or `None` when the index is out of range
    pub fn color_at(&self, step: usize) -> Option<Rgba> {
        self.read().get(step).copied()
    }

    /// Set the color at `step`; returns false and leaves the pattern untouched
    /// when the index is out of range
    pub fn set_color_at(&self, step: usize, color: Rgba) -> bool {
        match self.write().get_mut(step) {
            Some(slot) => {
                *slot = color;
                true
            }
            None => false,
        }
    }

    pub fn fill(&self, color: Rgba) {
        self.write().iter_mut().for_each(|s| *s = color);
    }

    /// Copy of all steps in order
    pub fn snapshot(&self) -> Vec<Rgba> {
        self.read().clone()
    }

    /// Serialize the current steps tagged with `channel`
    pub fn encode(&self, channel: u64) -> Vec<u8> {
        WireMessage::new(channel, self.snapshot()).encode()
    }

    /// Merge a received snapshot into this pattern
    ///
    /// Applies only when the message is tagged for `expected_channel` or for
    /// the wildcard channel; anything else, including short datagrams, is
    /// dropped without touching the pattern.
    pub fn decode(&self, bytes: &[u8], expected_channel: u64) -> MergeOutcome {
        let mut steps = self.write();

        let message = match WireMessage::decode(bytes, steps.len()) {
            Ok(message) => message,
            Err(WireError::Truncated { actual, .. }) => {
                trace!("Dropping truncated pattern message ({} bytes)", actual);
                return MergeOutcome::Truncated { len: actual };
            }
        };

        if !message.accepts(expected_channel) {
            trace!(
                "Dropping pattern for channel {} (listening on {})",
                message.channel,
                expected_channel
            );
            return MergeOutcome::ForeignChannel(message.channel);
        }

        steps.copy_from_slice(&message.steps);
        MergeOutcome::Applied
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Rgba>> {
        self.steps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Rgba>> {
        self.steps.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Authoring grid of independent patterns indexed by (channel, slot)
#[derive(Debug)]
pub struct PatternGrid {
    channels: Vec<Vec<ColorPattern>>,
    steps: usize,
}

impl PatternGrid {
    pub fn new(channels: usize, slots: usize, steps: usize) -> Self {
        let channels = (0..channels)
            .map(|_| (0..slots).map(|_| ColorPattern::new(steps)).collect())
            .collect();

        Self { channels, steps }
    }

    pub fn get(&self, channel: usize, slot: usize) -> Option<&ColorPattern> {
        self.channels.get(channel)?.get(slot)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn slot_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);

    #[test]
    fn test_new_pattern_is_opaque_black() {
        let p = ColorPattern::new(DEFAULT_STEPS);
        assert_eq!(p.len(), 16);
        assert!(p.snapshot().iter().all(|c| *c == Rgba::BLACK));
    }

    #[test]
    fn test_set_then_get() {
        let p = ColorPattern::new(16);
        for i in 0..16 {
            let c = Rgba::new(i as u8, 255 - i as u8, 7, 200);
            assert!(p.set_color_at(i, c));
            assert_eq!(p.color_at(i), Some(c));
        }
    }

    #[test]
    fn test_out_of_range_is_rejected_without_mutation() {
        let p = ColorPattern::new(16);
        let before = p.snapshot();

        assert_eq!(p.color_at(16), None);
        assert_eq!(p.color_at(usize::MAX), None);
        assert!(!p.set_color_at(16, RED));
        assert!(!p.set_color_at(1000, RED));

        assert_eq!(p.snapshot(), before);
    }

    #[test]
    fn test_decode_truncated_leaves_pattern() {
        let source = ColorPattern::filled(16, RED);
        let target = ColorPattern::new(16);
        let bytes = source.encode(1);

        for len in [0, 7, 8, 71] {
            assert_eq!(
                target.decode(&bytes[..len], 1),
                MergeOutcome::Truncated { len }
            );
        }
        assert!(target.snapshot().iter().all(|c| *c == Rgba::BLACK));
    }

    #[test]
    fn test_grid_cells_are_independent() {
        let grid = PatternGrid::new(4, 16, 16);
        assert_eq!(grid.channel_count(), 4);
        assert_eq!(grid.slot_count(), 16);

        grid.get(1, 5).unwrap().set_color_at(3, RED);
        assert_eq!(grid.get(1, 5).unwrap().color_at(3), Some(RED));
        assert_eq!(grid.get(0, 5).unwrap().color_at(3), Some(Rgba::BLACK));
        assert_eq!(grid.get(1, 4).unwrap().color_at(3), Some(Rgba::BLACK));
        assert!(grid.get(4, 0).is_none());
        assert!(grid.get(0, 16).is_none());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let p = Arc::new(ColorPattern::new(16));
        let writer = {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                for i in 0..1000 {
                    p.set_color_at(i % 16, Rgba::new((i % 256) as u8, 0, 0, 255));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let bytes = p.encode(0);
                        assert_eq!(bytes.len(), crate::wire::wire_len(16));
                        assert!(p.color_at(15).is_some());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
