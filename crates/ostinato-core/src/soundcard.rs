//! The soundcard contract and the in-memory card.
//!
//! Hardware backends are collaborators behind the [`Soundcard`] trait: the
//! engine only ever negotiates presets, asks for exactly one transfer per
//! activation, and mixes into the card's buffer through sub-block locking.

use core::cell::UnsafeCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::SoundcardPresets;
use crate::error::SoundcardError;
use crate::lockfree::AtomicFlag;

/// Hardware capability of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundcardCapability {
    Playback,
    Capture,
    Duplex,
}

/// Default sub-block granularity of a hardware buffer.
pub const DEFAULT_SUB_BLOCKS: usize = 8;

/// One hardware cycle's worth of interleaved samples, lockable in disjoint
/// sub blocks so concurrent mixers writing disjoint regions never serialize
/// on one big lock.
pub struct SoundcardBuffer {
    data: UnsafeCell<Vec<f32>>,
    locks: Vec<AtomicFlag>,
    block_len: usize,
}

// SAFETY: all access to `data` goes through `mix`/`write`/`fill`/`snapshot`,
// which require the covering sub-block locks (or exclusive cycle ownership
// for snapshot/fill, which run strictly between mixing phases).
unsafe impl Send for SoundcardBuffer {}
unsafe impl Sync for SoundcardBuffer {}

impl SoundcardBuffer {
    pub fn new(len: usize, sub_blocks: usize) -> Self {
        let sub_blocks = sub_blocks.max(1);
        Self {
            data: UnsafeCell::new(vec![0.0; len]),
            locks: (0..sub_blocks).map(|_| AtomicFlag::new(false)).collect(),
            block_len: len.div_ceil(sub_blocks),
        }
    }

    pub fn len(&self) -> usize {
        unsafe { (*self.data.get()).len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sub_block_count(&self) -> usize {
        self.locks.len()
    }

    /// Sub block covering the sample at `offset`.
    #[inline]
    pub fn sub_block_of(&self, offset: usize) -> usize {
        (offset / self.block_len).min(self.locks.len() - 1)
    }

    /// Try to take the lock of one sub block.
    #[inline]
    pub fn trylock_sub_block(&self, block: usize) -> bool {
        self.locks[block].test_and_set()
    }

    /// Release one sub block.
    #[inline]
    pub fn unlock_sub_block(&self, block: usize) {
        self.locks[block].set(false);
    }

    /// Add `samples` into the buffer starting at `offset`. The caller must
    /// hold the sub-block locks covering the range.
    pub fn mix(&self, offset: usize, samples: &[f32]) {
        let data = unsafe { &mut *self.data.get() };
        let end = (offset + samples.len()).min(data.len());
        for (slot, sample) in data[offset..end].iter_mut().zip(samples) {
            *slot += sample;
        }
    }

    /// Mix with the covering sub-block locks acquired and released here.
    /// Spins on trylock; mixers hold sub blocks only for the copy itself, so
    /// the wait is bounded.
    pub fn mix_locked(&self, offset: usize, samples: &[f32]) {
        if samples.is_empty() || offset >= self.len() {
            return;
        }
        let first = self.sub_block_of(offset);
        let last = self.sub_block_of(offset + samples.len() - 1);

        for block in first..=last {
            while !self.trylock_sub_block(block) {
                core::hint::spin_loop();
            }
        }
        self.mix(offset, samples);
        for block in first..=last {
            self.unlock_sub_block(block);
        }
    }

    /// Mix one de-interleaved line into the interleaved buffer: sample `i`
    /// lands at `start + i * stride`. Strided writes span every sub block,
    /// so all locks are taken for the copy.
    pub fn mix_strided(&self, start: usize, stride: usize, samples: &[f32]) {
        if samples.is_empty() || stride == 0 {
            return;
        }
        for block in 0..self.locks.len() {
            while !self.trylock_sub_block(block) {
                core::hint::spin_loop();
            }
        }

        let data = unsafe { &mut *self.data.get() };
        for (i, sample) in samples.iter().enumerate() {
            let Some(slot) = data.get_mut(start + i * stride) else {
                break;
            };
            *slot += sample;
        }

        for block in 0..self.locks.len() {
            self.unlock_sub_block(block);
        }
    }

    /// Overwrite the whole buffer. Runs strictly between mixing phases
    /// (capture fill, cycle reset).
    pub fn fill(&self, samples: &[f32]) {
        let data = unsafe { &mut *self.data.get() };
        let len = data.len().min(samples.len());
        data[..len].copy_from_slice(&samples[..len]);
        for slot in data[len..].iter_mut() {
            *slot = 0.0;
        }
    }

    pub fn clear(&self) {
        let data = unsafe { &mut *self.data.get() };
        data.fill(0.0);
    }

    /// Copy of the buffer contents. Runs strictly between mixing phases.
    pub fn snapshot(&self) -> Vec<f32> {
        unsafe { (*self.data.get()).clone() }
    }
}

/// Contract every hardware backend satisfies.
///
/// `play`/`record`/`duplex` perform exactly one transfer of the current
/// buffer and return; transient failures come back as [`SoundcardError`]
/// values, never panics, and a single bad cycle must leave the card usable
/// for the next one.
pub trait Soundcard: Send + Sync {
    fn presets(&self) -> SoundcardPresets;

    fn capability(&self) -> SoundcardCapability;

    /// Acquire hardware resources. Idempotent.
    fn start(&self) -> Result<(), SoundcardError> {
        Ok(())
    }

    /// Release hardware resources. Idempotent; backends with exclusive-mode
    /// teardown guard against re-entry themselves.
    fn shutdown(&self) {}

    fn play(&self) -> Result<(), SoundcardError>;

    fn record(&self) -> Result<(), SoundcardError>;

    fn duplex(&self) -> Result<(), SoundcardError>;

    fn is_playing(&self) -> bool;

    fn is_recording(&self) -> bool;

    /// Buffer of the cycle currently being mixed.
    fn buffer(&self) -> &SoundcardBuffer;

    /// Buffer of the previous cycle.
    fn prev_buffer(&self) -> &SoundcardBuffer;
}

/// An in-memory card: transfers flip the double buffer and archive the
/// played cycles. Serves offline rendering and the test suites; transient
/// errors can be scripted per cycle.
pub struct MemorySoundcard {
    presets: SoundcardPresets,
    capability: SoundcardCapability,
    buffers: [SoundcardBuffer; 2],
    current: AtomicUsize,
    cycle: AtomicU64,
    playing: AtomicFlag,
    recording: AtomicFlag,
    history: Mutex<Vec<Vec<f32>>>,
    fail_cycles: Mutex<HashSet<u64>>,
}

impl MemorySoundcard {
    pub fn new(presets: SoundcardPresets) -> Self {
        Self::with_capability(presets, SoundcardCapability::Playback)
    }

    pub fn with_capability(presets: SoundcardPresets, capability: SoundcardCapability) -> Self {
        let len = presets.buffer_size * presets.channels;
        Self {
            presets,
            capability,
            buffers: [
                SoundcardBuffer::new(len, DEFAULT_SUB_BLOCKS),
                SoundcardBuffer::new(len, DEFAULT_SUB_BLOCKS),
            ],
            current: AtomicUsize::new(0),
            cycle: AtomicU64::new(0),
            playing: AtomicFlag::new(false),
            recording: AtomicFlag::new(false),
            history: Mutex::new(Vec::new()),
            fail_cycles: Mutex::new(HashSet::new()),
        }
    }

    /// Script a transient error for the transfer of cycle `cycle`.
    pub fn fail_at_cycle(&self, cycle: u64) {
        self.fail_cycles.lock().insert(cycle);
    }

    /// Number of completed transfers.
    pub fn cycles(&self) -> u64 {
        self.cycle.load(Ordering::Acquire)
    }

    /// Played cycles, oldest first.
    pub fn history(&self) -> Vec<Vec<f32>> {
        self.history.lock().clone()
    }

    fn transfer(&self) -> Result<(), SoundcardError> {
        let cycle = self.cycle.fetch_add(1, Ordering::AcqRel);

        if self.fail_cycles.lock().remove(&cycle) {
            return Err(SoundcardError::Underrun);
        }

        let current = self.current.load(Ordering::Acquire);
        self.history
            .lock()
            .push(self.buffers[current].snapshot());

        // Flip: the mixed cycle becomes prev, the new current starts silent.
        let next = 1 - current;
        self.buffers[next].clear();
        self.current.store(next, Ordering::Release);

        Ok(())
    }
}

impl Soundcard for MemorySoundcard {
    fn presets(&self) -> SoundcardPresets {
        self.presets
    }

    fn capability(&self) -> SoundcardCapability {
        self.capability
    }

    fn start(&self) -> Result<(), SoundcardError> {
        match self.capability {
            SoundcardCapability::Playback => self.playing.set(true),
            SoundcardCapability::Capture => self.recording.set(true),
            SoundcardCapability::Duplex => {
                self.playing.set(true);
                self.recording.set(true);
            }
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.playing.set(false);
        self.recording.set(false);
    }

    fn play(&self) -> Result<(), SoundcardError> {
        self.transfer()
    }

    fn record(&self) -> Result<(), SoundcardError> {
        self.transfer()
    }

    fn duplex(&self) -> Result<(), SoundcardError> {
        self.transfer()
    }

    fn is_playing(&self) -> bool {
        self.playing.get()
    }

    fn is_recording(&self) -> bool {
        self.recording.get()
    }

    fn buffer(&self) -> &SoundcardBuffer {
        &self.buffers[self.current.load(Ordering::Acquire)]
    }

    fn prev_buffer(&self) -> &SoundcardBuffer {
        &self.buffers[1 - self.current.load(Ordering::Acquire)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_block_locking() {
        let buffer = SoundcardBuffer::new(64, 4);
        assert_eq!(buffer.sub_block_count(), 4);
        assert_eq!(buffer.sub_block_of(0), 0);
        assert_eq!(buffer.sub_block_of(63), 3);

        assert!(buffer.trylock_sub_block(1));
        assert!(!buffer.trylock_sub_block(1));
        buffer.unlock_sub_block(1);
        assert!(buffer.trylock_sub_block(1));
        buffer.unlock_sub_block(1);
    }

    #[test]
    fn test_mix_accumulates() {
        let buffer = SoundcardBuffer::new(8, 2);
        buffer.mix_locked(0, &[1.0; 4]);
        buffer.mix_locked(2, &[0.5; 4]);

        let snap = buffer.snapshot();
        assert_eq!(snap[0], 1.0);
        assert_eq!(snap[2], 1.5);
        assert_eq!(snap[5], 0.5);
        assert_eq!(snap[6], 0.0);
    }

    #[test]
    fn test_mix_clips_to_len() {
        let buffer = SoundcardBuffer::new(4, 1);
        buffer.mix_locked(2, &[1.0; 8]);
        let snap = buffer.snapshot();
        assert_eq!(snap, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_memory_card_flips_and_archives() {
        let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
        let card = MemorySoundcard::new(presets);
        card.start().unwrap();
        assert!(card.is_playing());

        card.buffer().mix_locked(0, &[0.25; 16]);
        card.play().unwrap();

        // The mixed cycle moved to prev; current is silent again.
        assert_eq!(card.prev_buffer().snapshot()[0], 0.25);
        assert_eq!(card.buffer().snapshot()[0], 0.0);
        assert_eq!(card.history().len(), 1);
        assert_eq!(card.cycles(), 1);

        card.shutdown();
        assert!(!card.is_playing());
    }

    #[test]
    fn test_scripted_transient_error() {
        let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
        let card = MemorySoundcard::new(presets);
        card.fail_at_cycle(1);

        assert!(card.play().is_ok());
        assert_eq!(card.play(), Err(SoundcardError::Underrun));
        // The card stays usable after a bad cycle.
        assert!(card.play().is_ok());
        assert_eq!(card.cycles(), 3);
    }
}
