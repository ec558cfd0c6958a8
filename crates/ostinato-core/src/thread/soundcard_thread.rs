//! Per-device soundcard thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::gate::TickGate;
use crate::lockfree::AtomicFlag;
use crate::soundcard::{Soundcard, SoundcardCapability};

/// Which half of the shared tick a device runs in: capture devices transfer
/// before the graph walk so their data is available for mixing, playback
/// devices after the post phase mixed the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHalf {
    PreSync,
    PostSync,
}

/// One thread per hardware device capability. Each activation performs
/// exactly one hardware transfer and acknowledges; transient device errors
/// are logged and the next activation proceeds normally. Backends wanting
/// elevated OS scheduling priority arrange it in their `start`.
pub struct SoundcardThread {
    card: Arc<dyn Soundcard>,
    half: SyncHalf,
    gate: Arc<TickGate>,
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Device teardown latch: a second stop never re-enters hardware
    /// shutdown (exclusive-mode backends break on double release).
    shutdown_done: AtomicFlag,
}

impl SoundcardThread {
    pub fn start(card: Arc<dyn Soundcard>) -> Arc<Self> {
        let half = match card.capability() {
            SoundcardCapability::Capture => SyncHalf::PreSync,
            SoundcardCapability::Playback | SoundcardCapability::Duplex => SyncHalf::PostSync,
        };

        let thread = Arc::new(Self {
            card,
            half,
            gate: Arc::new(TickGate::new()),
            handle: Mutex::new(None),
            shutdown_done: AtomicFlag::new(false),
        });

        let this = thread.clone();
        *thread.handle.lock() = Some(
            std::thread::Builder::new()
                .name("ostinato-soundcard".into())
                .spawn(move || this.run())
                .expect("failed to spawn soundcard thread"),
        );

        thread
    }

    pub fn half(&self) -> SyncHalf {
        self.half
    }

    pub fn card(&self) -> &Arc<dyn Soundcard> {
        &self.card
    }

    fn run(&self) {
        if let Err(error) = self.card.start() {
            tracing::warn!(%error, "soundcard failed to start");
        }

        let mut last = 0;
        while let Some((generation, _)) = self.gate.wait_request(last) {
            let result = match self.card.capability() {
                SoundcardCapability::Playback => self.card.play(),
                SoundcardCapability::Capture => self.card.record(),
                SoundcardCapability::Duplex => self.card.duplex(),
            };
            if let Err(error) = result {
                // A single bad cycle never stops the engine.
                tracing::warn!(%error, "hardware transfer failed, continuing");
            }

            self.gate.ack(generation);
            last = generation;
        }

        if self.shutdown_done.test_and_set() {
            self.card.shutdown();
        }
    }

    /// Request this tick's transfer.
    pub fn request_transfer(&self) -> u64 {
        self.gate.request(0)
    }

    pub fn wait_done(&self, generation: u64) {
        self.gate.wait_ack(generation);
    }

    /// Graceful stop: the transfer in flight finishes, then hardware is
    /// released exactly once.
    pub fn stop(&self) {
        self.gate.stop();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoundcardPresets;
    use crate::soundcard::MemorySoundcard;

    #[test]
    fn test_one_transfer_per_activation() {
        let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
        let card = Arc::new(MemorySoundcard::new(presets));
        let thread = SoundcardThread::start(card.clone());
        assert_eq!(thread.half(), SyncHalf::PostSync);

        for _ in 0..3 {
            let generation = thread.request_transfer();
            thread.wait_done(generation);
        }
        thread.stop();

        assert_eq!(card.cycles(), 3);
        assert!(!card.is_playing());
    }

    #[test]
    fn test_transient_error_does_not_stop_ticking() {
        let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
        let card = Arc::new(MemorySoundcard::new(presets));
        card.fail_at_cycle(1);
        let thread = SoundcardThread::start(card.clone());

        for _ in 0..3 {
            let generation = thread.request_transfer();
            thread.wait_done(generation);
        }
        thread.stop();

        // Cycle 1 failed but cycles 0 and 2 completed.
        assert_eq!(card.cycles(), 3);
        assert_eq!(card.history().len(), 2);
    }

    #[test]
    fn test_capture_runs_pre_sync() {
        let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
        let card = Arc::new(MemorySoundcard::with_capability(
            presets,
            SoundcardCapability::Capture,
        ));
        let thread = SoundcardThread::start(card);
        assert_eq!(thread.half(), SyncHalf::PreSync);
        thread.stop();
    }

    #[test]
    fn test_double_stop_is_safe() {
        let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
        let card = Arc::new(MemorySoundcard::new(presets));
        let thread = SoundcardThread::start(card);
        thread.stop();
        thread.stop();
    }
}
