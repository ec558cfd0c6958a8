//! The engine system: graph, arena, task queue, soundcard, context tree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::SoundcardPresets;
use crate::context::RecyclingContext;
use crate::error::Result;
use crate::graph::Audio;
use crate::recall::{RecallRegistry, RunEnv};
use crate::soundcard::{MemorySoundcard, Soundcard, SoundcardCapability};
use crate::task::{Task, TaskCompletion, TaskLauncher};
use crate::tick;

/// Everything one engine instance owns: the audio list, the toplevel
/// recycling context, the recall arena, the task queue and the soundcard.
///
/// The system is passive; ticking is driven either by an
/// [`AudioLoop`](crate::thread::AudioLoop) at the hardware cadence or by
/// [`OstinatoSystem::process_ticks`] for offline rendering and tests.
pub struct OstinatoSystem {
    presets: ArcSwap<SoundcardPresets>,
    soundcard: Arc<dyn Soundcard>,
    audios: Mutex<Vec<Arc<Audio>>>,
    root_context: Arc<RecyclingContext>,
    registry: Arc<RecallRegistry>,
    launcher: TaskLauncher,
    tick_counter: AtomicU64,
    super_threaded: bool,
}

impl OstinatoSystem {
    pub fn builder() -> OstinatoSystemBuilder {
        OstinatoSystemBuilder::default()
    }

    /// Current presets snapshot.
    pub fn presets(&self) -> SoundcardPresets {
        **self.presets.load()
    }

    /// Install new presets. Only ever called between ticks (task path).
    pub fn set_presets(&self, presets: SoundcardPresets) {
        self.presets.store(Arc::new(presets));
    }

    pub fn soundcard(&self) -> &Arc<dyn Soundcard> {
        &self.soundcard
    }

    pub fn audios(&self) -> Vec<Arc<Audio>> {
        self.audios.lock().clone()
    }

    /// Add an audio. Task path only; producers go through
    /// [`AppendAudio`](crate::task::AppendAudio).
    pub fn add_audio(&self, audio: Arc<Audio>) {
        self.audios.lock().push(audio);
    }

    pub fn remove_audio(&self, audio: &Arc<Audio>) {
        self.audios.lock().retain(|a| !Arc::ptr_eq(a, audio));
    }

    /// The toplevel recycling context scoping whole-performance operations.
    pub fn root_context(&self) -> Arc<RecyclingContext> {
        self.root_context.clone()
    }

    pub fn registry(&self) -> Arc<RecallRegistry> {
        self.registry.clone()
    }

    pub fn is_super_threaded(&self) -> bool {
        self.super_threaded
    }

    /// Completed tick count.
    pub fn ticks(&self) -> u64 {
        self.tick_counter.load(Ordering::Acquire)
    }

    /// Queue one mutation for the next inter-tick window.
    pub fn submit(&self, task: Box<dyn Task>) -> Arc<TaskCompletion> {
        self.launcher.submit(task)
    }

    /// Queue an ordered group applied atomically between the same two ticks.
    pub fn submit_group(&self, tasks: Vec<Box<dyn Task>>) -> Arc<TaskCompletion> {
        self.launcher.submit_group(tasks)
    }

    pub(crate) fn launcher(&self) -> &TaskLauncher {
        &self.launcher
    }

    /// Environment for the current tick.
    pub fn run_env(&self) -> RunEnv {
        RunEnv::new(
            self.presets(),
            Some(self.soundcard.clone()),
            self.registry.clone(),
            self.ticks(),
        )
    }

    pub(crate) fn bump_tick(&self) {
        self.tick_counter.fetch_add(1, Ordering::AcqRel);
    }

    /// Drive `count` ticks synchronously, including task drain and the
    /// pre/post-sync soundcard transfers. Offline counterpart of the audio
    /// loop; rendering and the test suites run on this.
    pub fn process_ticks(&self, count: u64) {
        for _ in 0..count {
            self.launcher.drain(self);

            let capability = self.soundcard.capability();
            if capability == SoundcardCapability::Capture {
                if let Err(error) = self.soundcard.record() {
                    tracing::warn!(%error, "capture transfer failed, continuing");
                }
            }

            let env = self.run_env();
            tick::run_tick(&self.audios(), &env);

            match capability {
                SoundcardCapability::Playback => {
                    if let Err(error) = self.soundcard.play() {
                        tracing::warn!(%error, "playback transfer failed, continuing");
                    }
                }
                SoundcardCapability::Duplex => {
                    if let Err(error) = self.soundcard.duplex() {
                        tracing::warn!(%error, "duplex transfer failed, continuing");
                    }
                }
                SoundcardCapability::Capture => {}
            }

            self.bump_tick();
        }
    }
}

/// Builder for [`OstinatoSystem`].
#[derive(Default)]
pub struct OstinatoSystemBuilder {
    soundcard: Option<Arc<dyn Soundcard>>,
    presets: Option<SoundcardPresets>,
    super_threaded: bool,
}

impl OstinatoSystemBuilder {
    /// Use a specific soundcard backend. Its negotiated presets win over
    /// `presets()`.
    pub fn soundcard(mut self, soundcard: Arc<dyn Soundcard>) -> Self {
        self.soundcard = Some(soundcard);
        self
    }

    /// Presets for the default in-memory card.
    pub fn presets(mut self, presets: SoundcardPresets) -> Self {
        self.presets = Some(presets);
        self
    }

    /// Opt in to per-audio/per-channel scheduling threads.
    pub fn super_threaded(mut self, enabled: bool) -> Self {
        self.super_threaded = enabled;
        self
    }

    pub fn build(self) -> Result<Arc<OstinatoSystem>> {
        let presets = self.presets.unwrap_or_default();
        let soundcard = match self.soundcard {
            Some(soundcard) => soundcard,
            None => Arc::new(MemorySoundcard::new(presets)),
        };
        let presets = soundcard.presets();

        Ok(Arc::new(OstinatoSystem {
            presets: ArcSwap::new(Arc::new(presets)),
            soundcard,
            audios: Mutex::new(Vec::new()),
            root_context: RecyclingContext::new(0),
            registry: Arc::new(RecallRegistry::new()),
            launcher: TaskLauncher::new(),
            tick_counter: AtomicU64::new(0),
            super_threaded: self.super_threaded,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_defaults() {
        let system = OstinatoSystem::builder().build().unwrap();
        assert_eq!(system.presets(), SoundcardPresets::default());
        assert!(system.audios().is_empty());
        assert_eq!(system.ticks(), 0);
        assert!(!system.is_super_threaded());
        assert!(system.root_context().parent().is_none());
    }

    #[test]
    fn test_soundcard_presets_win() {
        let presets = SoundcardPresets::new(4, 96000, 256).unwrap();
        let card = Arc::new(MemorySoundcard::new(presets));
        let system = OstinatoSystem::builder()
            .soundcard(card)
            .presets(SoundcardPresets::default())
            .build()
            .unwrap();
        assert_eq!(system.presets(), presets);
    }

    #[test]
    fn test_process_ticks_counts_and_transfers() {
        let system = OstinatoSystem::builder().build().unwrap();
        system.process_ticks(3);
        assert_eq!(system.ticks(), 3);
    }

    #[test]
    fn test_add_remove_audio() {
        let system = OstinatoSystem::builder().build().unwrap();
        let audio = Audio::new("t", 1, 1, 0, &system.presets());
        system.add_audio(audio.clone());
        assert_eq!(system.audios().len(), 1);
        system.remove_audio(&audio);
        assert!(system.audios().is_empty());
    }
}
