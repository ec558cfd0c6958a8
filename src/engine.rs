//! OstinatoEngine: the facade coordinating system, loop and tasks.

use std::sync::Arc;

use ostinato_core::prelude::*;
use ostinato_core::task::TaskCompletion;
use ostinato_core::thread::AudioLoop;
use parking_lot::Mutex;

use crate::Result;

/// Main engine handle.
///
/// Wraps the core system plus the audio loop. Every graph mutation goes
/// through the task queue; the engine only offers convenience constructors
/// around the task types.
///
/// # Example
///
/// ```ignore
/// use ostinato::prelude::*;
///
/// let engine = OstinatoEngine::builder().build()?;
///
/// let audio = engine.new_audio("synth", 2, 1, 0);
/// engine.append_audio(&audio).wait_ready(None);
///
/// let (recall_id, _) = engine.start_audio(&audio, SoundScope::Playback);
/// // ... later
/// engine.cancel_audio(&audio, &recall_id);
/// engine.shutdown();
/// ```
pub struct OstinatoEngine {
    system: Arc<OstinatoSystem>,
    audio_loop: Mutex<Option<Arc<AudioLoop>>>,
}

impl OstinatoEngine {
    /// Create a new engine builder.
    pub fn builder() -> crate::OstinatoEngineBuilder {
        crate::OstinatoEngineBuilder::default()
    }

    pub(crate) fn from_parts(
        system: Arc<OstinatoSystem>,
        audio_loop: Option<Arc<AudioLoop>>,
    ) -> Self {
        Self {
            system,
            audio_loop: Mutex::new(audio_loop),
        }
    }

    /// The underlying system (advanced use).
    pub fn system(&self) -> &Arc<OstinatoSystem> {
        &self.system
    }

    /// Current soundcard presets.
    pub fn presets(&self) -> SoundcardPresets {
        self.system.presets()
    }

    /// True while the audio loop is ticking.
    pub fn is_running(&self) -> bool {
        self.audio_loop
            .lock()
            .as_ref()
            .map(|l| l.is_running())
            .unwrap_or(false)
    }

    /// Completed tick count.
    pub fn ticks(&self) -> u64 {
        self.system.ticks()
    }

    /// Start the audio loop (no-op when already running).
    pub fn start(&self) -> &Self {
        let mut audio_loop = self.audio_loop.lock();
        if audio_loop.as_ref().map(|l| l.is_running()).unwrap_or(false) {
            return self;
        }
        *audio_loop = Some(AudioLoop::start(self.system.clone()));
        self
    }

    /// Stop the loop gracefully: current tick completes, children stop,
    /// hardware is released.
    pub fn shutdown(&self) {
        if let Some(audio_loop) = self.audio_loop.lock().take() {
            audio_loop.stop();
        }
    }

    /// Drive ticks synchronously while the loop is stopped (offline
    /// rendering, deterministic tests).
    pub fn process_offline(&self, ticks: u64) -> Result<()> {
        if self.is_running() {
            return Err(crate::Error::LoopRunning);
        }
        self.system.process_ticks(ticks);
        Ok(())
    }

    /// Construct an audio sized for the current presets. Not yet part of
    /// the engine; submit it with [`OstinatoEngine::append_audio`].
    pub fn new_audio(
        &self,
        name: impl Into<String>,
        audio_channels: usize,
        output_pads: usize,
        input_pads: usize,
    ) -> Arc<Audio> {
        Audio::new(
            name,
            audio_channels,
            output_pads,
            input_pads,
            &self.presets(),
        )
    }

    /// Queue the audio for insertion between two ticks.
    pub fn append_audio(&self, audio: &Arc<Audio>) -> Arc<TaskCompletion> {
        self.system.submit(AppendAudio::new(audio.clone()))
    }

    /// Queue one playback/sequencer/notation/wave run of `audio`. Returns
    /// the run's recall id (for cancellation) and the completion.
    pub fn start_audio(
        &self,
        audio: &Arc<Audio>,
        scope: SoundScope,
    ) -> (Arc<RecallId>, Arc<TaskCompletion>) {
        let (task, recall_id) = StartAudio::prepare(audio, scope);
        let completion = self.system.submit(task);
        (recall_id, completion)
    }

    /// Queue cooperative teardown of one run.
    pub fn cancel_audio(&self, audio: &Arc<Audio>, recall_id: &Arc<RecallId>) -> Arc<TaskCompletion> {
        self.system
            .submit(CancelAudio::new(audio.clone(), recall_id.clone()))
    }

    /// Queue a channel relink (patch-cable routing).
    pub fn link_channel(
        &self,
        channel: &Arc<Channel>,
        target: &Arc<Channel>,
    ) -> Arc<TaskCompletion> {
        self.system
            .submit(LinkChannel::new(channel.clone(), target.clone()))
    }

    /// Queue new presets; the loop recomputes its cadence on the next tick.
    pub fn apply_presets(&self, presets: SoundcardPresets) -> Arc<TaskCompletion> {
        self.system.submit(ApplyPresets::new(presets))
    }

    /// Queue an arbitrary task.
    pub fn submit(&self, task: Box<dyn Task>) -> Arc<TaskCompletion> {
        self.system.submit(task)
    }

    /// Queue an ordered group, applied atomically between the same two ticks.
    pub fn submit_group(&self, tasks: Vec<Box<dyn Task>>) -> Arc<TaskCompletion> {
        self.system.submit_group(tasks)
    }
}

impl Drop for OstinatoEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
