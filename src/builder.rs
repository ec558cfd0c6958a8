//! Builder for [`OstinatoEngine`](crate::OstinatoEngine).

use std::sync::Arc;

use ostinato_core::prelude::*;
use ostinato_core::thread::AudioLoop;

use crate::{OstinatoEngine, Result};

/// Configures soundcard, threading model and lifecycle of a new engine.
///
/// By default the engine opens the system's output device (with the `cpal`
/// feature) and starts ticking immediately. `offline()` keeps everything
/// in-memory and stopped, for rendering and tests.
#[derive(Default)]
pub struct OstinatoEngineBuilder {
    soundcard: Option<Arc<dyn Soundcard>>,
    presets: Option<SoundcardPresets>,
    device_index: Option<usize>,
    super_threaded: bool,
    offline: bool,
}

impl OstinatoEngineBuilder {
    /// Use a specific soundcard backend.
    pub fn soundcard(mut self, soundcard: Arc<dyn Soundcard>) -> Self {
        self.soundcard = Some(soundcard);
        self
    }

    /// Presets for an in-memory card (offline mode, or when no backend is
    /// given and `cpal` is disabled).
    pub fn presets(mut self, presets: SoundcardPresets) -> Self {
        self.presets = Some(presets);
        self
    }

    /// Output device index for the cpal backend.
    #[cfg(feature = "cpal")]
    pub fn output_device(mut self, index: usize) -> Self {
        self.device_index = Some(index);
        self
    }

    /// Opt in to per-audio/per-channel scheduling threads.
    pub fn super_threaded(mut self) -> Self {
        self.super_threaded = true;
        self
    }

    /// No hardware, no loop thread: ticks are driven by
    /// [`OstinatoEngine::process_offline`].
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Build the engine; unless offline, the audio loop starts ticking.
    pub fn build(self) -> Result<OstinatoEngine> {
        let presets = self.presets.unwrap_or_default();

        let soundcard: Arc<dyn Soundcard> = match self.soundcard {
            Some(soundcard) => soundcard,
            None if self.offline => Arc::new(MemorySoundcard::new(presets)),
            None => Self::default_card(self.device_index, presets)?,
        };

        let system = OstinatoSystem::builder()
            .soundcard(soundcard)
            .super_threaded(self.super_threaded)
            .build()
            .map_err(crate::Error::Core)?;

        let audio_loop = if self.offline {
            None
        } else {
            Some(AudioLoop::start(system.clone()))
        };

        Ok(OstinatoEngine::from_parts(system, audio_loop))
    }

    #[cfg(feature = "cpal")]
    fn default_card(
        device_index: Option<usize>,
        _presets: SoundcardPresets,
    ) -> Result<Arc<dyn Soundcard>> {
        let card = CpalSoundcard::new(device_index).map_err(crate::Error::Core)?;
        Ok(Arc::new(card))
    }

    #[cfg(not(feature = "cpal"))]
    fn default_card(
        _device_index: Option<usize>,
        presets: SoundcardPresets,
    ) -> Result<Arc<dyn Soundcard>> {
        Ok(Arc::new(MemorySoundcard::new(presets)))
    }
}
