//! Append an audio object to the engine.

use std::sync::Arc;

use super::Task;
use crate::error::Result;
use crate::graph::Audio;
use crate::system::OstinatoSystem;

/// Adds an audio (a track/instrument) to the engine between two ticks.
pub struct AppendAudio {
    audio: Arc<Audio>,
}

impl AppendAudio {
    pub fn new(audio: Arc<Audio>) -> Box<Self> {
        Box::new(Self { audio })
    }
}

impl Task for AppendAudio {
    fn name(&self) -> &'static str {
        "append-audio"
    }

    fn execute(&self, system: &OstinatoSystem) -> Result<()> {
        system.add_audio(self.audio.clone());
        Ok(())
    }
}
