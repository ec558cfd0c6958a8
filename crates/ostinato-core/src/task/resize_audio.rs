//! Change an audio's channel/pad configuration.

use std::sync::Arc;

use super::Task;
use crate::error::Result;
use crate::graph::{Audio, ChannelKind, SignalFormat};
use crate::system::OstinatoSystem;

/// Grows or shrinks one direction's pad count between two ticks. New lines
/// come up with fresh recycling chains sized by the current presets;
/// surviving lines keep theirs.
pub struct ResizeAudio {
    audio: Arc<Audio>,
    kind: ChannelKind,
    pads: usize,
}

impl ResizeAudio {
    pub fn new(audio: Arc<Audio>, kind: ChannelKind, pads: usize) -> Box<Self> {
        Box::new(Self { audio, kind, pads })
    }
}

impl Task for ResizeAudio {
    fn name(&self) -> &'static str {
        "resize-audio"
    }

    fn execute(&self, system: &OstinatoSystem) -> Result<()> {
        let format = SignalFormat::from_presets(&system.presets());
        self.audio.set_pads(self.kind, self.pads, format);
        Ok(())
    }
}
