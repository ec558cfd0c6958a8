//! The stream recall: allocates per-voice audio signals and feeds them.

use std::sync::Arc;

use super::behavior::{RecallBehavior, RunContext};
use super::{Recall, RecallLevel};
use crate::graph::{AudioSignal, GraphNode, Recycling};

/// Channel-run recall that turns the recycling templates its voice touches
/// into live signals and keeps them fed, one buffer per tick.
///
/// Which recyclings it touches is decided by the recall id's recycling
/// context: a recycling outside the context's slots belongs to another voice
/// and is left alone. Each touched recycling gets a recycling-level child
/// recall with an audio-signal-level child below it that does the feeding.
pub struct StreamChannelRun {
    signals: Vec<(Arc<Recycling>, Arc<AudioSignal>)>,
    spawned: bool,
}

impl StreamChannelRun {
    pub fn new() -> Self {
        Self {
            signals: Vec::new(),
            spawned: false,
        }
    }

    /// Port carrying the fill level of generated buffers.
    pub const LEVEL_PORT: &'static str = "level";
    /// Port carrying the note length in buffers; 0 streams until canceled.
    pub const LENGTH_PORT: &'static str = "length";
}

impl Default for StreamChannelRun {
    fn default() -> Self {
        Self::new()
    }
}

impl RecallBehavior for StreamChannelRun {
    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(StreamChannelRun::new())
    }

    fn run_init_pre(&mut self, ctx: &RunContext<'_>) {
        if self.spawned {
            return;
        }
        let Some(channel) = ctx.node.as_channel() else {
            return;
        };
        let Some(recall_id) = ctx.recall.recall_id() else {
            return;
        };

        let level = ctx
            .port(Self::LEVEL_PORT)
            .and_then(|p| p.safe_read_float().ok())
            .unwrap_or(1.0);
        let length = ctx
            .port(Self::LENGTH_PORT)
            .and_then(|p| p.safe_read_float().ok())
            .unwrap_or(0.0) as u64;

        for recycling in channel.recycling_chain() {
            if recall_id.context().find(&recycling).is_none() {
                continue;
            }

            let signal = AudioSignal::from_template(&recycling.template(), recall_id.clone());
            recycling.add_audio_signal(signal.clone());

            let recycling_run = Recall::spawn_child(
                ctx.recall,
                "stream-recycling",
                RecallLevel::Recycling,
                GraphNode::Recycling(recycling.clone()),
                Box::new(super::NoopBehavior),
            );
            Recall::spawn_child(
                &recycling_run,
                "stream-audio-signal",
                RecallLevel::AudioSignal,
                GraphNode::AudioSignal(signal.clone()),
                Box::new(StreamAudioSignal::new(level, length)),
            );

            self.signals.push((recycling, signal));
        }
        self.spawned = true;
    }

    fn is_finished(&self, _ctx: &RunContext<'_>) -> bool {
        self.spawned && self.signals.iter().all(|(_, signal)| signal.is_drained())
    }

    fn done(&mut self, _ctx: &RunContext<'_>) {
        for (recycling, signal) in self.signals.drain(..) {
            recycling.remove_audio_signal(&signal);
        }
    }
}

/// Audio-signal-level worker below a stream: appends one generated buffer
/// per tick until the note length is reached, then marks the signal
/// finished.
pub struct StreamAudioSignal {
    level: f32,
    length: u64,
    fed: u64,
}

impl StreamAudioSignal {
    pub fn new(level: f32, length: u64) -> Self {
        Self {
            level,
            length,
            fed: 0,
        }
    }
}

impl RecallBehavior for StreamAudioSignal {
    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(StreamAudioSignal::new(self.level, self.length))
    }

    fn run_pre(&mut self, ctx: &RunContext<'_>) {
        let Some(signal) = ctx.node.as_audio_signal() else {
            return;
        };
        if signal.is_finished() {
            return;
        }

        signal.push_buffer(vec![self.level; signal.format().buffer_size]);
        self.fed += 1;

        if self.length > 0 && self.fed >= self.length {
            signal.set_finished();
        }
    }

    fn is_finished(&self, ctx: &RunContext<'_>) -> bool {
        ctx.node
            .as_audio_signal()
            .map(|signal| signal.is_drained())
            .unwrap_or(true)
    }
}
