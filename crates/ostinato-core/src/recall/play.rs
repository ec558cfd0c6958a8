//! The play recall: mixes a voice's signal into the soundcard buffer.

use super::behavior::{RecallBehavior, RunContext};

/// Channel-run recall that takes its voice's stream output and mixes it into
/// the soundcard's current cycle, interleaved at the channel's line.
///
/// Declares a dependency on the stream template; resolution finds the stream
/// *instance* sharing this recall's id among all concurrently running
/// voices. While the dependency is unresolved the phases are no-ops; once
/// the stream is gone the play reports finished.
pub struct PlayChannelRun;

impl PlayChannelRun {
    pub fn new() -> Self {
        Self
    }

    /// Port scaling the mixed amplitude.
    pub const VOLUME_PORT: &'static str = "volume";
}

impl Default for PlayChannelRun {
    fn default() -> Self {
        Self::new()
    }
}

impl RecallBehavior for PlayChannelRun {
    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(PlayChannelRun::new())
    }

    fn run_post(&mut self, ctx: &RunContext<'_>) {
        let Some(soundcard) = ctx.env.soundcard.as_ref() else {
            return;
        };
        let Some(channel) = ctx.node.as_channel() else {
            return;
        };
        let Some(recall_id) = ctx.recall.recall_id() else {
            return;
        };
        // Dependency unresolved: reduced no-op phase, retried next tick.
        if ctx.dependency(0).is_none() {
            return;
        }

        let volume = ctx
            .port(Self::VOLUME_PORT)
            .and_then(|p| p.safe_read_float().ok())
            .unwrap_or(1.0);

        let channels = soundcard.presets().channels;
        let line = channel.line() % channels.max(1);
        let buffer = soundcard.buffer();

        for recycling in channel.recycling_chain() {
            if recall_id.context().find(&recycling).is_none() {
                continue;
            }
            let Some(signal) = recycling.find_signal(&recall_id) else {
                continue;
            };
            let Some(mut samples) = signal.pop_buffer() else {
                continue;
            };

            if volume != 1.0 {
                for sample in samples.iter_mut() {
                    *sample *= volume;
                }
            }

            let attack = signal.format().attack;
            buffer.mix_strided(line + attack * channels, channels, &samples);
        }
    }

    fn is_finished(&self, ctx: &RunContext<'_>) -> bool {
        ctx.dependency(0).is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SoundcardPresets;
    use crate::context::{RecallId, RecyclingContext, SoundScope};
    use crate::graph::{AudioSignal, Channel, ChannelKind, GraphNode, SignalFormat};
    use crate::port::{Port, PortValue};
    use crate::recall::{NoopBehavior, Recall, RecallDependency, RecallLevel, RecallRegistry, RunEnv};
    use crate::soundcard::{MemorySoundcard, Soundcard};

    #[test]
    fn test_play_mixes_dependency_signal() {
        let presets = SoundcardPresets::new(2, 44100, 16).unwrap();
        let card: Arc<dyn Soundcard> = Arc::new(MemorySoundcard::new(presets));
        let registry = Arc::new(RecallRegistry::new());
        let env = RunEnv::new(presets, Some(card.clone()), registry.clone(), 0);

        let format = SignalFormat::from_presets(&presets);
        let channel = Channel::new(ChannelKind::Output, 0, 1, Some(format));
        let context = RecyclingContext::with_slots(channel.recycling_chain());
        let recall_id = RecallId::new(context, SoundScope::Playback);

        let stream_template = Recall::template(
            "stream",
            RecallLevel::Channel,
            SoundScope::Playback,
            Box::new(NoopBehavior),
        );
        let play_template = Recall::template(
            "play",
            RecallLevel::Channel,
            SoundScope::Playback,
            Box::new(PlayChannelRun::new()),
        );
        play_template.add_dependency(RecallDependency::on(&stream_template));
        play_template.add_port(Port::new(PlayChannelRun::VOLUME_PORT, PortValue::Float(0.5)));
        play_template.attach(GraphNode::Channel(channel.clone()));
        stream_template.attach(GraphNode::Channel(channel.clone()));

        let _stream = Recall::duplicate(&stream_template, &recall_id, &registry);
        let play = Recall::duplicate(&play_template, &recall_id, &registry);

        // Hand-feed a signal as the stream recall would.
        let recycling = channel.first_recycling().unwrap();
        let signal = AudioSignal::from_template(&recycling.template(), recall_id.clone());
        signal.push_buffer(vec![1.0; 16]);
        recycling.add_audio_signal(signal.clone());

        play.resolve_dependency(&registry);
        play.run_init_pre(&env);
        play.run_init_inter(&env);
        play.run_init_post(&env);
        play.run_post(&env);

        // Line 1 of 2 interleaved channels, volume 0.5.
        let mixed = card.buffer().snapshot();
        assert_eq!(mixed[0], 0.0);
        assert_eq!(mixed[1], 0.5);
        assert_eq!(mixed[3], 0.5);
        assert_eq!(signal.stream_len(), 0);
    }

    #[test]
    fn test_play_noops_without_dependency() {
        let presets = SoundcardPresets::new(1, 44100, 16).unwrap();
        let card: Arc<dyn Soundcard> = Arc::new(MemorySoundcard::new(presets));
        let registry = Arc::new(RecallRegistry::new());
        let env = RunEnv::new(presets, Some(card.clone()), registry.clone(), 0);

        let format = SignalFormat::from_presets(&presets);
        let channel = Channel::new(ChannelKind::Output, 0, 0, Some(format));
        let context = RecyclingContext::with_slots(channel.recycling_chain());
        let recall_id = RecallId::new(context, SoundScope::Playback);

        let stream_template = Recall::template(
            "stream",
            RecallLevel::Channel,
            SoundScope::Playback,
            Box::new(NoopBehavior),
        );
        let play_template = Recall::template(
            "play",
            RecallLevel::Channel,
            SoundScope::Playback,
            Box::new(PlayChannelRun::new()),
        );
        play_template.add_dependency(RecallDependency::on(&stream_template));
        play_template.attach(GraphNode::Channel(channel.clone()));

        // No stream instance anywhere: the phase no-ops and finished is true.
        let play = Recall::duplicate(&play_template, &recall_id, &registry);
        play.resolve_dependency(&registry);
        play.run_init_pre(&env);
        play.run_init_inter(&env);
        play.run_init_post(&env);
        play.run_post(&env);

        assert!(card.buffer().snapshot().iter().all(|&s| s == 0.0));
        assert!(play.check_finished(&env));
    }
}
