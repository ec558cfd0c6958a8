//! Audio: a logical instrument or track.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::audio_signal::SignalFormat;
use super::channel::{Channel, ChannelKind};
use crate::config::SoundcardPresets;
use crate::context::SoundScope;
use crate::lockfree::IdSource;
use crate::recall::Recall;

static AUDIO_IDS: IdSource = IdSource::new();

/// Which scheduling tiers serve an audio in super-threaded mode.
///
/// Per-scope choice: a scope listed here gets its own audio thread (and, when
/// `channel_threads` is set, per-channel worker threads underneath).
#[derive(Debug)]
pub struct PlaybackDomain {
    super_threaded_scopes: Mutex<HashSet<SoundScope>>,
    channel_threads: Mutex<bool>,
}

impl PlaybackDomain {
    pub fn new() -> Self {
        Self {
            super_threaded_scopes: Mutex::new(HashSet::new()),
            channel_threads: Mutex::new(false),
        }
    }

    pub fn enable_super_threaded(&self, scope: SoundScope) {
        self.super_threaded_scopes.lock().insert(scope);
    }

    pub fn disable_super_threaded(&self, scope: SoundScope) {
        self.super_threaded_scopes.lock().remove(&scope);
    }

    pub fn is_super_threaded(&self, scope: SoundScope) -> bool {
        self.super_threaded_scopes.lock().contains(&scope)
    }

    pub fn wants_any_super_threading(&self) -> bool {
        !self.super_threaded_scopes.lock().is_empty()
    }

    pub fn set_channel_threads(&self, enabled: bool) {
        *self.channel_threads.lock() = enabled;
    }

    pub fn wants_channel_threads(&self) -> bool {
        *self.channel_threads.lock()
    }
}

impl Default for PlaybackDomain {
    fn default() -> Self {
        Self::new()
    }
}

/// A logical instrument/track: ordered output and input channel lines plus
/// the template recalls attached at audio level.
///
/// Channel count is `audio_channels * pads` per direction; the recycling
/// chain length of every line is fixed by that configuration and only ever
/// changes through queued tasks.
pub struct Audio {
    id: u64,
    name: String,
    audio_channels: AtomicUsize,
    output_pads: AtomicUsize,
    input_pads: AtomicUsize,
    output: Mutex<Vec<Arc<Channel>>>,
    input: Mutex<Vec<Arc<Channel>>>,
    recalls: Mutex<Vec<Arc<Recall>>>,
    playback_domain: PlaybackDomain,
}

impl Audio {
    pub fn new(
        name: impl Into<String>,
        audio_channels: usize,
        output_pads: usize,
        input_pads: usize,
        presets: &SoundcardPresets,
    ) -> Arc<Self> {
        let format = SignalFormat::from_presets(presets);

        let audio = Arc::new(Self {
            id: AUDIO_IDS.next(),
            name: name.into(),
            audio_channels: AtomicUsize::new(audio_channels),
            output_pads: AtomicUsize::new(output_pads),
            input_pads: AtomicUsize::new(input_pads),
            output: Mutex::new(Vec::new()),
            input: Mutex::new(Vec::new()),
            recalls: Mutex::new(Vec::new()),
            playback_domain: PlaybackDomain::new(),
        });

        let mut output = Vec::new();
        for pad in 0..output_pads {
            for line in 0..audio_channels {
                let channel = Channel::new(ChannelKind::Output, pad, line, Some(format));
                channel.set_audio(&audio);
                output.push(channel);
            }
        }
        *audio.output.lock() = output;

        let mut input = Vec::new();
        for pad in 0..input_pads {
            for line in 0..audio_channels {
                let channel = Channel::new(ChannelKind::Input, pad, line, Some(format));
                channel.set_audio(&audio);
                input.push(channel);
            }
        }
        *audio.input.lock() = input;

        audio
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn audio_channels(&self) -> usize {
        self.audio_channels.load(Ordering::Acquire)
    }

    pub fn output_pads(&self) -> usize {
        self.output_pads.load(Ordering::Acquire)
    }

    pub fn input_pads(&self) -> usize {
        self.input_pads.load(Ordering::Acquire)
    }

    /// Grow or shrink one direction's pad count, keeping surviving channels
    /// and their recycling chains intact. Task path only, between ticks.
    pub fn set_pads(self: &Arc<Self>, kind: ChannelKind, pads: usize, format: SignalFormat) {
        let (list, counter) = match kind {
            ChannelKind::Output => (&self.output, &self.output_pads),
            ChannelKind::Input => (&self.input, &self.input_pads),
        };
        let audio_channels = self.audio_channels();
        let old_pads = counter.swap(pads, Ordering::AcqRel);

        let mut channels = list.lock();
        if pads < old_pads {
            channels.truncate(pads * audio_channels);
            return;
        }
        for pad in old_pads..pads {
            for line in 0..audio_channels {
                let channel = Channel::new(kind, pad, line, Some(format));
                channel.set_audio(self);
                channels.push(channel);
            }
        }
    }

    pub fn playback_domain(&self) -> &PlaybackDomain {
        &self.playback_domain
    }

    /// Output channels, pad-major declaration order.
    pub fn output_channels(&self) -> Vec<Arc<Channel>> {
        self.output.lock().clone()
    }

    /// Input channels, pad-major declaration order.
    pub fn input_channels(&self) -> Vec<Arc<Channel>> {
        self.input.lock().clone()
    }

    /// All channels in traversal order: output before input.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        let mut all = self.output.lock().clone();
        all.extend(self.input.lock().iter().cloned());
        all
    }

    pub fn output_channel(&self, pad: usize, line: usize) -> Option<Arc<Channel>> {
        self.output
            .lock()
            .get(pad * self.audio_channels() + line)
            .cloned()
    }

    pub fn input_channel(&self, pad: usize, line: usize) -> Option<Arc<Channel>> {
        self.input
            .lock()
            .get(pad * self.audio_channels() + line)
            .cloned()
    }

    pub fn add_recall(&self, recall: Arc<Recall>) {
        self.recalls.lock().push(recall);
    }

    pub fn remove_recall(&self, recall: &Arc<Recall>) {
        self.recalls.lock().retain(|r| !Arc::ptr_eq(r, recall));
    }

    /// Recalls attached at audio level, declaration order.
    pub fn recalls(&self) -> Vec<Arc<Recall>> {
        self.recalls.lock().clone()
    }

    /// Template recalls matching `scope`.
    pub fn templates(&self, scope: SoundScope) -> Vec<Arc<Recall>> {
        self.recalls
            .lock()
            .iter()
            .filter(|r| r.is_template() && r.scope() == scope)
            .cloned()
            .collect()
    }
}

impl core::fmt::Debug for Audio {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Audio")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("audio_channels", &self.audio_channels())
            .field("output_pads", &self.output_pads)
            .field("input_pads", &self.input_pads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layout() {
        let presets = SoundcardPresets::default();
        let audio = Audio::new("drums", 2, 2, 1, &presets);

        assert_eq!(audio.output_channels().len(), 4);
        assert_eq!(audio.input_channels().len(), 2);
        assert_eq!(audio.channels().len(), 6);

        let channel = audio.output_channel(1, 1).unwrap();
        assert_eq!(channel.pad(), 1);
        assert_eq!(channel.line(), 1);
        assert!(Arc::ptr_eq(&channel.audio().unwrap(), &audio));
    }

    #[test]
    fn test_every_line_has_one_recycling() {
        let presets = SoundcardPresets::default();
        let audio = Audio::new("synth", 2, 1, 0, &presets);

        for channel in audio.channels() {
            assert_eq!(channel.recycling_chain().len(), 1);
        }
    }

    #[test]
    fn test_traversal_order_output_before_input() {
        let presets = SoundcardPresets::default();
        let audio = Audio::new("mixer", 1, 1, 1, &presets);

        let all = audio.channels();
        assert_eq!(all[0].kind(), ChannelKind::Output);
        assert_eq!(all[1].kind(), ChannelKind::Input);
    }

    #[test]
    fn test_playback_domain_scopes() {
        let presets = SoundcardPresets::default();
        let audio = Audio::new("seq", 1, 1, 0, &presets);
        let domain = audio.playback_domain();

        assert!(!domain.wants_any_super_threading());
        domain.enable_super_threaded(SoundScope::Playback);
        assert!(domain.is_super_threaded(SoundScope::Playback));
        assert!(!domain.is_super_threaded(SoundScope::Notation));
        domain.disable_super_threaded(SoundScope::Playback);
        assert!(!domain.wants_any_super_threading());
    }
}
