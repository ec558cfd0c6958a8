//! Channels: one I/O line of an audio object.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::audio::Audio;
use super::audio_signal::SignalFormat;
use super::recycling::Recycling;
use crate::lockfree::IdSource;
use crate::recall::Recall;

static CHANNEL_IDS: IdSource = IdSource::new();

/// Direction of a channel line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Output,
    Input,
}

#[derive(Clone)]
struct RecyclingSpan {
    first: Arc<Recycling>,
    last: Arc<Recycling>,
}

/// One I/O line of an [`Audio`].
///
/// Owns at most one recycling chain (none for pure-control channels) and may
/// hold a link to another channel: patch-cable semantics, a reference, never
/// ownership. While linked, the channel's effective recycling is the link
/// target's chain; the channel's own chain is kept aside and restored on
/// unlink. Relinking only ever happens through a queued task, between ticks.
pub struct Channel {
    id: u64,
    kind: ChannelKind,
    pad: usize,
    line: usize,
    audio: Mutex<Weak<Audio>>,
    own: Mutex<Option<RecyclingSpan>>,
    effective: Mutex<Option<RecyclingSpan>>,
    link: Mutex<Weak<Channel>>,
    recalls: Mutex<Vec<Arc<Recall>>>,
}

impl Channel {
    pub fn new(kind: ChannelKind, pad: usize, line: usize, format: Option<SignalFormat>) -> Arc<Self> {
        let channel = Arc::new(Self {
            id: CHANNEL_IDS.next(),
            kind,
            pad,
            line,
            audio: Mutex::new(Weak::new()),
            own: Mutex::new(None),
            effective: Mutex::new(None),
            link: Mutex::new(Weak::new()),
            recalls: Mutex::new(Vec::new()),
        });

        if let Some(format) = format {
            let recycling = Recycling::new(format);
            recycling.set_channel(&channel);
            let span = RecyclingSpan {
                first: recycling.clone(),
                last: recycling,
            };
            *channel.own.lock() = Some(span.clone());
            *channel.effective.lock() = Some(span);
        }

        channel
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn pad(&self) -> usize {
        self.pad
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn audio(&self) -> Option<Arc<Audio>> {
        self.audio.lock().upgrade()
    }

    pub(crate) fn set_audio(&self, audio: &Arc<Audio>) {
        *self.audio.lock() = Arc::downgrade(audio);
    }

    /// First recycling of the effective chain, link target's if linked.
    pub fn first_recycling(&self) -> Option<Arc<Recycling>> {
        self.effective.lock().as_ref().map(|s| s.first.clone())
    }

    /// Last recycling of the effective chain.
    pub fn last_recycling(&self) -> Option<Arc<Recycling>> {
        self.effective.lock().as_ref().map(|s| s.last.clone())
    }

    /// Effective recycling chain in linked-list order. Empty for
    /// pure-control channels.
    pub fn recycling_chain(&self) -> Vec<Arc<Recycling>> {
        match self.effective.lock().as_ref() {
            Some(span) => Recycling::collect_chain(&span.first, &span.last),
            None => Vec::new(),
        }
    }

    pub fn link(&self) -> Option<Arc<Channel>> {
        self.link.lock().upgrade()
    }

    /// Install a link to `target`, adopting its recycling chain as this
    /// channel's effective chain. Returns the replaced span `(first, last)`
    /// so callers can remap live contexts.
    ///
    /// Must only be called from the task path, never during a tick.
    pub(crate) fn set_link(
        &self,
        target: Option<&Arc<Channel>>,
    ) -> (Option<(Arc<Recycling>, Arc<Recycling>)>, Option<(Arc<Recycling>, Arc<Recycling>)>) {
        let old = self
            .effective
            .lock()
            .as_ref()
            .map(|s| (s.first.clone(), s.last.clone()));

        let new_span = match target {
            Some(target) => {
                *self.link.lock() = Arc::downgrade(target);
                target.effective.lock().clone()
            }
            None => {
                *self.link.lock() = Weak::new();
                self.own.lock().clone()
            }
        };

        let new = new_span.as_ref().map(|s| (s.first.clone(), s.last.clone()));
        *self.effective.lock() = new_span;

        (old, new)
    }

    pub fn add_recall(&self, recall: Arc<Recall>) {
        self.recalls.lock().push(recall);
    }

    pub fn remove_recall(&self, recall: &Arc<Recall>) {
        self.recalls.lock().retain(|r| !Arc::ptr_eq(r, recall));
    }

    /// Recalls attached to this channel, declaration order.
    pub fn recalls(&self) -> Vec<Arc<Recall>> {
        self.recalls.lock().clone()
    }

    /// Template recalls matching `scope`.
    pub fn templates(&self, scope: crate::context::SoundScope) -> Vec<Arc<Recall>> {
        self.recalls
            .lock()
            .iter()
            .filter(|r| r.is_template() && r.scope() == scope)
            .cloned()
            .collect()
    }
}

impl core::fmt::Debug for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("pad", &self.pad)
            .field("line", &self.line)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoundcardPresets;

    fn format() -> SignalFormat {
        SignalFormat::from_presets(&SoundcardPresets::default())
    }

    #[test]
    fn test_channel_with_recycling() {
        let channel = Channel::new(ChannelKind::Output, 0, 0, Some(format()));
        let chain = channel.recycling_chain();
        assert_eq!(chain.len(), 1);
        assert!(Arc::ptr_eq(&chain[0].channel().unwrap(), &channel));
    }

    #[test]
    fn test_pure_control_channel() {
        let channel = Channel::new(ChannelKind::Input, 0, 1, None);
        assert!(channel.first_recycling().is_none());
        assert!(channel.recycling_chain().is_empty());
    }

    #[test]
    fn test_link_adopts_target_chain() {
        let source = Channel::new(ChannelKind::Input, 0, 0, Some(format()));
        let target = Channel::new(ChannelKind::Output, 0, 0, Some(format()));

        let own_first = source.first_recycling().unwrap();
        let (old, new) = source.set_link(Some(&target));

        assert!(Arc::ptr_eq(&old.unwrap().0, &own_first));
        assert!(Arc::ptr_eq(
            &new.unwrap().0,
            &target.first_recycling().unwrap()
        ));
        assert!(Arc::ptr_eq(
            &source.first_recycling().unwrap(),
            &target.first_recycling().unwrap()
        ));
        assert!(source.link().is_some());

        // Unlink restores the channel's own chain.
        source.set_link(None);
        assert!(source.link().is_none());
        assert!(Arc::ptr_eq(&source.first_recycling().unwrap(), &own_first));
    }
}
