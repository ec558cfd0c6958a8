//! Restore a channel's own recycling chain.

use std::sync::Arc;

use super::link_channel::remap_contexts;
use super::Task;
use crate::error::Result;
use crate::graph::Channel;
use crate::system::OstinatoSystem;

/// Drops a channel's link and reinstates the chain the channel owns,
/// remapping live contexts back onto it.
pub struct ResetAudioConnection {
    channel: Arc<Channel>,
}

impl ResetAudioConnection {
    pub fn new(channel: Arc<Channel>) -> Box<Self> {
        Box::new(Self { channel })
    }
}

impl Task for ResetAudioConnection {
    fn name(&self) -> &'static str {
        "reset-audio-connection"
    }

    fn execute(&self, system: &OstinatoSystem) -> Result<()> {
        let (old, new) = self.channel.set_link(None);

        if let (Some((old_first, old_last)), Some((new_first, new_last))) = (old, new) {
            remap_contexts(
                &system.root_context(),
                &old_first,
                &old_last,
                &new_first,
                &new_last,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoundcardPresets;
    use crate::graph::Audio;
    use crate::task::LinkChannel;

    #[test]
    fn test_reset_restores_own_chain() {
        let system = OstinatoSystem::builder().build().unwrap();
        let presets = SoundcardPresets::default();

        let a = Audio::new("a", 1, 1, 1, &presets);
        let b = Audio::new("b", 1, 1, 0, &presets);
        system.add_audio(a.clone());
        system.add_audio(b.clone());

        let input = a.input_channel(0, 0).unwrap();
        let own = input.first_recycling().unwrap();

        system.submit(LinkChannel::new(
            input.clone(),
            b.output_channel(0, 0).unwrap(),
        ));
        system.process_ticks(1);
        assert!(!Arc::ptr_eq(&input.first_recycling().unwrap(), &own));

        system.submit(ResetAudioConnection::new(input.clone()));
        system.process_ticks(1);
        assert!(Arc::ptr_eq(&input.first_recycling().unwrap(), &own));
        assert!(input.link().is_none());
    }
}
