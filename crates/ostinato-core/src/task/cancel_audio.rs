//! Cancel one running invocation of an audio.

use std::sync::Arc;

use super::Task;
use crate::context::{RecallId, RecyclingContext, SoundScope};
use crate::error::Result;
use crate::graph::Audio;
use crate::system::OstinatoSystem;

/// Drives every recall instance of one recall id to done and detaches the
/// run's recycling context from the tree.
///
/// Cancellation is cooperative: done is the only primitive, instances tear
/// down their own state and the reference counting releases the rest.
pub struct CancelAudio {
    audio: Arc<Audio>,
    recall_id: Arc<RecallId>,
}

impl CancelAudio {
    pub fn new(audio: Arc<Audio>, recall_id: Arc<RecallId>) -> Box<Self> {
        Box::new(Self { audio, recall_id })
    }
}

impl Task for CancelAudio {
    fn name(&self) -> &'static str {
        "cancel-audio"
    }

    fn scope(&self) -> Option<SoundScope> {
        Some(self.recall_id.scope())
    }

    fn execute(&self, system: &OstinatoSystem) -> Result<()> {
        let env = system.run_env();

        for instance in system.registry().instances_of(self.recall_id.id()) {
            instance.done(&env);
            instance.dispose();
        }

        // Instances spawned as children (not arena-registered) hang off the
        // graph nodes; sweep what is left on this audio.
        for recall in self.audio.recalls() {
            if Self::matches(&recall, &self.recall_id) {
                recall.done(&env);
                recall.dispose();
            }
        }
        for channel in self.audio.channels() {
            for recall in channel.recalls() {
                if Self::matches(&recall, &self.recall_id) {
                    recall.done(&env);
                    recall.dispose();
                }
            }
        }

        let context = self.recall_id.context();
        if let Some(parent) = context.parent() {
            RecyclingContext::remove_child(&parent, context);
        }
        Ok(())
    }
}

impl CancelAudio {
    fn matches(recall: &crate::recall::Recall, recall_id: &RecallId) -> bool {
        !recall.is_template()
            && recall
                .recall_id()
                .map(|id| id.id() == recall_id.id())
                .unwrap_or(false)
    }
}
