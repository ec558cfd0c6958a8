//! Start one playback/sequencer/notation/wave run of an audio.

use std::sync::Arc;

use super::Task;
use crate::context::{RecallId, RecyclingContext, SoundScope};
use crate::error::Result;
use crate::graph::{Audio, GraphNode};
use crate::recall::Recall;
use crate::system::OstinatoSystem;

/// Duplicates the audio's matching templates against a fresh recall id,
/// giving the run its own recycling context under the toplevel.
///
/// The recall id is created up front so the caller can hold on to it for
/// cancellation; the graph mutation itself still happens between ticks.
pub struct StartAudio {
    audio: Arc<Audio>,
    recall_id: Arc<RecallId>,
}

impl StartAudio {
    /// Build the task and the recall id of the run it will start.
    pub fn prepare(audio: &Arc<Audio>, scope: SoundScope) -> (Box<Self>, Arc<RecallId>) {
        let slots = audio
            .channels()
            .iter()
            .filter_map(|channel| channel.first_recycling())
            .collect();
        let context = RecyclingContext::with_slots(slots);
        let recall_id = RecallId::new(context, scope);

        (
            Box::new(Self {
                audio: audio.clone(),
                recall_id: recall_id.clone(),
            }),
            recall_id,
        )
    }
}

impl Task for StartAudio {
    fn name(&self) -> &'static str {
        "start-audio"
    }

    fn scope(&self) -> Option<SoundScope> {
        Some(self.recall_id.scope())
    }

    fn execute(&self, system: &OstinatoSystem) -> Result<()> {
        let scope = self.recall_id.scope();
        let registry = system.registry();

        RecyclingContext::add_child(&system.root_context(), self.recall_id.context());

        for template in self.audio.templates(scope) {
            let instance = Recall::duplicate(&template, &self.recall_id, &registry);
            instance.attach(GraphNode::Audio(self.audio.clone()));
            self.audio.add_recall(instance);
        }

        for channel in self.audio.channels() {
            for template in channel.templates(scope) {
                let instance = Recall::duplicate(&template, &self.recall_id, &registry);
                instance.attach(GraphNode::Channel(channel.clone()));
                channel.add_recall(instance);
            }
        }

        Ok(())
    }
}
