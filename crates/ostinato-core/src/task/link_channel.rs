//! Link two channels: patch-cable routing applied between ticks.

use std::sync::Arc;

use super::Task;
use crate::context::RecyclingContext;
use crate::error::Result;
use crate::graph::{Channel, Recycling};
use crate::system::OstinatoSystem;

/// Installs (or replaces) a channel's link to another channel, remapping the
/// recycling slots of every live context that referenced the replaced chain.
///
/// Never runs mid-tick: the task queue guarantees the current tick's post
/// phase has completed.
pub struct LinkChannel {
    channel: Arc<Channel>,
    target: Option<Arc<Channel>>,
}

impl LinkChannel {
    pub fn new(channel: Arc<Channel>, target: Arc<Channel>) -> Box<Self> {
        Box::new(Self {
            channel,
            target: Some(target),
        })
    }

    pub fn unlink(channel: Arc<Channel>) -> Box<Self> {
        Box::new(Self {
            channel,
            target: None,
        })
    }
}

impl Task for LinkChannel {
    fn name(&self) -> &'static str {
        "link-channel"
    }

    fn execute(&self, system: &OstinatoSystem) -> Result<()> {
        let (old, new) = self.channel.set_link(self.target.as_ref());

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

/// Depth-first remap: every context in the tree whose slots hold the old
/// chain gets the replacement spliced in. Contexts over other leaves keep
/// their slots untouched.
pub(crate) fn remap_contexts(
    context: &Arc<RecyclingContext>,
    old_first: &Arc<Recycling>,
    old_last: &Arc<Recycling>,
    new_first: &Arc<Recycling>,
    new_last: &Arc<Recycling>,
) {
    if context.find(old_first).is_some() {
        context.reset_recycling(Some(old_first), Some(old_last), new_first, new_last);
    }
    for child in context.children() {
        remap_contexts(&child, old_first, old_last, new_first, new_last);
    }
}
