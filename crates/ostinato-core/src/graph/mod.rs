//! The processing graph: Audio → Channel → Recycling → AudioSignal.

pub mod audio;
pub mod audio_signal;
pub mod channel;
pub mod recycling;

pub use audio::{Audio, PlaybackDomain};
pub use audio_signal::{AudioSignal, SignalFormat};
pub use channel::{Channel, ChannelKind};
pub use recycling::Recycling;

use std::sync::Arc;

/// The graph node a recall is attached to.
#[derive(Clone)]
pub enum GraphNode {
    Audio(Arc<Audio>),
    Channel(Arc<Channel>),
    Recycling(Arc<Recycling>),
    AudioSignal(Arc<AudioSignal>),
}

impl GraphNode {
    pub fn as_audio(&self) -> Option<&Arc<Audio>> {
        match self {
            GraphNode::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&Arc<Channel>> {
        match self {
            GraphNode::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn as_recycling(&self) -> Option<&Arc<Recycling>> {
        match self {
            GraphNode::Recycling(recycling) => Some(recycling),
            _ => None,
        }
    }

    pub fn as_audio_signal(&self) -> Option<&Arc<AudioSignal>> {
        match self {
            GraphNode::AudioSignal(signal) => Some(signal),
            _ => None,
        }
    }
}

impl core::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GraphNode::Audio(a) => write!(f, "GraphNode::Audio({})", a.id()),
            GraphNode::Channel(c) => write!(f, "GraphNode::Channel({})", c.id()),
            GraphNode::Recycling(r) => write!(f, "GraphNode::Recycling({})", r.id()),
            GraphNode::AudioSignal(s) => write!(f, "GraphNode::AudioSignal({})", s.id()),
        }
    }
}
