//! The deadline-scheduled thread tree.
//!
//! AudioLoop is the root clock; SoundcardThread wraps each hardware device;
//! AudioThread/ChannelThread are the opt-in super-threaded tiers. Parents
//! and children synchronize through [`TickGate`] request/ack generations
//! instead of blocking condition waits on every tick.

pub mod audio_loop;
pub mod audio_thread;
pub mod channel_thread;
pub mod gate;
pub mod soundcard_thread;

pub use audio_loop::AudioLoop;
pub use audio_thread::AudioThread;
pub use channel_thread::ChannelThread;
pub use gate::TickGate;
pub use soundcard_thread::{SoundcardThread, SyncHalf};

use crate::tick::Phase;

/// Decode a gate payload into a tick phase.
pub(crate) fn phase_from_payload(payload: u8) -> Option<Phase> {
    match payload {
        0 => Some(Phase::Pre),
        1 => Some(Phase::Inter),
        2 => Some(Phase::Post),
        _ => None,
    }
}
