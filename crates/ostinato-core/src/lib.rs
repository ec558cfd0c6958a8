//! Engine core: the processing graph, recall lifecycle, recycling contexts,
//! task queue and tick scheduling.
//!
//! # Primary API
//!
//! - [`OstinatoSystem`] / [`OstinatoSystemBuilder`]: the engine instance
//! - [`Audio`] / [`Channel`] / [`Recycling`] / [`AudioSignal`]: the graph
//! - [`Recall`] + [`RecallBehavior`]: attachable processing units
//! - [`RecyclingContext`] / [`RecallId`]: per-voice dynamic scope
//! - [`Task`] / [`TaskCompletion`]: cross-thread mutation protocol
//! - [`AudioLoop`](thread::AudioLoop): the real-time tick engine
//!
//! # Example
//!
//! ```ignore
//! use ostinato_core::prelude::*;
//!
//! let system = OstinatoSystem::builder().build()?;
//!
//! let audio = Audio::new("track", 2, 1, 0, &system.presets());
//! system.submit(AppendAudio::new(audio.clone()));
//!
//! let (start, recall_id) = StartAudio::prepare(&audio, SoundScope::Playback);
//! system.submit(start);
//!
//! let audio_loop = AudioLoop::start(system.clone());
//! ```

pub mod config;
pub use config::{SampleFormat, SoundcardPresets, TICK_OVERCLOCK_HZ};

pub mod error;
pub use error::{Error, Result, SoundcardError};

pub(crate) mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicFloat};

pub mod port;
pub use port::{Port, PortConversion, PortScale, PortValue};

pub mod graph;
pub use graph::{
    Audio, AudioSignal, Channel, ChannelKind, GraphNode, PlaybackDomain, Recycling, SignalFormat,
};

pub mod context;
pub use context::{RecallId, RecyclingContext, SoundScope};

pub mod recall;
pub use recall::{
    NoopBehavior, PlayChannelRun, Recall, RecallBehavior, RecallDependency, RecallLevel,
    RecallRegistry, RunContext, RunEnv, StagingState, StreamChannelRun,
};

pub mod soundcard;
pub use soundcard::{
    MemorySoundcard, Soundcard, SoundcardBuffer, SoundcardCapability, DEFAULT_SUB_BLOCKS,
};

pub mod resample;
pub use resample::{LinearResampler, Resampler};

pub mod task;
pub use task::{
    AppendAudio, ApplyPresets, CallbackTask, CancelAudio, LinkChannel, ResetAudioConnection,
    ResizeAudio, StartAudio, Task, TaskCompletion, TaskLauncher, TaskState,
};

pub mod tick;
pub use tick::Phase;

pub mod system;
pub use system::{OstinatoSystem, OstinatoSystemBuilder};

pub mod thread;

#[cfg(feature = "cpal")]
pub mod output;
#[cfg(feature = "cpal")]
pub use output::CpalSoundcard;

pub mod prelude {
    //! Everything a typical embedder needs.
    pub use crate::config::{SampleFormat, SoundcardPresets};
    pub use crate::context::{RecallId, RecyclingContext, SoundScope};
    pub use crate::error::{Error, Result, SoundcardError};
    pub use crate::graph::{
        Audio, AudioSignal, Channel, ChannelKind, GraphNode, Recycling, SignalFormat,
    };
    pub use crate::port::{Port, PortConversion, PortValue};
    pub use crate::recall::{
        PlayChannelRun, Recall, RecallBehavior, RecallDependency, RecallLevel, RunContext,
        StreamChannelRun,
    };
    pub use crate::soundcard::{MemorySoundcard, Soundcard, SoundcardCapability};
    pub use crate::system::{OstinatoSystem, OstinatoSystemBuilder};
    pub use crate::task::{
        AppendAudio, ApplyPresets, CancelAudio, LinkChannel, StartAudio, Task, TaskCompletion,
    };
    pub use crate::thread::AudioLoop;

    #[cfg(feature = "cpal")]
    pub use crate::output::CpalSoundcard;
}
