//! Real-time DAW engine core.
//!
//! A graph of audio objects (Audio → Channel → Recycling → AudioSignal)
//! through which sample buffers flow, processed by attachable recalls,
//! driven by a deadline-scheduled thread tree in lock-step with the sound
//! hardware, and able to host native plugin instances behind a narrow call
//! contract.
//!
//! # Primary API
//!
//! - [`OstinatoEngine`] / [`OstinatoEngineBuilder`]: main entry point
//! - [`SoundScope`](core::SoundScope), recall ids and recycling contexts:
//!   per-voice dynamic scope
//! - Tasks ([`core::AppendAudio`], [`core::LinkChannel`], ...): all graph
//!   mutations, applied between ticks
//! - `PluginRecall` (feature `plugin`): host a native plugin per voice
//!
//! # Example
//!
//! ```ignore
//! use ostinato::prelude::*;
//!
//! let engine = OstinatoEngine::builder().build()?;
//!
//! let track = engine.new_audio("track", 2, 1, 0);
//! engine.append_audio(&track).wait_ready(None);
//!
//! let (recall_id, _) = engine.start_audio(&track, SoundScope::Playback);
//! ```

mod builder;
pub use builder::OstinatoEngineBuilder;

mod engine;
pub use engine::OstinatoEngine;

mod error;
pub use error::{Error, Result};

/// The engine core crate.
pub use ostinato_core as core;

#[cfg(feature = "plugin")]
/// The plugin adapter boundary crate.
pub use ostinato_plugin as plugin;

pub mod prelude {
    //! Everything a typical embedder needs.
    pub use crate::{Error, OstinatoEngine, OstinatoEngineBuilder, Result};

    pub use ostinato_core::prelude::*;

    #[cfg(feature = "plugin")]
    pub use ostinato_plugin::{
        PluginDescriptor, PluginFormat, PluginInstance, PluginPortInfo, PluginPortKind,
        PluginRecall, PluginWorker, PortBuffer,
    };
}
