//! Error type for the umbrella crate.

use thiserror::Error;

/// Engine-level error: everything a facade call can fail with.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] ostinato_core::Error),

    #[cfg(feature = "plugin")]
    #[error(transparent)]
    Plugin(#[from] ostinato_plugin::PluginError),

    #[error("Engine is live; stop the loop before offline processing")]
    LoopRunning,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
