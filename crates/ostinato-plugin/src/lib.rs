//! Native plugin adapter boundary for the engine.
//!
//! Format loaders stay outside; this crate fixes the call contract
//! ([`PluginInstance`], [`PluginFormat`]), the staged load error taxonomy
//! ([`PluginError`]), the polled worker for blocking work
//! ([`PluginWorker`]), and the recall behavior ([`PluginRecall`]) that
//! drives a hosted plugin once per tick inside the staging lifecycle.

pub mod adapter;
pub use adapter::{
    PluginDescriptor, PluginFormat, PluginInstance, PluginPortInfo, PluginPortKind, PortBuffer,
};

pub mod error;
pub use error::{LoadStage, PluginError, Result};

pub mod recall;
pub use recall::PluginRecall;

pub mod worker;
pub use worker::{PluginWorker, WorkHandler};
