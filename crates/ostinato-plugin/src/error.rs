//! Error types for the plugin boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Where in the load/instantiate sequence a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Scanning,
    Opening,
    Instantiation,
    Connection,
    Activation,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Scanning => write!(f, "scanning"),
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Connection => write!(f, "connecting ports"),
            LoadStage::Activation => write!(f, "activating"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin load failed at {stage} stage: {path}\n  Reason: {reason}")]
    LoadFailed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("Plugin failed at {stage}: {reason}")]
    InstanceError { stage: LoadStage, reason: String },

    #[error("Unknown port index: {0}")]
    UnknownPort(u32),

    #[error("Port {index} is {actual}, expected {expected}")]
    PortKindMismatch {
        index: u32,
        actual: &'static str,
        expected: &'static str,
    },

    #[error("Worker is shut down")]
    WorkerShutDown,
}

pub type Result<T> = std::result::Result<T, PluginError>;
