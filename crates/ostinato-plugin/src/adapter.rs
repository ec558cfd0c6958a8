//! The uniform call contract to native plugin instances.
//!
//! Format loaders (LADSPA, LV2, VST3) live outside this crate; whatever they
//! load must come back as a [`PluginInstance`] honoring the fixed sequence
//! the hosting recall drives: `instantiate` once, `connect_port` for every
//! used port, `activate` once, `run` once per tick, `deactivate`/`cleanup`
//! at teardown.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Direction/kind of one plugin port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginPortKind {
    ControlInput,
    ControlOutput,
    AudioInput,
    AudioOutput,
}

/// Static description of one plugin port.
#[derive(Debug, Clone)]
pub struct PluginPortInfo {
    pub index: u32,
    pub name: String,
    pub kind: PluginPortKind,
    pub default: f32,
}

/// What a format loader reports about a plugin before instantiation.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub path: Option<PathBuf>,
    pub ports: Vec<PluginPortInfo>,
}

impl PluginDescriptor {
    pub fn port(&self, index: u32) -> Option<&PluginPortInfo> {
        self.ports.iter().find(|p| p.index == index)
    }

    pub fn ports_of_kind(&self, kind: PluginPortKind) -> impl Iterator<Item = &PluginPortInfo> {
        self.ports.iter().filter(move |p| p.kind == kind)
    }
}

/// Shared sample cell a plugin port is connected to: length 1 for control
/// ports, one tick's frames for audio ports. The host writes inputs before
/// `run` and reads outputs after; the instance keeps its clone for the
/// lifetime of the connection.
#[derive(Clone)]
pub struct PortBuffer {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl PortBuffer {
    pub fn control(value: f32) -> Self {
        Self {
            samples: Arc::new(Mutex::new(vec![value])),
        }
    }

    pub fn audio(frames: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(vec![0.0; frames])),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set(&self, value: f32) {
        if let Some(first) = self.samples.lock().first_mut() {
            *first = value;
        }
    }

    pub fn get(&self) -> f32 {
        self.samples.lock().first().copied().unwrap_or(0.0)
    }

    pub fn write(&self, samples: &[f32]) {
        let mut guard = self.samples.lock();
        let len = guard.len().min(samples.len());
        guard[..len].copy_from_slice(&samples[..len]);
    }

    pub fn read(&self) -> Vec<f32> {
        self.samples.lock().clone()
    }

    /// Lock the cell for the duration of one `run`.
    pub fn with<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        f(&mut self.samples.lock())
    }
}

/// One live native plugin.
pub trait PluginInstance: Send {
    fn connect_port(&mut self, index: u32, buffer: PortBuffer) -> Result<()>;

    fn activate(&mut self) -> Result<()>;

    /// Process `frames` frames from the connected input buffers into the
    /// connected output buffers. Real-time safe: no blocking, no allocation.
    fn run(&mut self, frames: usize);

    fn deactivate(&mut self);

    fn cleanup(&mut self);
}

/// A format loader: turns a descriptor into live instances.
pub trait PluginFormat: Send + Sync {
    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        samplerate: u32,
    ) -> Result<Box<dyn PluginInstance>>;
}

#[cfg(test)]
pub(crate) mod stub {
    //! In-process gain plugin used by the crate's tests.

    use super::*;
    use crate::error::{LoadStage, PluginError};
    use std::collections::HashMap;

    pub fn gain_descriptor() -> PluginDescriptor {
        PluginDescriptor {
            name: "stub-gain".into(),
            path: None,
            ports: vec![
                PluginPortInfo {
                    index: 0,
                    name: "gain".into(),
                    kind: PluginPortKind::ControlInput,
                    default: 1.0,
                },
                PluginPortInfo {
                    index: 1,
                    name: "in".into(),
                    kind: PluginPortKind::AudioInput,
                    default: 0.0,
                },
                PluginPortInfo {
                    index: 2,
                    name: "out".into(),
                    kind: PluginPortKind::AudioOutput,
                    default: 0.0,
                },
            ],
        }
    }

    #[derive(Default)]
    pub struct StubGainFormat {
        pub fail_instantiate: bool,
    }

    impl PluginFormat for StubGainFormat {
        fn instantiate(
            &self,
            descriptor: &PluginDescriptor,
            _samplerate: u32,
        ) -> Result<Box<dyn PluginInstance>> {
            if self.fail_instantiate {
                return Err(PluginError::LoadFailed {
                    path: descriptor.path.clone().unwrap_or_default(),
                    stage: LoadStage::Instantiation,
                    reason: "scripted failure".into(),
                });
            }
            Ok(Box::new(StubGain {
                connections: HashMap::new(),
                active: false,
            }))
        }
    }

    pub struct StubGain {
        connections: HashMap<u32, PortBuffer>,
        active: bool,
    }

    impl PluginInstance for StubGain {
        fn connect_port(&mut self, index: u32, buffer: PortBuffer) -> Result<()> {
            if index > 2 {
                return Err(PluginError::UnknownPort(index));
            }
            self.connections.insert(index, buffer);
            Ok(())
        }

        fn activate(&mut self) -> Result<()> {
            self.active = true;
            Ok(())
        }

        fn run(&mut self, frames: usize) {
            if !self.active {
                return;
            }
            let gain = self.connections.get(&0).map(|b| b.get()).unwrap_or(1.0);
            let input = match self.connections.get(&1) {
                Some(buffer) => buffer.read(),
                None => return,
            };
            if let Some(output) = self.connections.get(&2) {
                output.with(|out| {
                    for (o, i) in out.iter_mut().zip(input.iter()).take(frames) {
                        *o = i * gain;
                    }
                });
            }
        }

        fn deactivate(&mut self) {
            self.active = false;
        }

        fn cleanup(&mut self) {
            self.connections.clear();
        }
    }
}
