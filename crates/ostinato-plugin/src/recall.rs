//! The recall behavior hosting one native plugin per voice.

use std::sync::Arc;

use ostinato_core::recall::{RecallBehavior, RunContext};
use ostinato_core::{AudioSignal, Recycling};

use crate::adapter::{PluginDescriptor, PluginFormat, PluginInstance, PluginPortKind, PortBuffer};

/// Channel-run recall that instantiates a plugin for its voice and runs it
/// once per tick over the voice's signal, between signal generation (pre)
/// and output mixing (post).
///
/// Instantiation happens in `run_init_inter`: instantiate, connect every
/// audio port and every control port (recall ports mirrored to plugin
/// controls via their port index), activate. A failure is reported once
/// through the warning channel and the instance is forced to done rather
/// than retried.
pub struct PluginRecall {
    format: Arc<dyn PluginFormat>,
    descriptor: Arc<PluginDescriptor>,
    instance: Option<Box<dyn PluginInstance>>,
    input: Option<PortBuffer>,
    output: Option<PortBuffer>,
    controls: Vec<(u32, PortBuffer)>,
    failed: bool,
}

impl PluginRecall {
    pub fn new(format: Arc<dyn PluginFormat>, descriptor: Arc<PluginDescriptor>) -> Self {
        Self {
            format,
            descriptor,
            instance: None,
            input: None,
            output: None,
            controls: Vec::new(),
            failed: false,
        }
    }

    fn fail(&mut self, ctx: &RunContext<'_>, stage: &str, reason: &str) {
        if ctx.recall.warn_once() {
            tracing::warn!(
                plugin = %self.descriptor.name,
                stage,
                reason,
                "plugin setup failed, forcing recall to done"
            );
        }
        self.instance = None;
        self.failed = true;
    }

    /// Find the signal this voice owns on its channel.
    fn voice_signal(ctx: &RunContext<'_>) -> Option<(Arc<Recycling>, Arc<AudioSignal>)> {
        let channel = ctx.node.as_channel()?;
        let recall_id = ctx.recall.recall_id()?;

        for recycling in channel.recycling_chain() {
            if recall_id.context().find(&recycling).is_none() {
                continue;
            }
            if let Some(signal) = recycling.find_signal(&recall_id) {
                return Some((recycling, signal));
            }
        }
        None
    }
}

impl RecallBehavior for PluginRecall {
    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(PluginRecall::new(
            self.format.clone(),
            self.descriptor.clone(),
        ))
    }

    fn run_init_inter(&mut self, ctx: &RunContext<'_>) {
        let samplerate = ctx.env.presets.samplerate;
        let frames = ctx.env.presets.buffer_size;

        let mut instance = match self.format.instantiate(&self.descriptor, samplerate) {
            Ok(instance) => instance,
            Err(error) => {
                let reason = error.to_string();
                self.fail(ctx, "instantiate", &reason);
                return;
            }
        };

        let input = PortBuffer::audio(frames);
        let output = PortBuffer::audio(frames);

        for port in self.descriptor.ports.clone() {
            let result = match port.kind {
                PluginPortKind::AudioInput => instance.connect_port(port.index, input.clone()),
                PluginPortKind::AudioOutput => instance.connect_port(port.index, output.clone()),
                PluginPortKind::ControlInput | PluginPortKind::ControlOutput => {
                    // Mirror a recall port when one names this control index,
                    // otherwise connect the descriptor default.
                    let value = ctx
                        .recall
                        .ports()
                        .iter()
                        .find(|p| p.plugin_port() == Some(port.index))
                        .and_then(|p| p.safe_read_float().ok())
                        .unwrap_or(port.default);
                    let buffer = PortBuffer::control(value);
                    let result = instance.connect_port(port.index, buffer.clone());
                    if result.is_ok() && port.kind == PluginPortKind::ControlInput {
                        self.controls.push((port.index, buffer));
                    }
                    result
                }
            };
            if let Err(error) = result {
                let reason = error.to_string();
                self.fail(ctx, "connect_port", &reason);
                return;
            }
        }

        if let Err(error) = instance.activate() {
            let reason = error.to_string();
            self.fail(ctx, "activate", &reason);
            return;
        }

        self.input = Some(input);
        self.output = Some(output);
        self.instance = Some(instance);
    }

    fn run_inter(&mut self, ctx: &RunContext<'_>) {
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        let (Some(input), Some(output)) = (self.input.as_ref(), self.output.as_ref()) else {
            return;
        };
        let Some((_, signal)) = Self::voice_signal(ctx) else {
            return;
        };

        // Marshal current control values from the mirrored recall ports.
        for (index, buffer) in &self.controls {
            if let Some(port) = ctx
                .recall
                .ports()
                .iter()
                .find(|p| p.plugin_port() == Some(*index))
            {
                if let Ok(value) = port.safe_read_float() {
                    buffer.set(value);
                }
            }
        }

        let frames = ctx.env.presets.buffer_size;
        signal.process_front(|samples| {
            input.write(samples);
            instance.run(frames);
            let processed = output.read();
            let len = samples.len().min(processed.len());
            samples[..len].copy_from_slice(&processed[..len]);
        });
    }

    fn is_finished(&self, _ctx: &RunContext<'_>) -> bool {
        self.failed
    }

    fn done(&mut self, _ctx: &RunContext<'_>) {
        if let Some(mut instance) = self.instance.take() {
            instance.deactivate();
            instance.cleanup();
        }
        self.input = None;
        self.output = None;
        self.controls.clear();
    }
}
