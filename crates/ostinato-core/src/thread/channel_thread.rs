//! Per-channel worker thread (super-threaded mode).

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::gate::TickGate;
use super::phase_from_payload;
use crate::graph::Channel;
use crate::recall::{Recall, RunEnv};
use crate::tick;

/// Runs one channel's recall subtree for a requested phase.
///
/// The parent audio thread stages the unit list and environment between
/// ticks, then requests phases through the gate; the channel thread
/// acknowledges each phase when its portion is done.
pub struct ChannelThread {
    channel: Arc<Channel>,
    gate: Arc<TickGate>,
    handle: Mutex<Option<JoinHandle<()>>>,
    work: Mutex<Option<TickWork>>,
}

pub(crate) struct TickWork {
    pub units: Vec<Arc<Recall>>,
    pub env: Arc<RunEnv>,
}

impl ChannelThread {
    /// Create without starting the OS thread; the parent consumes its start
    /// queue and calls [`ChannelThread::spawn`].
    pub fn new(channel: Arc<Channel>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            gate: Arc::new(TickGate::new()),
            handle: Mutex::new(None),
            work: Mutex::new(None),
        })
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Start the OS thread.
    pub fn spawn(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }

        let this = self.clone();
        *handle = Some(
            std::thread::Builder::new()
                .name(format!("ostinato-channel-{}", self.channel.id()))
                .spawn(move || this.run())
                .expect("failed to spawn channel thread"),
        );
    }

    fn run(&self) {
        let mut last = 0;
        while let Some((generation, payload)) = self.gate.wait_request(last) {
            if let Some(phase) = phase_from_payload(payload) {
                let work = self.work.lock();
                if let Some(work) = work.as_ref() {
                    tick::run_phase(&work.units, phase, &work.env);
                }
            }
            self.gate.ack(generation);
            last = generation;
        }
    }

    /// Stage this tick's units. Called between ticks.
    pub fn stage(&self, units: Vec<Arc<Recall>>, env: Arc<RunEnv>) {
        *self.work.lock() = Some(TickWork { units, env });
    }

    pub fn request_phase(&self, phase: tick::Phase) -> u64 {
        self.gate.request(phase as u8)
    }

    pub fn wait_done(&self, generation: u64) {
        self.gate.wait_ack(generation);
    }

    /// Graceful stop: the thread finishes the request in flight, then exits.
    pub fn stop(&self) {
        self.gate.stop();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}
