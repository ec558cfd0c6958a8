//! Per-audio worker thread (super-threaded mode).

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::channel_thread::ChannelThread;
use super::gate::TickGate;
use super::phase_from_payload;
use crate::graph::Audio;
use crate::recall::{Recall, RunEnv};
use crate::tick::{self, Phase};

/// Runs one audio's portion of the graph for each requested phase.
///
/// With channel threads enabled on the audio's playback domain, the audio
/// thread fans each phase out to one worker per channel and only reports its
/// own ack after every channel worker acknowledged: the sync barrier of the
/// tier. Channel workers created between ticks wait in a start queue the
/// audio thread consumes at the top of its next tick, never mid-flight.
pub struct AudioThread {
    audio: Arc<Audio>,
    gate: Arc<TickGate>,
    handle: Mutex<Option<JoinHandle<()>>>,
    own_units: Mutex<Vec<Arc<Recall>>>,
    env: Mutex<Option<Arc<RunEnv>>>,
    channel_threads: Mutex<Vec<Arc<ChannelThread>>>,
    start_queue: Mutex<Vec<Arc<ChannelThread>>>,
}

impl AudioThread {
    /// Create without starting the OS thread; the audio loop consumes its
    /// start queue and calls [`AudioThread::spawn`].
    pub fn new(audio: Arc<Audio>) -> Arc<Self> {
        Arc::new(Self {
            audio,
            gate: Arc::new(TickGate::new()),
            handle: Mutex::new(None),
            own_units: Mutex::new(Vec::new()),
            env: Mutex::new(None),
            channel_threads: Mutex::new(Vec::new()),
            start_queue: Mutex::new(Vec::new()),
        })
    }

    pub fn audio(&self) -> &Arc<Audio> {
        &self.audio
    }

    pub fn spawn(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }

        let this = self.clone();
        *handle = Some(
            std::thread::Builder::new()
                .name(format!("ostinato-audio-{}", self.audio.id()))
                .spawn(move || this.run())
                .expect("failed to spawn audio thread"),
        );
    }

    /// Stage this tick's work. Called by the audio loop between ticks:
    /// audio-level units stay on this thread, channel subtrees go to channel
    /// workers when the playback domain asks for them.
    pub fn stage(&self, env: Arc<RunEnv>) {
        let channel_tier = self.audio.playback_domain().wants_channel_threads();

        if channel_tier {
            let threads = self.channel_threads.lock();
            let mut queue = self.start_queue.lock();

            for channel in self.audio.channels() {
                let known = threads
                    .iter()
                    .chain(queue.iter())
                    .any(|t| Arc::ptr_eq(t.channel(), &channel));
                if !known {
                    queue.push(ChannelThread::new(channel));
                }
            }
            for thread in threads.iter().chain(queue.iter()) {
                thread.stage(
                    tick::collect_channel_instances(thread.channel()),
                    env.clone(),
                );
            }

            *self.own_units.lock() = tick::collect_audio_level_instances(&self.audio);
        } else {
            *self.own_units.lock() = tick::collect_audio_instances(&self.audio);
        }

        *self.env.lock() = Some(env);
    }

    fn run(&self) {
        let mut last = 0;
        while let Some((generation, payload)) = self.gate.wait_request(last) {
            if let Some(phase) = phase_from_payload(payload) {
                // New channel workers start at the top of this thread's own
                // tick, never while a phase round is in flight.
                if phase == Phase::Pre {
                    let pending: Vec<_> = self.start_queue.lock().drain(..).collect();
                    if !pending.is_empty() {
                        let mut threads = self.channel_threads.lock();
                        for thread in pending {
                            thread.spawn();
                            threads.push(thread);
                        }
                    }
                }

                if let Some(env) = self.env.lock().clone() {
                    let children: Vec<_> = self.channel_threads.lock().clone();
                    let generations: Vec<_> = children
                        .iter()
                        .map(|t| t.request_phase(phase))
                        .collect();

                    tick::run_phase(&self.own_units.lock(), phase, &env);

                    // Barrier: every channel worker reports done before this
                    // thread acks upward.
                    for (thread, generation) in children.iter().zip(generations) {
                        thread.wait_done(generation);
                    }
                }
            }
            self.gate.ack(generation);
            last = generation;
        }

        // Stop propagates downward before this thread exits.
        for thread in self.channel_threads.lock().iter() {
            thread.stop();
        }
    }

    pub fn request_phase(&self, phase: Phase) -> u64 {
        self.gate.request(phase as u8)
    }

    pub fn wait_done(&self, generation: u64) {
        self.gate.wait_ack(generation);
    }

    /// Graceful stop: finish the phase in flight, stop children, exit.
    pub fn stop(&self) {
        self.gate.stop();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}
