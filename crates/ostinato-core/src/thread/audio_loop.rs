//! The root scheduling thread.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use super::audio_thread::AudioThread;
use super::soundcard_thread::{SoundcardThread, SyncHalf};
use crate::graph::Audio;
use crate::lockfree::AtomicFlag;
use crate::system::OstinatoSystem;
use crate::tick::{self, Phase};

/// The single logical clock of the engine.
///
/// Ticks at `samplerate / buffer_size` plus the overclock margin,
/// recomputing the cadence from the presets snapshot every cycle. Each tick:
/// drain the task queue, run pre-sync device transfers, walk the graph's
/// three phases, run post-sync transfers. In the default model the loop
/// walks the whole graph itself; with super-threading enabled it
/// orchestrates one worker per audio and only keeps the phase barriers.
///
/// Lifecycle per thread: idle → start → running ticks → stop → idle. A stop
/// finishes the tick in flight, propagates stop to child threads, and only
/// then releases hardware.
pub struct AudioLoop {
    system: Arc<OstinatoSystem>,
    running: Arc<AtomicFlag>,
    handle: Mutex<Option<JoinHandle<()>>>,
    soundcard_threads: Mutex<Vec<Arc<SoundcardThread>>>,
    audio_threads: Mutex<Vec<Arc<AudioThread>>>,
    start_queue: Mutex<Vec<Arc<AudioThread>>>,
}

impl AudioLoop {
    /// Start the loop thread and the soundcard thread of the system's card.
    pub fn start(system: Arc<OstinatoSystem>) -> Arc<Self> {
        let audio_loop = Arc::new(Self {
            system: system.clone(),
            running: Arc::new(AtomicFlag::new(true)),
            handle: Mutex::new(None),
            soundcard_threads: Mutex::new(Vec::new()),
            audio_threads: Mutex::new(Vec::new()),
            start_queue: Mutex::new(Vec::new()),
        });

        audio_loop
            .soundcard_threads
            .lock()
            .push(SoundcardThread::start(system.soundcard().clone()));

        let this = audio_loop.clone();
        *audio_loop.handle.lock() = Some(
            std::thread::Builder::new()
                .name("ostinato-audio-loop".into())
                .spawn(move || this.run())
                .expect("failed to spawn audio loop"),
        );

        audio_loop
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    fn run(&self) {
        while self.running.get() {
            let started = Instant::now();

            // Mutations apply strictly between ticks.
            self.system.launcher().drain(&self.system);
            self.sync_audio_threads();

            self.transfer_half(SyncHalf::PreSync);
            self.walk_tick();
            self.transfer_half(SyncHalf::PostSync);

            self.system.bump_tick();

            // Cadence from the current presets; recomputed every cycle so a
            // preset change takes effect on the next tick.
            let interval = self.system.presets().tick_interval();
            if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }

        // Graceful teardown: children first, hardware last.
        for thread in self.audio_threads.lock().drain(..) {
            thread.stop();
        }
        for thread in self.soundcard_threads.lock().drain(..) {
            thread.stop();
        }
    }

    fn transfer_half(&self, half: SyncHalf) {
        let threads = self.soundcard_threads.lock();
        let generations: Vec<_> = threads
            .iter()
            .filter(|t| t.half() == half)
            .map(|t| (t.clone(), t.request_transfer()))
            .collect();
        drop(threads);

        for (thread, generation) in generations {
            thread.wait_done(generation);
        }
    }

    fn walk_tick(&self) {
        let audios = self.system.audios();
        let env = Arc::new(self.system.run_env());

        // Init staging always runs on the loop thread.
        tick::stage_created(&audios, &env);

        if !self.system.is_super_threaded() {
            let active = tick::collect_instances(&audios);
            tick::run_phase(&active, Phase::Pre, &env);
            tick::run_phase(&active, Phase::Inter, &env);
            tick::run_phase(&active, Phase::Post, &env);
            tick::finish_tick(&active, &env);
            return;
        }

        let threads: Vec<_> = self.audio_threads.lock().clone();
        let inline: Vec<Arc<Audio>> = audios
            .iter()
            .filter(|audio| !threads.iter().any(|t| Arc::ptr_eq(t.audio(), audio)))
            .cloned()
            .collect();

        for thread in &threads {
            thread.stage(env.clone());
        }
        let inline_units = tick::collect_instances(&inline);

        // Phase barriers across the whole tree: request every worker, run
        // the inline portion, then wait for all acks before the next phase.
        for phase in [Phase::Pre, Phase::Inter, Phase::Post] {
            let generations: Vec<_> = threads
                .iter()
                .map(|thread| thread.request_phase(phase))
                .collect();

            tick::run_phase(&inline_units, phase, &env);

            for (thread, generation) in threads.iter().zip(generations) {
                thread.wait_done(generation);
            }
        }

        let all_units = tick::collect_instances(&audios);
        tick::finish_tick(&all_units, &env);
    }

    /// Keep one audio thread per audio whose playback domain opted in.
    /// Fresh threads wait in the start queue and are spawned here, by the
    /// loop's own tick, never concurrently with one.
    fn sync_audio_threads(&self) {
        if !self.system.is_super_threaded() {
            return;
        }

        let audios = self.system.audios();
        {
            let threads = self.audio_threads.lock();
            let mut queue = self.start_queue.lock();

            for audio in &audios {
                if !audio.playback_domain().wants_any_super_threading() {
                    continue;
                }
                let known = threads
                    .iter()
                    .chain(queue.iter())
                    .any(|t| Arc::ptr_eq(t.audio(), audio));
                if !known {
                    queue.push(AudioThread::new(audio.clone()));
                }
            }
        }

        let pending: Vec<_> = self.start_queue.lock().drain(..).collect();
        let mut threads = self.audio_threads.lock();
        for thread in pending {
            thread.spawn();
            threads.push(thread);
        }

        // Audios removed from the engine take their workers with them.
        let mut removed = Vec::new();
        threads.retain(|thread| {
            let keep = audios.iter().any(|a| Arc::ptr_eq(a, thread.audio()));
            if !keep {
                removed.push(thread.clone());
            }
            keep
        });
        drop(threads);
        for thread in removed {
            thread.stop();
        }
    }

    /// Stop ticking. The current tick completes, children are stopped, then
    /// hardware is released.
    pub fn stop(&self) {
        self.running.set(false);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}
