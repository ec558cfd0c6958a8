//! Tasks: the cross-thread mutation protocol.
//!
//! Producer threads (UI, protocol handlers) never take graph locks; they
//! queue a task and the scheduling thread that owns the affected subgraph
//! applies it strictly between two ticks. A group of tasks submitted
//! together is applied atomically between the same two ticks. Each
//! submission is paired 1:1 with a [`TaskCompletion`] the producer can block
//! on or poll.

pub mod append_audio;
pub mod apply_presets;
pub mod cancel_audio;
pub mod link_channel;
pub mod reset_audio_connection;
pub mod resize_audio;
pub mod start_audio;

pub use append_audio::AppendAudio;
pub use apply_presets::ApplyPresets;
pub use cancel_audio::CancelAudio;
pub use link_channel::LinkChannel;
pub use reset_audio_connection::ResetAudioConnection;
pub use resize_audio::ResizeAudio;
pub use start_audio::StartAudio;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::context::SoundScope;
use crate::error::Result;
use crate::system::OstinatoSystem;

/// A single named mutation request.
pub trait Task: Send {
    fn name(&self) -> &'static str;

    /// Sound scope the mutation affects, if scoped.
    fn scope(&self) -> Option<SoundScope> {
        None
    }

    /// Apply the mutation. Runs on the scheduling thread between ticks, with
    /// no tick traversal in flight.
    fn execute(&self, system: &OstinatoSystem) -> Result<()>;
}

/// Lifecycle of one queued submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Queued = 0,
    Busy = 1,
    Ready = 2,
    Completed = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TaskState::Busy,
            2 => TaskState::Ready,
            3 => TaskState::Completed,
            _ => TaskState::Queued,
        }
    }
}

/// Completion notification paired with one submission.
///
/// The scheduling thread drives `queued → busy → ready`; a caller that needs
/// synchronous confirmation blocks on ready, asynchronous callers poll.
/// `complete()` is the caller's acknowledgement.
pub struct TaskCompletion {
    state: AtomicU8,
    lock: Mutex<()>,
    cond: Condvar,
}

impl TaskCompletion {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(TaskState::Queued as u8),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        })
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), TaskState::Ready | TaskState::Completed)
    }

    fn advance(&self, state: TaskState) {
        let _guard = self.lock.lock();
        self.state.store(state as u8, Ordering::Release);
        self.cond.notify_all();
    }

    /// Block until the mutation has taken effect. Returns false on timeout.
    pub fn wait_ready(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.lock.lock();
        loop {
            if self.is_ready() {
                return true;
            }
            match timeout {
                Some(timeout) => {
                    if self
                        .cond
                        .wait_for(&mut guard, timeout)
                        .timed_out()
                    {
                        return self.is_ready();
                    }
                }
                None => self.cond.wait(&mut guard),
            }
        }
    }

    /// Caller acknowledgement after observing ready.
    pub fn complete(&self) {
        if self.is_ready() {
            self.advance(TaskState::Completed);
        }
    }
}

struct QueuedGroup {
    tasks: Vec<Box<dyn Task>>,
    completion: Arc<TaskCompletion>,
}

/// The task queue owned by a scheduling thread.
///
/// Submission is lock-free for producers; the owning thread drains between
/// tick phases, never mid-phase.
pub struct TaskLauncher {
    tx: Sender<QueuedGroup>,
    rx: Receiver<QueuedGroup>,
}

impl TaskLauncher {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Queue one task.
    pub fn submit(&self, task: Box<dyn Task>) -> Arc<TaskCompletion> {
        self.submit_group(vec![task])
    }

    /// Queue an ordered multi-step mutation, applied atomically between the
    /// same two ticks.
    pub fn submit_group(&self, tasks: Vec<Box<dyn Task>>) -> Arc<TaskCompletion> {
        let completion = TaskCompletion::new();
        let _ = self.tx.send(QueuedGroup {
            tasks,
            completion: completion.clone(),
        });
        completion
    }

    /// Apply everything queued so far. Called by the owning scheduling
    /// thread between ticks.
    pub fn drain(&self, system: &OstinatoSystem) {
        while let Ok(group) = self.rx.try_recv() {
            group.completion.advance(TaskState::Busy);

            for task in &group.tasks {
                if let Err(error) = task.execute(system) {
                    // Abort the enclosing group, never the engine.
                    tracing::warn!(task = task.name(), %error, "task failed");
                    break;
                }
            }

            group.completion.advance(TaskState::Ready);
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for TaskLauncher {
    fn default() -> Self {
        Self::new()
    }
}

/// Task from a closure; protocol handlers and tests use this for one-off
/// mutations that do not warrant a named type.
pub struct CallbackTask<F> {
    name: &'static str,
    callback: F,
}

impl<F> CallbackTask<F>
where
    F: Fn(&OstinatoSystem) -> Result<()> + Send,
{
    pub fn new(name: &'static str, callback: F) -> Box<Self> {
        Box::new(Self { name, callback })
    }
}

impl<F> Task for CallbackTask<F>
where
    F: Fn(&OstinatoSystem) -> Result<()> + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(&self, system: &OstinatoSystem) -> Result<()> {
        (self.callback)(system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::OstinatoSystem;

    #[test]
    fn test_completion_states() {
        let completion = TaskCompletion::new();
        assert_eq!(completion.state(), TaskState::Queued);
        assert!(!completion.is_ready());

        completion.advance(TaskState::Busy);
        assert_eq!(completion.state(), TaskState::Busy);

        completion.advance(TaskState::Ready);
        assert!(completion.is_ready());
        assert!(completion.wait_ready(None));

        completion.complete();
        assert_eq!(completion.state(), TaskState::Completed);
    }

    #[test]
    fn test_complete_before_ready_is_noop() {
        let completion = TaskCompletion::new();
        completion.complete();
        assert_eq!(completion.state(), TaskState::Queued);
    }

    #[test]
    fn test_drain_applies_in_submission_order() {
        let system = OstinatoSystem::builder().build().unwrap();
        let launcher = TaskLauncher::new();

        let first = launcher.submit(CallbackTask::new("first", |_| Ok(())));
        let second = launcher.submit(CallbackTask::new("second", |_| Ok(())));
        assert_eq!(launcher.pending(), 2);

        launcher.drain(&system);
        assert!(first.is_ready());
        assert!(second.is_ready());
        assert_eq!(launcher.pending(), 0);
    }

    #[test]
    fn test_failed_task_aborts_group_not_engine() {
        let system = OstinatoSystem::builder().build().unwrap();
        let launcher = TaskLauncher::new();

        let completion = launcher.submit_group(vec![
            CallbackTask::new("fails", |_| {
                Err(crate::error::Error::TaskRejected("nope".into()))
            }),
            CallbackTask::new("skipped", |_| panic!("must not run")),
        ]);
        launcher.drain(&system);

        // The group still reaches ready; later groups are unaffected.
        assert!(completion.is_ready());
        let after = launcher.submit(CallbackTask::new("after", |_| Ok(())));
        launcher.drain(&system);
        assert!(after.is_ready());
    }

    #[test]
    fn test_wait_ready_blocks_until_drain() {
        let system = OstinatoSystem::builder().build().unwrap();
        let launcher = Arc::new(TaskLauncher::new());

        let completion = launcher.submit(CallbackTask::new("slow", |_| Ok(())));
        assert!(!completion.wait_ready(Some(Duration::from_millis(10))));

        launcher.drain(&system);
        assert!(completion.wait_ready(Some(Duration::from_millis(100))));
    }
}
