//! The recall capability set and the per-tick run context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::registry::RecallRegistry;
use super::Recall;
use crate::config::SoundcardPresets;
use crate::graph::GraphNode;
use crate::port::Port;
use crate::soundcard::Soundcard;

/// Per-tick environment shared by every staged recall: presets, the target
/// soundcard, the instance arena and the phase sequence counter that makes
/// the pre/inter/post ordering observable.
pub struct RunEnv {
    pub presets: SoundcardPresets,
    pub soundcard: Option<Arc<dyn Soundcard>>,
    pub registry: Arc<RecallRegistry>,
    pub tick: u64,
    sequence: AtomicU64,
}

impl RunEnv {
    pub fn new(
        presets: SoundcardPresets,
        soundcard: Option<Arc<dyn Soundcard>>,
        registry: Arc<RecallRegistry>,
        tick: u64,
    ) -> Self {
        Self {
            presets,
            soundcard,
            registry,
            tick,
            sequence: AtomicU64::new(0),
        }
    }

    /// Monotonic within one tick; every phase call that wants to be ordered
    /// against others draws from this.
    #[inline]
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

/// What one behavior invocation sees: its recall, the graph node the recall
/// is attached to, and the tick environment.
pub struct RunContext<'a> {
    pub recall: &'a Arc<Recall>,
    pub node: GraphNode,
    pub env: &'a RunEnv,
}

impl<'a> RunContext<'a> {
    #[inline]
    pub fn next_sequence(&self) -> u64 {
        self.env.next_sequence()
    }

    /// Resolved dependency instance at `index`, re-resolving through the
    /// arena when the stored reference went away. `None` degrades the phase
    /// to a no-op, never an error.
    pub fn dependency(&self, index: usize) -> Option<Arc<Recall>> {
        self.recall.resolved_dependency(index, &self.env.registry)
    }

    /// Port of the owning recall by name.
    pub fn port(&self, name: &str) -> Option<Arc<Port>> {
        self.recall.port(name)
    }
}

/// The behavior a recall level implements: the init stages, the steady-state
/// phases and teardown. One object per template; instances get their own via
/// [`RecallBehavior::duplicate`].
///
/// Phase methods run on the scheduling threads and must not block; anything
/// blocking hands off to a worker and resumes on a later tick. All methods
/// default to no-ops so a behavior only spells out the stages it uses.
pub trait RecallBehavior: Send {
    /// Fresh behavior state for a duplicated instance.
    fn duplicate(&self) -> Box<dyn RecallBehavior>;

    fn run_init_pre(&mut self, _ctx: &RunContext<'_>) {}
    fn run_init_inter(&mut self, _ctx: &RunContext<'_>) {}
    fn run_init_post(&mut self, _ctx: &RunContext<'_>) {}

    fn run_pre(&mut self, _ctx: &RunContext<'_>) {}
    fn run_inter(&mut self, _ctx: &RunContext<'_>) {}
    fn run_post(&mut self, _ctx: &RunContext<'_>) {}

    /// Cooperative completion check, polled once per tick after the post
    /// phase. Returning true asks the lifecycle to drive this instance to
    /// done.
    fn is_finished(&self, _ctx: &RunContext<'_>) -> bool {
        false
    }

    /// Teardown. Runs exactly once.
    fn done(&mut self, _ctx: &RunContext<'_>) {}
}

/// A behavior with no processing of its own; templates that only carry ports
/// and configuration use this.
#[derive(Default)]
pub struct NoopBehavior;

impl RecallBehavior for NoopBehavior {
    fn duplicate(&self) -> Box<dyn RecallBehavior> {
        Box::new(NoopBehavior)
    }
}
