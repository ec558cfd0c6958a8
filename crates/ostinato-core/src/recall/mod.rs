//! Recalls: attachable processing units and their staging lifecycle.
//!
//! A recall exists in one of two roles. A *template* is persistent
//! configuration: it owns ports, names its dependencies, and lives as long
//! as its graph node. An *instance* is produced by duplicating a template
//! against one recall id and processes samples for exactly one logical
//! invocation:
//!
//! `created → resolve_dependency → run_init_pre → run_init_inter →
//!  run_init_post → {run_pre → run_inter → run_post}* → done → disposed`
//!
//! Phases never block and never error; a missing dependency degrades the
//! phase to a no-op. `done` is cooperative, idempotent, and the only
//! cancellation primitive.

pub mod behavior;
pub mod play;
pub mod registry;
pub mod stream;

pub use behavior::{NoopBehavior, RecallBehavior, RunContext, RunEnv};
pub use play::PlayChannelRun;
pub use registry::RecallRegistry;
pub use stream::StreamChannelRun;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::context::{RecallId, SoundScope};
use crate::graph::GraphNode;
use crate::lockfree::{AtomicFlag, IdSource};
use crate::port::Port;

static RECALL_OBJECT_IDS: IdSource = IdSource::new();

/// Graph level a recall attaches to. Closed set: one variant per level, no
/// open-ended subtype chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallLevel {
    Audio,
    Channel,
    ChannelRun,
    Recycling,
    AudioSignal,
}

/// Staging state of a recall instance. Templates stay in `Template`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingState {
    Template,
    Created,
    Resolved,
    InitPre,
    InitInter,
    Running,
    Done,
    Disposed,
}

/// Records that one recall's operation requires another recall, resolved per
/// recall id against instances, never against templates.
#[derive(Clone)]
pub struct RecallDependency {
    template: Weak<Recall>,
}

impl RecallDependency {
    pub fn on(template: &Arc<Recall>) -> Self {
        Self {
            template: Arc::downgrade(template),
        }
    }

    pub fn template(&self) -> Option<Arc<Recall>> {
        self.template.upgrade()
    }
}

/// An attachable unit of behavior at one graph level.
pub struct Recall {
    id: u64,
    name: String,
    level: RecallLevel,
    scope: SoundScope,
    template: bool,
    /// Template this instance was duplicated from; arena key component.
    template_id: Option<u64>,
    state: Mutex<StagingState>,
    recall_id: Mutex<Option<Arc<RecallId>>>,
    node: Mutex<Option<GraphNode>>,
    ports: Mutex<Vec<Arc<Port>>>,
    dependencies: Mutex<Vec<RecallDependency>>,
    resolved: Mutex<Vec<Weak<Recall>>>,
    behavior: Mutex<Box<dyn RecallBehavior>>,
    children: Mutex<Vec<Arc<Recall>>>,
    parent: Mutex<Weak<Recall>>,
    done_flag: AtomicFlag,
    /// One-shot latch for the warning channel.
    warned: AtomicFlag,
    /// Counts behavior dispatches; frozen once done. The lifecycle tests
    /// verify it never moves after done.
    phase_invocations: AtomicU64,
}

impl Recall {
    /// Create a persistent template recall.
    pub fn template(
        name: impl Into<String>,
        level: RecallLevel,
        scope: SoundScope,
        behavior: Box<dyn RecallBehavior>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: RECALL_OBJECT_IDS.next(),
            name: name.into(),
            level,
            scope,
            template: true,
            template_id: None,
            state: Mutex::new(StagingState::Template),
            recall_id: Mutex::new(None),
            node: Mutex::new(None),
            ports: Mutex::new(Vec::new()),
            dependencies: Mutex::new(Vec::new()),
            resolved: Mutex::new(Vec::new()),
            behavior: Mutex::new(behavior),
            children: Mutex::new(Vec::new()),
            parent: Mutex::new(Weak::new()),
            done_flag: AtomicFlag::new(false),
            warned: AtomicFlag::new(false),
            phase_invocations: AtomicU64::new(0),
        })
    }

    /// Duplicate a template against one recall id, producing a registered
    /// instance. Port references are shared with the template; behavior
    /// state is fresh. A channel-level template duplicates to a channel-run
    /// instance.
    pub fn duplicate(
        template: &Arc<Recall>,
        recall_id: &Arc<RecallId>,
        registry: &RecallRegistry,
    ) -> Arc<Recall> {
        debug_assert!(template.template, "only templates duplicate");

        let level = match template.level {
            RecallLevel::Channel => RecallLevel::ChannelRun,
            level => level,
        };

        let instance = Arc::new(Self {
            id: RECALL_OBJECT_IDS.next(),
            name: template.name.clone(),
            level,
            scope: template.scope,
            template: false,
            template_id: Some(template.id),
            state: Mutex::new(StagingState::Created),
            recall_id: Mutex::new(Some(recall_id.clone())),
            node: Mutex::new(template.node.lock().clone()),
            ports: Mutex::new(template.ports.lock().clone()),
            dependencies: Mutex::new(template.dependencies.lock().clone()),
            resolved: Mutex::new(Vec::new()),
            behavior: Mutex::new(template.behavior.lock().duplicate()),
            children: Mutex::new(Vec::new()),
            parent: Mutex::new(Weak::new()),
            done_flag: AtomicFlag::new(false),
            warned: AtomicFlag::new(false),
            phase_invocations: AtomicU64::new(0),
        });

        registry.register(&instance);
        instance
    }

    /// Create a child instance under `parent`, inheriting its recall id and
    /// scope. Used by behaviors that fan out to deeper graph levels
    /// (channel-run → recycling → audio-signal).
    pub fn spawn_child(
        parent: &Arc<Recall>,
        name: impl Into<String>,
        level: RecallLevel,
        node: GraphNode,
        behavior: Box<dyn RecallBehavior>,
    ) -> Arc<Recall> {
        let child = Arc::new(Self {
            id: RECALL_OBJECT_IDS.next(),
            name: name.into(),
            level,
            scope: parent.scope,
            template: false,
            template_id: None,
            state: Mutex::new(StagingState::Created),
            recall_id: Mutex::new(parent.recall_id.lock().clone()),
            node: Mutex::new(Some(node)),
            ports: Mutex::new(Vec::new()),
            dependencies: Mutex::new(Vec::new()),
            resolved: Mutex::new(Vec::new()),
            behavior: Mutex::new(behavior),
            children: Mutex::new(Vec::new()),
            parent: Mutex::new(Arc::downgrade(parent)),
            done_flag: AtomicFlag::new(false),
            warned: AtomicFlag::new(false),
            phase_invocations: AtomicU64::new(0),
        });

        parent.children.lock().push(child.clone());
        child
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> RecallLevel {
        self.level
    }

    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    pub fn is_template(&self) -> bool {
        self.template
    }

    pub fn template_id(&self) -> Option<u64> {
        self.template_id
    }

    pub fn state(&self) -> StagingState {
        *self.state.lock()
    }

    pub fn recall_id(&self) -> Option<Arc<RecallId>> {
        self.recall_id.lock().clone()
    }

    pub fn node(&self) -> Option<GraphNode> {
        self.node.lock().clone()
    }

    /// Attach to a graph node. The caller also registers the recall in that
    /// node's recall list.
    pub fn attach(&self, node: GraphNode) {
        *self.node.lock() = Some(node);
    }

    pub fn add_port(&self, port: Arc<Port>) {
        self.ports.lock().push(port);
    }

    pub fn ports(&self) -> Vec<Arc<Port>> {
        self.ports.lock().clone()
    }

    pub fn port(&self, name: &str) -> Option<Arc<Port>> {
        self.ports
            .lock()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn add_dependency(&self, dependency: RecallDependency) {
        self.dependencies.lock().push(dependency);
    }

    pub fn dependencies(&self) -> Vec<RecallDependency> {
        self.dependencies.lock().clone()
    }

    pub fn children(&self) -> Vec<Arc<Recall>> {
        self.children.lock().clone()
    }

    pub fn parent(&self) -> Option<Arc<Recall>> {
        self.parent.lock().upgrade()
    }

    pub fn is_done(&self) -> bool {
        self.done_flag.get()
    }

    /// Behavior dispatch count; frozen at done.
    pub fn phase_invocations(&self) -> u64 {
        self.phase_invocations.load(Ordering::Acquire)
    }

    /// One-shot latch for the warning channel: true for exactly one caller.
    pub fn warn_once(&self) -> bool {
        self.warned.test_and_set()
    }

    fn try_advance(&self, from: StagingState, to: StagingState) -> bool {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    /// Walk the dependency list and store the instance (never the template)
    /// sharing this recall's id. Missing targets degrade later phases to
    /// no-ops; they are retried lazily, never fatal.
    pub fn resolve_dependency(&self, registry: &RecallRegistry) {
        if !self.try_advance(StagingState::Created, StagingState::Resolved) {
            return;
        }

        let Some(recall_id) = self.recall_id() else {
            return;
        };

        let dependencies = self.dependencies.lock().clone();
        let mut resolved = Vec::with_capacity(dependencies.len());
        for dependency in &dependencies {
            let instance = dependency
                .template()
                .and_then(|template| registry.find(template.id(), recall_id.id()));
            match instance {
                Some(instance) => resolved.push(Arc::downgrade(&instance)),
                None => {
                    tracing::debug!(recall = %self.name, "dependency unresolved, degrading to no-op");
                    resolved.push(Weak::new());
                }
            }
        }
        *self.resolved.lock() = resolved;
    }

    /// Resolved dependency at `index`, retrying the arena lookup when the
    /// stored reference is gone (self-correction across ticks).
    pub fn resolved_dependency(&self, index: usize, registry: &RecallRegistry) -> Option<Arc<Recall>> {
        if let Some(instance) = self.resolved.lock().get(index).and_then(Weak::upgrade) {
            if !instance.is_done() {
                return Some(instance);
            }
        }

        let recall_id = self.recall_id()?;
        let dependency = self.dependencies.lock().get(index)?.clone();
        let instance = dependency
            .template()
            .and_then(|template| registry.find(template.id(), recall_id.id()))?;

        if let Some(slot) = self.resolved.lock().get_mut(index) {
            *slot = Arc::downgrade(&instance);
        }
        Some(instance)
    }

    fn dispatch<F>(self: &Arc<Self>, env: &RunEnv, f: F)
    where
        F: FnOnce(&mut dyn RecallBehavior, &RunContext<'_>),
    {
        let Some(node) = self.node.lock().clone() else {
            return;
        };
        self.phase_invocations.fetch_add(1, Ordering::AcqRel);

        let ctx = RunContext {
            recall: self,
            node,
            env,
        };
        let mut behavior = self.behavior.lock();
        f(behavior.as_mut(), &ctx);
    }

    pub fn run_init_pre(self: &Arc<Self>, env: &RunEnv) {
        if self.template || self.done_flag.get() {
            return;
        }
        if !self.try_advance(StagingState::Resolved, StagingState::InitPre) {
            return;
        }
        self.dispatch(env, |b, ctx| b.run_init_pre(ctx));
    }

    pub fn run_init_inter(self: &Arc<Self>, env: &RunEnv) {
        if self.template || self.done_flag.get() {
            return;
        }
        if !self.try_advance(StagingState::InitPre, StagingState::InitInter) {
            return;
        }
        self.dispatch(env, |b, ctx| b.run_init_inter(ctx));
    }

    pub fn run_init_post(self: &Arc<Self>, env: &RunEnv) {
        if self.template || self.done_flag.get() {
            return;
        }
        if !self.try_advance(StagingState::InitInter, StagingState::Running) {
            return;
        }
        self.dispatch(env, |b, ctx| b.run_init_post(ctx));
    }

    pub fn run_pre(self: &Arc<Self>, env: &RunEnv) {
        if self.template || self.done_flag.get() || self.state() != StagingState::Running {
            return;
        }
        self.dispatch(env, |b, ctx| b.run_pre(ctx));
    }

    pub fn run_inter(self: &Arc<Self>, env: &RunEnv) {
        if self.template || self.done_flag.get() || self.state() != StagingState::Running {
            return;
        }
        self.dispatch(env, |b, ctx| b.run_inter(ctx));
    }

    pub fn run_post(self: &Arc<Self>, env: &RunEnv) {
        if self.template || self.done_flag.get() || self.state() != StagingState::Running {
            return;
        }
        self.dispatch(env, |b, ctx| b.run_post(ctx));
    }

    /// Poll the behavior's cooperative completion check.
    pub fn check_finished(self: &Arc<Self>, env: &RunEnv) -> bool {
        if self.template || self.done_flag.get() || self.state() != StagingState::Running {
            return false;
        }
        let Some(node) = self.node.lock().clone() else {
            return false;
        };
        let ctx = RunContext {
            recall: self,
            node,
            env,
        };
        let behavior = self.behavior.lock();
        behavior.is_finished(&ctx)
    }

    /// Drive the instance to done. Idempotent: the second and later calls
    /// are no-ops. Tears down behavior state, releases children and removes
    /// the instance from the arena and its graph node.
    pub fn done(self: &Arc<Self>, env: &RunEnv) {
        if self.template || !self.done_flag.test_and_set() {
            return;
        }

        if let Some(node) = self.node.lock().clone() {
            let ctx = RunContext {
                recall: self,
                node,
                env,
            };
            let mut behavior = self.behavior.lock();
            behavior.done(&ctx);
        }

        *self.state.lock() = StagingState::Done;

        let children = core::mem::take(&mut *self.children.lock());
        for child in children {
            child.done(env);
        }

        env.registry.remove(self);

        match self.node.lock().clone() {
            Some(GraphNode::Audio(audio)) => audio.remove_recall(self),
            Some(GraphNode::Channel(channel)) => channel.remove_recall(self),
            _ => {}
        }
    }

    /// Final state after the last reference is released.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if *state == StagingState::Done {
            *state = StagingState::Disposed;
        }
    }
}

impl core::fmt::Debug for Recall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Recall")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("level", &self.level)
            .field("template", &self.template)
            .field("state", &*self.state.lock())
            .finish()
    }
}
