//! Recycling contexts: the nested dynamic-scope tree.
//!
//! Every concurrent voice (a playing note, a notation run, a wave-player
//! instance) gets one context node holding its own ordered view of the
//! recyclings it reads and writes. Nested sub-mixes share structure with
//! their parent; the root context has no parent and scopes whole-performance
//! operations.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::graph::recycling::Recycling;
use crate::lockfree::{AtomicFlag, IdSource};

static CONTEXT_IDS: IdSource = IdSource::new();
static RECALL_IDS: IdSource = IdSource::new();

/// Sound scope a recall id (and the templates it matches) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundScope {
    Playback,
    Sequencer,
    Notation,
    Wave,
}

impl SoundScope {
    pub const ALL: [SoundScope; 4] = [
        SoundScope::Playback,
        SoundScope::Sequencer,
        SoundScope::Notation,
        SoundScope::Wave,
    ];
}

/// Identifies one logical invocation across the whole tree: a recycling
/// context paired with a sound scope and an initial-run marker.
pub struct RecallId {
    id: u64,
    context: Arc<RecyclingContext>,
    scope: SoundScope,
    initial_run: AtomicFlag,
}

impl RecallId {
    pub fn new(context: Arc<RecyclingContext>, scope: SoundScope) -> Arc<Self> {
        Arc::new(Self {
            id: RECALL_IDS.next(),
            context,
            scope,
            initial_run: AtomicFlag::new(true),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &Arc<RecyclingContext> {
        &self.context
    }

    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    /// True until the first tick has run this invocation.
    pub fn is_initial_run(&self) -> bool {
        self.initial_run.get()
    }

    pub fn clear_initial_run(&self) {
        self.initial_run.set(false);
    }
}

impl core::fmt::Debug for RecallId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecallId")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish()
    }
}

/// One node of the dynamic-scope tree.
///
/// Owns its children list, weakly references its parent. Slots are logical
/// positions, not object identities: [`RecyclingContext::reset_recycling`]
/// locates the affected range by position search and rebuilds the array
/// rather than mutating in place, so already-running recall instances keep a
/// consistent view.
pub struct RecyclingContext {
    id: u64,
    parent: Mutex<Weak<RecyclingContext>>,
    children: Mutex<Vec<Arc<RecyclingContext>>>,
    slots: Mutex<Vec<Arc<Recycling>>>,
}

impl RecyclingContext {
    /// A context with `length` empty-capacity slots (filled via
    /// [`RecyclingContext::with_slots`] or `reset_recycling`).
    pub fn new(length: usize) -> Arc<Self> {
        Arc::new(Self {
            id: CONTEXT_IDS.next(),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
            slots: Mutex::new(Vec::with_capacity(length)),
        })
    }

    pub fn with_slots(slots: Vec<Arc<Recycling>>) -> Arc<Self> {
        Arc::new(Self {
            id: CONTEXT_IDS.next(),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
            slots: Mutex::new(slots),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent(&self) -> Option<Arc<RecyclingContext>> {
        self.parent.lock().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<RecyclingContext>> {
        self.children.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn slot(&self, index: usize) -> Option<Arc<Recycling>> {
        self.slots.lock().get(index).cloned()
    }

    pub fn slots(&self) -> Vec<Arc<Recycling>> {
        self.slots.lock().clone()
    }

    /// Attach `child` under `parent`. The parent/child list and the child's
    /// parent pointer only ever change through this and `remove_child`.
    pub fn add_child(parent: &Arc<RecyclingContext>, child: &Arc<RecyclingContext>) {
        debug_assert!(
            !RecyclingContext::is_ancestor(child, parent),
            "context tree must stay acyclic"
        );

        *child.parent.lock() = Arc::downgrade(parent);
        parent.children.lock().push(child.clone());
    }

    /// Detach `child` from `parent`. A context with no parent and no owner
    /// is garbage and drops with its last reference.
    pub fn remove_child(parent: &Arc<RecyclingContext>, child: &Arc<RecyclingContext>) {
        *child.parent.lock() = Weak::new();
        parent
            .children
            .lock()
            .retain(|c| !Arc::ptr_eq(c, child));
    }

    /// True when `node` appears on `of`'s parent chain.
    pub fn is_ancestor(node: &Arc<RecyclingContext>, of: &Arc<RecyclingContext>) -> bool {
        let mut current = of.parent();
        while let Some(ctx) = current {
            if Arc::ptr_eq(&ctx, node) {
                return true;
            }
            current = ctx.parent();
        }
        false
    }

    /// Position of `recycling` within this context's slots.
    pub fn find(&self, recycling: &Arc<Recycling>) -> Option<usize> {
        self.slots
            .lock()
            .iter()
            .position(|r| Arc::ptr_eq(r, recycling))
    }

    /// Index of the first child context whose slots contain `recycling`.
    pub fn find_child(&self, recycling: &Arc<Recycling>) -> Option<usize> {
        let children = self.children();
        children
            .iter()
            .position(|child| child.find(recycling).is_some())
    }

    /// Position of `recycling` within the parent context's slots.
    pub fn find_parent(&self, recycling: &Arc<Recycling>) -> Option<usize> {
        self.parent().and_then(|parent| parent.find(recycling))
    }

    /// Walk parent pointers to the root of the tree.
    pub fn get_toplevel(self: &Arc<Self>) -> Arc<RecyclingContext> {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Replace the slots holding `old_first..=old_last` with the chain
    /// `new_first..=new_last`, recomputing the array length.
    ///
    /// The affected range is located by position search on the current array.
    /// When the old slice cannot be found (empty context, brand-new context,
    /// or no old slice given) the new chain is inserted at position 0 without
    /// removing anything. Rebuilds the array rather than patching in place.
    pub fn reset_recycling(
        &self,
        old_first: Option<&Arc<Recycling>>,
        old_last: Option<&Arc<Recycling>>,
        new_first: &Arc<Recycling>,
        new_last: &Arc<Recycling>,
    ) {
        let chain = Recycling::collect_chain(new_first, new_last);

        let mut slots = self.slots.lock();

        let range = match (old_first, old_last) {
            (Some(of), Some(ol)) => {
                let first = slots.iter().position(|r| Arc::ptr_eq(r, of));
                let last = slots.iter().position(|r| Arc::ptr_eq(r, ol));
                match (first, last) {
                    (Some(f), Some(l)) if f <= l => Some((f, l)),
                    _ => None,
                }
            }
            _ => None,
        };

        let mut rebuilt = Vec::with_capacity(slots.len() + chain.len());
        match range {
            Some((first, last)) => {
                rebuilt.extend_from_slice(&slots[..first]);
                rebuilt.extend(chain);
                rebuilt.extend_from_slice(&slots[last + 1..]);
            }
            None => {
                rebuilt.extend(chain);
                rebuilt.extend_from_slice(&slots);
            }
        }

        *slots = rebuilt;
    }
}

impl core::fmt::Debug for RecyclingContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecyclingContext")
            .field("id", &self.id)
            .field("slots", &self.slots.lock().len())
            .field("children", &self.children.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SoundcardPresets;
    use crate::graph::audio_signal::SignalFormat;

    fn recycling() -> Arc<Recycling> {
        Recycling::new(SignalFormat::from_presets(&SoundcardPresets::default()))
    }

    fn chain(n: usize) -> Vec<Arc<Recycling>> {
        let nodes: Vec<_> = (0..n).map(|_| recycling()).collect();
        for pair in nodes.windows(2) {
            Recycling::connect(&pair[0], &pair[1]);
        }
        nodes
    }

    #[test]
    fn test_add_remove_child() {
        let root = RecyclingContext::new(0);
        let child = RecyclingContext::new(0);

        RecyclingContext::add_child(&root, &child);
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &root));
        assert_eq!(root.children().len(), 1);

        RecyclingContext::remove_child(&root, &child);
        assert!(child.parent().is_none());
        assert!(root.children().is_empty());
    }

    #[test]
    fn test_get_toplevel() {
        let root = RecyclingContext::new(0);
        let mid = RecyclingContext::new(0);
        let leaf = RecyclingContext::new(0);
        RecyclingContext::add_child(&root, &mid);
        RecyclingContext::add_child(&mid, &leaf);

        assert!(Arc::ptr_eq(&leaf.get_toplevel(), &root));
        assert!(Arc::ptr_eq(&root.get_toplevel(), &root));
    }

    #[test]
    fn test_find_and_find_child() {
        let nodes = chain(3);
        let context = RecyclingContext::with_slots(nodes.clone());
        assert_eq!(context.find(&nodes[1]), Some(1));
        assert_eq!(context.find(&recycling()), None);

        let parent = RecyclingContext::new(0);
        RecyclingContext::add_child(&parent, &context);
        assert_eq!(parent.find_child(&nodes[2]), Some(0));
        assert_eq!(context.find_parent(&nodes[0]), None);
    }

    #[test]
    fn test_reset_recycling_replaces_slice() {
        let old = chain(4);
        let context = RecyclingContext::with_slots(old.clone());

        let new = chain(2);
        context.reset_recycling(Some(&old[1]), Some(&old[2]), &new[0], &new[1]);

        let slots = context.slots();
        assert_eq!(slots.len(), 4);
        assert!(Arc::ptr_eq(&slots[0], &old[0]));
        assert!(Arc::ptr_eq(&slots[1], &new[0]));
        assert!(Arc::ptr_eq(&slots[2], &new[1]));
        assert!(Arc::ptr_eq(&slots[3], &old[3]));
    }

    #[test]
    fn test_reset_recycling_idempotent_on_installed_slice() {
        let nodes = chain(3);
        let context = RecyclingContext::with_slots(nodes.clone());

        context.reset_recycling(Some(&nodes[0]), Some(&nodes[2]), &nodes[0], &nodes[2]);
        let once = context.slots();
        context.reset_recycling(Some(&nodes[0]), Some(&nodes[2]), &nodes[0], &nodes[2]);
        let twice = context.slots();

        assert_eq!(once.len(), 3);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!(Arc::ptr_eq(a, b));
        }
    }

    #[test]
    fn test_reset_recycling_not_found_inserts_at_front() {
        let context = RecyclingContext::new(0);
        let new = chain(2);

        // Empty, brand-new context: the chain lands at position 0.
        context.reset_recycling(None, None, &new[0], &new[1]);
        assert_eq!(context.len(), 2);
        assert!(Arc::ptr_eq(&context.slot(0).unwrap(), &new[0]));

        // Old slice unknown to this context: still insert at 0, keep the rest.
        let stranger = chain(2);
        let extra = chain(1);
        context.reset_recycling(Some(&stranger[0]), Some(&stranger[1]), &extra[0], &extra[0]);
        assert_eq!(context.len(), 3);
        assert!(Arc::ptr_eq(&context.slot(0).unwrap(), &extra[0]));
        assert!(Arc::ptr_eq(&context.slot(1).unwrap(), &new[0]));
    }

    #[test]
    fn test_no_cycles() {
        let root = RecyclingContext::new(0);
        let child = RecyclingContext::new(0);
        RecyclingContext::add_child(&root, &child);

        assert!(RecyclingContext::is_ancestor(&root, &child));
        assert!(!RecyclingContext::is_ancestor(&child, &root));
    }

    #[test]
    fn test_recall_id_initial_run() {
        let context = RecyclingContext::new(0);
        let id = RecallId::new(context, SoundScope::Notation);

        assert!(id.is_initial_run());
        id.clear_initial_run();
        assert!(!id.is_initial_run());
        assert_eq!(id.scope(), SoundScope::Notation);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Applying reset_recycling twice with identical arguments
            /// yields the same slot array both times.
            #[test]
            fn reset_recycling_idempotent(len in 1usize..8, first in 0usize..8, last in 0usize..8) {
                let first = first % len;
                let last = last % len;
                prop_assume!(first <= last);

                let nodes = chain(len);
                let context = RecyclingContext::with_slots(nodes.clone());
                let replacement = chain(last - first + 1);

                context.reset_recycling(
                    Some(&nodes[first]),
                    Some(&nodes[last]),
                    &replacement[0],
                    &replacement[replacement.len() - 1],
                );
                let once = context.slots();

                context.reset_recycling(
                    Some(&replacement[0]),
                    Some(&replacement[replacement.len() - 1]),
                    &replacement[0],
                    &replacement[replacement.len() - 1],
                );
                let twice = context.slots();

                prop_assert_eq!(once.len(), len);
                prop_assert_eq!(once.len(), twice.len());
                for (a, b) in once.iter().zip(twice.iter()) {
                    prop_assert!(Arc::ptr_eq(a, b));
                }
            }

            /// However children are attached and detached, the tree stays
            /// acyclic and parent pointers match the children lists.
            #[test]
            fn tree_stays_consistent(ops in proptest::collection::vec((0usize..6, 0usize..6, any::<bool>()), 0..40)) {
                let contexts: Vec<_> = (0..6).map(|_| RecyclingContext::new(0)).collect();

                for (parent, child, attach) in ops {
                    if parent == child {
                        continue;
                    }
                    let p = &contexts[parent];
                    let c = &contexts[child];
                    if attach {
                        // Refuse edges that would close a cycle or steal a
                        // parented child, as the task layer does.
                        if c.parent().is_none() && !RecyclingContext::is_ancestor(c, p) {
                            RecyclingContext::add_child(p, c);
                        }
                    } else if c.parent().map(|x| Arc::ptr_eq(&x, p)).unwrap_or(false) {
                        RecyclingContext::remove_child(p, c);
                    }
                }

                for context in &contexts {
                    // No context is its own ancestor.
                    prop_assert!(!RecyclingContext::is_ancestor(context, context));
                    // Parent/child lists agree.
                    if let Some(parent) = context.parent() {
                        prop_assert!(parent
                            .children()
                            .iter()
                            .any(|c| Arc::ptr_eq(c, context)));
                    }
                    for child in context.children() {
                        prop_assert!(Arc::ptr_eq(&child.parent().unwrap(), context));
                    }
                }
            }
        }
    }
}
