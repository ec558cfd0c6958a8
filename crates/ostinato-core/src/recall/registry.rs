//! The recall instance arena.

use std::sync::Arc;

use dashmap::DashMap;

use super::Recall;

/// Arena of live recall instances keyed by `(template id, recall id)`.
///
/// This is what dependency resolution walks: a "play" instance finds *its*
/// "stream" instance among many concurrently-running voices by looking up
/// the dependency's template id under its own recall id.
#[derive(Default)]
pub struct RecallRegistry {
    instances: DashMap<(u64, u64), Arc<Recall>>,
}

impl RecallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, instance: &Arc<Recall>) {
        let (Some(template_id), Some(recall_id)) = (instance.template_id(), instance.recall_id())
        else {
            return;
        };
        self.instances
            .insert((template_id, recall_id.id()), instance.clone());
    }

    pub fn find(&self, template_id: u64, recall_id: u64) -> Option<Arc<Recall>> {
        self.instances
            .get(&(template_id, recall_id))
            .map(|entry| entry.value().clone())
    }

    pub fn remove(&self, instance: &Recall) {
        let (Some(template_id), Some(recall_id)) = (instance.template_id(), instance.recall_id())
        else {
            return;
        };
        self.instances.remove(&(template_id, recall_id.id()));
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Live instances belonging to one recall id.
    pub fn instances_of(&self, recall_id: u64) -> Vec<Arc<Recall>> {
        self.instances
            .iter()
            .filter(|entry| entry.key().1 == recall_id)
            .map(|entry| entry.value().clone())
            .collect()
    }
}
