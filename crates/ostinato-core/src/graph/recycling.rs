//! Recycling: the buffer-chain owner inside a channel.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::audio_signal::{AudioSignal, SignalFormat};
use super::channel::Channel;
use crate::context::RecallId;
use crate::lockfree::IdSource;

static RECYCLING_IDS: IdSource = IdSource::new();

/// An ordered, doubly-linked node holding the audio signals that share
/// identical timing. Belongs to exactly one channel.
pub struct Recycling {
    id: u64,
    channel: Mutex<Weak<Channel>>,
    next: Mutex<Option<Arc<Recycling>>>,
    prev: Mutex<Weak<Recycling>>,
    signals: Mutex<Vec<Arc<AudioSignal>>>,
}

impl Recycling {
    /// Create a recycling with its template signal already installed.
    pub fn new(format: SignalFormat) -> Arc<Self> {
        Arc::new(Self {
            id: RECYCLING_IDS.next(),
            channel: Mutex::new(Weak::new()),
            next: Mutex::new(None),
            prev: Mutex::new(Weak::new()),
            signals: Mutex::new(vec![AudioSignal::template(format)]),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.lock().upgrade()
    }

    pub(crate) fn set_channel(&self, channel: &Arc<Channel>) {
        *self.channel.lock() = Arc::downgrade(channel);
    }

    pub fn next(&self) -> Option<Arc<Recycling>> {
        self.next.lock().clone()
    }

    pub fn prev(&self) -> Option<Arc<Recycling>> {
        self.prev.lock().upgrade()
    }

    /// Link two recyclings as neighbors in a chain.
    pub fn connect(left: &Arc<Recycling>, right: &Arc<Recycling>) {
        *left.next.lock() = Some(right.clone());
        *right.prev.lock() = Arc::downgrade(left);
    }

    /// The template signal of this recycling.
    pub fn template(&self) -> Arc<AudioSignal> {
        self.signals
            .lock()
            .iter()
            .find(|s| s.is_template())
            .cloned()
            .expect("recycling always holds its template signal")
    }

    pub fn add_audio_signal(&self, signal: Arc<AudioSignal>) {
        self.signals.lock().push(signal);
    }

    pub fn remove_audio_signal(&self, signal: &Arc<AudioSignal>) {
        self.signals
            .lock()
            .retain(|s| !Arc::ptr_eq(s, signal));
    }

    /// Find the live signal tied to `recall_id`.
    pub fn find_signal(&self, recall_id: &RecallId) -> Option<Arc<AudioSignal>> {
        self.signals
            .lock()
            .iter()
            .find(|s| {
                !s.is_template()
                    && s.recall_id()
                        .map(|id| id.id() == recall_id.id())
                        .unwrap_or(false)
            })
            .cloned()
    }

    /// Live signals, template excluded, in insertion order.
    pub fn live_signals(&self) -> Vec<Arc<AudioSignal>> {
        self.signals
            .lock()
            .iter()
            .filter(|s| !s.is_template())
            .cloned()
            .collect()
    }

    /// Walk the chain from `first` up to (not including) `bound`, returning
    /// the position of `target`. Mirrors position search on the linked list,
    /// not pointer arithmetic.
    pub fn position(
        first: &Arc<Recycling>,
        bound: Option<&Arc<Recycling>>,
        target: &Arc<Recycling>,
    ) -> Option<usize> {
        let mut current = Some(first.clone());
        let mut index = 0;

        while let Some(node) = current {
            if let Some(bound) = bound {
                if Arc::ptr_eq(&node, bound) {
                    return None;
                }
            }
            if Arc::ptr_eq(&node, target) {
                return Some(index);
            }
            index += 1;
            current = node.next();
        }

        None
    }

    /// Collect the chain `first..=last` into a vector, following next links.
    pub fn collect_chain(first: &Arc<Recycling>, last: &Arc<Recycling>) -> Vec<Arc<Recycling>> {
        let mut chain = Vec::new();
        let mut current = Some(first.clone());

        while let Some(node) = current {
            let is_last = Arc::ptr_eq(&node, last);
            chain.push(node.clone());
            if is_last {
                break;
            }
            current = node.next();
        }

        chain
    }
}

impl core::fmt::Debug for Recycling {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Recycling")
            .field("id", &self.id)
            .field("signals", &self.signals.lock().len())
            .finish()
    }
}
