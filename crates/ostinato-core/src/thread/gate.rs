//! The request/ack gate between a scheduling parent and one child thread.
//!
//! One atomic generation counter per direction plus a condvar only for the
//! rare blocking wait: the common case (request pending, ack already
//! visible) stays lock-free. The parent requests a unit of work with a
//! payload, the child acknowledges the generation when its portion is done;
//! a parent waiting on all its children's acks is the sync barrier of the
//! tier above.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::lockfree::AtomicFlag;

pub struct TickGate {
    requested: AtomicU64,
    acked: AtomicU64,
    payload: AtomicU8,
    stopped: AtomicFlag,
    lock: Mutex<()>,
    cond: Condvar,
}

impl TickGate {
    pub fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            payload: AtomicU8::new(0),
            stopped: AtomicFlag::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Parent side: publish a work request. The payload is visible to the
    /// child before the generation it belongs to. Only one request may be in
    /// flight; callers wait for the ack before requesting again.
    pub fn request(&self, payload: u8) -> u64 {
        let _guard = self.lock.lock();
        self.payload.store(payload, Ordering::Release);
        let generation = self.requested.load(Ordering::Acquire) + 1;
        self.requested.store(generation, Ordering::Release);
        self.cond.notify_all();
        generation
    }

    /// Child side: block until a generation newer than `last_seen` arrives.
    /// Returns `None` once the gate is stopped.
    pub fn wait_request(&self, last_seen: u64) -> Option<(u64, u8)> {
        loop {
            if self.stopped.get() {
                return None;
            }
            let generation = self.requested.load(Ordering::Acquire);
            if generation > last_seen {
                return Some((generation, self.payload.load(Ordering::Acquire)));
            }

            let mut guard = self.lock.lock();
            // Re-check under the lock so a request between the atomic read
            // and the park is not missed.
            if self.stopped.get() || self.requested.load(Ordering::Acquire) > last_seen {
                continue;
            }
            self.cond.wait(&mut guard);
        }
    }

    /// Child side: report `generation` finished.
    pub fn ack(&self, generation: u64) {
        let _guard = self.lock.lock();
        self.acked.store(generation, Ordering::Release);
        self.cond.notify_all();
    }

    /// Parent side: block until the child acknowledged `generation`.
    pub fn wait_ack(&self, generation: u64) {
        loop {
            if self.acked.load(Ordering::Acquire) >= generation || self.stopped.get() {
                return;
            }
            let mut guard = self.lock.lock();
            if self.acked.load(Ordering::Acquire) >= generation || self.stopped.get() {
                return;
            }
            self.cond.wait(&mut guard);
        }
    }

    /// Wake everything and refuse further requests.
    pub fn stop(&self) {
        let _guard = self.lock.lock();
        self.stopped.set(true);
        self.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl Default for TickGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_request_ack_roundtrip() {
        let gate = Arc::new(TickGate::new());
        let child_gate = gate.clone();

        let child = std::thread::spawn(move || {
            let mut last = 0;
            let mut payloads = Vec::new();
            while let Some((generation, payload)) = child_gate.wait_request(last) {
                payloads.push(payload);
                child_gate.ack(generation);
                last = generation;
            }
            payloads
        });

        for payload in [1u8, 2, 3] {
            let generation = gate.request(payload);
            gate.wait_ack(generation);
        }
        gate.stop();

        assert_eq!(child.join().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_stop_unblocks_waiter() {
        let gate = Arc::new(TickGate::new());
        let waiter_gate = gate.clone();

        let waiter = std::thread::spawn(move || waiter_gate.wait_request(0));
        std::thread::sleep(std::time::Duration::from_millis(20));
        gate.stop();

        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn test_ack_already_visible_skips_wait() {
        let gate = TickGate::new();
        let generation = gate.request(0);
        gate.ack(generation);
        // Must return immediately.
        gate.wait_ack(generation);
        assert!(!gate.is_stopped());
    }
}
