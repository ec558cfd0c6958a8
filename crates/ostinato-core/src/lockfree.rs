//! Lock-free primitives for real-time scheduling and ports.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use atomic_float::{AtomicF32, AtomicF64};

/// Cache-line aligned atomic f32.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic f64.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicDouble {
    value: AtomicF64,
}

impl AtomicDouble {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicF64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: f64) -> f64 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicDouble {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicDouble {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }

    /// Atomically set the flag, returning true only for the caller that
    /// performed the transition. Used for one-shot latches (warning channels,
    /// shutdown guards).
    #[inline]
    pub fn test_and_set(&self) -> bool {
        self.value
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Clone for AtomicFlag {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Monotonic id source shared by graph nodes, recalls and recall ids.
#[derive(Debug, Default)]
pub struct IdSource {
    next: AtomicU64,
}

impl IdSource {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    #[inline]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
