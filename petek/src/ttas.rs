//! TTAS (Test-Test-And-Set) lock for cold-path registry state.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// A TTAS spin lock with a closure-scoped critical section.
///
/// Guards only the recycled-id list and the orphaned retired buffers,
/// never anything on a container's hot path.
pub(crate) struct TTas<T> {
    acquired: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for TTas<T> {}
unsafe impl<T: Send> Sync for TTas<T> {}

impl<T> TTas<T> {
    pub(crate) const fn new(data: T) -> Self {
        Self {
            acquired: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Run `f` with the lock held.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        loop {
            // Test phase: spin on relaxed load (stays in cache)
            while self.acquired.load(Ordering::Relaxed) {
                spin_loop();
            }
            // Test-and-set phase: attempt to acquire
            if !self.acquired.swap(true, Ordering::Acquire) {
                break;
            }
        }
        // SAFETY: the swap above grants exclusive access until release.
        let result = f(unsafe { &mut *self.data.get() });
        self.acquired.store(false, Ordering::Release);
        result
    }
}
