//! Process-wide thread registry.
//!
//! Assigns every participating thread a dense integer id in
//! `[0, MAX_THREADS)`. Ids are recycled when a thread's handle drops, so a
//! long-running process cycling short-lived threads never exhausts the
//! space. The recycled-id list sits behind a TTAS lock; a thread that
//! already owns an id never touches it again.

use crate::ttas::TTas;
use core::sync::atomic::{AtomicUsize, Ordering};

// Maximum concurrent threads. Configurable via cargo features:
//   petek = { features = ["max-threads-512"] }
// Default: 256.
/// Thread registry capacity.
#[cfg(feature = "max-threads-1024")]
pub const MAX_THREADS: usize = 1024;
/// Thread registry capacity.
#[cfg(all(feature = "max-threads-512", not(feature = "max-threads-1024")))]
pub const MAX_THREADS: usize = 512;
/// Thread registry capacity.
#[cfg(not(any(feature = "max-threads-512", feature = "max-threads-1024")))]
pub const MAX_THREADS: usize = 256;

pub(crate) struct ThreadRegistry {
    /// Next never-used id.
    next: AtomicUsize,
    /// Recycled ids from exited threads.
    recycled: TTas<Vec<usize>>,
}

impl ThreadRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
            recycled: TTas::new(Vec::new()),
        }
    }

    /// Allocates a dense thread id, preferring recycled ids.
    pub(crate) fn alloc_id(&self) -> usize {
        if let Some(id) = self.recycled.with(|ids| ids.pop()) {
            return id;
        }
        // CAS loop: only increment on success so the counter stays valid
        // if the assert panics and is caught by catch_unwind.
        loop {
            let current = self.next.load(Ordering::Relaxed);
            assert!(
                current < MAX_THREADS,
                "petek: exceeded maximum thread count ({MAX_THREADS})"
            );
            if self
                .next
                .compare_exchange_weak(current, current + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return current;
            }
        }
    }

    /// Returns `id` for reuse by a future thread.
    pub(crate) fn release_id(&self, id: usize) {
        self.recycled.with(|ids| ids.push(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_recycled() {
        let registry = ThreadRegistry::new();
        let a = registry.alloc_id();
        let b = registry.alloc_id();
        assert_ne!(a, b);
        registry.release_id(a);
        assert_eq!(registry.alloc_id(), a);
    }
}
