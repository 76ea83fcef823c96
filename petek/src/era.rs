//! Global era state.
//!
//! One process-wide monotone era counter plus a per-thread reservation pair
//! `{enter, exit}`. A thread inside a guard has `exit < enter`; its `enter`
//! era lower-bounds everything it may still be dereferencing. Reclamation
//! frees a retired buffer only when its retire era is older than the oldest
//! live `enter` (see `guard::cleanup`).

use crate::buffer::BufferHeader;
use crate::pad::CacheAligned;
use crate::registry::{ThreadRegistry, MAX_THREADS};
use crate::ttas::TTas;
use core::sync::atomic::{AtomicU64, Ordering};
use once_cell::race::OnceBox;

/// Per-thread hazard-era reservation.
///
/// Owned by the thread at the matching registry id: only that thread writes
/// `enter`/`exit`; every cleanup scan reads them.
pub(crate) struct Reservation {
    pub(crate) enter: AtomicU64,
    pub(crate) exit: AtomicU64,
}

impl Reservation {
    fn new() -> Self {
        Self {
            enter: AtomicU64::new(0),
            exit: AtomicU64::new(0),
        }
    }
}

/// A retired buffer that outlived its thread.
///
/// The header carries the retire era and the type-erased destructor, so any
/// thread's cleanup can finish the job.
pub(crate) struct Orphan(pub(crate) *mut BufferHeader);

// SAFETY: the pointee is exclusively owned by the reclamation system once
// retired; the destructor requires the payload to be Send (enforced at the
// retire call site).
unsafe impl Send for Orphan {}

pub(crate) struct EraState {
    /// Global era counter (starts at 1).
    era: CacheAligned<AtomicU64>,
    /// Per-thread reservations, indexed by registry id.
    reservations: Box<[CacheAligned<Reservation>]>,
    /// Thread id allocator.
    registry: ThreadRegistry,
    /// Retired buffers handed over by exited threads.
    orphans: TTas<Vec<Orphan>>,
}

impl EraState {
    fn new() -> Self {
        let mut reservations = Vec::with_capacity(MAX_THREADS);
        for _ in 0..MAX_THREADS {
            reservations.push(CacheAligned::new(Reservation::new()));
        }
        Self {
            era: CacheAligned::new(AtomicU64::new(1)),
            reservations: reservations.into_boxed_slice(),
            registry: ThreadRegistry::new(),
            orphans: TTas::new(Vec::new()),
        }
    }

    /// Current global era.
    #[inline]
    pub(crate) fn current(&self) -> u64 {
        self.era.load(Ordering::Acquire)
    }

    /// Advances the global era.
    #[inline]
    pub(crate) fn advance(&self) {
        self.era.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn reservation(&self, tid: usize) -> &Reservation {
        &self.reservations[tid]
    }

    pub(crate) fn alloc_tid(&self) -> usize {
        self.registry.alloc_id()
    }

    pub(crate) fn free_tid(&self, tid: usize) {
        self.registry.release_id(tid);
    }

    /// The oldest `enter` era over all threads currently inside a guard, or
    /// `u64::MAX` when none is.
    ///
    /// Callers must issue a SeqCst fence first so that reservation stores
    /// from other threads are visible to the scan.
    pub(crate) fn quiescent_era(&self) -> u64 {
        let mut quiescent = u64::MAX;
        for slot in self.reservations.iter() {
            let enter = slot.enter.load(Ordering::Acquire);
            let exit = slot.exit.load(Ordering::Acquire);
            if exit < enter && enter < quiescent {
                quiescent = enter;
            }
        }
        quiescent
    }

    /// Hands the retired buffers of an exiting thread to the orphan list.
    pub(crate) fn adopt(&self, buffers: impl Iterator<Item = *mut BufferHeader>) {
        self.orphans
            .with(|orphans| orphans.extend(buffers.map(Orphan)));
    }

    /// Takes the whole orphan list; the caller filters and returns the
    /// survivors via `adopt`. Taking rather than filtering in place keeps
    /// destructor calls outside the lock.
    pub(crate) fn take_orphans(&self) -> Vec<Orphan> {
        self.orphans.with(core::mem::take)
    }
}

/// Global singleton instance.
static GLOBAL: OnceBox<EraState> = OnceBox::new();

/// Get a reference to the global era state.
#[inline]
pub(crate) fn global() -> &'static EraState {
    GLOBAL.get_or_init(|| Box::new(EraState::new()))
}
