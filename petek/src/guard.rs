//! Guard and per-thread handle for critical section management.
//!
//! Protocol:
//! - Guard entry publishes `enter := current_era` for the thread; nested
//!   guards share the outer guard's reservation through a depth count.
//! - Guard exit publishes `exit := enter + 1`.
//! - `retire` stamps the buffer with the current era and queues it on the
//!   calling thread's retired list; every `FREQ` retires the era advances
//!   and `cleanup` runs.
//! - `cleanup` frees every queued buffer whose retire era is older than the
//!   oldest live `enter` over all threads.

use crate::buffer::BufferHeader;
use crate::era;
use core::cell::Cell;
use core::marker::PhantomData;
use core::sync::atomic::{fence, Ordering};

/// Retires (and allocations) between era advances. Power of two.
pub(crate) const FREQ: usize = 1024;

/// RAII guard representing an active critical section.
///
/// While a `Guard` exists, any pointer read through
/// [`HazardEraAllocator::protect`] is guaranteed not to be reclaimed.
/// Guards nest freely on one thread: only the outermost entry publishes the
/// reservation, inner guards ride on it.
///
/// [`HazardEraAllocator::protect`]: crate::HazardEraAllocator::protect
pub struct Guard {
    _private: (),
    _marker: PhantomData<*mut ()>,
}

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        // Use try_with to handle process teardown gracefully. During static
        // destructor execution TLS may already be destroyed; panicking in a
        // destructor during cleanup causes SIGABRT.
        let _ = HANDLE.try_with(|handle| handle.exit_guard());
    }
}

/// Thread-local handle: registry id, guard depth, retired buffers.
struct Handle {
    /// Registry id (lazily allocated).
    tid: Cell<Option<usize>>,
    /// Number of live guards on this thread. Only the outermost entry and
    /// the last exit touch the reservation.
    depth: Cell<usize>,
    /// The era published at the outermost guard entry.
    enter: Cell<u64>,
    /// Buffers retired by this thread, awaiting quiescence.
    retired: Cell<Vec<*mut BufferHeader>>,
    /// Counters driving periodic era advancement.
    alloc_count: Cell<usize>,
    retire_count: Cell<usize>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            tid: Cell::new(None),
            depth: Cell::new(0),
            enter: Cell::new(0),
            retired: Cell::new(Vec::new()),
            alloc_count: Cell::new(0),
            retire_count: Cell::new(0),
        }
    }

    /// Get or allocate the registry id.
    #[inline]
    fn tid(&self) -> usize {
        match self.tid.get() {
            Some(tid) => tid,
            None => {
                let tid = era::global().alloc_tid();
                self.tid.set(Some(tid));
                tid
            }
        }
    }

    /// Enter a critical section.
    ///
    /// The reservation must end up with `exit < enter`, otherwise the record
    /// looks inactive to concurrent cleanup scans. When the era has not
    /// moved since this thread's last exit, one advance restores the
    /// invariant; the era is monotone, so a single advance always suffices.
    fn enter_guard(&self) -> Guard {
        let depth = self.depth.get();
        self.depth.set(depth + 1);

        if depth == 0 {
            let tid = self.tid();
            let state = era::global();
            let reservation = state.reservation(tid);

            let exit = reservation.exit.load(Ordering::Relaxed);
            let mut entered = state.current();
            if entered <= exit {
                state.advance();
                entered = state.current();
            }
            reservation.enter.store(entered, Ordering::SeqCst);
            // Pairs with the SeqCst fence in cleanup(): either the scan sees
            // this store, or every pointer loaded under this guard was
            // unlinked (and hence retired) after the scan ran.
            fence(Ordering::SeqCst);
            self.enter.set(entered);
        }

        Guard {
            _private: (),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn exit_guard(&self) {
        let depth = self.depth.get();
        if depth == 0 {
            // Dummy guard created while TLS was unavailable; never entered.
            return;
        }
        self.depth.set(depth - 1);
        if depth == 1 {
            if let Some(tid) = self.tid.get() {
                era::global()
                    .reservation(tid)
                    .exit
                    .store(self.enter.get() + 1, Ordering::Release);
            }
        }
    }

    /// Bump the allocation counter, advancing the era every `FREQ` calls.
    #[inline]
    fn note_alloc(&self) {
        let count = self.alloc_count.get();
        self.alloc_count.set(count.wrapping_add(1));
        if count % FREQ == 0 {
            era::global().advance();
        }
    }

    /// Queue a retired buffer; its header's retire era must already be
    /// stamped by the caller. Every `FREQ` retires: advance + cleanup.
    fn retire_header(&self, header: *mut BufferHeader) {
        let mut list = self.retired.take();
        list.push(header);
        self.retired.set(list);

        let count = self.retire_count.get();
        self.retire_count.set(count.wrapping_add(1));
        if count % FREQ == 0 {
            era::global().advance();
            self.cleanup();
        }
    }

    /// Free every queued buffer retired before the quiescent era.
    ///
    /// The retired list is detached from the cell before any destructor
    /// runs: a payload destructor may itself retire into (or clean up) this
    /// handle, and must find it in a consistent state.
    fn cleanup(&self) {
        fence(Ordering::SeqCst);
        let state = era::global();
        let quiescent = state.quiescent_era();

        let mut doomed: Vec<*mut BufferHeader> = Vec::new();

        let mut list = self.retired.take();
        list.retain(|&header| {
            // Only this thread writes the header until the buffer is freed.
            if unsafe { (*header).retired } < quiescent {
                doomed.push(header);
                false
            } else {
                true
            }
        });
        self.retired.set(list);

        // Adopt-and-filter buffers from exited threads under the same rule.
        let orphans = state.take_orphans();
        if !orphans.is_empty() {
            let mut survivors = Vec::with_capacity(orphans.len());
            for orphan in orphans {
                if unsafe { (*orphan.0).retired } < quiescent {
                    doomed.push(orphan.0);
                } else {
                    survivors.push(orphan.0);
                }
            }
            state.adopt(survivors.into_iter());
        }

        for header in doomed {
            if let Some(destructor) = unsafe { (*header).destructor } {
                // SAFETY: retired exactly once, quiescence established above.
                unsafe { destructor(header) };
            }
        }
    }

    /// Advance the era and drain what this thread can.
    fn flush(&self) {
        era::global().advance();
        self.cleanup();
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Some(tid) = self.tid.get() {
            let state = era::global();
            state.advance();
            self.cleanup();

            // Buffers still blocked by other threads' guards outlive this
            // thread; hand them to the orphan list so a later cleanup on
            // any thread can free them.
            let leftovers = self.retired.take();
            if !leftovers.is_empty() {
                state.adopt(leftovers.into_iter());
            }

            let reservation = state.reservation(tid);
            reservation.enter.store(0, Ordering::Release);
            reservation.exit.store(0, Ordering::Release);

            self.tid.set(None);
            state.free_tid(tid);
        }
    }
}

thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

/// Enter a critical section.
///
/// Returns a [`Guard`] whose lifetime brackets this thread's use of
/// hazard-era-protected pointers. Guards are cheap and reentrant.
#[inline]
pub fn guard() -> Guard {
    // During process teardown TLS may be destroyed. Return a dummy guard
    // whose drop is also a no-op (depth stays 0). The fallback must be
    // constructed lazily: an eager dummy would be dropped on the success
    // path and its drop would pop the guard it did not push.
    match HANDLE.try_with(|handle| handle.enter_guard()) {
        Ok(guard) => guard,
        Err(_) => Guard {
            _private: (),
            _marker: PhantomData,
        },
    }
}

/// The calling thread's dense registry id in `[0, MAX_THREADS)`.
///
/// Allocated on first use and recycled when the thread exits.
#[inline]
pub fn thread_id() -> usize {
    HANDLE.with(|handle| handle.tid())
}

/// Force an era advance and drain the calling thread's retired list.
///
/// Call before dropping containers at the end of a test or before process
/// exit to reclaim promptly. Buffers retired by other threads are drained
/// by those threads (or adopted when they exit).
pub fn flush() {
    let _ = HANDLE.try_with(|handle| handle.flush());
}

#[inline]
pub(crate) fn guard_active() -> bool {
    HANDLE
        .try_with(|handle| handle.depth.get() > 0)
        .unwrap_or(false)
}

#[inline]
pub(crate) fn note_alloc() {
    let _ = HANDLE.try_with(|handle| handle.note_alloc());
}

#[inline]
pub(crate) fn retire_header(header: *mut BufferHeader) {
    // During process teardown TLS may be destroyed. Leak the buffer;
    // process memory is reclaimed by the OS on exit.
    let _ = HANDLE.try_with(|handle| handle.retire_header(header));
}
