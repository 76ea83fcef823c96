//! Striped counters over the thread registry.
//!
//! Each participating thread owns one cache-aligned stripe, indexed by its
//! registry id, so increments never contend. `get` folds the stripes and is
//! the expensive side of the trade.

use crate::pad::CacheAligned;
use crate::registry::MAX_THREADS;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI64, Ordering};

/// A per-thread striped counter.
///
/// `add` touches only the calling thread's stripe; `get` sums all stripes
/// and is linearizable with respect to each stripe, not the total.
///
/// ```
/// use petek::StripedCounter;
///
/// let counter = StripedCounter::new();
/// counter.add(1);
/// counter.add(2);
/// assert_eq!(counter.get(), 3);
/// ```
pub struct StripedCounter {
    values: Box<[CacheAligned<AtomicI64>]>,
}

impl StripedCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        let values = (0..MAX_THREADS)
            .map(|_| CacheAligned::new(AtomicI64::new(0)))
            .collect();
        Self { values }
    }

    /// Adds `delta` to the calling thread's stripe, returning that
    /// stripe's previous value.
    #[inline]
    pub fn add(&self, delta: i64) -> i64 {
        self.values[crate::guard::thread_id()].fetch_add(delta, Ordering::Relaxed)
    }

    /// Sums all stripes.
    pub fn get(&self) -> i64 {
        self.values
            .iter()
            .map(|value| value.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for StripedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A striped counter that publishes each stripe only every `FREQUENCY`
/// increments.
///
/// The hot path is a plain (non-atomic) add on thread-owned state; `get`
/// reads the published snapshots and may lag each stripe by up to
/// `FREQUENCY - 1` increments. Use where rough totals are enough
/// (statistics, rate estimation).
pub struct FrequencyCounter {
    stripes: Box<[CacheAligned<Stripe>]>,
}

/// Publication period. Power of two.
const FREQUENCY: u64 = 256;

struct Stripe {
    /// Owner-only: increment count and running local total.
    local: UnsafeCell<(u64, i64)>,
    /// Snapshot visible to `get`.
    global: AtomicI64,
}

// SAFETY: `local` is written only by the thread whose registry id selects
// this stripe; cross-thread reads go through `global`.
unsafe impl Sync for Stripe {}

impl FrequencyCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        let stripes = (0..MAX_THREADS)
            .map(|_| {
                CacheAligned::new(Stripe {
                    local: UnsafeCell::new((0, 0)),
                    global: AtomicI64::new(0),
                })
            })
            .collect();
        Self { stripes }
    }

    /// Adds `delta` to the calling thread's stripe, returning the stripe's
    /// new local total. Publishes the total every `FREQUENCY` calls.
    #[inline]
    pub fn add(&self, delta: i64) -> i64 {
        let stripe = &self.stripes[crate::guard::thread_id()];
        // SAFETY: the registry id is unique among live threads, so this
        // thread owns the stripe's local state.
        let (count, local) = unsafe {
            let local = &mut *stripe.local.get();
            local.1 += delta;
            let snapshot = *local;
            local.0 += 1;
            snapshot
        };
        if count & (FREQUENCY - 1) == 0 {
            stripe.global.store(local, Ordering::Relaxed);
        }
        local
    }

    /// Sums the published snapshots.
    pub fn get(&self) -> i64 {
        self.stripes
            .iter()
            .map(|stripe| stripe.global.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for FrequencyCounter {
    fn default() -> Self {
        Self::new()
    }
}
