//! Atomic operations over a 16-byte word.
//!
//! The bounded stack packs an `{index, counter, value}` triple into one
//! 128-bit word so that a single double-wide CAS can move the top and the
//! write-through cell consistently. On x86_64/aarch64/s390x this compiles
//! to the native 16-byte primitives; elsewhere `portable-atomic` supplies
//! a correct fallback.

use core::sync::atomic::Ordering;
use portable_atomic::AtomicU128;

/// A 16-byte atomic word with load/store/CAS.
///
/// All three operations are linearizable. Callers pack and unpack their own
/// field layout; this type is deliberately untyped so the packing stays next
/// to the algorithm that defines it.
#[repr(transparent)]
pub struct Atomic128 {
    data: AtomicU128,
}

impl Atomic128 {
    /// Creates a new atomic initialized to `value`.
    #[inline]
    pub const fn new(value: u128) -> Self {
        Self {
            data: AtomicU128::new(value),
        }
    }

    /// Loads the current 16-byte word.
    #[inline]
    pub fn load(&self, order: Ordering) -> u128 {
        self.data.load(order)
    }

    /// Replaces the current word.
    #[inline]
    pub fn store(&self, value: u128, order: Ordering) {
        self.data.store(value, order);
    }

    /// Strong compare-exchange; succeeds iff the current word is bit-equal
    /// to `current`.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: u128,
        new: u128,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u128, u128> {
        self.data.compare_exchange(current, new, success, failure)
    }

    /// Weak compare-exchange; may fail spuriously.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: u128,
        new: u128,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u128, u128> {
        self.data
            .compare_exchange_weak(current, new, success, failure)
    }
}

impl Default for Atomic128 {
    fn default() -> Self {
        Self::new(0)
    }
}
