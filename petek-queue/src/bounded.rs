//! Array-based bounded MPMC queue.
//!
//! Four monotone counters choreograph the ring: producers reserve a
//! position by bumping `phead`, write the slot, then publish `ptail` in
//! reservation order; consumers mirror this through `chead`/`ctail`. A slot
//! is reused only once `ctail` proves its previous occupant was consumed.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU64, Ordering};
use petek::{Backoff, CacheAligned};

/// A bounded MPMC FIFO with power-of-two capacity.
///
/// `push` fails iff the queue is full, `pop` iff it is empty; transient
/// contention is absorbed by backoff and never surfaces.
///
/// ```
/// use petek_queue::BoundedQueue;
///
/// let queue = BoundedQueue::new(4);
/// assert!(queue.push(10).is_ok());
/// assert!(queue.push(20).is_ok());
/// assert_eq!(queue.pop(), Some(10));
/// assert_eq!(queue.pop(), Some(20));
/// assert_eq!(queue.pop(), None);
/// ```
pub struct BoundedQueue<T> {
    chead: CacheAligned<AtomicU64>,
    ctail: CacheAligned<AtomicU64>,
    phead: CacheAligned<AtomicU64>,
    ptail: CacheAligned<AtomicU64>,
    values: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u64,
}

unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// Creates a queue with the given capacity, rounded up to the next
    /// power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let values = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            chead: CacheAligned::new(AtomicU64::new(0)),
            ctail: CacheAligned::new(AtomicU64::new(0)),
            phead: CacheAligned::new(AtomicU64::new(0)),
            ptail: CacheAligned::new(AtomicU64::new(0)),
            values,
            mask: capacity as u64 - 1,
        }
    }

    /// Capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Pushes a value; fails iff the queue is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut backoff = Backoff::new();
        loop {
            let ph = self.phead.load(Ordering::Acquire);
            let pn = ph + 1;
            // Acquire pairs with the ctail release below: reusing a slot
            // must happen after its previous occupant was read out.
            if pn > self.ctail.load(Ordering::Acquire) + self.values.len() as u64 {
                return Err(value);
            }
            if self
                .phead
                .compare_exchange(ph, pn, Ordering::Release, Ordering::Relaxed)
                .is_err()
            {
                backoff.spin();
            } else {
                // The full check above proves position pn - N was consumed,
                // so the slot is writable.
                unsafe {
                    (*self.values[(pn & self.mask) as usize].get()).write(value);
                }
                // Publish strictly in reservation order.
                while self.ptail.load(Ordering::Acquire) != ph {
                    spin_loop();
                }
                self.ptail.store(pn, Ordering::Release);
                return Ok(());
            }
        }
    }

    /// Pops the oldest value; `None` iff the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let mut backoff = Backoff::new();
        loop {
            let ch = self.chead.load(Ordering::Acquire);
            let cn = ch + 1;
            // Acquire pairs with the ptail release in push: proceeding
            // means the slot at cn is fully published.
            if cn > self.ptail.load(Ordering::Acquire) {
                return None;
            }
            if self
                .chead
                .compare_exchange(ch, cn, Ordering::Release, Ordering::Relaxed)
                .is_err()
            {
                backoff.spin();
            } else {
                // cn <= ptail held before the CAS and ptail is monotone, so
                // the slot is fully published.
                let value =
                    unsafe { (*self.values[(cn & self.mask) as usize].get()).assume_init_read() };
                // Confirm consumption strictly in reservation order; push
                // relies on ctail for slot reuse.
                while self.ctail.load(Ordering::Acquire) != ch {
                    spin_loop();
                }
                self.ctail.store(cn, Ordering::Release);
                return Some(value);
            }
        }
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        // Positions (ctail, ptail] were published but never consumed.
        let mut position = self.ctail.load(Ordering::Relaxed) + 1;
        let ptail = self.ptail.load(Ordering::Relaxed);
        while position <= ptail {
            unsafe {
                (*self.values[(position & self.mask) as usize].get()).assume_init_drop();
            }
            position += 1;
        }
    }
}
