//! Single-use BBQ block.
//!
//! One block of the block-based queue, usable on its own as a fixed batch
//! buffer that can be filled and depleted only once: producers claim
//! offsets until the block is done, consumers drain committed entries, and
//! nothing ever rewinds. The revolving queue is [`Bbq`](crate::Bbq).

use crate::bbq::Cursor;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU64, Ordering};
use petek::{Backoff, CacheAligned};

/// A fill-once / drain-once MPMC batch buffer.
///
/// `push` fails permanently once `capacity` entries were ever claimed;
/// `pop` fails when every committed entry has been taken. Mid-commit
/// entries are waited out with backoff, never surfaced.
///
/// ```
/// use petek_queue::BbqBlock;
///
/// let block = BbqBlock::new(4);
/// for i in 0..4 {
///     assert!(block.push(i).is_ok());
/// }
/// assert!(block.push(4).is_err());
/// assert_eq!(block.pop(), Some(0));
/// ```
pub struct BbqBlock<T> {
    allocated: CacheAligned<AtomicU64>,
    committed: CacheAligned<AtomicU64>,
    reserved: CacheAligned<AtomicU64>,
    consumed: CacheAligned<AtomicU64>,
    entries: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

unsafe impl<T: Send> Send for BbqBlock<T> {}
unsafe impl<T: Send> Sync for BbqBlock<T> {}

impl<T> BbqBlock<T> {
    /// Creates a block holding up to `capacity` entries (rounded up to a
    /// power of two).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        Self {
            allocated: CacheAligned::new(AtomicU64::new(0)),
            committed: CacheAligned::new(AtomicU64::new(0)),
            reserved: CacheAligned::new(AtomicU64::new(0)),
            consumed: CacheAligned::new(AtomicU64::new(0)),
            entries: (0..capacity)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
        }
    }

    /// Maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Pushes a value; fails once the block's capacity was ever claimed.
    pub fn push(&self, value: T) -> Result<(), T> {
        if Cursor::unpack(self.allocated.load(Ordering::SeqCst)).offset as usize
            >= self.entries.len()
        {
            return Err(value);
        }
        let allocated = Cursor::unpack(self.allocated.fetch_add(1, Ordering::SeqCst));
        if allocated.offset as usize >= self.entries.len() {
            return Err(value);
        }
        // SAFETY: the fetch_add granted this offset to exactly one producer.
        unsafe {
            (*self.entries[allocated.offset as usize].get()).write(value);
        }
        self.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Pops the oldest committed entry; `None` once the block is drained
    /// or nothing was committed.
    pub fn pop(&self) -> Option<T> {
        let mut backoff = Backoff::new();
        loop {
            let reserved = Cursor::unpack(self.reserved.load(Ordering::SeqCst));
            if reserved.offset as usize >= self.entries.len() {
                return None;
            }
            let committed = Cursor::unpack(self.committed.load(Ordering::SeqCst));
            if committed.offset == reserved.offset {
                return None;
            }
            if committed.offset as usize != self.entries.len() {
                let allocated = Cursor::unpack(self.allocated.load(Ordering::SeqCst));
                if allocated.offset != committed.offset {
                    // An entry is claimed but not yet committed.
                    backoff.spin();
                    continue;
                }
            }
            if self.reserved.fetch_max(
                Cursor::new(reserved.offset + 1, reserved.version).pack(),
                Ordering::SeqCst,
            ) == reserved.pack()
            {
                // SAFETY: the fetch_max granted this offset to exactly one
                // consumer, and committed covers it.
                let value =
                    unsafe { (*self.entries[reserved.offset as usize].get()).assume_init_read() };
                self.consumed.fetch_add(1, Ordering::SeqCst);
                return Some(value);
            }
            backoff.spin();
        }
    }

    /// Whether every committed entry was reserved at the time of the call.
    pub fn is_empty(&self) -> bool {
        let reserved = Cursor::unpack(self.reserved.load(Ordering::SeqCst));
        if (reserved.offset as usize) < self.entries.len() {
            let committed = Cursor::unpack(self.committed.load(Ordering::SeqCst));
            return committed.offset == reserved.offset;
        }
        false
    }
}

impl<T> Drop for BbqBlock<T> {
    fn drop(&mut self) {
        let consumed = Cursor::unpack(self.consumed.load(Ordering::Relaxed));
        let committed = Cursor::unpack(self.committed.load(Ordering::Relaxed));
        for offset in consumed.offset as usize..committed.offset as usize {
            unsafe {
                (*self.entries[offset].get()).assume_init_drop();
            }
        }
    }
}
