//! Block-based bounded queue.
//!
//! BBQ: A Block-based Bounded Queue
//! https://www.usenix.org/conference/atc22/presentation/wang-jiawei
//!
//! The ring is split into blocks, each with four packed
//! `{offset, version}` cursors: `allocated`/`committed` on the producer
//! side, `reserved`/`consumed` on the consumer side. Within one version a
//! block moves monotonically through empty -> filling -> full -> draining ->
//! drained; advancing a head bumps the next block's cursors to the next
//! version with atomic fetch-max, so late helpers can never move a cursor
//! backwards.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU64, Ordering};
use petek::{Backoff, CacheAligned};

/// A packed 64-bit block cursor: version in the high half, offset in the
/// low half, so numeric max is lexicographic (version, offset) max.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Cursor {
    pub(crate) offset: u32,
    pub(crate) version: u32,
}

impl Cursor {
    #[inline]
    pub(crate) fn new(offset: u32, version: u32) -> Self {
        Self { offset, version }
    }

    #[inline]
    pub(crate) fn pack(self) -> u64 {
        (self.version as u64) << 32 | self.offset as u64
    }

    #[inline]
    pub(crate) fn unpack(raw: u64) -> Self {
        Self {
            offset: raw as u32,
            version: (raw >> 32) as u32,
        }
    }
}

struct Block<T> {
    allocated: CacheAligned<AtomicU64>,
    committed: CacheAligned<AtomicU64>,
    reserved: CacheAligned<AtomicU64>,
    consumed: CacheAligned<AtomicU64>,
    entries: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

impl<T> Block<T> {
    fn new(block_size: usize, drained: bool) -> Self {
        // All blocks except the first start in the drained state of
        // version 0, so the first producer wrap finds them reusable.
        let start = if drained { block_size as u32 } else { 0 };
        let cursor = Cursor::new(start, 0).pack();
        Self {
            allocated: CacheAligned::new(AtomicU64::new(cursor)),
            committed: CacheAligned::new(AtomicU64::new(cursor)),
            reserved: CacheAligned::new(AtomicU64::new(cursor)),
            consumed: CacheAligned::new(AtomicU64::new(cursor)),
            entries: (0..block_size)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
        }
    }
}

enum Claim {
    Granted(u32),
    BlockDone,
}

enum Reserve {
    Granted(u32),
    Fail,
    Busy,
    BlockDone,
}

enum Advance {
    Success,
    Fail,
    Busy,
}

/// A block-based bounded MPMC FIFO.
///
/// `push` fails only when the queue is genuinely full (the consumer has not
/// caught up across a full revolution); `pop` fails only when genuinely
/// empty. Transient busy states are retried internally with backoff.
///
/// ```
/// use petek_queue::Bbq;
///
/// let queue = Bbq::with_block_size(16, 4);
/// for i in 0..16 {
///     assert!(queue.push(i).is_ok());
/// }
/// assert!(queue.push(16).is_err());
/// assert_eq!(queue.pop(), Some(0));
/// ```
pub struct Bbq<T> {
    blocks: Box<[Block<T>]>,
    phead: CacheAligned<AtomicU64>,
    chead: CacheAligned<AtomicU64>,
    block_size: usize,
}

unsafe impl<T: Send> Send for Bbq<T> {}
unsafe impl<T: Send> Sync for Bbq<T> {}

impl<T> Bbq<T> {
    /// Creates a queue with the given capacity (rounded up to a power of
    /// two, minimum 2) and the default block geometry
    /// `block count = 2^max(1, log2(size)/4)`.
    pub fn new(capacity: usize) -> Self {
        let size = capacity.max(2).next_power_of_two();
        let log2 = size.trailing_zeros() as usize;
        let block_count = 1usize << (log2 / 4).max(1);
        Self::with_block_size(size, size / block_count)
    }

    /// Creates a queue with explicit geometry; `size` and `block_size` must
    /// be powers of two with more than one block.
    pub fn with_block_size(size: usize, block_size: usize) -> Self {
        assert!(size.is_power_of_two(), "size must be a power of two");
        assert!(
            block_size.is_power_of_two(),
            "block size must be a power of two"
        );
        assert!(size / block_size > 1, "the queue needs at least two blocks");
        let block_count = size / block_size;
        let blocks = (0..block_count)
            .map(|i| Block::new(block_size, i != 0))
            .collect();
        Self {
            blocks,
            phead: CacheAligned::new(AtomicU64::new(0)),
            chead: CacheAligned::new(AtomicU64::new(0)),
            block_size,
        }
    }

    /// Total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks.len() * self.block_size
    }

    #[inline]
    fn block_mask(&self) -> usize {
        self.blocks.len() - 1
    }

    #[inline]
    fn block_at(&self, head: &AtomicU64) -> (Cursor, &Block<T>) {
        let cursor = Cursor::unpack(head.load(Ordering::SeqCst));
        (cursor, &self.blocks[cursor.offset as usize & self.block_mask()])
    }

    fn allocate_entry(&self, block: &Block<T>) -> Claim {
        if Cursor::unpack(block.allocated.load(Ordering::SeqCst)).offset as usize
            >= self.block_size
        {
            return Claim::BlockDone;
        }
        let allocated = Cursor::unpack(block.allocated.fetch_add(1, Ordering::SeqCst));
        if allocated.offset as usize >= self.block_size {
            Claim::BlockDone
        } else {
            Claim::Granted(allocated.offset)
        }
    }

    fn commit_entry(&self, block: &Block<T>, offset: u32, value: T) {
        // SAFETY: allocate_entry granted this offset to exactly one
        // producer for the current block version.
        unsafe {
            (*block.entries[offset as usize].get()).write(value);
        }
        block.committed.fetch_add(1, Ordering::SeqCst);
    }

    fn advance_phead(&self, head: Cursor) -> Advance {
        let next = &self.blocks[(head.offset as usize + 1) & self.block_mask()];
        let consumed = Cursor::unpack(next.consumed.load(Ordering::SeqCst));
        if consumed.version < head.version
            || (consumed.version == head.version && consumed.offset as usize != self.block_size)
        {
            // The next block still holds unconsumed data from the previous
            // revolution; a producer may never overwrite it.
            let reserved = Cursor::unpack(next.reserved.load(Ordering::SeqCst));
            if reserved.offset == consumed.offset {
                return Advance::Fail;
            }
            return Advance::Busy;
        }
        next.committed
            .fetch_max(Cursor::new(0, head.version + 1).pack(), Ordering::SeqCst);
        next.allocated
            .fetch_max(Cursor::new(0, head.version + 1).pack(), Ordering::SeqCst);

        let mut version = head.version;
        if (head.offset as usize + 1) & self.block_mask() == 0 {
            version = version.wrapping_add(1);
        }
        self.phead.fetch_max(
            Cursor::new(head.offset.wrapping_add(1), version).pack(),
            Ordering::SeqCst,
        );
        Advance::Success
    }

    fn reserve_entry(&self, block: &Block<T>, backoff: &mut Backoff) -> Reserve {
        loop {
            let reserved = Cursor::unpack(block.reserved.load(Ordering::SeqCst));
            if (reserved.offset as usize) < self.block_size {
                let committed = Cursor::unpack(block.committed.load(Ordering::SeqCst));
                if committed.offset == reserved.offset {
                    return Reserve::Fail;
                }
                if committed.offset as usize != self.block_size {
                    // Mid-block with outstanding allocations: an entry was
                    // claimed but its value is not committed yet.
                    let allocated = Cursor::unpack(block.allocated.load(Ordering::SeqCst));
                    if allocated.offset != committed.offset {
                        return Reserve::Busy;
                    }
                }
                if block.reserved.fetch_max(
                    Cursor::new(reserved.offset + 1, reserved.version).pack(),
                    Ordering::SeqCst,
                ) == reserved.pack()
                {
                    return Reserve::Granted(reserved.offset);
                }
                backoff.spin();
                continue;
            }
            return Reserve::BlockDone;
        }
    }

    fn consume_entry(&self, block: &Block<T>, offset: u32) -> T {
        // SAFETY: reserve_entry granted this offset to exactly one consumer
        // for the current block version, and committed covers it.
        let value = unsafe { (*block.entries[offset as usize].get()).assume_init_read() };
        block.consumed.fetch_add(1, Ordering::SeqCst);
        value
    }

    fn advance_chead(&self, head: Cursor) -> bool {
        let next = &self.blocks[(head.offset as usize + 1) & self.block_mask()];
        let committed = Cursor::unpack(next.committed.load(Ordering::SeqCst));
        if committed.version != head.version.wrapping_add(1) {
            return false;
        }
        next.consumed
            .fetch_max(Cursor::new(0, head.version + 1).pack(), Ordering::SeqCst);
        next.reserved
            .fetch_max(Cursor::new(0, head.version + 1).pack(), Ordering::SeqCst);

        let mut version = head.version;
        if (head.offset as usize + 1) & self.block_mask() == 0 {
            version = version.wrapping_add(1);
        }
        self.chead.fetch_max(
            Cursor::new(head.offset.wrapping_add(1), version).pack(),
            Ordering::SeqCst,
        );
        true
    }

    /// Pushes a value; fails iff the queue is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut backoff = Backoff::new();
        loop {
            let (head, block) = self.block_at(&self.phead);
            match self.allocate_entry(block) {
                Claim::Granted(offset) => {
                    self.commit_entry(block, offset, value);
                    return Ok(());
                }
                Claim::BlockDone => match self.advance_phead(head) {
                    Advance::Success => continue,
                    Advance::Fail => return Err(value),
                    Advance::Busy => {}
                },
            }
            backoff.spin();
        }
    }

    /// Pops the oldest value; `None` iff the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let mut backoff = Backoff::new();
        loop {
            let (head, block) = self.block_at(&self.chead);
            match self.reserve_entry(block, &mut backoff) {
                Reserve::Granted(offset) => return Some(self.consume_entry(block, offset)),
                Reserve::Fail => return None,
                Reserve::Busy => {}
                Reserve::BlockDone => {
                    if !self.advance_chead(head) {
                        return None;
                    }
                    continue;
                }
            }
            backoff.spin();
        }
    }
}

impl<T> Drop for Bbq<T> {
    fn drop(&mut self) {
        for block in self.blocks.iter() {
            let consumed = Cursor::unpack(block.consumed.load(Ordering::Relaxed));
            let committed = Cursor::unpack(block.committed.load(Ordering::Relaxed));
            // A consumed cursor from an older version means no entry of the
            // committed version was consumed yet.
            let start = if consumed.version == committed.version {
                consumed.offset as usize
            } else {
                0
            };
            let end = (committed.offset as usize).min(self.block_size);
            for offset in start..end {
                unsafe {
                    (*block.entries[offset].get()).assume_init_drop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_max_is_version_major() {
        let early = Cursor::new(7, 0).pack();
        let late = Cursor::new(0, 1).pack();
        assert!(late > early);
        assert_eq!(Cursor::unpack(late), Cursor::new(0, 1));
    }

    #[test]
    fn default_geometry() {
        let queue: Bbq<u32> = Bbq::new(16);
        assert_eq!(queue.capacity(), 16);
        assert_eq!(queue.blocks.len(), 2);
        let queue: Bbq<u32> = Bbq::new(1 << 16);
        assert_eq!(queue.blocks.len(), 16);
    }
}
