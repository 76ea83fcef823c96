//! Single-writer, multi-reader growable append-only array.
//!
//! Values live in fixed-capacity blocks reached through a block map; the
//! map is republished (never mutated in place) when it runs out of room, so
//! a reader holding a stale map pointer stays safe, and published values
//! never move. The writer publishes a new element with a release-store of
//! `size`; a reader that acquire-loads `size` is guaranteed the map, the
//! block pointer, and the value behind any index below it.
//!
//! One writer at a time is assumed (checked in debug builds); readers are
//! unlimited and never block the writer.
//!
//! ```
//! use petek_array::GrowableArray;
//!
//! let array = GrowableArray::new();
//! for i in 0..1000 {
//!     array.push_back(i);
//! }
//! assert_eq!(array.get(999), Some(&999));
//! assert_eq!(array.get(1000), None);
//! ```

#![warn(unsafe_op_in_unsafe_fn)]

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ops::Index;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use petek::CacheAligned;

#[cfg(debug_assertions)]
use core::sync::atomic::AtomicBool;

/// Elements per block. Power of two.
const BLOCK_CAPACITY: usize = 256;
const BLOCK_SHIFT: u32 = BLOCK_CAPACITY.trailing_zeros();
const BLOCK_MASK: usize = BLOCK_CAPACITY - 1;
/// Initial block-map capacity; doubles on every growth.
const INITIAL_MAP_CAPACITY: usize = 2;

struct Block<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

impl<T> Block<T> {
    fn alloc() -> *mut Block<T> {
        Box::into_raw(Box::new(Block {
            slots: (0..BLOCK_CAPACITY)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect(),
        }))
    }
}

struct BlockMap<T> {
    /// Retired-map chain link; written by the writer, read at drop.
    next: *mut BlockMap<T>,
    /// Block `i` holds indices `[i * B, (i + 1) * B)`.
    blocks: Box<[AtomicPtr<Block<T>>]>,
}

impl<T> BlockMap<T> {
    fn alloc(capacity: usize) -> *mut BlockMap<T> {
        Box::into_raw(Box::new(BlockMap {
            next: core::ptr::null_mut(),
            blocks: (0..capacity)
                .map(|_| AtomicPtr::new(core::ptr::null_mut()))
                .collect(),
        }))
    }
}

/// Writer-only bookkeeping behind the single-writer contract.
struct WriterState<T> {
    map_size: usize,
    map_capacity: usize,
    /// Superseded maps, kept until the array is destroyed so readers
    /// holding a stale map pointer remain safe.
    retired: *mut BlockMap<T>,
}

/// A per-reader cached view.
///
/// The reader hot path only re-loads `size` when the requested index
/// exceeds the cached bound, saving the acquire-load on repeat reads.
/// There is no synchronisation between different readers.
#[derive(Clone, Copy, Default)]
pub struct ReaderState {
    size: usize,
}

impl ReaderState {
    /// Creates a view that has observed nothing yet.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Single-writer / multi-reader append-only array.
///
/// Contents never move once published; the writer never invalidates a
/// reader's existing index.
pub struct GrowableArray<T> {
    size: CacheAligned<AtomicUsize>,
    /// Active block map; superseded maps hang off the writer's retired chain.
    map: AtomicPtr<BlockMap<T>>,
    writer: UnsafeCell<WriterState<T>>,
    #[cfg(debug_assertions)]
    writing: AtomicBool,
}

unsafe impl<T: Send> Send for GrowableArray<T> {}
unsafe impl<T: Send + Sync> Sync for GrowableArray<T> {}

impl<T> GrowableArray<T> {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self {
            size: CacheAligned::new(AtomicUsize::new(0)),
            map: AtomicPtr::new(core::ptr::null_mut()),
            writer: UnsafeCell::new(WriterState {
                map_size: 0,
                map_capacity: 0,
                retired: core::ptr::null_mut(),
            }),
            #[cfg(debug_assertions)]
            writing: AtomicBool::new(false),
        }
    }

    /// Number of published elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Whether nothing has been published yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a value, returning the new length.
    ///
    /// Only one thread may call this at a time; concurrent writers are
    /// undefined (asserted in debug builds). Readers are unaffected.
    pub fn push_back(&self, value: T) -> usize {
        #[cfg(debug_assertions)]
        assert!(
            !self.writing.swap(true, Ordering::Acquire),
            "GrowableArray only supports a single writer"
        );

        let size = self.size.load(Ordering::Relaxed);
        let index = size >> BLOCK_SHIFT;
        let offset = size & BLOCK_MASK;

        // SAFETY: the single-writer contract grants exclusive access to the
        // writer state.
        let writer = unsafe { &mut *self.writer.get() };
        let mut map = self.map.load(Ordering::Relaxed);

        if map.is_null() {
            map = BlockMap::alloc(INITIAL_MAP_CAPACITY);
            unsafe {
                (*map).blocks[0].store(Block::alloc(), Ordering::Relaxed);
            }
            writer.map_size = 1;
            writer.map_capacity = INITIAL_MAP_CAPACITY;
            // Publish the map before the size that makes it reachable.
            self.map.store(map, Ordering::Release);
        } else if index < writer.map_size {
            // The target block already exists.
        } else if writer.map_size < writer.map_capacity {
            unsafe {
                (*map).blocks[writer.map_size].store(Block::alloc(), Ordering::Release);
            }
            writer.map_size += 1;
        } else {
            // Out of map room: republish a doubled map. The old map is
            // retired, not freed; readers may still be indexing it.
            let grown = BlockMap::alloc(writer.map_capacity * 2);
            unsafe {
                for i in 0..writer.map_capacity {
                    let block = (*map).blocks[i].load(Ordering::Relaxed);
                    (*grown).blocks[i].store(block, Ordering::Relaxed);
                }
                (*grown).blocks[writer.map_size].store(Block::alloc(), Ordering::Relaxed);
                (*map).next = writer.retired;
            }
            writer.retired = map;
            writer.map_capacity *= 2;
            writer.map_size += 1;
            self.map.store(grown, Ordering::Release);
            map = grown;
        }

        unsafe {
            let block = (*map).blocks[index].load(Ordering::Relaxed);
            (*(*block).slots[offset].get()).write(value);
        }
        self.size.store(size + 1, Ordering::Release);

        #[cfg(debug_assertions)]
        self.writing.store(false, Ordering::Release);

        size + 1
    }

    /// Returns the element at `index`, or `None` when it has not been
    /// published yet.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.size.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the acquire-load of size covers the map, the block
        // pointer and the value at every index below it.
        Some(unsafe { self.read_unchecked(index) })
    }

    /// Returns the element at `index` through a cached view, re-loading
    /// `size` only when the index exceeds the cached bound.
    #[inline]
    pub fn read(&self, state: &mut ReaderState, index: usize) -> Option<&T> {
        if index >= state.size {
            state.size = self.size.load(Ordering::Acquire);
            if index >= state.size {
                return None;
            }
        }
        // SAFETY: as in get(); the cached size was acquire-loaded.
        Some(unsafe { self.read_unchecked(index) })
    }

    /// # Safety
    ///
    /// `index` must be below an acquire-loaded `size`.
    #[inline]
    unsafe fn read_unchecked(&self, index: usize) -> &T {
        let map = self.map.load(Ordering::Acquire);
        unsafe {
            let block = (*map).blocks[index >> BLOCK_SHIFT].load(Ordering::Acquire);
            (*(*block).slots[index & BLOCK_MASK].get()).assume_init_ref()
        }
    }
}

impl<T> Index<usize> for GrowableArray<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(value) => value,
            None => panic!("index {index} out of bounds"),
        }
    }
}

impl<T> Default for GrowableArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for GrowableArray<T> {
    fn drop(&mut self) {
        let map = self.map.load(Ordering::Relaxed);
        if map.is_null() {
            return;
        }
        let size = self.size.load(Ordering::Relaxed);
        let writer = self.writer.get_mut();
        unsafe {
            // Drop the constructed prefix (the last block is partial).
            for index in 0..size {
                let block = (*map).blocks[index >> BLOCK_SHIFT].load(Ordering::Relaxed);
                (*(*block).slots[index & BLOCK_MASK].get()).assume_init_drop();
            }
            for i in 0..writer.map_size {
                drop(Box::from_raw((*map).blocks[i].load(Ordering::Relaxed)));
            }
            // The retired maps only ever held aliases of the same blocks.
            let mut retired = writer.retired;
            drop(Box::from_raw(map));
            while !retired.is_null() {
                let next = (*retired).next;
                drop(Box::from_raw(retired));
                retired = next;
            }
        }
    }
}
