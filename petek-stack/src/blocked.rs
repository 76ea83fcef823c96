//! Unbounded stack composed of bounded blocks.
//!
//! The algorithm marks a drained block for deletion instead of deleting it
//! outright: whichever push or pop observes a failure on the head block
//! seals it by poisoning the top index, and whoever sees a sealed block
//! tries to unlink it. Every operation thus works on a sequence of
//! (block fine -> sealed -> removed) transitions, and at most one block
//! carries the seal at a time.
//!
//! With blocks of 128 slots, reclamation runs per block rather than per
//! element, so the hazard-era machinery stays off the common path.

use crate::bounded::BoundedStack;
use core::sync::atomic::{fence, AtomicPtr, Ordering};
use petek::{CacheAligned, HazardEraAllocator};

const BLOCK_CAPACITY: usize = 128;
const BLOCK_MARK: u32 = u32::MAX;

struct BlockNode<T> {
    /// Written only before the block is published; immutable afterwards.
    next: *mut BlockNode<T>,
    stack: BoundedStack<T>,
}

// SAFETY: the raw next pointer is managed by the stack's publication
// protocol; blocks move between threads only through it.
unsafe impl<T: Copy + Send> Send for BlockNode<T> {}

/// An unbounded lock-free stack for small `Copy` payloads, chaining
/// [`BoundedStack`] blocks behind a hazard-protected head.
///
/// ```
/// use petek_stack::UnboundedBlockedStack;
///
/// let stack = UnboundedBlockedStack::new();
/// for i in 0..200u32 {
///     stack.push(i);
/// }
/// assert_eq!(stack.pop(), Some(199));
/// ```
pub struct UnboundedBlockedStack<T: Copy + Send + 'static> {
    head: CacheAligned<AtomicPtr<BlockNode<T>>>,
    allocator: HazardEraAllocator<BlockNode<T>>,
}

unsafe impl<T: Copy + Send + 'static> Send for UnboundedBlockedStack<T> {}
unsafe impl<T: Copy + Send + 'static> Sync for UnboundedBlockedStack<T> {}

impl<T: Copy + Send + 'static> UnboundedBlockedStack<T> {
    fn fresh_block(allocator: &HazardEraAllocator<BlockNode<T>>, next: *mut BlockNode<T>) -> *mut BlockNode<T> {
        allocator.allocate(BlockNode {
            next,
            stack: BoundedStack::with_mark(BLOCK_CAPACITY, BLOCK_MARK),
        })
    }

    /// Creates an empty stack with one block.
    pub fn new() -> Self {
        let allocator = HazardEraAllocator::new();
        let first = Self::fresh_block(&allocator, core::ptr::null_mut());
        Self {
            head: CacheAligned::new(AtomicPtr::new(first)),
            allocator,
        }
    }

    /// Pushes a value onto the stack.
    pub fn push(&self, value: T) {
        let _guard = self.allocator.guard();
        loop {
            let head = self.allocator.protect(&self.head, Ordering::Acquire);
            // SAFETY: head is guard-protected and never null.
            let top = unsafe { (*head).stack.top_slot() };
            if unsafe { (*head).stack.push(value) }.is_ok() {
                return;
            }

            if top.index == BLOCK_MARK {
                // Sealed blocks are never the last block, so next is valid.
                let next = unsafe { (*head).next };
                if self
                    .head
                    .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    fence(Ordering::Acquire);
                    unsafe { self.allocator.retire(head) };
                }
            } else {
                // Full: link a fresh block on top. Racing threads may
                // observe either the old or the new head.
                let node = Self::fresh_block(&self.allocator, head);
                if self
                    .head
                    .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed)
                    .is_err()
                {
                    unsafe { self.allocator.deallocate_unsafe(node) };
                }
            }
        }
    }

    /// Pops the most recently pushed value.
    pub fn pop(&self) -> Option<T> {
        let _guard = self.allocator.guard();
        loop {
            let head = self.allocator.protect(&self.head, Ordering::Acquire);
            // SAFETY: head is guard-protected and never null.
            let top = unsafe { (*head).stack.top_slot() };
            if let Some(value) = unsafe { (*head).stack.pop() } {
                return Some(value);
            }

            let next = unsafe { (*head).next };
            if next.is_null() {
                return None;
            }

            // Seal the drained head (the CAS fails if anything was pushed
            // since we observed the top), then unlink it.
            if top.index == BLOCK_MARK || unsafe { (*head).stack.try_mark(top) } {
                if self
                    .head
                    .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    fence(Ordering::Acquire);
                    unsafe { self.allocator.retire(head) };
                }
            }
        }
    }
}

impl<T: Copy + Send + 'static> Default for UnboundedBlockedStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Send + 'static> Drop for UnboundedBlockedStack<T> {
    fn drop(&mut self) {
        // Exclusive access: no guards are live on this stack.
        let mut node = self.head.load(Ordering::Acquire);
        while !node.is_null() {
            unsafe {
                let next = (*node).next;
                self.allocator.deallocate_unsafe(node);
                node = next;
            }
        }
    }
}
