//! Treiber stack over hazard-era reclamation.
//!
//! https://en.wikipedia.org/wiki/Treiber_stack

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{fence, AtomicPtr, Ordering};
use petek::{Backoff, CacheAligned, HazardEraAllocator};

struct StackNode<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    /// Written only before the node is published; immutable afterwards.
    next: *mut StackNode<T>,
}

// SAFETY: the raw next pointer is managed by the stack's publication
// protocol; nodes move between threads only through it.
unsafe impl<T: Send> Send for StackNode<T> {}

/// An unbounded lock-free stack.
///
/// `push` never fails; `pop` returns `None` on an empty stack. Popped nodes
/// are retired through the hazard-era allocator, so a concurrent popper that
/// still holds the old head dereferences valid memory.
///
/// ```
/// use petek_stack::UnboundedStack;
///
/// let stack = UnboundedStack::new();
/// stack.push("a");
/// stack.push("b");
/// assert_eq!(stack.pop(), Some("b"));
/// assert_eq!(stack.pop(), Some("a"));
/// assert_eq!(stack.pop(), None);
/// ```
pub struct UnboundedStack<T: Send + 'static> {
    head: CacheAligned<AtomicPtr<StackNode<T>>>,
    allocator: HazardEraAllocator<StackNode<T>>,
}

unsafe impl<T: Send + 'static> Send for UnboundedStack<T> {}
unsafe impl<T: Send + 'static> Sync for UnboundedStack<T> {}

impl<T: Send + 'static> UnboundedStack<T> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self {
            head: CacheAligned::new(AtomicPtr::new(core::ptr::null_mut())),
            allocator: HazardEraAllocator::new(),
        }
    }

    /// Pushes a value onto the stack.
    pub fn push(&self, value: T) {
        let node = self.allocator.allocate(StackNode {
            value: UnsafeCell::new(MaybeUninit::new(value)),
            next: core::ptr::null_mut(),
        });
        let mut backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: node is unpublished, we still own it exclusively.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(current) => {
                    head = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Pops the most recently pushed value.
    pub fn pop(&self) -> Option<T> {
        let _guard = self.allocator.guard();
        let mut backoff = Backoff::new();
        loop {
            let head = self.allocator.protect(&self.head, Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            // SAFETY: head is guard-protected; next is immutable once the
            // node is published.
            let next = unsafe { (*head).next };
            if self
                .head
                .compare_exchange_weak(head, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                fence(Ordering::Acquire);
                // SAFETY: winning the CAS grants exclusive ownership of the
                // unlinked node's value slot; it is read exactly once.
                let value = unsafe { (*(*head).value.get()).assume_init_read() };
                unsafe { self.allocator.retire(head) };
                return Some(value);
            }
            backoff.spin();
        }
    }

    /// Whether the stack was empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T: Send + 'static> Default for UnboundedStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for UnboundedStack<T> {
    fn drop(&mut self) {
        // Exclusive access: no guards are live on this stack.
        let mut node = self.head.load(Ordering::Acquire);
        while !node.is_null() {
            unsafe {
                let next = (*node).next;
                // Every node still linked holds a live value.
                (*(*node).value.get()).assume_init_drop();
                self.allocator.deallocate_unsafe(node);
                node = next;
            }
        }
    }
}
