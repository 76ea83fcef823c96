//! Michael–Scott unbounded MPMC queue.
//!
//! Simple, fast, and practical non-blocking and blocking concurrent queue
//! algorithms. http://www.cs.rochester.edu/~scott/papers/1996_PODC_queues.pdf
//!
//! The queue always holds one dummy node; the head points at the dummy and
//! the first real value lives in `head.next`. A pop advances the head and
//! retires the old dummy through the hazard-era allocator, turning the
//! popped node into the new dummy.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicPtr, Ordering};
use petek::{Backoff, CacheAligned, HazardEraAllocator};

struct QueueNode<T> {
    next: AtomicPtr<QueueNode<T>>,
    value: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: nodes move between threads only through the queue's publication
// protocol.
unsafe impl<T: Send> Send for QueueNode<T> {}

/// An unbounded lock-free FIFO.
///
/// `push` never fails; `pop` returns `None` on an empty queue. The queue is
/// linearizable FIFO across all producers and consumers.
///
/// ```
/// use petek_queue::UnboundedQueue;
///
/// let queue = UnboundedQueue::new();
/// queue.push(1);
/// queue.push(2);
/// assert_eq!(queue.pop(), Some(1));
/// assert_eq!(queue.pop(), Some(2));
/// assert_eq!(queue.pop(), None);
/// ```
pub struct UnboundedQueue<T: Send + 'static> {
    head: CacheAligned<AtomicPtr<QueueNode<T>>>,
    tail: CacheAligned<AtomicPtr<QueueNode<T>>>,
    allocator: HazardEraAllocator<QueueNode<T>>,
}

unsafe impl<T: Send + 'static> Send for UnboundedQueue<T> {}
unsafe impl<T: Send + 'static> Sync for UnboundedQueue<T> {}

impl<T: Send + 'static> UnboundedQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let allocator = HazardEraAllocator::new();
        let dummy = allocator.allocate(QueueNode {
            next: AtomicPtr::new(core::ptr::null_mut()),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        });
        Self {
            head: CacheAligned::new(AtomicPtr::new(dummy)),
            tail: CacheAligned::new(AtomicPtr::new(dummy)),
            allocator,
        }
    }

    /// Appends a value at the tail.
    pub fn push(&self, value: T) {
        let _guard = self.allocator.guard();
        let node = self.allocator.allocate(QueueNode {
            next: AtomicPtr::new(core::ptr::null_mut()),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        });
        let mut backoff = Backoff::new();
        loop {
            let tail = self.allocator.protect(&self.tail, Ordering::Acquire);
            // SAFETY: tail is guard-protected.
            let tail_next = unsafe { &(*tail).next };
            let next = self.allocator.protect(tail_next, Ordering::Acquire);
            if tail == self.tail.load(Ordering::Relaxed) {
                if next.is_null() {
                    if tail_next
                        .compare_exchange_weak(
                            core::ptr::null_mut(),
                            node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        let _ = self.tail.compare_exchange_weak(
                            tail,
                            node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        );
                        return;
                    }
                } else {
                    // Help a lagging producer swing the tail forward.
                    let _ = self.tail.compare_exchange_weak(
                        tail,
                        next,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                }
            }
            backoff.spin();
        }
    }

    /// Removes the oldest value; `None` on an empty queue.
    pub fn pop(&self) -> Option<T> {
        let _guard = self.allocator.guard();
        let mut backoff = Backoff::new();
        loop {
            let head = self.allocator.protect(&self.head, Ordering::Acquire);
            // SAFETY: head is guard-protected.
            let head_next = unsafe { &(*head).next };
            let next = self.allocator.protect(head_next, Ordering::Acquire);
            let tail = self.tail.load(Ordering::Relaxed);
            if head == self.head.load(Ordering::Relaxed) {
                if head == tail {
                    if next.is_null() {
                        return None;
                    }
                    // The tail lags behind an in-flight push; help it.
                    let _ = self.tail.compare_exchange_weak(
                        tail,
                        next,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                } else if self
                    .head
                    .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: winning the head CAS claims next's value slot
                    // exclusively (next is the new dummy; only the pop that
                    // unlinked it reads the slot).
                    let value = unsafe { (*(*next).value.get()).assume_init_read() };
                    unsafe { self.allocator.retire(head) };
                    return Some(value);
                }
            }
            backoff.spin();
        }
    }

    /// Whether the queue was empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == self.tail.load(Ordering::Relaxed)
    }
}

impl<T: Send + 'static> Default for UnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for UnboundedQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: the first node is the dummy (its value was
        // consumed or never set); every node after it holds a live value.
        let mut node = self.head.load(Ordering::Acquire);
        let mut is_dummy = true;
        while !node.is_null() {
            unsafe {
                let next = (*node).next.load(Ordering::Relaxed);
                if !is_dummy {
                    (*(*node).value.get()).assume_init_drop();
                }
                self.allocator.deallocate_unsafe(node);
                node = next;
                is_dummy = false;
            }
        }
    }
}
