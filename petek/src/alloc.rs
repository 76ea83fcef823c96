//! Typed hazard-era allocator facade.

use crate::buffer::{BufferHeader, HazardBuffer};
use crate::guard::{self, Guard};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Typed allocator + reclamation service for one node type.
///
/// Lets lock-free producers retire nodes whose logical lifetime has ended
/// while readers may still be dereferencing them, without blocking and
/// without reference counting on the hot path.
///
/// The allocator itself is a zero-sized handle; all state lives in the
/// process-wide era registry and the calling thread's handle. Containers
/// embed one per node type:
///
/// ```
/// use petek::HazardEraAllocator;
/// use std::sync::atomic::{AtomicPtr, Ordering};
///
/// struct Node {
///     value: u64,
///     next: AtomicPtr<Node>,
/// }
///
/// let allocator: HazardEraAllocator<Node> = HazardEraAllocator::new();
/// let head = AtomicPtr::new(allocator.allocate(Node {
///     value: 7,
///     next: AtomicPtr::new(std::ptr::null_mut()),
/// }));
///
/// {
///     let _guard = allocator.guard();
///     let node = allocator.protect(&head, Ordering::Acquire);
///     assert_eq!(unsafe { (*node).value }, 7);
/// }
///
/// // Exclusive at this point, so the immediate path is fine.
/// unsafe { allocator.deallocate_unsafe(head.load(Ordering::Relaxed)) };
/// ```
pub struct HazardEraAllocator<T: Send + 'static> {
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Send + 'static> HazardEraAllocator<T> {
    /// Creates an allocator handle.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Enter a critical section. See [`guard()`](crate::guard()).
    #[inline]
    pub fn guard(&self) -> Guard {
        guard::guard()
    }

    /// Allocates a buffer recording the current era and constructs `value`
    /// in place, returning a pointer to the value.
    ///
    /// The pointer must eventually be handed back through
    /// [`retire`](Self::retire) or [`deallocate_unsafe`](Self::deallocate_unsafe).
    pub fn allocate(&self, value: T) -> *mut T {
        let buffer = HazardBuffer::boxed(value);
        guard::note_alloc();
        HazardBuffer::value_ptr(buffer)
    }

    /// Loads `ptr` under the calling thread's active guard.
    ///
    /// The observed value is guaranteed to be either still allocated or not
    /// yet retired when the surrounding guard was entered: the guard's
    /// published enter era blocks reclamation of anything retired at or
    /// after it. Readers call this instead of a bare load.
    #[inline]
    pub fn protect(&self, ptr: &AtomicPtr<T>, order: Ordering) -> *mut T {
        debug_assert!(
            guard::guard_active(),
            "protect() requires an active guard on this thread"
        );
        ptr.load(order)
    }

    /// Hands `ptr` to the reclaimer: its destructor runs once every thread
    /// that could have observed it has left its guard.
    ///
    /// # Safety
    ///
    /// - `ptr` must come from [`allocate`](Self::allocate) on this
    ///   allocator type.
    /// - `ptr` must be unreachable from the container (unlinked) and must
    ///   not be retired more than once.
    /// - The caller must not access `*ptr` after this call.
    pub unsafe fn retire(&self, ptr: *mut T) {
        let buffer = unsafe { HazardBuffer::from_value(ptr) };
        let header = buffer as *mut BufferHeader;
        unsafe {
            let retired = crate::era::global().current();
            debug_assert!(
                (*header).allocated <= retired,
                "retire era precedes allocation era"
            );
            debug_assert_eq!((*header).retired, u64::MAX, "double retire");
            (*header).retired = retired;
            (*header).destructor = Some(HazardBuffer::<T>::destroy);
        }
        guard::retire_header(header);
    }

    /// Destroys `ptr` immediately, bypassing the reclaimer.
    ///
    /// # Safety
    ///
    /// Callable only when no other thread can possibly hold the pointer,
    /// typically from the destructor of the owning container.
    pub unsafe fn deallocate_unsafe(&self, ptr: *mut T) {
        unsafe {
            drop(Box::from_raw(HazardBuffer::from_value(ptr)));
        }
    }
}

impl<T: Send + 'static> Default for HazardEraAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Clone for HazardEraAllocator<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}
