//! Hazard buffer layout.
//!
//! Every allocation that goes through [`HazardEraAllocator`] is a
//! `HazardBuffer<T>`: a header at offset 0 followed by the payload. The
//! header records the allocation era, the retire era, and a type-erased
//! destructor, so a thread's retired list (and the orphan list) can hold
//! buffers of mixed payload types and still destroy each one correctly.
//!
//! [`HazardEraAllocator`]: crate::HazardEraAllocator

use core::mem::offset_of;

/// Type-erased destructor; drops the full `HazardBuffer<T>` allocation.
pub(crate) type DestructorFn = unsafe fn(*mut BufferHeader);

/// Buffer header, always at offset 0 of the allocation.
#[repr(C)]
pub(crate) struct BufferHeader {
    /// Era at allocation time.
    pub(crate) allocated: u64,
    /// Era at retire time; `u64::MAX` while the buffer is live.
    pub(crate) retired: u64,
    /// Set during `retire()`; consumed exactly once by cleanup.
    pub(crate) destructor: Option<DestructorFn>,
}

/// A payload with its reclamation header.
#[repr(C)]
pub(crate) struct HazardBuffer<T> {
    pub(crate) header: BufferHeader,
    pub(crate) value: T,
}

impl<T> HazardBuffer<T> {
    /// Heap-allocates a buffer around `value`, stamping the current era.
    pub(crate) fn boxed(value: T) -> *mut HazardBuffer<T> {
        Box::into_raw(Box::new(HazardBuffer {
            header: BufferHeader {
                allocated: crate::era::global().current(),
                retired: u64::MAX,
                destructor: None,
            },
            value,
        }))
    }

    /// Pointer to the payload inside `buffer`.
    #[inline]
    pub(crate) fn value_ptr(buffer: *mut HazardBuffer<T>) -> *mut T {
        unsafe { core::ptr::addr_of_mut!((*buffer).value) }
    }

    /// Recovers the buffer pointer from a payload pointer.
    ///
    /// # Safety
    ///
    /// `value` must have been produced by [`HazardBuffer::boxed`] (via
    /// `value_ptr`).
    #[inline]
    pub(crate) unsafe fn from_value(value: *mut T) -> *mut HazardBuffer<T> {
        unsafe { value.byte_sub(offset_of!(HazardBuffer<T>, value)) as *mut HazardBuffer<T> }
    }

    /// Monomorphic destructor stored in the header at retire time.
    ///
    /// # Safety
    ///
    /// `header` must be the offset-0 header of a live `HazardBuffer<T>`
    /// allocated by `boxed`, and must not be destroyed twice.
    pub(crate) unsafe fn destroy(header: *mut BufferHeader) {
        unsafe {
            drop(Box::from_raw(header as *mut HazardBuffer<T>));
        }
    }
}
