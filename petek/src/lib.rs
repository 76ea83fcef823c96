//! Petek: hazard-era memory reclamation for lock-free data structures.
//!
//! Petek lets lock-free producers free nodes that concurrent readers may
//! still be dereferencing, without blocking and without reference counting
//! on the hot path. Each thread publishes the era at which it enters a
//! critical section; retired memory is reclaimed only once its retire era is
//! older than the oldest live enter era.
//!
//! # Key Features
//!
//! - **Cheap reads**: protected loads are a single atomic load under a guard
//! - **Lock-free progress**: reclamation never blocks producers or readers
//! - **Typed allocation**: one [`HazardEraAllocator`] per node type, with a
//!   type-erased destructor recorded in the buffer header
//! - **Amortized reclamation**: the era advances and cleanup runs once per
//!   1024 retires
//!
//! # Example
//!
//! ```
//! use petek::HazardEraAllocator;
//! use std::sync::atomic::{AtomicPtr, Ordering};
//!
//! let allocator: HazardEraAllocator<u64> = HazardEraAllocator::new();
//! let slot = AtomicPtr::new(allocator.allocate(42));
//!
//! // Enter a critical section
//! let guard = allocator.guard();
//!
//! // Protected load: the value cannot be reclaimed while the guard lives
//! let ptr = allocator.protect(&slot, Ordering::Acquire);
//! assert_eq!(unsafe { *ptr }, 42);
//!
//! drop(guard);
//!
//! // Swap out and retire; freed once all concurrent readers move on
//! let old = slot.swap(allocator.allocate(43), Ordering::AcqRel);
//! unsafe { allocator.retire(old) };
//! ```
//!
//! The container crates (`petek-stack`, `petek-queue`, `petek-array`,
//! `petek-cache`) build on this core.

#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

mod alloc;
mod atomic128;
mod backoff;
mod buffer;
mod counter;
mod era;
mod guard;
mod pad;
mod registry;
mod ttas;

pub use alloc::HazardEraAllocator;
pub use atomic128::Atomic128;
pub use backoff::Backoff;
pub use counter::{FrequencyCounter, StripedCounter};
pub use guard::{flush, guard, thread_id, Guard};
pub use pad::{CacheAligned, CACHE_LINE_SIZE};
pub use registry::MAX_THREADS;

// Re-export for convenience
pub use core::sync::atomic::Ordering;
