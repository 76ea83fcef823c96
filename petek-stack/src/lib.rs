//! Lock-free stacks over hazard-era reclamation.
//!
//! Three flavors:
//!
//! - [`BoundedStack`]: array-based stack for small `Copy` payloads, built
//!   on a double-wide CAS over `{value, index, counter}` slots. No
//!   allocation after construction.
//! - [`UnboundedStack`]: classic Treiber stack; nodes are retired through
//!   the hazard-era allocator so poppers never free memory a concurrent
//!   reader still holds.
//! - [`UnboundedBlockedStack`]: chains bounded blocks of 128 slots behind
//!   a hazard-protected head, trading the Treiber stack's per-node
//!   allocation for per-block allocation and O(block) reclamation.

#![warn(unsafe_op_in_unsafe_fn)]

mod blocked;
mod bounded;
mod treiber;

pub use blocked::UnboundedBlockedStack;
pub use bounded::BoundedStack;
pub use treiber::UnboundedStack;
