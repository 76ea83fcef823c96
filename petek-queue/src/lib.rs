//! Lock-free queues over hazard-era reclamation.
//!
//! Three flavors:
//!
//! - [`BoundedQueue`]: array-based MPMC FIFO driven by four monotone
//!   counters; producers and consumers publish in reservation order.
//! - [`UnboundedQueue`]: the Michael–Scott two-pointer FIFO; nodes are
//!   retired through the hazard-era allocator.
//! - [`Bbq`]: a block-based bounded FIFO (BBQ) that splits the ring into
//!   blocks with independent producer/consumer cursors, so contending
//!   threads fight over a block, not the whole queue.
//! - [`BbqBlock`]: one such block on its own: a fill-once / drain-once
//!   batch buffer.

#![warn(unsafe_op_in_unsafe_fn)]

mod bbq;
mod block;
mod bounded;
mod unbounded;

pub use bbq::Bbq;
pub use block::BbqBlock;
pub use bounded::BoundedQueue;
pub use unbounded::UnboundedQueue;
