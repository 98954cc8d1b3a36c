//! Windowed work buffers and object reuse pools.
//!
//! Both buffer disciplines expose their live elements as one contiguous
//! slice, so a chunk of work can be handed to worker threads without any
//! wraparound handling:
//!
//! ```text
//! CircularBuffer   [ dead | live live live | spare capacity ]
//!                          ^begin          ^end
//!                  erase() advances begin; a full store compacts first
//!
//! LifoBuffer       [ live live live | spare capacity ]
//!                                   ^end
//!                  erase() and chunks work from the tail
//! ```
//!
//! [`SharedPool`] recycles heap objects behind reference-counted
//! [`Shared`] handles that find their way back to the pool on drop.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod circular;
pub mod lifo;
pub mod pool;

pub use buffer::Buffer;
pub use circular::CircularBuffer;
pub use lifo::LifoBuffer;
pub use pool::{Pooled, Recyclable, Shared, SharedPool};
