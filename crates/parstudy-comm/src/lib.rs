//! Message passing for parstudy.
//!
//! The engine never talks to a transport directly. It goes through the
//! [`Communicator`] trait: tag-scoped non-blocking point-to-point
//! messages plus a handful of collectives used for termination
//! detection. Every operation returns a [`Request`] that is completed by
//! polling.
//!
//! [`LocalCluster`] is the in-process backend: one OS thread per rank,
//! one `crossbeam-channel` mailbox per rank, and a shared slot table for
//! collectives. It is what the test suites and benchmarks run on.
//!
//! The [`packing`] module holds the wire codec, and [`push`] the
//! non-blocking all-to-all exchange used when message counts per rank
//! are unknown up front.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod collective;
pub mod comm;
pub mod local;
pub mod packing;
pub mod push;

pub use comm::{Communicator, Rank, Request, Status, Tag};
pub use local::{LocalCluster, LocalComm};
pub use packing::{CodecError, Packing};
pub use push::push_parallel_helper;
