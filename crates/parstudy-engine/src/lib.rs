//! Distributed execution of dynamically generated work.
//!
//! A [`ParallelStudy`] runs on every rank of a [`Communicator`]. Work
//! items are executed locally in chunks on a pool of worker threads; a
//! [`StudyHandler`] turns finished work into [`ParallelData`] for other
//! ranks and turns arriving data back into work. The study decides when
//! the whole cluster is done using one of three termination algorithms
//! (see [`Method`]).
//!
//! [`Communicator`]: parstudy_comm::Communicator

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod chunk;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod handler;
mod outbox;
pub mod receive_buffer;
pub mod send_buffer;
pub mod stats;
pub mod study;

#[cfg(test)]
mod test_data;

pub use config::{Method, StudyConfig, WorkBufferType};
pub use context::{StudyContext, ThreadContext};
pub use data::ParallelData;
pub use error::{BufferCheck, ConfigError, MoveWorkError, StudyError};
pub use handler::{ClosureHandler, StudyHandler};
pub use receive_buffer::ReceiveBuffer;
pub use send_buffer::SendBuffer;
pub use stats::StudyStats;
pub use study::ParallelStudy;
