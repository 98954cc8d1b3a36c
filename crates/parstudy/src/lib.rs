//! parstudy: distributed execution of dynamically generated work.
//!
//! This is the facade crate that re-exports the public API of the
//! parstudy sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use parstudy::prelude::*;
//! use parstudy::comm::LocalComm;
//!
//! #[derive(Default)]
//! struct Unit;
//!
//! impl Recyclable for Unit {
//!     fn construct(_: ()) -> Self {
//!         Unit
//!     }
//! }
//!
//! impl ParallelData for Unit {
//!     fn packed_size(&self) -> usize { 0 }
//!     fn pack(&self, _out: &mut Vec<u8>) {}
//!     fn unpack(_input: &mut &[u8], pool: &SharedPool<Self>) -> Result<Shared<Self>, CodecError> {
//!         Ok(pool.acquire(()))
//!     }
//! }
//!
//! let handler = ClosureHandler::new(|n: &mut u32, ctx: &mut ThreadContext<'_, u32, Unit>| {
//!     if *n > 0 {
//!         ctx.move_work_to_buffer(*n - 1)?;
//!     }
//!     Ok(())
//! });
//! let mut study = ParallelStudy::new(LocalComm::single(), StudyConfig::default(), handler).unwrap();
//! study.pre_execute().unwrap();
//! study.move_work_to_buffer(9, 0).unwrap();
//! study.execute().unwrap();
//! assert_eq!(study.total_work_completed(), 10);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`buffer`] | `parstudy-buffer` | Work buffers and the object pool |
//! | [`comm`] | `parstudy-comm` | Communicator traits, in-process cluster, codec, push exchange |
//! | [`engine`] | `parstudy-engine` | `ParallelStudy`, send/receive buffers, handlers |
//! | [`claim`] | `parstudy-claim` | Spatial ownership assignment |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Work buffers and the object pool (`parstudy-buffer`).
pub use parstudy_buffer as buffer;

/// Message passing (`parstudy-comm`).
///
/// [`comm::LocalCluster`] runs one rank per thread in-process.
pub use parstudy_comm as comm;

/// The study engine (`parstudy-engine`).
pub use parstudy_engine as engine;

/// Spatial ownership assignment (`parstudy-claim`).
pub use parstudy_claim as claim;

/// Common imports for writing and running a study.
pub mod prelude {
    // Buffers and pooling
    pub use parstudy_buffer::{Buffer, Recyclable, Shared, SharedPool};

    // Communication
    pub use parstudy_comm::{CodecError, Communicator, Packing, Rank};

    // Engine
    pub use parstudy_engine::{
        ClosureHandler, Method, ParallelData, ParallelStudy, StudyConfig, StudyContext,
        StudyError, StudyHandler, StudyStats, ThreadContext, WorkBufferType,
    };

    // Claiming
    pub use parstudy_claim::{ClaimError, ClaimItems, Claimable, PointLocator};
}
