//! Ownership assignment for spatially located items.
//!
//! Before a distributed study starts, items generated anywhere (ray
//! origins, particles, seeds) must each end up on exactly one rank: the
//! one owning the mesh element their start point lies in. [`ClaimItems`]
//! routes items by bounding box, resolves points on shared faces with a
//! deterministic tie-break, and verifies the result globally.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod claim;
pub mod geometry;
pub mod locator;

pub use claim::{ClaimError, ClaimItems};
pub use geometry::{BoundingBox, Point};
pub use locator::{tie_break, Claimable, ElemHit, ElemId, Hits, PointLocator};
