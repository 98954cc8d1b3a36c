//! The [`ParallelData`] trait: what travels between ranks.

use parstudy_buffer::{Shared, SharedPool};
use parstudy_comm::CodecError;

/// The transmissible counterpart of a work item.
///
/// Parallel data lives behind [`Shared`] handles so it can be referenced
/// from the work buffer, a send batch and a hook at the same time
/// without copying. Decoded objects are rebuilt through a pool, which
/// lets recycled objects keep their allocations.
pub trait ParallelData: Send + Sync + Sized + 'static {
    /// Exact number of bytes [`pack`](ParallelData::pack) appends.
    fn packed_size(&self) -> usize;

    /// Append the encoding of `self` to `out`.
    fn pack(&self, out: &mut Vec<u8>);

    /// Decode one object from the front of `input`, advancing it, and
    /// build it through `pool`.
    fn unpack(input: &mut &[u8], pool: &SharedPool<Self>) -> Result<Shared<Self>, CodecError>;
}
