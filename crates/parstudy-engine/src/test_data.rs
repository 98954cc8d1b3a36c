//! Minimal parallel data for unit tests.

use parstudy_buffer::{Recyclable, Shared, SharedPool};
use parstudy_comm::packing::{read_u64_le, write_u64_le};
use parstudy_comm::CodecError;

use crate::data::ParallelData;

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Blob(pub u64);

impl Recyclable<u64> for Blob {
    fn construct(v: u64) -> Self {
        Blob(v)
    }

    fn reset(&mut self, v: u64) {
        self.0 = v;
    }
}

impl ParallelData for Blob {
    fn packed_size(&self) -> usize {
        8
    }

    fn pack(&self, out: &mut Vec<u8>) {
        write_u64_le(out, self.0);
    }

    fn unpack(input: &mut &[u8], pool: &SharedPool<Self>) -> Result<Shared<Self>, CodecError> {
        Ok(pool.acquire(read_u64_le(input)?))
    }
}
