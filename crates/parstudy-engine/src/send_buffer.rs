//! Per-destination batching of outgoing parallel data.
//!
//! Objects accumulate in a batch until it reaches the current batch
//! size, the configured maximum, or [`MAX_BUFFER_BYTES`]; then the whole
//! batch is packed into one message. Under SMART the batch size adapts:
//! it grows by the growth multiplier after every threshold-triggered
//! send and shrinks by the shrink multiplier after every forced flush,
//! always staying within `[min, max]`.

use parstudy_buffer::{Pooled, Shared, SharedPool};
use parstudy_comm::packing::pack_range;
use parstudy_comm::{Communicator, Rank, Request, Tag};

use crate::config::Method;
use crate::data::ParallelData;

/// Batch byte size that forces a send regardless of object count.
pub const MAX_BUFFER_BYTES: usize = 1 << 20;

/// Sizing parameters shared by every send buffer of a study.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SendBufferSizing {
    /// Whether the batch size adapts to traffic.
    pub adaptive: bool,
    /// Floor for shrinking.
    pub min: usize,
    /// Ceiling for growth, and the hard batch limit.
    pub max: usize,
    /// Factor applied on growth.
    pub growth: f64,
    /// Factor applied on shrink.
    pub shrink: f64,
}

impl SendBufferSizing {
    /// Sizing for `method`: adaptive only under SMART.
    pub fn for_method(method: Method, min: usize, max: usize, growth: f64, shrink: f64) -> Self {
        Self {
            adaptive: method == Method::Smart,
            min,
            max,
            growth,
            shrink,
        }
    }

    fn grown(&self, current: usize) -> usize {
        let next = (current as f64 * self.growth).ceil() as usize;
        next.clamp(self.min, self.max)
    }

    fn shrunk(&self, current: usize) -> usize {
        let next = (current as f64 * self.shrink) as usize;
        next.clamp(self.min, self.max)
    }
}

/// Outgoing batch and in-flight sends for one destination rank.
pub struct SendBuffer<P: ParallelData, C: Communicator> {
    dest: Rank,
    tag: Tag,
    sizing: SendBufferSizing,
    current_buffer_size: usize,
    buffer: Vec<Shared<P>>,
    buffered_bytes: usize,
    requests: Vec<(C::SendRequest, Pooled<Vec<u8>>)>,
    byte_pool: SharedPool<Vec<u8>>,
    objects_sent: u64,
    buffers_sent: u64,
}

impl<P: ParallelData, C: Communicator> SendBuffer<P, C> {
    /// Create an idle buffer that sends to `dest` on `tag`. The batch
    /// size starts at `sizing.min`.
    pub fn new(dest: Rank, tag: Tag, sizing: SendBufferSizing) -> Self {
        Self {
            dest,
            tag,
            sizing,
            current_buffer_size: sizing.min,
            buffer: Vec::new(),
            buffered_bytes: 0,
            requests: Vec::new(),
            byte_pool: SharedPool::new(),
            objects_sent: 0,
            buffers_sent: 0,
        }
    }

    /// Destination rank.
    pub fn dest(&self) -> Rank {
        self.dest
    }

    /// Batch size that currently triggers a send.
    pub fn current_buffer_size(&self) -> usize {
        self.current_buffer_size
    }

    /// Objects sent since construction.
    pub fn objects_sent(&self) -> u64 {
        self.objects_sent
    }

    /// Messages sent since construction.
    pub fn buffers_sent(&self) -> u64 {
        self.buffers_sent
    }

    /// Byte vectors allocated by this buffer's pool.
    pub fn buffer_pool_created(&self) -> u64 {
        self.byte_pool.num_created()
    }

    /// Whether any send has not yet completed.
    pub fn currently_sending(&self) -> bool {
        !self.requests.is_empty()
    }

    /// Whether objects are waiting in the batch.
    pub fn currently_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Add `object` to the batch, sending it if a threshold is reached.
    pub fn move_object(&mut self, comm: &C, object: Shared<P>) {
        self.buffered_bytes += object.packed_size();
        self.buffer.push(object);

        if self.buffer.len() >= self.current_buffer_size
            || self.buffer.len() >= self.sizing.max
            || self.buffered_bytes > MAX_BUFFER_BYTES
        {
            self.force_send(comm, false);
        }
    }

    /// Send whatever is batched, then reap completed sends.
    ///
    /// With `shrink` the adaptive batch size shrinks after sending;
    /// without it, it grows.
    pub fn force_send(&mut self, comm: &C, shrink: bool) {
        if !self.buffer.is_empty() {
            if self.sizing.adaptive {
                self.current_buffer_size = if shrink {
                    self.sizing.shrunk(self.current_buffer_size)
                } else {
                    self.sizing.grown(self.current_buffer_size)
                };
            }

            let mut bytes = self.byte_pool.checkout(());
            bytes.reserve(4 + self.buffered_bytes);
            pack_range(&self.buffer, &mut bytes, |object, out| object.pack(out));
            let request = comm.isend(self.dest, self.tag, &bytes);

            tracing::trace!(
                dest = self.dest,
                objects = self.buffer.len(),
                bytes = bytes.len(),
                next_batch = self.current_buffer_size,
                "sent parallel data batch"
            );

            self.objects_sent += self.buffer.len() as u64;
            self.buffers_sent += 1;
            self.requests.push((request, bytes));
            self.buffer.clear();
            self.buffered_bytes = 0;
        }

        self.cleanup_requests();
    }

    /// Drop the pending batch without sending it.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.buffered_bytes = 0;
    }

    fn cleanup_requests(&mut self) {
        // Completed byte buffers return to the pool as they drop.
        self.requests.retain_mut(|(request, _)| !request.test());
    }
}

impl<P: ParallelData, C: Communicator> Drop for SendBuffer<P, C> {
    fn drop(&mut self) {
        for (request, _bytes) in self.requests.drain(..) {
            request.wait();
        }
    }
}
