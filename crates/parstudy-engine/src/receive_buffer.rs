//! Polling receiver for incoming parallel data.
//!
//! Probing is rate limited: only every `clicks_per_receive`-th call to
//! [`receive`](ReceiveBuffer::receive) looks at the network. Each probed
//! message gets a posted receive; completed receives are decoded into a
//! LIFO result buffer that the study drains into its hooks.

use parstudy_buffer::{Buffer, LifoBuffer, Shared, SharedPool};
use parstudy_comm::packing::unpack_range_into;
use parstudy_comm::{CodecError, Communicator, Request, Tag};

use crate::data::ParallelData;

/// Incoming side of a study's parallel data exchange.
pub struct ReceiveBuffer<P: ParallelData, C: Communicator> {
    tag: Tag,
    clicks_per_receive: u32,
    current_clicks: u64,
    requests: Vec<C::RecvRequest>,
    buffer: LifoBuffer<Shared<P>>,
    vector_pool: SharedPool<Vec<Shared<P>>>,
    objects_received: u64,
    buffers_received: u64,
}

impl<P: ParallelData, C: Communicator> ReceiveBuffer<P, C> {
    /// Create a receiver for messages on `tag`.
    ///
    /// # Panics
    ///
    /// Panics if `clicks_per_receive == 0`.
    pub fn new(tag: Tag, clicks_per_receive: u32) -> Self {
        assert!(clicks_per_receive > 0, "clicks_per_receive must be positive");
        Self {
            tag,
            clicks_per_receive,
            current_clicks: 0,
            requests: Vec::new(),
            buffer: LifoBuffer::new(),
            vector_pool: SharedPool::new(),
            objects_received: 0,
            buffers_received: 0,
        }
    }

    /// Objects decoded since construction.
    pub fn objects_received(&self) -> u64 {
        self.objects_received
    }

    /// Messages completed since construction.
    pub fn buffers_received(&self) -> u64 {
        self.buffers_received
    }

    /// Whether any posted receive has not been cleaned up.
    pub fn currently_receiving(&self) -> bool {
        !self.requests.is_empty()
    }

    /// Received objects not yet handed to the study.
    pub fn buffer(&self) -> &LifoBuffer<Shared<P>> {
        &self.buffer
    }

    /// Mutable access to the received objects.
    pub fn buffer_mut(&mut self) -> &mut LifoBuffer<Shared<P>> {
        &mut self.buffer
    }

    /// Post receives for waiting messages (rate limited) and, unless
    /// `start_receives_only`, decode every completed one.
    pub fn receive(
        &mut self,
        comm: &C,
        start_receives_only: bool,
        pool: &SharedPool<P>,
    ) -> Result<(), CodecError> {
        if self.current_clicks % u64::from(self.clicks_per_receive) == 0 {
            while let Some(status) = comm.iprobe(self.tag) {
                self.requests.push(comm.irecv(&status));
            }
        }
        self.current_clicks += 1;

        if !start_receives_only {
            self.cleanup_requests(pool)?;
        }
        Ok(())
    }

    /// Decode every completed receive into the result buffer, keeping
    /// incomplete ones posted. Objects are rebuilt through `pool`.
    pub fn cleanup_requests(&mut self, pool: &SharedPool<P>) -> Result<(), CodecError> {
        let posted = std::mem::take(&mut self.requests);
        let mut result = Ok(());
        for mut request in posted {
            if result.is_err() || !request.test() {
                self.requests.push(request);
                continue;
            }
            let bytes = request.finish();
            let mut objects = self.vector_pool.checkout(());
            match unpack_range_into(&bytes, &mut *objects, |input| P::unpack(input, pool)) {
                Ok(count) => {
                    self.objects_received += count as u64;
                    self.buffers_received += 1;
                    self.buffer.append(&mut *objects);
                }
                Err(e) => result = Err(e),
            }
        }
        result
    }

    /// Drop received objects and reset the probe cadence and counters.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.current_clicks = 0;
        self.objects_received = 0;
        self.buffers_received = 0;
    }
}

impl<P: ParallelData, C: Communicator> Drop for ReceiveBuffer<P, C> {
    fn drop(&mut self) {
        for request in self.requests.drain(..) {
            request.wait();
        }
    }
}
