//! The set of per-destination send buffers, plus the communicator they
//! send through.

use indexmap::IndexMap;
use parstudy_buffer::Shared;
use parstudy_comm::{Communicator, Rank, Tag};

use crate::data::ParallelData;
use crate::error::StudyError;
use crate::send_buffer::{SendBuffer, SendBufferSizing};

pub(crate) struct Outbox<P: ParallelData, C: Communicator> {
    // Declared before `comm` so in-flight sends are waited on while the
    // communicator is still alive.
    pub(crate) send_buffers: IndexMap<Rank, SendBuffer<P, C>>,
    pub(crate) comm: C,
    tag: Tag,
    sizing: SendBufferSizing,
}

impl<P: ParallelData, C: Communicator> Outbox<P, C> {
    pub(crate) fn new(comm: C, tag: Tag, sizing: SendBufferSizing) -> Self {
        Self {
            send_buffers: IndexMap::new(),
            comm,
            tag,
            sizing,
        }
    }

    /// Queue `data` for `dest`, creating its send buffer on first use.
    pub(crate) fn send(&mut self, study: &str, data: Shared<P>, dest: Rank) -> Result<(), StudyError> {
        let size = self.comm.size();
        if dest >= size || dest == self.comm.rank() {
            return Err(StudyError::InvalidDestination {
                study: study.to_string(),
                dest,
                size,
            });
        }
        let (tag, sizing) = (self.tag, self.sizing);
        self.send_buffers
            .entry(dest)
            .or_insert_with(|| SendBuffer::new(dest, tag, sizing))
            .move_object(&self.comm, data);
        Ok(())
    }

    /// Force out every pending batch.
    pub(crate) fn flush(&mut self) {
        for buffer in self.send_buffers.values_mut() {
            buffer.force_send(&self.comm, true);
        }
    }

    pub(crate) fn sending_or_buffered(&self) -> bool {
        self.send_buffers
            .values()
            .any(|b| b.currently_sending() || b.currently_buffered())
    }

    /// Drop every send buffer. Only valid when none is sending.
    pub(crate) fn reset(&mut self) {
        for buffer in self.send_buffers.values_mut() {
            buffer.clear();
        }
        self.send_buffers.clear();
    }
}
