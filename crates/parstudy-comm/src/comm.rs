//! The [`Communicator`] and [`Request`] traits.

use std::fmt;

/// Index of a process in a communicator, `0..size()`.
pub type Rank = usize;

/// Message tag. Messages are only matched against probes for the same tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u32);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

/// Envelope information for a probed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status {
    /// Sending rank.
    pub source: Rank,
    /// Tag the message was sent with.
    pub tag: Tag,
    /// Payload length in bytes.
    pub len: usize,
}

/// A non-blocking operation in flight.
///
/// Completion is observed by polling [`test`](Request::test). Once it
/// has returned `true`, [`finish`](Request::finish) hands back the result.
pub trait Request: Sized {
    /// What the completed operation produces.
    type Output;

    /// Poll for completion. Returns `true` once the operation is done;
    /// further calls keep returning `true`.
    fn test(&mut self) -> bool;

    /// Consume a completed request and return its result.
    ///
    /// # Panics
    ///
    /// Implementations may panic if the request has not completed.
    fn finish(self) -> Self::Output;

    /// Poll until complete, yielding the thread between polls.
    fn wait(mut self) -> Self::Output {
        while !self.test() {
            std::thread::yield_now();
        }
        self.finish()
    }
}

/// A group of ranks that exchange tagged byte messages.
///
/// Sends have synchronous-mode semantics: a send request completes only
/// once the destination has matched the message with
/// [`irecv`](Communicator::irecv). Collectives of each kind are matched
/// across ranks by the order in which each rank issues them, so every
/// rank must issue the same sequence of sums, the same sequence of
/// barriers, and the same sequence of gathers.
pub trait Communicator {
    /// Request returned by [`isend`](Communicator::isend).
    type SendRequest: Request<Output = ()>;
    /// Request returned by [`irecv`](Communicator::irecv); yields the payload.
    type RecvRequest: Request<Output = Vec<u8>>;
    /// Request returned by [`isum`](Communicator::isum); yields the global sum.
    type SumRequest: Request<Output = u64>;
    /// Request returned by [`ibarrier`](Communicator::ibarrier).
    type BarrierRequest: Request<Output = ()>;

    /// This process's rank.
    fn rank(&self) -> Rank;

    /// Number of ranks.
    fn size(&self) -> usize;

    /// Allocate a fresh tag. Ranks that allocate tags in the same order
    /// receive the same tags.
    fn unique_tag(&self) -> Tag;

    /// Start sending `bytes` to `dest`.
    fn isend(&self, dest: Rank, tag: Tag, bytes: &[u8]) -> Self::SendRequest;

    /// Check for an incoming message with `tag` from any source.
    fn iprobe(&self, tag: Tag) -> Option<Status>;

    /// Start receiving the message described by a previous probe.
    fn irecv(&self, status: &Status) -> Self::RecvRequest;

    /// Start a global sum of `value` over all ranks.
    fn isum(&self, value: u64) -> Self::SumRequest;

    /// Enter a non-blocking barrier.
    fn ibarrier(&self) -> Self::BarrierRequest;

    /// Gather `bytes` from every rank, indexed by rank.
    fn all_gather(&self, bytes: &[u8]) -> Vec<Vec<u8>>;

    /// Blocking global sum.
    fn sum(&self, value: u64) -> u64 {
        self.isum(value).wait()
    }

    /// Blocking barrier.
    fn barrier(&self) {
        self.ibarrier().wait();
    }
}

impl<C: Communicator + ?Sized> Communicator for &C {
    type SendRequest = C::SendRequest;
    type RecvRequest = C::RecvRequest;
    type SumRequest = C::SumRequest;
    type BarrierRequest = C::BarrierRequest;

    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn unique_tag(&self) -> Tag {
        (**self).unique_tag()
    }

    fn isend(&self, dest: Rank, tag: Tag, bytes: &[u8]) -> Self::SendRequest {
        (**self).isend(dest, tag, bytes)
    }

    fn iprobe(&self, tag: Tag) -> Option<Status> {
        (**self).iprobe(tag)
    }

    fn irecv(&self, status: &Status) -> Self::RecvRequest {
        (**self).irecv(status)
    }

    fn isum(&self, value: u64) -> Self::SumRequest {
        (**self).isum(value)
    }

    fn ibarrier(&self) -> Self::BarrierRequest {
        (**self).ibarrier()
    }

    fn all_gather(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        (**self).all_gather(bytes)
    }

    fn sum(&self, value: u64) -> u64 {
        (**self).sum(value)
    }

    fn barrier(&self) {
        (**self).barrier()
    }
}
