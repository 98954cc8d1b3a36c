//! Read-only run statistics.

/// Work counters owned by the study, reset by `pre_execute()`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StudyCounters {
    pub(crate) chunks_executed: u64,
    pub(crate) work_started: u64,
    pub(crate) work_executed: u64,
    pub(crate) work_completed: u64,
    pub(crate) total_work_started: u64,
    pub(crate) total_work_completed: u64,
}

/// Snapshot of a study's counters, for instrumentation.
///
/// `total_*` values are the last global sums the termination algorithm
/// observed; after a successful run they are equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StudyStats {
    /// Chunks executed on this rank.
    pub local_chunks_executed: u64,
    /// Work items started on this rank.
    pub local_work_started: u64,
    /// Work items executed on this rank.
    pub local_work_executed: u64,
    /// Work items completed on this rank.
    pub local_work_completed: u64,
    /// Work items started across all ranks.
    pub total_work_started: u64,
    /// Work items completed across all ranks.
    pub total_work_completed: u64,
    /// Byte buffers allocated by the send buffers.
    pub send_buffer_pool_created: u64,
    /// Parallel data objects sent.
    pub parallel_data_sent: u64,
    /// Messages sent.
    pub buffers_sent: u64,
    /// Parallel data objects received.
    pub parallel_data_received: u64,
    /// Messages received.
    pub buffers_received: u64,
    /// Parallel data objects allocated by the per-thread pools.
    pub pool_parallel_data_created: u64,
}
