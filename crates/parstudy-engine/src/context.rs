//! Capability handles passed to [`StudyHandler`](crate::StudyHandler) hooks.
//!
//! [`ThreadContext`] is what a worker thread sees while executing one
//! item: it can stage new work and acquire pooled parallel data, nothing
//! else. [`StudyContext`] is what the main-thread hooks see between
//! chunks: it can also send parallel data and re-enqueue continuing work.

use parstudy_buffer::{Buffer, Recyclable, Shared, SharedPool};
use parstudy_comm::{Communicator, Rank};

use crate::data::ParallelData;
use crate::error::{MoveWorkError, StudyError};
use crate::outbox::Outbox;

fn move_work_error(study: &str, error: MoveWorkError) -> StudyError {
    StudyError::MoveWork {
        study: study.to_string(),
        error,
    }
}

/// Per-thread handle available inside
/// [`StudyHandler::execute_work`](crate::StudyHandler::execute_work).
pub struct ThreadContext<'a, W, P> {
    tid: usize,
    study: &'a str,
    staging: &'a mut Vec<W>,
    pool: &'a SharedPool<P>,
    allow_new_work: bool,
}

impl<'a, W, P> ThreadContext<'a, W, P> {
    pub(crate) fn new(
        tid: usize,
        study: &'a str,
        staging: &'a mut Vec<W>,
        pool: &'a SharedPool<P>,
        allow_new_work: bool,
    ) -> Self {
        Self {
            tid,
            study,
            staging,
            pool,
            allow_new_work,
        }
    }

    /// Id of the executing worker thread.
    pub fn tid(&self) -> usize {
        self.tid
    }

    /// Stage new work. It is merged into the work buffer, and counted as
    /// started, once the current chunk has finished.
    pub fn move_work_to_buffer(&mut self, work: W) -> Result<(), StudyError> {
        if !self.allow_new_work {
            return Err(move_work_error(
                self.study,
                MoveWorkError::DuringExecutionDisabled,
            ));
        }
        self.staging.push(work);
        Ok(())
    }

    /// Stage every item of `works`.
    pub fn move_work_range_to_buffer<I>(&mut self, works: I) -> Result<(), StudyError>
    where
        I: IntoIterator<Item = W>,
    {
        if !self.allow_new_work {
            return Err(move_work_error(
                self.study,
                MoveWorkError::DuringExecutionDisabled,
            ));
        }
        self.staging.extend(works);
        Ok(())
    }

    /// Acquire parallel data from this thread's pool.
    pub fn acquire_parallel_data<A>(&self, args: A) -> Shared<P>
    where
        P: Recyclable<A>,
    {
        self.pool.acquire(args)
    }
}

/// Main-thread handle available to the between-chunk hooks.
pub struct StudyContext<'a, W, P: ParallelData, C: Communicator> {
    study: &'a str,
    outbox: &'a mut Outbox<P, C>,
    // `None` while a chunk is executing.
    work_buffer: Option<&'a mut dyn Buffer<W>>,
    staging: &'a mut Vec<W>,
    pool: &'a SharedPool<P>,
    work_started: &'a mut u64,
    allow_new_work: bool,
}

impl<'a, W, P: ParallelData, C: Communicator> StudyContext<'a, W, P, C> {
    pub(crate) fn new(
        study: &'a str,
        outbox: &'a mut Outbox<P, C>,
        work_buffer: Option<&'a mut dyn Buffer<W>>,
        staging: &'a mut Vec<W>,
        pool: &'a SharedPool<P>,
        work_started: &'a mut u64,
        allow_new_work: bool,
    ) -> Self {
        Self {
            study,
            outbox,
            work_buffer,
            staging,
            pool,
            work_started,
            allow_new_work,
        }
    }

    /// This rank.
    pub fn rank(&self) -> Rank {
        self.outbox.comm.rank()
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.outbox.comm.size()
    }

    /// The study's communicator.
    pub fn comm(&self) -> &C {
        &self.outbox.comm
    }

    /// Acquire parallel data from thread 0's pool.
    pub fn acquire_parallel_data<A>(&self, args: A) -> Shared<P>
    where
        P: Recyclable<A>,
    {
        self.pool.acquire(args)
    }

    /// Queue `data` for sending to `dest`.
    pub fn move_parallel_data_to_buffer(
        &mut self,
        data: Shared<P>,
        dest: Rank,
    ) -> Result<(), StudyError> {
        self.outbox.send(self.study, data, dest)
    }

    /// Add new work. Counted as started immediately, or once the current
    /// chunk finishes if called from
    /// [`post_execute_chunk`](crate::StudyHandler::post_execute_chunk).
    pub fn move_work_to_buffer(&mut self, work: W) -> Result<(), StudyError> {
        if !self.allow_new_work {
            return Err(move_work_error(
                self.study,
                MoveWorkError::DuringExecutionDisabled,
            ));
        }
        match self.work_buffer.as_deref_mut() {
            Some(buffer) => {
                buffer.push_back(work);
                *self.work_started += 1;
            }
            None => self.staging.push(work),
        }
        Ok(())
    }

    /// Re-enqueue work that is already counted as started elsewhere, such
    /// as work that arrived from another rank.
    pub fn move_continuing_work_to_buffer(&mut self, work: W) -> Result<(), StudyError> {
        match self.work_buffer.as_deref_mut() {
            Some(buffer) => {
                buffer.push_back(work);
                Ok(())
            }
            None => Err(move_work_error(
                self.study,
                MoveWorkError::ContinuingDuringExecutingWork,
            )),
        }
    }

    /// Re-enqueue every item of `works` as continuing work.
    pub fn move_continuing_work_range_to_buffer<I>(&mut self, works: I) -> Result<(), StudyError>
    where
        I: IntoIterator<Item = W>,
    {
        match self.work_buffer.as_deref_mut() {
            Some(buffer) => {
                let mut works: Vec<W> = works.into_iter().collect();
                buffer.append(&mut works);
                Ok(())
            }
            None => Err(move_work_error(
                self.study,
                MoveWorkError::ContinuingDuringExecutingWork,
            )),
        }
    }
}
