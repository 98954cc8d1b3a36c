//! The [`StudyHandler`] trait: the behavior a study executes.

use std::marker::PhantomData;

use parstudy_buffer::Shared;
use parstudy_comm::Communicator;

use crate::context::{StudyContext, ThreadContext};
use crate::data::ParallelData;
use crate::error::StudyError;

/// Work execution and the hooks around it.
///
/// [`execute_work`](StudyHandler::execute_work) runs on worker threads
/// (hence `&self` and the `Sync` bound); every other hook runs on the
/// main thread between chunks.
pub trait StudyHandler<W, P: ParallelData>: Sync {
    /// Execute one work item.
    fn execute_work(&self, work: &mut W, ctx: &mut ThreadContext<'_, W, P>)
        -> Result<(), StudyError>;

    /// Whether `work` is finished, as opposed to continuing elsewhere.
    /// Only finished work counts toward termination.
    fn work_is_complete(&self, _work: &W) -> bool {
        true
    }

    /// Called with the chunk that just executed, before it leaves the
    /// work buffer. The usual place to turn work into parallel data.
    fn post_execute_chunk<C: Communicator>(
        &mut self,
        _chunk: &mut [W],
        _ctx: &mut StudyContext<'_, W, P, C>,
    ) -> Result<(), StudyError> {
        Ok(())
    }

    /// Called after every receive attempt, before the work buffer is
    /// drained.
    fn pre_receive_and_execute<C: Communicator>(
        &mut self,
        _ctx: &mut StudyContext<'_, W, P, C>,
    ) -> Result<(), StudyError> {
        Ok(())
    }

    /// Called with parallel data that just arrived. The usual place to
    /// turn it into continuing work.
    fn post_receive_parallel_data<C: Communicator>(
        &mut self,
        _data: &[Shared<P>],
        _ctx: &mut StudyContext<'_, W, P, C>,
    ) -> Result<(), StudyError> {
        Ok(())
    }

    /// Whether SMART should end on
    /// [`alternate_ending_criteria_met`](StudyHandler::alternate_ending_criteria_met)
    /// instead of the started/completed agreement.
    fn has_alternate_ending_criteria(&self) -> bool {
        false
    }

    /// Checked only once every local buffer is empty. Must become true
    /// on every rank, since it is followed by a barrier.
    fn alternate_ending_criteria_met(&mut self) -> bool {
        false
    }
}

fn always_complete<W>(_: &W) -> bool {
    true
}

/// A [`StudyHandler`] built from closures, for studies that need no
/// hooks.
pub struct ClosureHandler<W, P, F, G = fn(&W) -> bool> {
    execute: F,
    is_complete: G,
    _types: PhantomData<fn(&W, &P)>,
}

impl<W, P, F> ClosureHandler<W, P, F>
where
    P: ParallelData,
    F: Fn(&mut W, &mut ThreadContext<'_, W, P>) -> Result<(), StudyError> + Sync,
{
    /// Handler whose work always completes on execution.
    pub fn new(execute: F) -> Self {
        Self {
            execute,
            is_complete: always_complete::<W>,
            _types: PhantomData,
        }
    }
}

impl<W, P, F, G> ClosureHandler<W, P, F, G> {
    /// Replace the completion predicate.
    pub fn with_completion<G2>(self, is_complete: G2) -> ClosureHandler<W, P, F, G2>
    where
        G2: Fn(&W) -> bool + Sync,
    {
        ClosureHandler {
            execute: self.execute,
            is_complete,
            _types: PhantomData,
        }
    }
}

impl<W, P, F, G> StudyHandler<W, P> for ClosureHandler<W, P, F, G>
where
    P: ParallelData,
    F: Fn(&mut W, &mut ThreadContext<'_, W, P>) -> Result<(), StudyError> + Sync,
    G: Fn(&W) -> bool + Sync,
{
    fn execute_work(
        &self,
        work: &mut W,
        ctx: &mut ThreadContext<'_, W, P>,
    ) -> Result<(), StudyError> {
        (self.execute)(work, ctx)
    }

    fn work_is_complete(&self, work: &W) -> bool {
        (self.is_complete)(work)
    }
}
