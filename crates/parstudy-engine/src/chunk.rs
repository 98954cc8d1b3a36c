//! Data-parallel execution of one chunk.
//!
//! The chunk is cut into blocks of [`BLOCK_SIZE`] items that worker
//! threads pull from a shared channel, so uneven item costs balance out.
//! Each worker owns its staging vector and pool for the duration.

use std::panic;

use parstudy_buffer::SharedPool;

use crate::context::ThreadContext;
use crate::data::ParallelData;
use crate::error::StudyError;
use crate::handler::StudyHandler;

/// Items per scheduling block.
pub(crate) const BLOCK_SIZE: usize = 20;

/// Execute every item of `chunk` on `staging.len()` threads.
///
/// Returns the first error reported by any thread; the remaining items
/// may or may not have executed. A panic on a worker is re-raised.
pub(crate) fn execute_chunk<W, P, H>(
    handler: &H,
    chunk: &mut [W],
    staging: &mut [Vec<W>],
    pools: &[SharedPool<P>],
    study: &str,
    allow_new_work: bool,
) -> Result<(), StudyError>
where
    W: Send,
    P: ParallelData,
    H: StudyHandler<W, P>,
{
    debug_assert_eq!(staging.len(), pools.len());

    if staging.len() == 1 || chunk.len() <= BLOCK_SIZE {
        let mut ctx = ThreadContext::new(0, study, &mut staging[0], &pools[0], allow_new_work);
        for work in chunk.iter_mut() {
            handler.execute_work(work, &mut ctx)?;
        }
        return Ok(());
    }

    let (tx, rx) = crossbeam_channel::unbounded::<&mut [W]>();
    for block in chunk.chunks_mut(BLOCK_SIZE) {
        // The receiver is alive for the whole loop.
        let _ = tx.send(block);
    }
    drop(tx);

    std::thread::scope(|s| {
        let handles: Vec<_> = staging
            .iter_mut()
            .zip(pools)
            .enumerate()
            .map(|(tid, (stage, pool))| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("{study}-worker-{tid}"))
                    .spawn_scoped(s, move || -> Result<(), StudyError> {
                        let mut ctx = ThreadContext::new(tid, study, stage, pool, allow_new_work);
                        for block in rx.iter() {
                            for work in block.iter_mut() {
                                handler.execute_work(work, &mut ctx)?;
                            }
                        }
                        Ok(())
                    })
                    .expect("failed to spawn study worker")
            })
            .collect();

        let mut first_error = None;
        let mut first_panic = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(payload) => {
                    first_panic.get_or_insert(payload);
                }
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        first_error.map_or(Ok(()), Err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ClosureHandler;
    use crate::test_data::Blob;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn setup(threads: usize) -> (Vec<Vec<u32>>, Vec<SharedPool<Blob>>) {
        (
            (0..threads).map(|_| Vec::new()).collect(),
            (0..threads).map(|_| SharedPool::new()).collect(),
        )
    }

    #[test]
    fn single_thread_runs_inline_in_order() {
        let seen = Mutex::new(Vec::new());
        let handler = ClosureHandler::new(|w: &mut u32, ctx: &mut ThreadContext<'_, u32, Blob>| {
            seen.lock().unwrap().push((*w, ctx.tid()));
            *w += 100;
            Ok(())
        });
        let (mut staging, pools) = setup(1);
        let mut chunk = vec![1, 2, 3];
        execute_chunk(&handler, &mut chunk, &mut staging, &pools, "t", true).unwrap();
        assert_eq!(chunk, vec![101, 102, 103]);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn every_item_runs_exactly_once_across_threads() {
        let handler = ClosureHandler::new(|w: &mut u32, ctx: &mut ThreadContext<'_, u32, Blob>| {
            *w += 1;
            ctx.move_work_to_buffer(*w)
        });
        let (mut staging, pools) = setup(4);
        let mut chunk: Vec<u32> = (0..500).collect();
        execute_chunk(&handler, &mut chunk, &mut staging, &pools, "t", true).unwrap();
        assert_eq!(chunk, (1..=500).collect::<Vec<_>>());
        let staged: HashSet<u32> = staging.iter().flatten().copied().collect();
        assert_eq!(staged.len(), 500);
        assert_eq!(staging.iter().map(Vec::len).sum::<usize>(), 500);
    }

    #[test]
    fn worker_error_is_returned() {
        let handler = ClosureHandler::new(|w: &mut u32, _ctx: &mut ThreadContext<'_, u32, Blob>| {
            if *w == 77 {
                Err(StudyError::handler("bad item"))
            } else {
                Ok(())
            }
        });
        let (mut staging, pools) = setup(3);
        let mut chunk: Vec<u32> = (0..200).collect();
        let err = execute_chunk(&handler, &mut chunk, &mut staging, &pools, "t", true).unwrap_err();
        assert_eq!(err, StudyError::handler("bad item"));
    }

    #[test]
    fn staging_refused_when_new_work_disabled() {
        let handler = ClosureHandler::new(|w: &mut u32, ctx: &mut ThreadContext<'_, u32, Blob>| {
            ctx.move_work_to_buffer(*w)
        });
        let (mut staging, pools) = setup(1);
        let mut chunk = vec![1];
        let err = execute_chunk(&handler, &mut chunk, &mut staging, &pools, "t", false).unwrap_err();
        assert!(matches!(
            err,
            StudyError::MoveWork {
                error: crate::MoveWorkError::DuringExecutionDisabled,
                ..
            }
        ));
    }
}
