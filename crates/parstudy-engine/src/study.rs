//! The [`ParallelStudy`] orchestrator and its three termination algorithms.
//!
//! A study owns one work buffer, one receive buffer and one send buffer
//! per destination rank. A run is `pre_execute()`, any number of
//! `move_work_to_buffer()` calls on thread 0, then `execute()`, which
//! returns once every rank agrees that all started work has completed.
//!
//! Termination detection:
//!
//! - **SMART** executes bounded chunks and, every
//!   `clicks_per_root_communication` idle iterations, advances a two-phase
//!   non-blocking sum of completed and started counts. When work may spawn
//!   new work, the started sum is requested only after the completed sum
//!   has arrived, so it cannot undercount work created in between.
//! - **HARM** executes everything buffered, then trades completed counts
//!   with every other rank through tagged point-to-point messages.
//! - **BS** alternates a settle phase, which lasts until no rank has
//!   traffic in flight, with an execute-all phase closed by a barrier.

use parstudy_buffer::{Buffer, CircularBuffer, LifoBuffer, Recyclable, Shared, SharedPool};
use parstudy_comm::packing::read_u64_le;
use parstudy_comm::{Communicator, Rank, Request};

use crate::chunk::execute_chunk;
use crate::config::{Method, StudyConfig, WorkBufferType};
use crate::context::StudyContext;
use crate::data::ParallelData;
use crate::error::{BufferCheck, MoveWorkError, StudyError};
use crate::handler::StudyHandler;
use crate::outbox::Outbox;
use crate::receive_buffer::ReceiveBuffer;
use crate::send_buffer::SendBufferSizing;
use crate::stats::{StudyCounters, StudyStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    PreExecuting,
    Executing,
}

/// Poll a sum request. A finished (or never made) request reads as
/// complete; on completion the result is stored in `out`.
fn test_sum<R: Request<Output = u64>>(request: &mut Option<R>, out: &mut u64) -> bool {
    let done = match request.as_mut() {
        None => return true,
        Some(r) => r.test(),
    };
    if done {
        if let Some(r) = request.take() {
            *out = r.finish();
        }
    }
    done
}

/// Distributed execution of dynamically generated work.
///
/// `W` is the local work item, `P` its transmissible counterpart, `H`
/// the behavior and `C` the communicator.
pub struct ParallelStudy<W, P, H, C>
where
    P: ParallelData,
    C: Communicator,
{
    config: StudyConfig,
    handler: H,
    work_buffer: Box<dyn Buffer<W>>,
    staging: Vec<Vec<W>>,
    pools: Vec<SharedPool<P>>,
    receive_buffer: ReceiveBuffer<P, C>,
    outbox: Outbox<P, C>,
    counters: StudyCounters,
    phase: Phase,
}

impl<W, P, H, C> ParallelStudy<W, P, H, C>
where
    W: Send + 'static,
    P: ParallelData,
    H: StudyHandler<W, P>,
    C: Communicator,
{
    /// Validate `config` and build an idle study.
    ///
    /// Collective: allocates the study's message tag, so every rank must
    /// construct its studies in the same order.
    pub fn new(comm: C, config: StudyConfig, handler: H) -> Result<Self, StudyError> {
        config.validate()?;

        let work_buffer: Box<dyn Buffer<W>> = match config.work_buffer_type {
            WorkBufferType::Lifo => Box::new(LifoBuffer::new()),
            WorkBufferType::Circular => Box::new(CircularBuffer::new()),
        };
        let tag = comm.unique_tag();
        let sizing = SendBufferSizing::for_method(
            config.method,
            config.effective_min_buffer_size(),
            config.send_buffer_size,
            config.buffer_growth_multiplier,
            config.buffer_shrink_multiplier,
        );

        Ok(Self {
            staging: (0..config.threads).map(|_| Vec::new()).collect(),
            pools: (0..config.threads).map(|_| SharedPool::new()).collect(),
            receive_buffer: ReceiveBuffer::new(tag, config.clicks_per_receive),
            outbox: Outbox::new(comm, tag, sizing),
            work_buffer,
            config,
            handler,
            counters: StudyCounters::default(),
            phase: Phase::Idle,
        })
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Study name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration the study was built with.
    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Termination algorithm.
    pub fn method(&self) -> Method {
        self.config.method
    }

    /// The communicator.
    pub fn comm(&self) -> &C {
        &self.outbox.comm
    }

    /// The handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable access to the handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The local work buffer.
    pub fn work_buffer(&self) -> &dyn Buffer<W> {
        self.work_buffer.as_ref()
    }

    /// The receive buffer.
    pub fn receive_buffer(&self) -> &ReceiveBuffer<P, C> {
        &self.receive_buffer
    }

    /// Whether `execute()` is running.
    pub fn currently_executing(&self) -> bool {
        self.phase == Phase::Executing
    }

    /// Whether the study is between `pre_execute()` and `execute()`.
    pub fn currently_pre_executing(&self) -> bool {
        self.phase == Phase::PreExecuting
    }

    /// Work items started on this rank in the current run.
    pub fn local_work_started(&self) -> u64 {
        self.counters.work_started
    }

    /// Work items executed on this rank in the current run.
    pub fn local_work_executed(&self) -> u64 {
        self.counters.work_executed
    }

    /// Work items completed on this rank in the current run.
    pub fn local_work_completed(&self) -> u64 {
        self.counters.work_completed
    }

    /// Chunks executed on this rank in the current run.
    pub fn local_chunks_executed(&self) -> u64 {
        self.counters.chunks_executed
    }

    /// Last observed global started count.
    pub fn total_work_started(&self) -> u64 {
        self.counters.total_work_started
    }

    /// Last observed global completed count.
    pub fn total_work_completed(&self) -> u64 {
        self.counters.total_work_completed
    }

    /// Byte buffers allocated by all send buffers.
    pub fn send_buffer_pool_created(&self) -> u64 {
        self.outbox
            .send_buffers
            .values()
            .map(|b| b.buffer_pool_created())
            .sum()
    }

    /// Parallel data objects sent in the current run.
    pub fn parallel_data_sent(&self) -> u64 {
        self.outbox
            .send_buffers
            .values()
            .map(|b| b.objects_sent())
            .sum()
    }

    /// Messages sent in the current run.
    pub fn buffers_sent(&self) -> u64 {
        self.outbox
            .send_buffers
            .values()
            .map(|b| b.buffers_sent())
            .sum()
    }

    /// Parallel data objects received in the current run.
    pub fn parallel_data_received(&self) -> u64 {
        self.receive_buffer.objects_received()
    }

    /// Messages received in the current run.
    pub fn buffers_received(&self) -> u64 {
        self.receive_buffer.buffers_received()
    }

    /// Parallel data objects allocated by the per-thread pools.
    pub fn pool_parallel_data_created(&self) -> u64 {
        self.pools.iter().map(SharedPool::num_created).sum()
    }

    /// Every counter at once.
    pub fn stats(&self) -> StudyStats {
        StudyStats {
            local_chunks_executed: self.counters.chunks_executed,
            local_work_started: self.counters.work_started,
            local_work_executed: self.counters.work_executed,
            local_work_completed: self.counters.work_completed,
            total_work_started: self.counters.total_work_started,
            total_work_completed: self.counters.total_work_completed,
            send_buffer_pool_created: self.send_buffer_pool_created(),
            parallel_data_sent: self.parallel_data_sent(),
            buffers_sent: self.buffers_sent(),
            parallel_data_received: self.parallel_data_received(),
            buffers_received: self.buffers_received(),
            pool_parallel_data_created: self.pool_parallel_data_created(),
        }
    }

    /// Whether no work or traffic is held anywhere on this rank.
    pub fn buffers_are_empty(&self) -> bool {
        self.work_buffer.is_empty()
            && self.staging.iter().all(Vec::is_empty)
            && !self.receive_buffer.currently_receiving()
            && self.receive_buffer.buffer().is_empty()
            && !self.outbox.sending_or_buffered()
    }

    // ── Work injection ─────────────────────────────────────────────

    fn move_work_error(&self, error: MoveWorkError) -> StudyError {
        StudyError::MoveWork {
            study: self.config.name.clone(),
            error,
        }
    }

    fn can_move_work_check(&self, tid: usize) -> Result<(), StudyError> {
        match self.phase {
            Phase::Executing if !self.config.allow_new_work_during_execution => {
                Err(self.move_work_error(MoveWorkError::DuringExecutionDisabled))
            }
            Phase::Executing => Ok(()),
            Phase::Idle if self.config.allow_new_work_during_execution => {
                Err(self.move_work_error(MoveWorkError::PreExecutionAndExecutionOnly))
            }
            Phase::Idle => Err(self.move_work_error(MoveWorkError::PreExecutionOnly)),
            Phase::PreExecuting if tid != 0 => {
                Err(self.move_work_error(MoveWorkError::PreExecutionThread0Only))
            }
            Phase::PreExecuting => Ok(()),
        }
    }

    /// Add one item of new work. Pre-execution only, thread 0 only.
    pub fn move_work_to_buffer(&mut self, work: W, tid: usize) -> Result<(), StudyError> {
        self.can_move_work_check(tid)?;
        self.work_buffer.push_back(work);
        self.counters.work_started += 1;
        Ok(())
    }

    /// Add every item of `works` as new work. Pre-execution only,
    /// thread 0 only.
    pub fn move_work_range_to_buffer<I>(&mut self, works: I, tid: usize) -> Result<(), StudyError>
    where
        I: IntoIterator<Item = W>,
    {
        self.can_move_work_check(tid)?;
        let mut works: Vec<W> = works.into_iter().collect();
        self.counters.work_started += works.len() as u64;
        self.work_buffer.append(&mut works);
        Ok(())
    }

    /// Grow the work buffer to hold at least `size` items. Pre-execution
    /// only.
    pub fn reserve_buffer(&mut self, size: usize) -> Result<(), StudyError> {
        if self.phase != Phase::PreExecuting {
            return Err(StudyError::ReserveOutsidePreExecution {
                study: self.config.name.clone(),
            });
        }
        if self.work_buffer.capacity() < size {
            self.work_buffer.set_capacity(size);
        }
        Ok(())
    }

    /// Acquire parallel data from thread `tid`'s pool.
    ///
    /// # Panics
    ///
    /// Panics if `tid >= config().threads`.
    pub fn acquire_parallel_data<A>(&self, tid: usize, args: A) -> Shared<P>
    where
        P: Recyclable<A>,
    {
        self.pools[tid].acquire(args)
    }

    /// Queue parallel data for `dest`. Pre-execution or execution only.
    pub fn move_parallel_data_to_buffer(
        &mut self,
        data: Shared<P>,
        dest: Rank,
    ) -> Result<(), StudyError> {
        if self.phase == Phase::Idle {
            return Err(StudyError::NotExecuting {
                study: self.config.name.clone(),
            });
        }
        self.outbox.send(&self.config.name, data, dest)
    }

    // ── Run lifecycle ──────────────────────────────────────────────

    /// Start a run: reset counters and communication buffers and allow
    /// work injection.
    pub fn pre_execute(&mut self) -> Result<(), StudyError> {
        if !self.buffers_are_empty() {
            return Err(StudyError::BuffersNotEmpty {
                study: self.config.name.clone(),
                when: BufferCheck::PreExecute,
            });
        }
        self.outbox.reset();
        self.receive_buffer.clear();
        self.counters = StudyCounters::default();
        self.phase = Phase::PreExecuting;
        Ok(())
    }

    /// Execute until every rank agrees that all work has completed.
    ///
    /// Collective. Requires a preceding [`pre_execute`](Self::pre_execute).
    pub fn execute(&mut self) -> Result<(), StudyError> {
        if self.phase != Phase::PreExecuting {
            return Err(StudyError::NotPreExecuted {
                study: self.config.name.clone(),
            });
        }
        self.phase = Phase::Executing;

        tracing::debug!(
            study = %self.config.name,
            rank = self.outbox.comm.rank(),
            method = %self.config.method,
            work_started = self.counters.work_started,
            "executing study"
        );

        let result = match self.config.method {
            Method::Smart => self.smart_execute(),
            Method::Harm => self.harm_execute(),
            Method::Bs => self.bs_execute(),
        };
        self.phase = Phase::Idle;
        result?;

        self.outbox.comm.barrier();
        // Every send was matched before global completion; reap them.
        self.flush_send_buffers();

        if !self.buffers_are_empty() {
            return Err(StudyError::BuffersNotEmpty {
                study: self.config.name.clone(),
                when: BufferCheck::AfterExecution,
            });
        }

        let stats = self.stats();
        tracing::debug!(
            study = %self.config.name,
            rank = self.outbox.comm.rank(),
            chunks = stats.local_chunks_executed,
            executed = stats.local_work_executed,
            completed = stats.local_work_completed,
            total_completed = stats.total_work_completed,
            data_sent = stats.parallel_data_sent,
            data_received = stats.parallel_data_received,
            "study finished"
        );
        Ok(())
    }

    // ── Execution internals ────────────────────────────────────────

    fn flush_send_buffers(&mut self) {
        self.outbox.flush();
    }

    fn execute_and_buffer(&mut self, chunk_size: usize) -> Result<(), StudyError> {
        let Self {
            config,
            handler,
            work_buffer,
            staging,
            pools,
            outbox,
            counters,
            ..
        } = self;
        let allow_new = config.allow_new_work_during_execution;

        counters.chunks_executed += 1;
        let chunk = work_buffer.chunk_mut(chunk_size);
        let executed = chunk.len();

        execute_chunk(&*handler, chunk, staging, pools, &config.name, allow_new)?;

        counters.work_executed += executed as u64;
        counters.work_completed += chunk.iter().filter(|w| handler.work_is_complete(w)).count() as u64;

        {
            let mut ctx = StudyContext::new(
                &config.name,
                outbox,
                None,
                &mut staging[0],
                &pools[0],
                &mut counters.work_started,
                allow_new,
            );
            handler.post_execute_chunk(chunk, &mut ctx)?;
        }

        work_buffer.erase_chunk(chunk_size);

        if allow_new {
            let staged: usize = staging.iter().map(Vec::len).sum();
            if staged > 0 {
                let needed = work_buffer.len() + staged;
                work_buffer.set_capacity(needed);
                for stage in staging.iter_mut() {
                    work_buffer.append(stage);
                }
                counters.work_started += staged as u64;
            }
        }

        if config.method == Method::Harm {
            outbox.flush();
        }

        tracing::trace!(
            study = %config.name,
            executed,
            remaining = work_buffer.len(),
            "executed chunk"
        );
        Ok(())
    }

    fn post_receive_parallel_data_internal(&mut self) -> Result<(), StudyError> {
        if self.receive_buffer.buffer().is_empty() {
            return Ok(());
        }
        let Self {
            config,
            handler,
            work_buffer,
            staging,
            pools,
            receive_buffer,
            outbox,
            counters,
            ..
        } = self;
        let mut ctx = StudyContext::new(
            &config.name,
            outbox,
            Some(work_buffer.as_mut()),
            &mut staging[0],
            &pools[0],
            &mut counters.work_started,
            config.allow_new_work_during_execution,
        );
        let result = handler.post_receive_parallel_data(receive_buffer.buffer().as_slice(), &mut ctx);
        receive_buffer.buffer_mut().clear();
        result
    }

    fn pre_receive_and_execute_internal(&mut self) -> Result<(), StudyError> {
        let Self {
            config,
            handler,
            work_buffer,
            staging,
            pools,
            outbox,
            counters,
            ..
        } = self;
        let mut ctx = StudyContext::new(
            &config.name,
            outbox,
            Some(work_buffer.as_mut()),
            &mut staging[0],
            &pools[0],
            &mut counters.work_started,
            config.allow_new_work_during_execution,
        );
        handler.pre_receive_and_execute(&mut ctx)
    }

    fn receive(&mut self, start_receives_only: bool) -> Result<(), StudyError> {
        self.receive_buffer
            .receive(&self.outbox.comm, start_receives_only, &self.pools[0])?;
        Ok(())
    }

    /// One receive-then-drain pass. Returns whether any work executed.
    fn receive_and_execute(&mut self) -> Result<bool, StudyError> {
        let smart = self.config.method == Method::Smart;

        if self.receive_buffer.currently_receiving() && smart {
            self.receive_buffer.cleanup_requests(&self.pools[0])?;
        } else {
            self.receive(false)?;
        }
        self.post_receive_parallel_data_internal()?;
        self.pre_receive_and_execute_internal()?;

        let mut executed_some = false;
        while !self.work_buffer.is_empty() {
            executed_some = true;
            if smart {
                // Keep receives posted while there is plenty of local work.
                let start_receives_only = self.work_buffer.len() > 2 * self.config.chunk_size;
                self.receive(start_receives_only)?;
                if !start_receives_only {
                    self.post_receive_parallel_data_internal()?;
                }
                self.execute_and_buffer(self.config.chunk_size)?;
            } else {
                let all = self.work_buffer.len();
                self.execute_and_buffer(all)?;
            }
        }
        Ok(executed_some)
    }

    fn check_fixed_work_method(&self) -> Result<(), StudyError> {
        if self.handler.has_alternate_ending_criteria() {
            return Err(StudyError::AlternateEndingUnsupported {
                study: self.config.name.clone(),
                method: self.config.method,
            });
        }
        Ok(())
    }

    fn smart_execute(&mut self) -> Result<(), StudyError> {
        let mut started_request: Option<C::SumRequest> = None;
        let mut completed_request: Option<C::SumRequest> = None;

        let has_alternate_ending = self.handler.has_alternate_ending_criteria();

        // Without new work the started count is final now. Otherwise it
        // must be sampled after each completed sum. An alternate ending
        // never reads the sums, so none is started.
        let started_request_first =
            !self.config.allow_new_work_during_execution && !has_alternate_ending;
        if started_request_first {
            started_request = Some(self.outbox.comm.isum(self.counters.work_started));
        }
        let mut made_started_request = started_request_first;
        let mut made_completed_request = false;

        self.flush_send_buffers();

        let mut non_executing_clicks = 0u32;
        let mut non_executing_root_clicks = 0u32;

        loop {
            if self.receive_and_execute()? {
                non_executing_clicks = 0;
                non_executing_root_clicks = 0;
            } else {
                non_executing_clicks += 1;
                non_executing_root_clicks += 1;
            }

            if non_executing_clicks >= self.config.clicks_per_communication {
                non_executing_clicks = 0;
                self.flush_send_buffers();
            }

            if has_alternate_ending {
                if self.buffers_are_empty() && self.handler.alternate_ending_criteria_met() {
                    self.outbox.comm.barrier();
                    return Ok(());
                }
            } else if non_executing_root_clicks >= self.config.clicks_per_root_communication {
                non_executing_root_clicks = 0;

                if started_request_first
                    && !test_sum(&mut started_request, &mut self.counters.total_work_started)
                {
                    continue;
                }

                if !made_completed_request {
                    made_completed_request = true;
                    completed_request = Some(self.outbox.comm.isum(self.counters.work_completed));
                    continue;
                }

                if test_sum(&mut completed_request, &mut self.counters.total_work_completed) {
                    if !made_started_request {
                        made_started_request = true;
                        started_request = Some(self.outbox.comm.isum(self.counters.work_started));
                        continue;
                    }

                    if !started_request_first
                        && !test_sum(&mut started_request, &mut self.counters.total_work_started)
                    {
                        continue;
                    }

                    if self.counters.total_work_started == self.counters.total_work_completed {
                        return Ok(());
                    }

                    made_completed_request = false;
                    if !started_request_first {
                        made_started_request = false;
                    }
                }
            }
        }
    }

    fn harm_execute(&mut self) -> Result<(), StudyError> {
        self.check_fixed_work_method()?;

        let size = self.outbox.comm.size();
        let me = self.outbox.comm.rank();
        let tag = self.outbox.comm.unique_tag();

        let mut completed_requests: Vec<Option<C::SendRequest>> = (0..size).map(|_| None).collect();
        let mut completed_sent = vec![0u64; size];
        let mut completed_per_rank = vec![0u64; size];
        let mut started_request = Some(self.outbox.comm.isum(self.counters.work_started));

        self.flush_send_buffers();

        let mut communication_clicks = 0usize;
        loop {
            self.receive_and_execute()?;
            self.flush_send_buffers();

            if communication_clicks > size {
                let comm = &self.outbox.comm;
                while let Some(status) = comm.iprobe(tag) {
                    let bytes = comm.irecv(&status).wait();
                    completed_per_rank[status.source] = read_u64_le(&mut bytes.as_slice())?;
                }
                self.counters.total_work_completed =
                    self.counters.work_completed + completed_per_rank.iter().sum::<u64>();
                communication_clicks = 0;
            }

            let local_completed = self.counters.work_completed;
            for pid in (0..size).filter(|&pid| pid != me) {
                let idle = match completed_requests[pid].as_mut() {
                    None => true,
                    Some(request) => request.test(),
                };
                if idle && local_completed > completed_sent[pid] {
                    completed_sent[pid] = local_completed;
                    completed_requests[pid] =
                        Some(self.outbox.comm.isend(pid, tag, &local_completed.to_le_bytes()));
                }
            }

            if test_sum(&mut started_request, &mut self.counters.total_work_started)
                && self.counters.total_work_started == self.counters.total_work_completed
            {
                // Peers may still be waiting on our final count.
                for pid in (0..size).filter(|&pid| pid != me) {
                    if let Some(request) = completed_requests[pid].take() {
                        request.wait();
                    }
                    if local_completed > completed_sent[pid] {
                        self.outbox
                            .comm
                            .isend(pid, tag, &local_completed.to_le_bytes())
                            .wait();
                    }
                }
                return Ok(());
            }

            communication_clicks += 1;
        }
    }

    fn bs_execute(&mut self) -> Result<(), StudyError> {
        self.check_fixed_work_method()?;

        let mut started_request = Some(self.outbox.comm.isum(self.counters.work_started));
        let mut completed_request: Option<C::SumRequest> = None;

        loop {
            let mut some_left_request: Option<C::SumRequest> = None;
            let mut all_some_left = 1u64;

            loop {
                self.receive(false)?;
                self.post_receive_parallel_data_internal()?;
                self.flush_send_buffers();

                let receiving = self.receive_buffer.currently_receiving();
                let sending = self.outbox.sending_or_buffered();

                if !receiving
                    && !sending
                    && test_sum(&mut some_left_request, &mut all_some_left)
                    && all_some_left != 0
                {
                    some_left_request = Some(self.outbox.comm.isum(0));
                }

                let settled = !receiving
                    && !sending
                    && test_sum(&mut some_left_request, &mut all_some_left)
                    && all_some_left == 0;
                if settled {
                    break;
                }
            }

            if !self.work_buffer.is_empty() {
                let all = self.work_buffer.len();
                self.execute_and_buffer(all)?;
            }

            self.outbox.comm.barrier();

            if test_sum(&mut started_request, &mut self.counters.total_work_started)
                && test_sum(&mut completed_request, &mut self.counters.total_work_completed)
            {
                if self.counters.total_work_started == self.counters.total_work_completed {
                    return Ok(());
                }
                completed_request = Some(self.outbox.comm.isum(self.counters.work_completed));
            }
        }
    }
}
