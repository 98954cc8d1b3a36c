//! Test handlers, parallel data and mesh fixtures for parstudy
//! development.
//!
//! - [`Token`] / [`RingHandler`]: work that hops around the ring of ranks
//!   a fixed number of times before completing. Exercises routing,
//!   continuing work and the termination algorithms with cross-rank
//!   traffic. Needs at least two ranks.
//! - [`chain`]: work that randomly spawns successors, for new work
//!   during execution.
//! - [`mesh`]: a 1D mesh split across ranks, for the claim protocol.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod chain;
pub mod mesh;

use std::sync::atomic::{AtomicU64, Ordering};

use parstudy_buffer::{Recyclable, Shared, SharedPool};
use parstudy_comm::packing::{read_u32_le, read_u64_le, write_u32_le, write_u64_le};
use parstudy_comm::{CodecError, Communicator};
use parstudy_engine::{ParallelData, StudyContext, StudyError, StudyHandler, ThreadContext};

/// A work item with `hops` transfers left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Token {
    pub id: u64,
    pub hops: u32,
}

impl Token {
    pub fn new(id: u64, hops: u32) -> Self {
        Self { id, hops }
    }
}

impl Recyclable<(u64, u32)> for Token {
    fn construct((id, hops): (u64, u32)) -> Self {
        Self { id, hops }
    }

    fn reset(&mut self, (id, hops): (u64, u32)) {
        self.id = id;
        self.hops = hops;
    }
}

impl ParallelData for Token {
    fn packed_size(&self) -> usize {
        12
    }

    fn pack(&self, out: &mut Vec<u8>) {
        write_u64_le(out, self.id);
        write_u32_le(out, self.hops);
    }

    fn unpack(input: &mut &[u8], pool: &SharedPool<Self>) -> Result<Shared<Self>, CodecError> {
        let id = read_u64_le(input)?;
        let hops = read_u32_le(input)?;
        Ok(pool.acquire((id, hops)))
    }
}

/// Forwards every executed token with hops left to the next rank.
///
/// A token is complete once it executes with zero hops left, so each
/// token counts as started once and completed once, however far it
/// travels.
#[derive(Debug, Default)]
pub struct RingHandler {
    executed: AtomicU64,
    pub forwarded: u64,
    pub received: u64,
}

impl RingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

impl StudyHandler<Token, Token> for RingHandler {
    fn execute_work(
        &self,
        _work: &mut Token,
        _ctx: &mut ThreadContext<'_, Token, Token>,
    ) -> Result<(), StudyError> {
        self.executed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn work_is_complete(&self, work: &Token) -> bool {
        work.hops == 0
    }

    fn post_execute_chunk<C: Communicator>(
        &mut self,
        chunk: &mut [Token],
        ctx: &mut StudyContext<'_, Token, Token, C>,
    ) -> Result<(), StudyError> {
        let next = (ctx.rank() + 1) % ctx.size();
        for token in chunk.iter().filter(|t| t.hops > 0) {
            let data = ctx.acquire_parallel_data((token.id, token.hops - 1));
            ctx.move_parallel_data_to_buffer(data, next)?;
            self.forwarded += 1;
        }
        Ok(())
    }

    fn post_receive_parallel_data<C: Communicator>(
        &mut self,
        data: &[Shared<Token>],
        ctx: &mut StudyContext<'_, Token, Token, C>,
    ) -> Result<(), StudyError> {
        for token in data {
            ctx.move_continuing_work_to_buffer(Token::clone(token))?;
            self.received += 1;
        }
        Ok(())
    }
}
