//! Randomly continuing chains of local work.
//!
//! A [`Link`] `(seed, depth)` spawns `(seed, depth + 1)` with a fixed
//! probability. The decision is a pure function of the link, so the
//! total amount of work is known up front via [`chain_length`].

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use parstudy_engine::{StudyError, StudyHandler, ThreadContext};

use crate::Token;

pub type Link = (u64, u32);

/// Whether `link` spawns a successor, with probability `percent`/100.
pub fn continues(link: &Link, percent: u64) -> bool {
    let mut rng = ChaCha8Rng::seed_from_u64(link.0 ^ (u64::from(link.1) << 40));
    rng.next_u64() % 100 < percent
}

/// Number of links executed for the chain started at `(seed, 0)`.
pub fn chain_length(seed: u64, percent: u64) -> u64 {
    let mut depth = 0;
    while continues(&(seed, depth), percent) {
        depth += 1;
    }
    u64::from(depth) + 1
}

/// Spawns successors as new work during execution.
pub struct GeometricHandler {
    pub percent: u64,
}

impl StudyHandler<Link, Token> for GeometricHandler {
    fn execute_work(
        &self,
        link: &mut Link,
        ctx: &mut ThreadContext<'_, Link, Token>,
    ) -> Result<(), StudyError> {
        if continues(link, self.percent) {
            ctx.move_work_to_buffer((link.0, link.1 + 1))?;
        }
        Ok(())
    }
}
