//! Benchmark profiles for parstudy.
//!
//! - [`flat_profile`]: `n` independent items, no new work, no traffic
//! - [`chain_profile`]: seeds whose chains spawn new work as they run

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use parstudy_comm::LocalComm;
use parstudy_engine::{ParallelStudy, StudyConfig, StudyError};
use parstudy_test_utils::chain::{GeometricHandler, Link};
use parstudy_test_utils::{RingHandler, Token};

/// Single-rank study with `n` zero-hop tokens injected and ready to
/// execute.
pub fn flat_profile(
    n: u64,
    config: StudyConfig,
) -> Result<ParallelStudy<Token, Token, RingHandler, LocalComm>, StudyError> {
    let mut study = ParallelStudy::new(LocalComm::single(), config, RingHandler::new())?;
    study.pre_execute()?;
    study.reserve_buffer(n as usize)?;
    study.move_work_range_to_buffer((0..n).map(|i| Token::new(i, 0)), 0)?;
    Ok(study)
}

/// Single-rank study with `seeds` chains that continue with probability
/// `percent`/100, injected and ready to execute.
pub fn chain_profile(
    seeds: u64,
    percent: u64,
    config: StudyConfig,
) -> Result<ParallelStudy<Link, Token, GeometricHandler, LocalComm>, StudyError> {
    let mut study = ParallelStudy::new(LocalComm::single(), config, GeometricHandler { percent })?;
    study.pre_execute()?;
    study.move_work_range_to_buffer((0..seeds).map(|s| (s, 0)), 0)?;
    Ok(study)
}
