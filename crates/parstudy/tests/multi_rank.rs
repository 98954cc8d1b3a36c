//! Integration test: studies spanning several in-process ranks.
//!
//! Tokens travel around the ring of ranks before completing, so every
//! termination algorithm has to agree while parallel data is in flight.
//! Chains of new work check that SMART still terminates when ranks keep
//! generating work at different rates.

use parstudy::comm::LocalCluster;
use parstudy::prelude::*;
use parstudy_test_utils::chain::{chain_length, GeometricHandler, Link};
use parstudy_test_utils::{RingHandler, Token};
use proptest::prelude::*;

#[derive(Debug)]
struct RankReport {
    stats: StudyStats,
    executed: u64,
    forwarded: u64,
    received: u64,
}

fn run_ring(size: usize, config: StudyConfig, tokens: u64, hops: u32) -> Vec<RankReport> {
    LocalCluster::run(size, |comm| {
        let rank = comm.rank() as u64;
        let mut study = ParallelStudy::new(comm, config.clone(), RingHandler::new()).unwrap();
        study.pre_execute().unwrap();
        study
            .move_work_range_to_buffer((0..tokens).map(|i| Token::new(rank * 10_000 + i, hops)), 0)
            .unwrap();
        study.execute().unwrap();
        assert!(study.buffers_are_empty());
        RankReport {
            stats: study.stats(),
            executed: study.handler().executed(),
            forwarded: study.handler().forwarded,
            received: study.handler().received,
        }
    })
}

fn check_ring(reports: &[RankReport], tokens: u64, hops: u32) {
    let size = reports.len() as u64;
    let hops = u64::from(hops);
    for r in reports {
        assert_eq!(r.stats.local_work_started, tokens);
        assert_eq!(r.stats.total_work_started, size * tokens);
        assert_eq!(r.stats.total_work_completed, size * tokens);
        assert_eq!(r.stats.parallel_data_sent, r.forwarded);
        assert_eq!(r.stats.parallel_data_received, r.received);
    }
    let executed: u64 = reports.iter().map(|r| r.executed).sum();
    let local_executed: u64 = reports.iter().map(|r| r.stats.local_work_executed).sum();
    let completed: u64 = reports.iter().map(|r| r.stats.local_work_completed).sum();
    let sent: u64 = reports.iter().map(|r| r.stats.parallel_data_sent).sum();
    let received: u64 = reports.iter().map(|r| r.stats.parallel_data_received).sum();
    assert_eq!(executed, size * tokens * (hops + 1));
    assert_eq!(local_executed, executed);
    assert_eq!(completed, size * tokens);
    assert_eq!(sent, size * tokens * hops);
    assert_eq!(received, sent);
}

fn fixed_work(method: Method) -> StudyConfig {
    StudyConfig {
        method,
        allow_new_work_during_execution: false,
        ..Default::default()
    }
}

#[test]
fn smart_ring_with_worker_threads() {
    let config = StudyConfig {
        threads: 2,
        chunk_size: 64,
        send_buffer_size: 16,
        min_buffer_size: Some(2),
        ..Default::default()
    };
    let reports = run_ring(3, config, 150, 4);
    check_ring(&reports, 150, 4);
}

#[test]
fn harm_ring() {
    let config = StudyConfig {
        chunk_size: 8,
        ..fixed_work(Method::Harm)
    };
    let reports = run_ring(4, config, 40, 3);
    check_ring(&reports, 40, 3);
}

#[test]
fn bs_ring() {
    let config = StudyConfig {
        threads: 2,
        ..fixed_work(Method::Bs)
    };
    let reports = run_ring(3, config, 60, 5);
    check_ring(&reports, 60, 5);
}

#[test]
fn idle_ranks_still_agree() {
    // Only rank 0 has work; everyone else waits for tokens to arrive.
    for method in [Method::Smart, Method::Harm, Method::Bs] {
        let config = fixed_work(method);
        let reports = LocalCluster::run(3, |comm| {
            let seed = comm.rank() == 0;
            let mut study = ParallelStudy::new(comm, config.clone(), RingHandler::new()).unwrap();
            study.pre_execute().unwrap();
            if seed {
                study
                    .move_work_range_to_buffer((0..10).map(|i| Token::new(i, 2)), 0)
                    .unwrap();
            }
            study.execute().unwrap();
            study.stats()
        });
        for stats in &reports {
            assert_eq!(stats.total_work_started, 10, "{method}");
            assert_eq!(stats.total_work_completed, 10, "{method}");
        }
        let executed: u64 = reports.iter().map(|s| s.local_work_executed).sum();
        assert_eq!(executed, 30, "{method}");
    }
}

#[test]
fn repeated_runs_reset_counters() {
    let reports = LocalCluster::run(2, |comm| {
        let rank = comm.rank() as u64;
        let mut study =
            ParallelStudy::new(comm, StudyConfig::default(), RingHandler::new()).unwrap();
        let mut runs = Vec::new();
        for run in 0..3u64 {
            study.pre_execute().unwrap();
            study
                .move_work_range_to_buffer((0..5 + run).map(|i| Token::new(rank * 100 + i, 1)), 0)
                .unwrap();
            study.execute().unwrap();
            runs.push(study.stats());
        }
        runs
    });
    for runs in &reports {
        for (run, stats) in runs.iter().enumerate() {
            let per_rank = 5 + run as u64;
            assert_eq!(stats.local_work_started, per_rank);
            assert_eq!(stats.total_work_completed, 2 * per_rank);
            assert_eq!(stats.parallel_data_sent, per_rank);
        }
    }
}

#[test]
fn smart_new_work_across_ranks() {
    let size = 3;
    let seeds_per_rank = 40u64;
    let percent = 75;
    let reports = LocalCluster::run(size, |comm| {
        let rank = comm.rank() as u64;
        let config = StudyConfig {
            threads: 2,
            chunk_size: 16,
            ..Default::default()
        };
        let mut study = ParallelStudy::new(comm, config, GeometricHandler { percent }).unwrap();
        study.pre_execute().unwrap();
        // Uneven seeding so ranks finish at different times.
        let count = seeds_per_rank * (rank + 1);
        study
            .move_work_range_to_buffer((0..count).map(|s| -> Link { (rank * 1_000 + s, 0) }), 0)
            .unwrap();
        study.execute().unwrap();
        study.stats()
    });

    let expected: u64 = (0..size as u64)
        .flat_map(|rank| (0..seeds_per_rank * (rank + 1)).map(move |s| rank * 1_000 + s))
        .map(|seed| chain_length(seed, percent))
        .sum();
    for stats in &reports {
        assert_eq!(stats.total_work_started, expected);
        assert_eq!(stats.total_work_completed, expected);
        assert_eq!(stats.local_work_started, stats.local_work_executed);
        assert_eq!(stats.parallel_data_sent, 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_method_agrees_on_totals(
        method_index in 0usize..3,
        size in 2usize..5,
        tokens in 0u64..25,
        hops in 0u32..4,
        chunk_size in 1usize..20,
        send_buffer_size in 1usize..8,
        clicks in 1u32..4,
    ) {
        let method = [Method::Smart, Method::Harm, Method::Bs][method_index];
        let config = StudyConfig {
            chunk_size,
            send_buffer_size,
            clicks_per_communication: clicks,
            clicks_per_root_communication: clicks,
            ..fixed_work(method)
        };
        let reports = run_ring(size, config, tokens, hops);
        check_ring(&reports, tokens, hops);
    }
}
