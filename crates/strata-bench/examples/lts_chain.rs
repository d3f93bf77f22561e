//! Two ranks advancing the reference profile together.
//!
//! Demonstrates: partition a strip → one `TimeManager` per rank over an
//! in-process channel network → advance to a few sync points → stop the
//! progress thread → inspect the per-advance metrics.
//!
//! Run with `RUST_LOG=strata_engine=info` to see the progress log.

use std::thread;

use strata_bench::reference_profile;
use strata_core::ReceiverId;
use strata_engine::{ChannelTransport, CommMode, EngineConfig};
use strata_test_utils::AnalyticKernels;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Strata clustered LTS example ===\n");

    let profile = reference_profile(2);
    let config = EngineConfig {
        comm_mode: CommMode::Thread,
        progress_interval: 2,
        receiver_sampling: Some(0.25),
        ..profile.config.clone()
    };

    let handles: Vec<_> = profile
        .chain
        .partition()
        .into_iter()
        .zip(ChannelTransport::network(2))
        .map(|(fixture, transport)| {
            let config = config.clone();
            thread::spawn(move || {
                let rank = fixture.rank;
                let mut tm = fixture
                    .manager(config, Box::new(AnalyticKernels), Box::new(transport))
                    .unwrap();
                tm.add_receiver(ReceiverId(rank.0), 0).unwrap();

                for sync in [1.0, 2.0, 3.0] {
                    let metrics = tm.advance_in_time(sync).unwrap();
                    println!(
                        "rank {rank}: t = {sync:.2}  updates {:?}  sent {}  received {}  {} us",
                        metrics.full_updates,
                        metrics.messages_sent,
                        metrics.messages_received,
                        metrics.total_us,
                    );
                }
                tm.stop_communication_thread().unwrap();

                let mismatches = fixture.analytic_mismatches(&tm, 0.0, 3.0);
                let samples = tm.receiver(ReceiverId(rank.0)).map_or(0, |r| r.samples.len());
                println!(
                    "rank {rank}: {} cells, {} inexact, {samples} receiver samples",
                    fixture.cells.len(),
                    mismatches.len(),
                );
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
