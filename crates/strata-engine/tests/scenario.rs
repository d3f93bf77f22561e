//! Three clusters on one rank, widths 1, 1/2 and 1/4, advanced to t = 1.
//!
//! Checks the update counts, the buffer flags handed to the kernels and
//! the ordering constraints between neighbouring clusters. A last case
//! advances a two-cluster rank to a sync point no width divides.
//!
//! Rates are relative to the next-coarser cluster, so the finest cluster
//! has rate 2 and sends its buffer whenever it closes one of the middle
//! cluster's intervals: on its 2nd and 4th updates, not only on its last
//! (DESIGN.md, Open Question 2).

use strata_arena::Layer;
use strata_core::{ClusterId, RankId, Real};
use strata_engine::{CommMode, NullTransport, TimeManager};
use strata_test_utils::{engine_config, init_tracing, Call, Chain, Phase, RecordingKernels};

fn three_clusters() -> (TimeManager, RecordingKernels) {
    init_tracing();
    let fixture = &Chain::single_rank(vec![1.0, 0.5, 0.25], 2).partition()[0];
    let kernels = RecordingKernels::new();
    let manager = fixture
        .manager(
            engine_config(CommMode::Inline),
            Box::new(kernels.clone()),
            Box::new(NullTransport::new(RankId(0))),
        )
        .unwrap();
    (manager, kernels)
}

fn calls_of(calls: &[Call], cluster: u32, phase: Phase) -> Vec<Call> {
    calls
        .iter()
        .filter(|c| c.info.cluster == ClusterId(cluster) && c.phase == phase)
        .copied()
        .collect()
}

#[test]
fn update_counts_follow_rates() {
    let (mut manager, kernels) = three_clusters();
    let metrics = manager.advance_in_time(1.0).unwrap();

    assert_eq!(metrics.full_updates, vec![1, 2, 4]);
    let updates: Vec<u64> = manager
        .clusters()
        .iter()
        .map(|c| c.number_of_full_updates())
        .collect();
    assert_eq!(updates, vec![1, 2, 4]);
    for cluster in manager.clusters() {
        assert!((cluster.full_update_time() - 1.0).abs() <= manager.time_tolerance());
        assert!((cluster.prediction_time() - 1.0).abs() <= manager.time_tolerance());
    }
    assert_eq!(manager.queue_lengths(), [0, 0, 0, 0]);

    // No copy layers: one kernel call per interior step.
    let calls = kernels.calls();
    assert_eq!(calls.len(), 2 * 7);
    assert!(calls.iter().all(|c| c.info.layer == Layer::Interior));
    assert_eq!(metrics.predictions, 2 * 7);
    assert_eq!(metrics.corrections, 2 * 7);
    assert_eq!(metrics.messages_sent, 0);
}

#[test]
fn buffer_flags_mark_coarse_interval_boundaries() {
    let (mut manager, kernels) = three_clusters();
    manager.advance_in_time(1.0).unwrap();
    let calls = kernels.calls();

    let flags = |cluster| -> Vec<(bool, bool)> {
        calls_of(&calls, cluster, Phase::Local)
            .iter()
            .map(|c| (c.info.reset_lts_buffers, c.info.send_lts_buffers))
            .collect()
    };
    assert_eq!(flags(0), vec![(true, true)]);
    assert_eq!(flags(1), vec![(true, false), (false, true)]);
    assert_eq!(
        flags(2),
        vec![(true, false), (false, true), (true, false), (false, true)]
    );
}

#[test]
fn step_intervals_tile_the_advance() {
    let (mut manager, kernels) = three_clusters();
    manager.advance_in_time(1.0).unwrap();
    let calls = kernels.calls();

    for (cluster, width) in [(0, 1.0), (1, 0.5), (2, 0.25)] {
        let predictions = calls_of(&calls, cluster, Phase::Local);
        let corrections = calls_of(&calls, cluster, Phase::Neighboring);
        let starts: Vec<Real> = predictions.iter().map(|c| c.info.start_time).collect();
        let expected: Vec<Real> = (0..predictions.len()).map(|k| k as Real * width).collect();
        assert_eq!(starts, expected, "cluster {cluster}");
        assert!(predictions.iter().all(|c| c.info.time_step_width == width));
        assert_eq!(
            corrections.iter().map(|c| c.info.start_time).collect::<Vec<_>>(),
            expected
        );
    }

    // Sub-interval offsets restart at every coarser boundary.
    let subs: Vec<Real> = calls_of(&calls, 2, Phase::Local)
        .iter()
        .map(|c| c.info.sub_time_start)
        .collect();
    assert_eq!(subs, vec![0.0, 0.25, 0.0, 0.25]);
}

#[test]
fn coarse_correction_waits_for_finer_predictions() {
    let (mut manager, kernels) = three_clusters();
    manager.advance_in_time(1.0).unwrap();
    let calls = kernels.calls();

    for (index, call) in calls.iter().enumerate() {
        if call.phase != Phase::Neighboring || call.info.cluster.0 == 2 {
            continue;
        }
        let end = call.info.end_time();
        let finer = call.info.cluster.0 + 1;
        let covered = calls[..index]
            .iter()
            .filter(|c| c.info.cluster.0 == finer && c.phase == Phase::Local)
            .map(|c| c.info.end_time())
            .fold(0.0, Real::max);
        assert!(
            covered >= end - 1e-12,
            "cluster {} corrected to {end} before cluster {finer} predicted past {covered}",
            call.info.cluster
        );
    }
}

#[test]
fn fine_prediction_stays_within_coarse_step() {
    let (mut manager, kernels) = three_clusters();
    manager.advance_in_time(1.0).unwrap();
    let calls = kernels.calls();
    let widths = [1.0, 0.5, 0.25];

    for (index, call) in calls.iter().enumerate() {
        if call.phase != Phase::Local || call.info.cluster.0 == 0 {
            continue;
        }
        let start = call.info.start_time;
        let coarser = call.info.cluster.0 - 1;
        let corrected_to = calls[..index]
            .iter()
            .filter(|c| c.info.cluster.0 == coarser && c.phase == Phase::Neighboring)
            .map(|c| c.info.end_time())
            .fold(0.0, Real::max);
        assert!(
            corrected_to + widths[coarser as usize] > start + 1e-12,
            "cluster {} predicted from {start} while cluster {coarser} was corrected to {corrected_to}",
            call.info.cluster
        );
    }
}

#[test]
fn second_advance_continues_from_sync_point() {
    let (mut manager, kernels) = three_clusters();
    manager.advance_in_time(1.0).unwrap();
    let metrics = manager.advance_in_time(1.5).unwrap();

    assert_eq!(metrics.full_updates, vec![1, 1, 2]);
    assert_eq!(manager.sync_time(), 1.5);
    let updates: Vec<u64> = manager
        .clusters()
        .iter()
        .map(|c| c.number_of_full_updates())
        .collect();
    // Counters restart at every advance.
    assert_eq!(updates, vec![1, 1, 2]);

    // The coarse step is clamped to the sync point.
    let calls = kernels.calls();
    let coarse = calls_of(&calls, 0, Phase::Local);
    assert_eq!(coarse.len(), 2);
    assert_eq!(coarse[1].info.time_step_width, 0.5);
    // Clusters 0 and 1 both close their interval at the sync point.
    assert!(coarse[1].info.send_lts_buffers);
    let middle = calls_of(&calls, 1, Phase::Local);
    assert!(middle[2].info.reset_lts_buffers && middle[2].info.send_lts_buffers);
}

#[test]
fn no_step_crosses_a_non_aligned_sync_point() {
    init_tracing();
    let fixture = &Chain::single_rank(vec![1.0, 0.25], 2).partition()[0];
    let kernels = RecordingKernels::new();
    let mut manager = fixture
        .manager(
            engine_config(CommMode::Inline),
            Box::new(kernels.clone()),
            Box::new(NullTransport::new(RankId(0))),
        )
        .unwrap();
    let metrics = manager.advance_in_time(0.6).unwrap();
    let tolerance = manager.time_tolerance();

    assert_eq!(metrics.full_updates, vec![1, 3]);
    let calls = kernels.calls();
    let latest = calls.iter().map(|c| c.info.end_time()).fold(0.0, Real::max);
    assert!((latest - 0.6).abs() <= tolerance);
    assert!(calls.iter().all(|c| c.info.end_time() <= 0.6 + tolerance));
    for cluster in manager.clusters() {
        assert!(cluster.full_update_time() <= 0.6 + tolerance);
        assert!((cluster.full_update_time() - 0.6).abs() <= tolerance);
    }

    // The fine cluster's last step is cut short at the sync point.
    let fine: Vec<Real> = calls_of(&calls, 1, Phase::Local)
        .iter()
        .map(|c| c.info.time_step_width)
        .collect();
    assert_eq!(fine.len(), 3);
    assert!((fine[2] - 0.1).abs() <= tolerance);
}
