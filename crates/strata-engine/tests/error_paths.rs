//! Failures surfacing through `advance_in_time`.

use std::error::Error;

use strata_core::{KernelError, RankId, Real, TransportError};
use strata_engine::{ChannelTransport, CommMode, NullTransport, SchedulerError, TimeManager};
use strata_test_utils::{
    engine_config, init_tracing, AnalyticKernels, Chain, FailAfter, NoopKernels,
};

#[test]
fn kernel_failure_stops_the_advance() {
    init_tracing();
    let fixture = Chain::single_rank(vec![1.0, 0.5], 2).partition().remove(0);
    let mut manager = fixture
        .manager(
            engine_config(CommMode::Inline),
            Box::new(FailAfter::new(3)),
            Box::new(NullTransport::new(RankId(0))),
        )
        .unwrap();

    let err = manager.advance_in_time(1.0).unwrap_err();
    match &err {
        SchedulerError::Kernel { source, .. } => {
            assert!(matches!(source, KernelError::ExecutionFailed { .. }));
        }
        other => panic!("expected kernel error, got {other:?}"),
    }
    assert!(err.source().is_some());
    // The sync point was not reached.
    assert!(manager
        .clusters()
        .iter()
        .any(|c| c.full_update_time() < 1.0));
}

fn lonely_rank(mode: CommMode) -> TimeManager {
    init_tracing();
    let fixture = Chain::two_ranks(vec![1.0], 4, 2).partition().remove(0);
    let mut network = ChannelTransport::network(2);
    // Rank 1 never shows up.
    drop(network.pop());
    let transport = network.remove(0);
    fixture
        .manager(engine_config(mode), Box::new(AnalyticKernels), Box::new(transport))
        .unwrap()
}

#[test]
fn vanished_peer_is_a_transport_error_inline() {
    let mut manager = lonely_rank(CommMode::Inline);
    assert_eq!(
        manager.advance_in_time(1.0),
        Err(SchedulerError::Transport(TransportError::Disconnected {
            rank: RankId(1)
        }))
    );
}

#[test]
fn vanished_peer_is_a_transport_error_threaded() {
    let mut manager = lonely_rank(CommMode::Thread);
    assert_eq!(
        manager.advance_in_time(1.0),
        Err(SchedulerError::Transport(TransportError::Disconnected {
            rank: RankId(1)
        }))
    );
}

#[test]
fn regression_leaves_state_untouched() {
    init_tracing();
    let fixture = Chain::single_rank(vec![1.0, 0.5], 1).partition().remove(0);
    let mut manager = fixture
        .manager(
            engine_config(CommMode::Inline),
            Box::new(AnalyticKernels),
            Box::new(NullTransport::new(RankId(0))),
        )
        .unwrap();
    manager.advance_in_time(2.0).unwrap();
    let err = manager.advance_in_time(1.5).unwrap_err();
    assert_eq!(
        err,
        SchedulerError::SyncTimeRegression {
            current: 2.0,
            requested: 1.5
        }
    );
    assert_eq!(manager.sync_time(), 2.0);
    assert!(fixture.analytic_mismatches(&manager, 0.0, 2.0).is_empty());
}

#[test]
fn non_finite_sync_time_is_rejected() {
    init_tracing();
    let fixture = Chain::single_rank(vec![1.0, 0.5], 2).partition().remove(0);
    let mut manager = fixture
        .manager(
            engine_config(CommMode::Inline),
            Box::new(NoopKernels),
            Box::new(NullTransport::new(RankId(0))),
        )
        .unwrap();
    for bad in [Real::INFINITY, Real::NEG_INFINITY, Real::NAN] {
        assert!(matches!(
            manager.advance_in_time(bad),
            Err(SchedulerError::InvalidSyncTime { .. })
        ));
    }
    // Nothing was stepped; the manager still advances normally.
    assert_eq!(manager.sync_time(), 0.0);
    let metrics = manager.advance_in_time(1.0).unwrap();
    assert_eq!(metrics.full_updates, vec![1, 2]);
}

#[test]
fn single_rank_transport_is_never_touched() {
    init_tracing();
    // NullTransport fails every request; a rank without halo regions must
    // not issue any.
    let fixture = Chain::single_rank(vec![1.0, 0.5, 0.25], 2)
        .partition()
        .remove(0);
    let mut manager = fixture
        .manager(
            engine_config(CommMode::Inline),
            Box::new(AnalyticKernels),
            Box::new(NullTransport::new(RankId(0))),
        )
        .unwrap();
    let metrics = manager.advance_in_time(1.0).unwrap();
    assert_eq!(metrics.messages_sent + metrics.messages_received, 0);
}
