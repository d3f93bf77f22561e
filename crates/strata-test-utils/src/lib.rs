//! Test utilities for Strata development.
//!
//! Provides one-dimensional mesh fixtures ([`fixtures::Chain`]) that
//! partition into per-rank cluster structures, and kernel doubles
//! ([`kernels`]) ranging from an exact analytic integrator to a kernel
//! that fails on demand.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod kernels;

pub use fixtures::{engine_config, Chain, RankFixture};
pub use kernels::{AnalyticKernels, Call, FailAfter, NoopKernels, Phase, RecordingKernels};

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
