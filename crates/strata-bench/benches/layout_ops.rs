//! Criterion micro-benchmarks for building the memory layout and moving
//! halo data.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_arena::MemoryLayout;
use strata_bench::{reference_profile, stress_profile, Profile};
use strata_core::ClusterId;

fn build(profile: &Profile, rank: usize) -> MemoryLayout {
    let fixture = &profile.chain.partition()[rank];
    MemoryLayout::new(
        profile.config.arena.clone(),
        &fixture.mesh,
        &fixture.cells,
        &fixture.time_stepping.local_clusters,
    )
    .unwrap()
}

/// Benchmark: size, assign and resolve faces for 10K cells.
fn bench_layout_setup_10k(c: &mut Criterion) {
    let profile = reference_profile(1);
    let fixture = profile.chain.partition().remove(0);
    c.bench_function("layout_setup_10k", |b| {
        b.iter(|| {
            let layout = MemoryLayout::new(
                profile.config.arena.clone(),
                &fixture.mesh,
                &fixture.cells,
                &fixture.time_stepping.local_clusters,
            )
            .unwrap();
            black_box(layout.memory_bytes());
        });
    });
}

/// Benchmark: the same for 100K cells.
fn bench_layout_setup_100k(c: &mut Criterion) {
    let profile = stress_profile(1);
    let fixture = profile.chain.partition().remove(0);
    c.bench_function("layout_setup_100k", |b| {
        b.iter(|| {
            let layout = MemoryLayout::new(
                profile.config.arena.clone(),
                &fixture.mesh,
                &fixture.cells,
                &fixture.time_stepping.local_clusters,
            )
            .unwrap();
            black_box(layout.memory_bytes());
        });
    });
}

/// Benchmark: gather a copy region and scatter it into a ghost region.
fn bench_halo_roundtrip(c: &mut Criterion) {
    let profile = reference_profile(2);
    let mut layout = build(&profile, 0);
    // The last local cluster of rank 0 borders rank 1.
    let cluster = ClusterId(layout.topology().cluster_count() as u32 - 1);
    c.bench_function("halo_gather_scatter", |b| {
        b.iter(|| {
            let payload = layout.gather_copy_region(cluster, 0).unwrap();
            layout.scatter_ghost_region(cluster, 0, &payload).unwrap();
            black_box(payload.len());
        });
    });
}

criterion_group!(
    benches,
    bench_layout_setup_10k,
    bench_layout_setup_100k,
    bench_halo_roundtrip
);
criterion_main!(benches);
