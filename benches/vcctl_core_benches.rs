use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vcctl_core::fem::stiffness::{element_stiffness, PhaseModuli};
use vcctl_core::grid::Grid;
use vcctl_core::packing::digitize_sphere;
use vcctl_core::phase::{self, PhaseId};
use vcctl_core::stats::apstats;

fn bench_element_stiffness(c: &mut Criterion) {
    let moduli = PhaseModuli::from_young_poisson(30.0, 0.2);
    c.bench_function("fem::element_stiffness", |b| {
        b.iter(|| element_stiffness(black_box(moduli)))
    });
}

fn bench_digitize_sphere(c: &mut Criterion) {
    c.bench_function("packing::digitize_sphere r=8", |b| {
        b.iter(|| digitize_sphere(black_box(8.0)))
    });
}

fn bench_apstats(c: &mut Criterion) {
    let mut grid = Grid::filled(40, 40, 40, 1.0, PhaseId::AGG);
    for (i, (x, y, z)) in grid.coords().collect::<Vec<_>>().into_iter().enumerate() {
        if i % 7 == 0 {
            grid.set(x, y, z, phase::PhaseId::BINDER);
        }
    }
    c.bench_function("stats::apstats 40^3", |b| b.iter(|| apstats(black_box(&grid))));
}

criterion_group!(benches, bench_element_stiffness, bench_digitize_sphere, bench_apstats);
criterion_main!(benches);
