//! The settler: rigid gravity settling of unsettled particles.

use crate::grid::{PartIdGrid, PhaseGrid};
use crate::packing::particle::Particle;
use crate::phase::PhaseId;

/// Attempts a -1 z shift for every unsettled particle, in ascending
/// `minz_vox.z` order; on a blocked z-shift, tries up to 4 lateral shifts
/// (+-1 in x then +-1 in y). Returns the count of particles that settled
/// (moved or became permanently settled) this pass.
pub fn settle_pass(
    particles: &mut [Particle],
    phase_grid: &mut PhaseGrid,
    part_grid: &mut PartIdGrid,
) -> usize {
    let mut order: Vec<usize> = (0..particles.len())
        .filter(|&i| !particles[i].settled)
        .collect();
    order.sort_by_key(|&i| particles[i].minz());

    let mut settled_count = 0;
    for idx in order {
        if particles[idx].minz() == 0 {
            particles[idx].settled = true;
            settled_count += 1;
            continue;
        }

        let shift = find_shift(&particles[idx], phase_grid, idx as u32 + 1);
        match shift {
            Some(delta) => {
                apply_shift(particles, idx, delta, phase_grid, part_grid);
                settled_count += 1;
            }
            None => {
                particles[idx].settled = true;
            }
        }
    }
    settled_count
}

const LATERAL_TRIES: [(i64, i64, i64); 4] = [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0)];

/// Finds a legal rigid shift for `particle`: first try `(0,0,-1)`; on
/// failure, the 4 lateral alternatives.
fn find_shift(particle: &Particle, grid: &PhaseGrid, own_id: u32) -> Option<(i64, i64, i64)> {
    if shift_is_legal(particle, grid, (0, 0, -1), own_id) {
        return Some((0, 0, -1));
    }
    for &delta in &LATERAL_TRIES {
        if shift_is_legal(particle, grid, delta, own_id) {
            return Some(delta);
        }
    }
    None
}

fn shift_is_legal(
    particle: &Particle,
    grid: &PhaseGrid,
    delta: (i64, i64, i64),
    own_id: u32,
) -> bool {
    let _ = own_id;
    particle.voxels.iter().all(|&(x, y, z)| {
        let (nx, ny, nz) = (x + delta.0, y + delta.1, z + delta.2);
        let occupant = grid.get(nx, ny, nz);
        occupant == PhaseId::POROSITY || particle.voxels.contains(&(nx, ny, nz))
    })
}

/// Commits a shift: rewrites every owned voxel in both grids, clearing the
/// previous position only where it is still owned by this particle.
fn apply_shift(
    particles: &mut [Particle],
    idx: usize,
    delta: (i64, i64, i64),
    phase_grid: &mut PhaseGrid,
    part_grid: &mut PartIdGrid,
) {
    let id = particles[idx].id;
    let phase = particles[idx].phase;
    let old_voxels = particles[idx].voxels.clone();

    let new_voxels: Vec<(i64, i64, i64)> = old_voxels
        .iter()
        .map(|&(x, y, z)| {
            (
                crate::grid::wrap(x + delta.0, phase_grid.nx()),
                crate::grid::wrap(y + delta.1, phase_grid.ny()),
                crate::grid::wrap(z + delta.2, phase_grid.nz()),
            )
        })
        .collect();

    for &(x, y, z) in &old_voxels {
        if !new_voxels.contains(&(x, y, z)) {
            phase_grid.set(x, y, z, PhaseId::POROSITY);
            part_grid.set(x, y, z, 0);
        }
    }
    for &(x, y, z) in &new_voxels {
        phase_grid.set(x, y, z, phase);
        part_grid.set(x, y, z, id);
    }

    particles[idx].voxels = new_voxels;
    particles[idx].recompute_derived(|v| {
        crate::packing::itz::has_non_aggregate_neighbor(phase_grid, v)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_touching_floor_settles_immediately() {
        let mut grid = PhaseGrid::new(10, 10, 10, 1.0).unwrap();
        let mut part_grid = PartIdGrid::new(10, 10, 10, 1.0).unwrap();
        grid.set(5, 5, 0, PhaseId::AGG);
        part_grid.set(5, 5, 0, 1);
        let mut particles = vec![Particle {
            id: 1,
            phase: PhaseId::AGG,
            center: (5, 5, 0),
            extent: (0, 0, 0),
            voxels: vec![(5, 5, 0)],
            periph: vec![(5, 5, 0)],
            minz_vox: 0,
            settled: false,
        }];
        let moved = settle_pass(&mut particles, &mut grid, &mut part_grid);
        assert_eq!(moved, 1);
        assert!(particles[0].settled);
    }

    #[test]
    fn particle_falls_until_blocked() {
        let mut grid = PhaseGrid::new(10, 10, 10, 1.0).unwrap();
        let mut part_grid = PartIdGrid::new(10, 10, 10, 1.0).unwrap();
        grid.set(5, 5, 5, PhaseId::AGG);
        part_grid.set(5, 5, 5, 1);
        let mut particles = vec![Particle {
            id: 1,
            phase: PhaseId::AGG,
            center: (5, 5, 5),
            extent: (0, 0, 0),
            voxels: vec![(5, 5, 5)],
            periph: vec![(5, 5, 5)],
            minz_vox: 0,
            settled: false,
        }];
        for _ in 0..5 {
            settle_pass(&mut particles, &mut grid, &mut part_grid);
            if particles[0].settled {
                break;
            }
        }
        assert_eq!(particles[0].minz(), 0);
    }
}
