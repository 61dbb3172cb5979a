//! Placement candidate search and the fit test.

use crate::grid::{PartIdGrid, PhaseGrid};
use crate::packing::pore_list::PoreList;
use crate::packing::shape::VoxelOffset;
use crate::phase::PhaseId;

/// Builds a [`PoreList`] over every POROSITY voxel of `grid`, optionally
/// annotated with a pore radius.
///
/// `compute_radius` is `Some(max_radius)` for "large" classes (index above
/// the large/small threshold); the radius of a pore voxel is the largest
/// integer `r <= max_radius` such that every voxel within a cube of that
/// radius is porosity.
pub fn build_pore_list(grid: &PhaseGrid, compute_radius: Option<i64>) -> PoreList {
    let mut list = PoreList::new();
    for (x, y, z) in grid.coords() {
        if grid.get(x, y, z) != PhaseId::POROSITY {
            continue;
        }
        let voxel_index = grid.flat_index(x, y, z);
        let radius = match compute_radius {
            Some(max_radius) => pore_radius_at(grid, x, y, z, max_radius) as f64,
            None => 0.0,
        };
        list.push_back(voxel_index, radius);
    }
    list
}

/// Largest integer `r` in `[0, max_radius]` such that every voxel in the
/// cube `[-r, r]^3` centered at `(x,y,z)` is porosity.
fn pore_radius_at(grid: &PhaseGrid, x: i64, y: i64, z: i64, max_radius: i64) -> i64 {
    let mut best = 0;
    for r in 1..=max_radius {
        let mut all_porosity = true;
        'search: for dz in -r..=r {
            for dy in -r..=r {
                for dx in -r..=r {
                    if grid.get(x + dx, y + dy, z + dz) != PhaseId::POROSITY {
                        all_porosity = false;
                        break 'search;
                    }
                }
            }
        }
        if all_porosity {
            best = r;
        } else {
            break;
        }
    }
    best
}

/// Converts a flat voxel index back into `(x, y, z)`.
fn unflatten(index: usize, nx: i64, ny: i64) -> (i64, i64, i64) {
    let index = index as i64;
    let z = index / (nx * ny);
    let rest = index % (nx * ny);
    let y = rest / nx;
    let x = rest % nx;
    (x, y, z)
}

/// Tests whether `template` (bounding-box-relative offsets) fits centered at
/// `(cx, cy, cz)`: legal iff every offset maps to a POROSITY grid voxel.
/// Periodic wrapping applies on all axes.
pub fn fits(grid: &PhaseGrid, center: (i64, i64, i64), template: &[VoxelOffset]) -> bool {
    let (cx, cy, cz) = center;
    template.iter().all(|&(dx, dy, dz)| {
        grid.get(cx + dx as i64, cy + dy as i64, cz + dz as i64) == PhaseId::POROSITY
    })
}

/// Stamps `template` into `phase_grid`/`part_grid` centered at `center`,
/// assuming [`fits`] already returned `true`.
pub fn stamp(
    phase_grid: &mut PhaseGrid,
    part_grid: &mut PartIdGrid,
    center: (i64, i64, i64),
    template: &[VoxelOffset],
    phase: PhaseId,
    particle_id: u32,
) -> Vec<(i64, i64, i64)> {
    let (cx, cy, cz) = center;
    let mut absolute_voxels = Vec::with_capacity(template.len());
    for &(dx, dy, dz) in template {
        let (x, y, z) = (cx + dx as i64, cy + dy as i64, cz + dz as i64);
        let (wx, wy, wz) = (
            crate::grid::wrap(x, phase_grid.nx()),
            crate::grid::wrap(y, phase_grid.ny()),
            crate::grid::wrap(z, phase_grid.nz()),
        );
        phase_grid.set(wx, wy, wz, phase);
        part_grid.set(wx, wy, wz, particle_id);
        absolute_voxels.push((wx, wy, wz));
    }
    absolute_voxels
}

pub(crate) fn pore_voxel_coords(list: &PoreList, handle: u32, grid: &PhaseGrid) -> (i64, i64, i64) {
    unflatten(list.voxel_index(handle), grid.nx(), grid.ny())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::PhaseGrid;

    #[test]
    fn fits_rejects_non_porosity() {
        let mut grid = PhaseGrid::new(10, 10, 10, 1.0).unwrap();
        grid.set(5, 5, 5, PhaseId::AGG);
        let template = vec![(0, 0, 0)];
        assert!(!fits(&grid, (5, 5, 5), &template));
        assert!(fits(&grid, (1, 1, 1), &template));
    }

    #[test]
    fn pore_radius_respects_bound() {
        let grid = PhaseGrid::new(20, 20, 20, 1.0).unwrap();
        let r = pore_radius_at(&grid, 10, 10, 10, 3);
        assert_eq!(r, 3);
    }
}
