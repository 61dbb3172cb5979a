//! Simulated mercury intrusion porosimetry.

use std::collections::VecDeque;

use crate::grid::PhaseGrid;
use crate::packing::digitize_sphere;
use crate::phase::PhaseId;

/// One row of the intrusion distribution: pore diameter in voxels and the
/// voxel count first intruded at that radius.
#[derive(Clone, Copy, Debug)]
pub struct PoreDistRow {
    pub diameter_voxels: i64,
    pub intruded_voxels: u64,
}

/// Simulates non-wetting intrusion from the `z=0` face inward. `x,y` are
/// periodic; `z` is an open boundary, so a probe template centered near
/// either z-face can never "fit" past it.
///
/// Descends `r` from `max_radius` to `0`; at each radius, seeds the BFS at
/// still-unintruded porosity voxels on the `z=0` face, then grows the
/// frontier to any neighboring porosity voxel where the radius-`r` template
/// still fits entirely within porosity-like voxels. Intruded voxels are
/// flipped from `POROSITY` to `EMPTYP` (spec's "tagged by POROSITY+1").
pub fn poredist(grid: &mut PhaseGrid, max_radius: i64) -> Vec<PoreDistRow> {
    let mut rows = Vec::with_capacity((max_radius + 1) as usize);

    for r in (0..=max_radius).rev() {
        let template = digitize_sphere(r as f64);
        let mut intruded_this_radius = 0u64;
        let mut queue: VecDeque<(i64, i64, i64)> = VecDeque::new();

        for x in 0..grid.nx() {
            for y in 0..grid.ny() {
                let (px, py, pz) = (x, y, 0);
                if grid.get(px, py, pz) == PhaseId::POROSITY && template_fits(grid, &template, px, py, pz) {
                    queue.push_back((px, py, pz));
                }
            }
        }

        while let Some((x, y, z)) = queue.pop_front() {
            if grid.get(x, y, z) != PhaseId::POROSITY {
                continue;
            }
            if !template_fits(grid, &template, x, y, z) {
                continue;
            }
            grid.set(x, y, z, PhaseId::EMPTYP);
            intruded_this_radius += 1;

            for (dx, dy, dz) in [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)] {
                let nz = z + dz;
                if !(0..grid.nz()).contains(&nz) {
                    continue;
                }
                let (nx, ny) = (x + dx, y + dy); // wrap handled by grid.get/set
                if grid.get(nx, ny, nz) == PhaseId::POROSITY {
                    queue.push_back((nx, ny, nz));
                }
            }
        }

        rows.push(PoreDistRow {
            diameter_voxels: 2 * r + 1,
            intruded_voxels: intruded_this_radius,
        });
    }

    rows
}

/// Whether every offset voxel of `template`, centered on `(x,y,z)`, is
/// porosity-like and within the open z-range of the grid.
fn template_fits(grid: &PhaseGrid, template: &[(i32, i32, i32)], x: i64, y: i64, z: i64) -> bool {
    template.iter().all(|&(dx, dy, dz)| {
        let tz = z + dz as i64;
        if !(0..grid.nz()).contains(&tz) {
            return false;
        }
        let (tx, ty) = (x + dx as i64, y + dy as i64);
        grid.get(tx, ty, tz).is_porosity_like()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn all_porosity_grid_intrudes_fully_at_radius_zero() {
        let mut grid = Grid::filled(8, 8, 8, 1.0, PhaseId::POROSITY);
        let rows = poredist(&mut grid, 1);
        let total: u64 = rows.iter().map(|r| r.intruded_voxels).sum();
        assert_eq!(total, 8 * 8 * 8);
        assert!(grid.voxels().iter().all(|&p| p == PhaseId::EMPTYP));
    }

    #[test]
    fn solid_block_blocks_all_intrusion() {
        let mut grid = Grid::filled(6, 6, 6, 1.0, PhaseId::AGG);
        let rows = poredist(&mut grid, 2);
        assert!(rows.iter().all(|r| r.intruded_voxels == 0));
    }
}
