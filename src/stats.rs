//! Derived phase statistics: per-phase volume and binder-exposed-surface
//! fractions over the grid.

use crate::grid::PhaseGrid;
use crate::phase::PhaseId;

/// Volume and binder-exposed-surface counts/fractions for one phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseStats {
    pub phase: PhaseId,
    pub volume_voxels: u64,
    pub volume_fraction: f64,
    /// Voxels of this phase whose periodic 6-neighborhood contains a
    /// `BINDER` or `ITZ` voxel.
    pub surface_voxels: u64,
    pub surface_fraction: f64,
}

/// Volume and surface-exposure fractions for `BINDER`, `AGG`, and `ITZ`.
/// Surface fraction is relative to that phase's own volume count, not the
/// whole grid.
pub fn apstats(grid: &PhaseGrid) -> Vec<PhaseStats> {
    const RELEVANT: [PhaseId; 3] = [PhaseId::BINDER, PhaseId::AGG, PhaseId::ITZ];
    let total = grid.voxel_count() as f64;

    RELEVANT
        .into_iter()
        .map(|phase| {
            let mut volume = 0u64;
            let mut surface = 0u64;
            for (x, y, z) in grid.coords() {
                if grid.get(x, y, z) != phase {
                    continue;
                }
                volume += 1;
                let neighbors = grid.neighbors_6(x, y, z);
                if neighbors
                    .iter()
                    .any(|&n| n == PhaseId::BINDER || n == PhaseId::ITZ)
                {
                    surface += 1;
                }
            }
            PhaseStats {
                phase,
                volume_voxels: volume,
                volume_fraction: volume as f64 / total,
                surface_voxels: surface,
                surface_fraction: if volume > 0 { surface as f64 / volume as f64 } else { 0.0 },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn isolated_aggregate_has_no_surface() {
        let grid = Grid::filled(4, 4, 4, 1.0, PhaseId::AGG);
        let stats = apstats(&grid);
        let agg = stats.iter().find(|s| s.phase == PhaseId::AGG).unwrap();
        assert_eq!(agg.volume_voxels, 64);
        assert_eq!(agg.surface_voxels, 0);
    }

    #[test]
    fn aggregate_adjacent_to_binder_is_surface() {
        let mut grid = Grid::filled(4, 4, 4, 1.0, PhaseId::AGG);
        grid.set(0, 0, 0, PhaseId::BINDER);
        let stats = apstats(&grid);
        let agg = stats.iter().find(|s| s.phase == PhaseId::AGG).unwrap();
        // Every periodic 6-neighbor of (0,0,0) sees the BINDER voxel.
        assert_eq!(agg.surface_voxels, 6);
    }
}
