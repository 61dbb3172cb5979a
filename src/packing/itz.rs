//! ITZ addition: relabel POROSITY voxels adjacent to a particle as ITZ.

use crate::grid::PhaseGrid;
use crate::phase::PhaseId;

/// True if any of the 18-neighborhood of `(x,y,z)` is not POROSITY and not
/// ITZ itself (i.e. touches a particle or other solid).
pub fn has_non_aggregate_neighbor(grid: &PhaseGrid, voxel: (i64, i64, i64)) -> bool {
    let (x, y, z) = voxel;
    grid.neighbors_18(x, y, z)
        .iter()
        .any(|&p| p != PhaseId::POROSITY)
}

/// Relabels any POROSITY voxel 18-adjacent to a particle (AGG phase) as ITZ.
/// Pre-export step, run once after all classes/settling are done.
pub fn add_itz(grid: &mut PhaseGrid) {
    let to_relabel: Vec<(i64, i64, i64)> = grid
        .coords()
        .filter(|&(x, y, z)| {
            grid.get(x, y, z) == PhaseId::POROSITY
                && grid
                    .neighbors_18(x, y, z)
                    .iter()
                    .any(|&p| p.is_aggregate())
        })
        .collect();

    for (x, y, z) in to_relabel {
        grid.set(x, y, z, PhaseId::ITZ);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itz_only_touches_porosity_next_to_aggregate() {
        let mut grid = PhaseGrid::new(5, 5, 5, 1.0).unwrap();
        grid.set(2, 2, 2, PhaseId::AGG);
        add_itz(&mut grid);
        assert_eq!(grid.get(2, 2, 1), PhaseId::ITZ);
        assert_eq!(grid.get(0, 0, 0), PhaseId::POROSITY);
    }
}
