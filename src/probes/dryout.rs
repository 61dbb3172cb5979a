//! Desiccation / drying ranker.

use crate::error::ProbeError;
use crate::grid::PhaseGrid;
use crate::phase::PhaseId;

const CUBEMIN: i64 = 3;

/// Gel-porosity fraction contributed by a phase, `0.0` for non-gel phases
/// (spec: "CSH at 0.38, POZZCSH/SLAGCSH at 0.20").
fn gel_porosity_of(phase: PhaseId) -> f64 {
    phase.info().gel_porosity
}

/// Effective pore-volume accounting: `total` includes every porosity-like
/// voxel plus the implicit gel porosity of CSH-family solids; `saturated`
/// counts only voxels still tagged `POROSITY` (every other porosity-like tag
/// denotes an already-dried voxel).
struct PoreBudget {
    saturated_voxels: f64,
    total_pore_volume: f64,
    gel_pore_volume: f64,
}

fn pore_budget(grid: &PhaseGrid) -> PoreBudget {
    let mut saturated = 0.0;
    let mut porosity_like_total = 0.0;
    let mut gel_volume = 0.0;

    for &phase in grid.voxels() {
        if phase == PhaseId::POROSITY {
            saturated += 1.0;
        }
        if phase.is_porosity_like() {
            porosity_like_total += 1.0;
        }
        let gp = gel_porosity_of(phase);
        if gp > 0.0 {
            gel_volume += gp;
        }
    }

    PoreBudget {
        saturated_voxels: saturated,
        total_pore_volume: porosity_like_total + gel_volume,
        gel_pore_volume: gel_volume,
    }
}

/// Result of a [`dry_out`] run.
#[derive(Clone, Debug)]
pub struct DryoutReport {
    pub voxels_dried: usize,
    pub achieved_saturation: f64,
    pub cube_size_used: i64,
}

/// Removes (flips to [`PhaseId::EMPTYP`]) exactly enough saturated
/// [`PhaseId::POROSITY`] voxels to bring the overall degree of saturation
/// down to `target_saturation`, clamped below by the gel-porosity-only
/// limit.
pub fn dry_out(grid: &mut PhaseGrid, target_saturation: f64, initial_cube_size: i64) -> Result<DryoutReport, ProbeError> {
    let budget = pore_budget(grid);
    let gel_floor = if budget.total_pore_volume > 0.0 {
        budget.gel_pore_volume / budget.total_pore_volume
    } else {
        0.0
    };
    let clamped_target = target_saturation.max(gel_floor).min(1.0);

    let target_saturated_volume = clamped_target * budget.total_pore_volume;
    let ndesire_f = (budget.saturated_voxels - target_saturated_volume).max(0.0);
    let ndesire = ndesire_f.round() as usize;

    if ndesire > budget.saturated_voxels as usize {
        return Err(ProbeError::InsufficientPoreVoxels {
            ndesire,
            available: budget.saturated_voxels as usize,
        });
    }
    if ndesire == 0 {
        return Ok(DryoutReport {
            voxels_dried: 0,
            achieved_saturation: if budget.total_pore_volume > 0.0 {
                budget.saturated_voxels / budget.total_pore_volume
            } else {
                0.0
            },
            cube_size_used: initial_cube_size,
        });
    }

    let (ranked, cube_size_used) = rank_by_connectivity(grid, ndesire, initial_cube_size);

    for &(x, y, z) in ranked.iter().take(ndesire) {
        grid.set(x, y, z, PhaseId::EMPTYP);
    }

    let achieved_saturation = (budget.saturated_voxels - ndesire as f64) / budget.total_pore_volume;

    Ok(DryoutReport {
        voxels_dried: ranked.len().min(ndesire),
        achieved_saturation,
        cube_size_used,
    })
}

/// Builds a length-`ndesire` list of `POROSITY` voxel coordinates, ranked
/// descending by the count of porosity-like voxels in a centered, periodic
/// cube of side `cube_size`. Shrinks `cube_size` by 2 (never below
/// [`CUBEMIN`]) if the best observed score undershoots half the cube volume.
fn rank_by_connectivity(grid: &PhaseGrid, ndesire: usize, initial_cube_size: i64) -> (Vec<(i64, i64, i64)>, i64) {
    let mut cube_size = initial_cube_size;

    loop {
        let half = cube_size / 2;
        let mut ranked: Vec<(i64, (i64, i64, i64))> = Vec::with_capacity(ndesire + 1);
        let mut best_score = 0i64;

        for (x, y, z) in grid.coords() {
            if grid.get(x, y, z) != PhaseId::POROSITY {
                continue;
            }
            let score = connectivity_score(grid, x, y, z, half);
            best_score = best_score.max(score);

            let pos = ranked.partition_point(|&(s, _)| s >= score);
            ranked.insert(pos, (score, (x, y, z)));
            if ranked.len() > ndesire {
                ranked.truncate(ndesire);
            }
        }

        let cube_volume = (2 * half + 1).pow(3);
        if best_score < cube_volume / 2 && cube_size - 2 >= CUBEMIN {
            cube_size -= 2;
            continue;
        }

        return (ranked.into_iter().map(|(_, pos)| pos).collect(), cube_size);
    }
}

fn connectivity_score(grid: &PhaseGrid, x: i64, y: i64, z: i64, half: i64) -> i64 {
    let mut count = 0i64;
    for dz in -half..=half {
        for dy in -half..=half {
            for dx in -half..=half {
                if grid.get(x + dx, y + dy, z + dz).is_porosity_like() {
                    count += 1;
                }
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn all_porosity_dries_to_target() {
        let mut grid = Grid::filled(6, 6, 6, 1.0, PhaseId::POROSITY);
        let total = 6 * 6 * 6;
        let report = dry_out(&mut grid, 0.5, 5).unwrap();
        let dried = grid.voxels().iter().filter(|&&p| p == PhaseId::EMPTYP).count();
        assert_eq!(dried, report.voxels_dried);
        assert!((dried as f64 - total as f64 * 0.5).abs() <= 1.0);
    }

    #[test]
    fn target_below_gel_floor_is_clamped() {
        let mut grid = Grid::filled(4, 4, 4, 1.0, PhaseId::POROSITY);
        for i in 0..20 {
            let (x, y, z) = grid.unflatten(i);
            grid.set(x, y, z, PhaseId::CSH);
        }
        let report = dry_out(&mut grid, 0.0, 5).unwrap();
        assert!(report.achieved_saturation > 0.0);
    }

    #[test]
    fn no_porosity_voxels_with_positive_target_is_a_no_op() {
        let mut grid = Grid::filled(4, 4, 4, 1.0, PhaseId::AGG);
        let report = dry_out(&mut grid, 0.5, 5).unwrap();
        assert_eq!(report.voxels_dried, 0);
    }
}
