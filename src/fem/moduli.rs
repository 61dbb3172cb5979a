//! Stress/strain averaging and effective-moduli extraction.

use nalgebra::Vector3;

use crate::fem::solver::{ElasticitySolver, MacroStrain};
use crate::fem::stiffness::{cmod_for, strain_displacement, PhaseModuli};
use crate::phase::PhaseId;

/// Isotropic effective moduli fit to the overall averaged stress/strain.
#[derive(Clone, Copy, Debug)]
pub struct EffectiveModuli {
    pub bulk_k: f64,
    pub shear_g: f64,
    pub young_e: f64,
    pub poisson_v: f64,
}

/// Per-phase volume-fraction-weighted contribution to the averaged response.
#[derive(Clone, Copy, Debug)]
pub struct PhaseContribution {
    pub phase: PhaseId,
    pub volume_fraction: f64,
    pub mean_bulk_stress: f64,
    pub mean_shear_stress: f64,
}

/// One x-layer's isotropic moduli, for ITZ-layered reporting.
#[derive(Clone, Copy, Debug)]
pub struct ItzLayerModuli {
    pub x: i64,
    pub bulk_k: f64,
    pub shear_g: f64,
    pub young_e: f64,
    pub poisson_v: f64,
}

fn flatten_corners(corners: &[Vector3<f64>; 8]) -> [f64; 24] {
    let mut flat = [0.0_f64; 24];
    for (i, c) in corners.iter().enumerate() {
        flat[3 * i] = c.x;
        flat[3 * i + 1] = c.y;
        flat[3 * i + 2] = c.z;
    }
    flat
}

/// 6-component engineering strain at the element center, from its 8 corner
/// total displacements.
fn element_strain(corners: &[Vector3<f64>; 8]) -> [f64; 6] {
    let b = strain_displacement(0.0, 0.0, 0.0);
    let u = flatten_corners(corners);
    let mut strain = [0.0_f64; 6];
    for (row, b_row) in b.iter().enumerate() {
        strain[row] = b_row.iter().zip(u.iter()).map(|(bij, uj)| bij * uj).sum();
    }
    strain
}

fn apply_cmod(cmod: &[[f64; 6]; 6], strain: &[f64; 6]) -> [f64; 6] {
    let mut stress = [0.0_f64; 6];
    for row in 0..6 {
        stress[row] = (0..6).map(|k| cmod[row][k] * strain[k]).sum();
    }
    stress
}

/// Averages per-voxel strain/stress over the whole grid and fits isotropic
/// effective moduli. `do_itz_layers` additionally reports per-x-layer
/// isotropic moduli.
pub fn average_moduli(
    solver: &ElasticitySolver<'_>,
    moduli: impl Fn(PhaseId) -> PhaseModuli,
    do_itz_layers: bool,
) -> (EffectiveModuli, Vec<PhaseContribution>, Option<Vec<ItzLayerModuli>>) {
    let grid = solver.grid();
    let applied = solver.applied_strain();
    let n = grid.voxel_count();

    let mut mean_stress = [0.0_f64; 6];
    let mut per_phase: Vec<(PhaseId, u64, f64, f64)> = Vec::new();

    let nx = grid.nx();
    let mut layer_stress: Vec<[f64; 6]> = vec![[0.0; 6]; nx as usize];
    let mut layer_count: Vec<u64> = vec![0; nx as usize];

    for element_flat in 0..n {
        let phase = grid.get_flat(element_flat);
        let cmod = cmod_for(moduli(phase));
        let corners = solver.element_corner_displacements(element_flat);
        let strain = element_strain(&corners);
        let stress = apply_cmod(&cmod, &strain);

        for k in 0..6 {
            mean_stress[k] += stress[k];
        }

        let entry = per_phase.iter_mut().find(|(p, ..)| *p == phase);
        let bulk_stress = (stress[0] + stress[1] + stress[2]) / 3.0;
        let shear_stress = (stress[3] + stress[4] + stress[5]) / 3.0;
        match entry {
            Some((_, count, bulk_sum, shear_sum)) => {
                *count += 1;
                *bulk_sum += bulk_stress;
                *shear_sum += shear_stress;
            }
            None => per_phase.push((phase, 1, bulk_stress, shear_stress)),
        }

        if do_itz_layers {
            let (x, _, _) = grid.unflatten(element_flat);
            let layer = x as usize;
            for k in 0..6 {
                layer_stress[layer][k] += stress[k];
            }
            layer_count[layer] += 1;
        }
    }

    for k in 0..6 {
        mean_stress[k] /= n as f64;
    }

    let effective = fit_isotropic(&mean_stress, &applied);

    let contributions = per_phase
        .into_iter()
        .map(|(phase, count, bulk_sum, shear_sum)| PhaseContribution {
            phase,
            volume_fraction: count as f64 / n as f64,
            mean_bulk_stress: bulk_sum / count as f64,
            mean_shear_stress: shear_sum / count as f64,
        })
        .collect();

    let itz = do_itz_layers.then(|| {
        (0..nx as usize)
            .map(|x| {
                let mut s = layer_stress[x];
                let count = layer_count[x].max(1) as f64;
                for v in s.iter_mut() {
                    *v /= count;
                }
                let fit = fit_isotropic(&s, &applied);
                ItzLayerModuli {
                    x: x as i64,
                    bulk_k: fit.bulk_k,
                    shear_g: fit.shear_g,
                    young_e: fit.young_e,
                    poisson_v: fit.poisson_v,
                }
            })
            .collect()
    });

    (effective, contributions, itz)
}

/// `K = (1/3)(Σxx+Σyy+Σzz)/(εxx+εyy+εzz)`, `G = (1/3)(σxy/εxy + σxz/εxz + σyz/εyz)`,
/// `E = 9KG/(3K+G)`, `ν = (3K-2G)/(2(3K+G))`.
fn fit_isotropic(mean_stress: &[f64; 6], applied: &MacroStrain) -> EffectiveModuli {
    let volumetric_strain = applied.exx + applied.eyy + applied.ezz;
    let bulk_k = if volumetric_strain.abs() > f64::EPSILON {
        (mean_stress[0] + mean_stress[1] + mean_stress[2]) / (3.0 * volumetric_strain)
    } else {
        0.0
    };

    let mut shear_terms = Vec::new();
    if applied.exy.abs() > f64::EPSILON {
        shear_terms.push(mean_stress[3] / applied.exy);
    }
    if applied.exz.abs() > f64::EPSILON {
        shear_terms.push(mean_stress[4] / applied.exz);
    }
    if applied.eyz.abs() > f64::EPSILON {
        shear_terms.push(mean_stress[5] / applied.eyz);
    }
    let shear_g = if shear_terms.is_empty() {
        0.0
    } else {
        shear_terms.iter().sum::<f64>() / shear_terms.len() as f64
    };

    let young_e = if (3.0 * bulk_k + shear_g).abs() > f64::EPSILON {
        9.0 * bulk_k * shear_g / (3.0 * bulk_k + shear_g)
    } else {
        0.0
    };
    let poisson_v = if (3.0 * bulk_k + shear_g).abs() > f64::EPSILON {
        (3.0 * bulk_k - 2.0 * shear_g) / (2.0 * (3.0 * bulk_k + shear_g))
    } else {
        0.0
    };

    EffectiveModuli { bulk_k, shear_g, young_e, poisson_v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem::solver::MacroStrain;
    use crate::grid::Grid;

    #[test]
    fn single_phase_recovers_input_moduli() {
        let grid = Grid::filled(20, 20, 20, 1.0, PhaseId::C3S);
        let strain = MacroStrain { exx: 0.001, eyy: 0.001, ezz: 0.001, exy: 0.0005, ..Default::default() };
        let mut solver = ElasticitySolver::new(&grid, strain);
        let moduli = |_p: PhaseId| PhaseModuli { bulk_k: 10.0, shear_g: 5.0 };
        solver.solve(moduli, 1e-16, 50);

        let (effective, contributions, itz) = average_moduli(&solver, moduli, false);
        assert!((effective.bulk_k - 10.0).abs() < 1e-2, "K={}", effective.bulk_k);
        assert!((effective.shear_g - 5.0).abs() < 1e-2, "G={}", effective.shear_g);
        assert_eq!(contributions.len(), 1);
        assert!(itz.is_none());
    }

    #[test]
    fn two_phase_series_bracketed_by_voigt_reuss() {
        let mut grid = Grid::filled(20, 20, 20, 1.0, PhaseId(0));
        for element_flat in 0..grid.voxel_count() {
            let (_, _, z) = grid.unflatten(element_flat);
            grid.set_flat(element_flat, if z < 10 { PhaseId(0) } else { PhaseId(1) });
        }
        let strain = MacroStrain { ezz: 0.001, ..Default::default() };
        let mut solver = ElasticitySolver::new(&grid, strain);
        let moduli = |p: PhaseId| {
            if p == PhaseId(0) {
                PhaseModuli { bulk_k: 1.0, shear_g: 0.5 }
            } else {
                PhaseModuli { bulk_k: 10.0, shear_g: 5.0 }
            }
        };
        solver.solve(moduli, 1e-14, 400);

        let (effective, _, _) = average_moduli(&solver, moduli, false);
        let voigt = 0.5 * (1.0 + 10.0);
        let reuss = 1.0 / (0.5 / 1.0 + 0.5 / 10.0);
        assert!(effective.bulk_k >= reuss - 1e-6 && effective.bulk_k <= voigt + 1e-6);
    }
}
