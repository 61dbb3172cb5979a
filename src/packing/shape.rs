//! Particle digitization: sphere mode and spherical-harmonic real-shape mode.
//!
//! [`ParticleShape`] is a sum type behind one [`ParticleShape::digitize`]
//! entry point rather than a trait object, since the two modes share no
//! runtime-polymorphic state beyond the final voxel offsets they produce.

use crate::quadrature::GaussQuadrature;
use nalgebra::Vector3;
use num::complex::Complex64;
use rand::Rng;
use std::f64::consts::PI;

/// Maximum spherical-harmonic degree the packing engine reconstructs.
pub const NNN: usize = 14;

/// A single `(n, m)` spherical-harmonic coefficient.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShCoeff {
    pub n: usize,
    pub m: i32,
    pub value: Complex64,
}

/// A real-shape particle template: spherical-harmonic coefficients up to
/// degree [`NNN`], as loaded from a `<name>.anm` file.
#[derive(Clone, Debug)]
pub struct ShShape {
    /// `coeffs[n][(m + n) as usize]` gives `A[n,m]`, `m` ranging over `-n..=n`.
    pub coeffs: Vec<Vec<Complex64>>,
}

impl ShShape {
    pub fn from_rows(rows: &[ShCoeff]) -> Self {
        let mut coeffs = vec![Vec::new(); NNN + 1];
        for n in 0..=NNN {
            coeffs[n] = vec![Complex64::new(0.0, 0.0); 2 * n + 1];
        }
        for row in rows {
            if row.n <= NNN {
                let idx = (row.m + row.n as i32) as usize;
                coeffs[row.n][idx] = row.value;
            }
        }
        Self { coeffs }
    }

    fn coeff(&self, n: usize, m: i32) -> Complex64 {
        self.coeffs[n][(m + n as i32) as usize]
    }

    /// Evaluates the radial surface `rho(theta, phi) = Re(Sum A[n,m] Y[n,m](theta,phi))`.
    pub fn radius_at(&self, theta: f64, phi: f64) -> f64 {
        let mut total = Complex64::new(0.0, 0.0);
        for n in 0..=NNN {
            for m in -(n as i32)..=(n as i32) {
                let a = self.coeff(n, m);
                if a.norm() == 0.0 {
                    continue;
                }
                total += a * real_spherical_harmonic(n, m, theta, phi);
            }
        }
        total.re
    }

    /// Scales every coefficient by `factor` (used to retarget volume).
    pub fn scale(&mut self, factor: f64) {
        for row in self.coeffs.iter_mut() {
            for c in row.iter_mut() {
                *c *= factor;
            }
        }
    }
}

/// Evaluates `Y[n,m](theta,phi)` via the complex spherical harmonics, using
/// the standard normalized associated Legendre recurrence.
fn real_spherical_harmonic(n: usize, m: i32, theta: f64, phi: f64) -> Complex64 {
    let am = m.unsigned_abs() as usize;
    let p = associated_legendre(n, am, theta.cos());
    let norm = normalization(n, am);
    let angular = Complex64::new(0.0, m as f64 * phi).exp();
    let y = norm * p * angular;
    if m < 0 {
        // Y[n,-m] = (-1)^m conj(Y[n,m]) for real-valued underlying field.
        let sign = if am % 2 == 0 { 1.0 } else { -1.0 };
        sign * y.conj()
    } else {
        y
    }
}

fn normalization(n: usize, m: usize) -> f64 {
    let num = (2 * n + 1) as f64 * factorial_ratio(n, m);
    (num / (4.0 * PI)).sqrt()
}

/// `(n-m)! / (n+m)!` computed without overflow via a running product.
fn factorial_ratio(n: usize, m: usize) -> f64 {
    let mut ratio = 1.0;
    for k in (n - m + 1)..=(n + m) {
        ratio /= k as f64;
    }
    ratio
}

/// Associated Legendre polynomial `P_n^m(x)` via the standard stable
/// three-term recurrence (Press et al., "Numerical Recipes").
fn associated_legendre(n: usize, m: usize, x: f64) -> f64 {
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = ((1.0 - x) * (1.0 + x)).sqrt();
        let mut fact = 1.0;
        for _ in 0..m {
            pmm *= -fact * somx2;
            fact += 2.0;
        }
    }
    if n == m {
        return pmm;
    }
    let mut pmmp1 = x * (2 * m as i64 + 1) as f64 * pmm;
    if n == m + 1 {
        return pmmp1;
    }
    let mut pll = 0.0;
    for ll in (m + 2)..=n {
        pll = (x * (2 * ll as i64 - 1) as f64 * pmmp1 - (ll + m - 1) as f64 * pmm)
            / (ll - m) as f64;
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pll
}

/// A voxel offset (relative to the bounding-box center) making up a digitized
/// particle shape.
pub type VoxelOffset = (i32, i32, i32);

/// A particle digitization source: either a sphere of a given radius, or a
/// rotated real-shape spherical-harmonic template.
#[derive(Clone, Debug)]
pub enum ParticleShape {
    Sphere { radius_voxels: f64 },
    RealShape { template: ShShape, rotation: AxisRotation },
}

/// A rotation restricted to multiples of 90 degrees about each axis.
/// Represented as the signed permutation of axes it induces, which is
/// exactly what a Wigner-D rotation at these special angles reduces to.
#[derive(Clone, Copy, Debug)]
pub struct AxisRotation {
    /// `perm[i]` and `sign[i]` describe how rotated-axis `i` maps to
    /// `sign[i] * original_axis[perm[i]]`.
    perm: [usize; 3],
    sign: [f64; 3],
}

impl AxisRotation {
    pub fn identity() -> Self {
        Self {
            perm: [0, 1, 2],
            sign: [1.0, 1.0, 1.0],
        }
    }

    /// Draws one of the 24 signed-axis-permutation rotations uniformly at
    /// random.
    pub fn random<Rn: Rng>(rng: &mut Rn) -> Self {
        const PERMS: [[usize; 3]; 6] = [
            [0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0],
        ];
        let perm = PERMS[rng.gen_range(0..6)];
        let sign = [
            if rng.gen_bool(0.5) { 1.0 } else { -1.0 },
            if rng.gen_bool(0.5) { 1.0 } else { -1.0 },
            if rng.gen_bool(0.5) { 1.0 } else { -1.0 },
        ];
        Self { perm, sign }
    }

    /// Applies the inverse rotation to a direction vector: evaluating the
    /// *original* (unrotated) coefficients at `inverse(direction)` is
    /// equivalent to evaluating the rotated coefficients at `direction`,
    /// avoiding an explicit Wigner-D coefficient transform.
    fn inverse_apply(&self, v: Vector3<f64>) -> Vector3<f64> {
        let mut out = Vector3::zeros();
        for axis in 0..3 {
            out[self.perm[axis]] = self.sign[axis] * v[axis];
        }
        out
    }
}

/// Evaluates a rotated real-shape template's radius along `direction`
/// (unit vector) by rotating the query direction instead of the coefficients.
pub fn rotated_radius(template: &ShShape, rotation: &AxisRotation, direction: Vector3<f64>) -> f64 {
    let local = rotation.inverse_apply(direction);
    let r = local.norm().max(1e-12);
    let theta = (local.z / r).acos();
    let phi = local.y.atan2(local.x);
    template.radius_at(theta, phi)
}

/// Volume (in units of `r^3`) of a real-shape template evaluated by Gaussian
/// quadrature over the 120x120 `(theta, phi)` grid.
pub fn sh_volume(template: &ShShape, rotation: &AxisRotation, quad: &GaussQuadrature) -> f64 {
    let mut volume = 0.0;
    for &(mu, w_mu) in &quad.nodes {
        let theta = mu.acos();
        for &(phi_node, w_phi) in &quad.nodes {
            let phi = (phi_node + 1.0) * PI; // map [-1,1] -> [0, 2pi]
            let dir = Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            let rho = rotated_radius(template, rotation, dir).max(0.0);
            volume += w_mu * w_phi * rho.powi(3);
        }
    }
    // d(cos theta) integrates the polar angle directly; phi was rescaled by PI.
    volume * PI / 3.0
}

/// Iteratively rescales `template`'s coefficients so its quadrature-evaluated
/// volume matches `target_voxels`, within `max(4, 3% of target)` voxels,
/// capped at 2 iterations.
pub fn retarget_volume(
    template: &mut ShShape,
    rotation: &AxisRotation,
    quad: &GaussQuadrature,
    target_voxels: f64,
) {
    let tolerance = (4.0_f64).max(0.03 * target_voxels);
    for _ in 0..2 {
        let computed = sh_volume(template, rotation, quad);
        if (computed - target_voxels).abs() <= tolerance || computed <= 0.0 {
            break;
        }
        let factor = (target_voxels / computed).cbrt();
        template.scale(factor);
    }
}

/// Digitizes a sphere of the given radius (in voxels) by the classical
/// Bresenham-style in/out test against a target voxel count: every offset
/// whose distance from center is `<= radius` is included, diameter is
/// `ceil(2r)`.
pub fn digitize_sphere(radius_voxels: f64) -> Vec<VoxelOffset> {
    let half = radius_voxels.ceil() as i32;
    let mut voxels = Vec::new();
    for z in -half..=half {
        for y in -half..=half {
            for x in -half..=half {
                let d2 = (x as f64 + 0.5).powi(2) + (y as f64 + 0.5).powi(2) + (z as f64 + 0.5).powi(2);
                if d2 <= radius_voxels * radius_voxels {
                    voxels.push((x, y, z));
                }
            }
        }
    }
    voxels
}

/// Digitizes a real-shape template into bounding-box-relative voxel offsets
/// by testing `|offset| <= rho(theta,phi)` at the offset's direction, then
/// surgically flips boundary voxels ([`adjust_volume`]) until the count
/// matches `target_voxels` exactly.
pub fn digitize_real_shape<Rn: Rng>(
    template: &ShShape,
    rotation: &AxisRotation,
    bbox_half_extent: i32,
    target_voxels: usize,
    rng: &mut Rn,
) -> Vec<VoxelOffset> {
    let mut voxels = Vec::new();
    for z in -bbox_half_extent..=bbox_half_extent {
        for y in -bbox_half_extent..=bbox_half_extent {
            for x in -bbox_half_extent..=bbox_half_extent {
                let v = Vector3::new(x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5);
                let r = v.norm();
                if r < 1e-9 {
                    voxels.push((x, y, z));
                    continue;
                }
                let rho = rotated_radius(template, rotation, v / r);
                if r <= rho.max(0.0) {
                    voxels.push((x, y, z));
                }
            }
        }
    }
    adjust_volume(voxels, target_voxels, bbox_half_extent, rng)
}

/// Flips surface voxels (picked from the 6-neighbor-defined surface set) in
/// or out of the shape until `voxels.len() == target` exactly.
fn adjust_volume<Rn: Rng>(
    mut voxels: Vec<VoxelOffset>,
    target: usize,
    bbox_half_extent: i32,
    rng: &mut Rn,
) -> Vec<VoxelOffset> {
    use std::collections::HashSet;
    let mut occupied: HashSet<VoxelOffset> = voxels.iter().copied().collect();

    while occupied.len() != target {
        if occupied.len() > target {
            // Remove a random surface voxel: one with at least one 6-neighbor
            // outside the shape.
            let surface: Vec<VoxelOffset> = occupied
                .iter()
                .copied()
                .filter(|&(x, y, z)| {
                    crate::grid::neighborhood::OFFSETS_6
                        .iter()
                        .any(|(dx, dy, dz)| !occupied.contains(&(x + *dx as i32, y + *dy as i32, z + *dz as i32)))
                })
                .collect();
            if surface.is_empty() {
                break;
            }
            let pick = surface[rng.gen_range(0..surface.len())];
            occupied.remove(&pick);
        } else {
            // Add a random voxel adjacent to the current surface, staying
            // inside the bounding box.
            let candidates: Vec<VoxelOffset> = occupied
                .iter()
                .flat_map(|&(x, y, z)| {
                    crate::grid::neighborhood::OFFSETS_6
                        .iter()
                        .map(move |(dx, dy, dz)| (x + *dx as i32, y + *dy as i32, z + *dz as i32))
                })
                .filter(|&(x, y, z)| {
                    x.abs() <= bbox_half_extent
                        && y.abs() <= bbox_half_extent
                        && z.abs() <= bbox_half_extent
                        && !occupied.contains(&(x, y, z))
                })
                .collect();
            if candidates.is_empty() {
                break;
            }
            let pick = candidates[rng.gen_range(0..candidates.len())];
            occupied.insert(pick);
        }
    }

    voxels.clear();
    voxels.extend(occupied);
    voxels
}

impl ParticleShape {
    /// Produces the bounding-box-relative voxel offsets for this shape at
    /// the given target voxel count.
    pub fn digitize<Rn: Rng>(&self, target_voxels: usize, rng: &mut Rn) -> Vec<VoxelOffset> {
        match self {
            ParticleShape::Sphere { radius_voxels } => digitize_sphere(*radius_voxels),
            ParticleShape::RealShape { template, rotation } => {
                let half = (target_voxels as f64).cbrt().ceil() as i32 + 2;
                digitize_real_shape(template, rotation, half, target_voxels, rng)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_digitization_is_roughly_right_volume() {
        let radius = 5.0;
        let voxels = digitize_sphere(radius);
        let expected = 4.0 / 3.0 * PI * radius.powi(3);
        let actual = voxels.len() as f64;
        assert!((actual - expected).abs() / expected < 0.2);
    }

    #[test]
    fn identity_rotation_preserves_radius() {
        let mut coeffs = vec![vec![Complex64::new(0.0, 0.0); 1]; NNN + 1];
        coeffs[0] = vec![Complex64::new(5.0 * (4.0 * PI).sqrt(), 0.0)];
        let shape = ShShape { coeffs };
        let rotation = AxisRotation::identity();
        let r = rotated_radius(&shape, &rotation, Vector3::new(0.0, 0.0, 1.0));
        assert!((r - 5.0).abs() < 1e-6);
    }
}
