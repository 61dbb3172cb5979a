//! Size-class bookkeeping.

use crate::quadrature::GaussQuadrature;

/// One entry of a particle size distribution "source".
#[derive(Clone, Copy, Debug)]
pub struct SizeClass {
    pub volume_total_um3: f64,
    pub radius_min_um: f64,
    pub radius_max_um: f64,
}

impl SizeClass {
    /// Volume-weighted mean radius `r_bar = integral(r^4 dr) / integral(r^3 dr)`
    /// over `[radius_min, radius_max]`, via trapezoidal-rule integration.
    pub fn mean_radius(&self, steps: usize) -> f64 {
        let (a, b) = (self.radius_min_um, self.radius_max_um);
        let num = trapezoid(a, b, steps, |r| r.powi(4));
        let den = trapezoid(a, b, steps, |r| r.powi(3));
        if den.abs() < 1e-300 {
            0.5 * (a + b)
        } else {
            num / den
        }
    }

    /// Representative particle volume from the mean radius.
    pub fn representative_volume_um3(&self, steps: usize) -> f64 {
        let r = self.mean_radius(steps);
        4.0 / 3.0 * std::f64::consts::PI * r.powi(3)
    }

    /// Number of particles for this class given the per-particle voxel
    /// volume and current voxel volume in um^3: `floor(volumeTotal /
    /// voxelsPerParticle + 0.5)`, i.e. round-to-nearest.
    pub fn particle_count(&self, voxel_volume_um3: f64, steps: usize) -> u64 {
        let particle_volume_voxels = self.representative_volume_um3(steps) / voxel_volume_um3;
        if particle_volume_voxels <= 0.0 {
            return 0;
        }
        ((self.volume_total_um3 / voxel_volume_um3) / particle_volume_voxels + 0.5).floor() as u64
    }
}

fn trapezoid(a: f64, b: f64, steps: usize, f: impl Fn(f64) -> f64) -> f64 {
    let steps = steps.max(1);
    let h = (b - a) / steps as f64;
    let mut sum = 0.5 * (f(a) + f(b));
    for i in 1..steps {
        sum += f(a + i as f64 * h);
    }
    sum * h
}

/// Loads a three-column tab-separated aggregate grading file:
/// `(sieve label, opening diameter mm, retained fraction)`, with an optional
/// single header row.
pub fn read_grading_file<R: std::io::BufRead>(reader: R) -> anyhow::Result<Vec<(String, f64, f64)>> {
    let mut rows = Vec::new();
    let mut first = true;
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let cols: Vec<&str> = trimmed.split('\t').map(str::trim).collect();
        if cols.len() < 3 {
            first = false;
            continue;
        }
        match (cols[1].parse::<f64>(), cols[2].parse::<f64>()) {
            (Ok(diam), Ok(frac)) => rows.push((cols[0].to_string(), diam, frac)),
            _ if first => {
                // Header row: columns didn't parse as numbers, skip.
                first = false;
            }
            _ => return Err(anyhow::anyhow!("malformed grading row: {trimmed}")),
        }
        first = false;
    }
    Ok(rows)
}

/// A quadrature table shared by the real-shape digitizer (kept alongside
/// size-class helpers because both are consulted while sizing a class).
pub fn default_quadrature() -> GaussQuadrature {
    GaussQuadrature::generate(120)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_radius_of_degenerate_class_is_the_radius() {
        let class = SizeClass {
            volume_total_um3: 1.0,
            radius_min_um: 2.0,
            radius_max_um: 2.0,
        };
        assert!((class.mean_radius(4) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn particle_count_rounds_to_nearest() {
        let class = SizeClass {
            volume_total_um3: 6545.0,
            radius_min_um: 2.5,
            radius_max_um: 2.5,
        };
        let count = class.particle_count(1.0, 20);
        // single diameter-5 spheres: volume ~= 65.45 voxels each -> ~100 particles
        assert!((90..=110).contains(&count));
    }
}
