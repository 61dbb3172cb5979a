//! Shared 120-point Gauss-Legendre quadrature table, used by both the
//! spherical-harmonic digitizer and (via [`crate::fem::stiffness`]) as a
//! cross-check source of quadrature nodes.

use std::io::BufRead;

/// 120 `(x, w)` Gauss-Legendre nodes/weights on `[-1, 1]`.
#[derive(Clone, Debug)]
pub struct GaussQuadrature {
    pub nodes: Vec<(f64, f64)>,
}

impl GaussQuadrature {
    /// Parses the quadrature file format: 120 rows of `(xg, wg)`.
    pub fn read<R: BufRead>(reader: R) -> anyhow::Result<Self> {
        let mut nodes = Vec::with_capacity(120);
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut parts = trimmed.split_whitespace();
            let x: f64 = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing xg column"))?
                .parse()?;
            let w: f64 = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing wg column"))?
                .parse()?;
            nodes.push((x, w));
        }
        Ok(Self { nodes })
    }

    /// Computes a 120-point Gauss-Legendre table numerically (Newton
    /// iteration on the Legendre polynomial roots), for callers without a
    /// quadrature file on hand.
    pub fn generate(n: usize) -> Self {
        let mut nodes = Vec::with_capacity(n);
        let m = (n + 1) / 2;
        for i in 0..m {
            let mut x = ((std::f64::consts::PI * (i as f64 + 0.75)) / (n as f64 + 0.5)).cos();
            for _ in 0..100 {
                let (p, dp) = legendre_and_derivative(n, x);
                let dx = p / dp;
                x -= dx;
                if dx.abs() < 1e-14 {
                    break;
                }
            }
            let (_, dp) = legendre_and_derivative(n, x);
            let w = 2.0 / ((1.0 - x * x) * dp * dp);
            nodes.push((-x, w));
            nodes.push((x, w));
        }
        nodes.truncate(n);
        nodes.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        Self { nodes }
    }
}

fn legendre_and_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let p2 = ((2 * k - 1) as f64 * x * p1 - (k - 1) as f64 * p0) / k as f64;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_quadrature_integrates_polynomials_exactly() {
        let quad = GaussQuadrature::generate(20);
        assert_eq!(quad.nodes.len(), 20);
        // integral of x^2 over [-1,1] is 2/3
        let integral: f64 = quad.nodes.iter().map(|(x, w)| w * x * x).sum();
        assert!((integral - 2.0 / 3.0).abs() < 1e-10);
    }
}
