//! The placed-particle record.

use crate::phase::PhaseId;

/// A single placed aggregate particle.
#[derive(Clone, Debug)]
pub struct Particle {
    pub id: u32,
    pub phase: PhaseId,
    /// Bounding-box center, in absolute grid coordinates.
    pub center: (i64, i64, i64),
    /// Bounding-box half-extents.
    pub extent: (i64, i64, i64),
    /// Every voxel owned by this particle, in absolute grid coordinates.
    pub voxels: Vec<(i64, i64, i64)>,
    /// Subset of `voxels` that is solid and adjacent to a non-aggregate voxel.
    pub periph: Vec<(i64, i64, i64)>,
    /// Index into `voxels` of the voxel with minimal `z` (ties broken by
    /// first occurrence), used by the settler.
    pub minz_vox: usize,
    pub settled: bool,
}

impl Particle {
    pub fn minz(&self) -> i64 {
        self.voxels[self.minz_vox].2
    }

    /// Recomputes `minz_vox` and `periph` after voxels move (placement or
    /// settling).
    pub fn recompute_derived<F>(&mut self, mut is_aggregate_neighbor_missing: F)
    where
        F: FnMut((i64, i64, i64)) -> bool,
    {
        self.minz_vox = self
            .voxels
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.2)
            .map(|(i, _)| i)
            .unwrap_or(0);

        self.periph = self
            .voxels
            .iter()
            .copied()
            .filter(|&v| is_aggregate_neighbor_missing(v))
            .collect();
    }
}
