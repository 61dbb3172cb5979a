//! Typed error hierarchy.
//!
//! Each engine family gets a `thiserror`-derived enum. Fatal variants map to
//! "stop, no output file written"; Recoverable variants carry enough context
//! that the engine runner can log a warning and keep the partial result.
//! `VcctlError` aggregates all of them for call sites that don't care which
//! engine failed, with a catch-all `Unknown(anyhow::Error)` arm for errors
//! that don't belong to any single engine family.

use thiserror::Error as ThisError;

#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum GridError {
    #[error("grid: missing header key `{0}` after header was started")]
    MissingHeaderKey(&'static str),
    #[error("grid: failed to parse integer token `{token}` at voxel index {index}")]
    ParseFailure { token: String, index: usize },
    #[error("grid: declared {expected} voxels but stream had only {found}")]
    TooFewValues { expected: usize, found: usize },
    #[error("grid: phase id {0} is out of range after version remap")]
    OutOfRangePhaseId(u8),
    #[error("grid: declared dimensions {nx}x{ny}x{nz} overflow a usize voxel count")]
    DimensionOverflow { nx: i64, ny: i64, nz: i64 },
}

#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum PackingError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("packing: size class minimum radius {radius_um} um is below the grid resolution {resolution_um} um")]
    IrresolvableClass { radius_um: f64, resolution_um: f64 },
    #[error("packing: class could not be fully placed even after settling; {remaining_voxels} voxels deferred")]
    ClassPartiallyPlaced { remaining_voxels: u64 },
    #[error("packing: allocation of {0} voxel particle failed")]
    AllocationFailure(usize),
}

#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum DiffusionError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("diffusion: precipitation of product {product:?} found no void near ({x},{y},{z}); strain accumulated")]
    NoPrecipitationSite { product: crate::phase::PhaseId, x: i64, y: i64, z: i64 },
    #[error("diffusion: cycle budget {0} exhausted")]
    CycleBudgetExhausted(u32),
}

#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum FemError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("fem: phase {0:?} has zero stiffness (K=G=0) but non-zero volume fraction")]
    InvalidPhaseModuli(crate::phase::PhaseId),
    #[error("fem: conjugate gradient did not converge within {budget} iterations (gg/n = {residual:e})")]
    NotConverged { budget: u32, residual: f64 },
    #[error("fem: aggregate diameter {0} um is not positive")]
    InvalidAggregateDiameter(f64),
    #[error("fem: aggregate fraction {aggregate} + air fraction {air} leaves no room for the matrix")]
    InvalidVolumeFractions { aggregate: f64, air: f64 },
}

#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum ProbeError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("probe: requested removal of {ndesire} voxels but only {available} saturated pore voxels exist")]
    InsufficientPoreVoxels { ndesire: usize, available: usize },
}

#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum VcctlError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Packing(#[from] PackingError),
    #[error(transparent)]
    Diffusion(#[from] DiffusionError),
    #[error(transparent)]
    Fem(#[from] FemError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("unknown error")]
    Unknown(#[from] anyhow::Error),
}
