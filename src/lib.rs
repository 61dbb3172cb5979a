//!
//! Voxel-based simulation engines for cement and concrete microstructure:
//! aggregate packing, sulfate-attack diffusion, linear-elastic FEM
//! homogenization, and pore-structure/drying probes, all operating on a
//! shared periodic 3-D phase grid. Entry points are [`packing::run_packing`],
//! [`diffusion::DiffusionEngine`], [`fem::ElasticitySolver`], and the
//! [`probes`] module functions.
//!

/// Re-export the version of nalgebra used by this crate.
pub use nalgebra;

#[cfg(feature = "profiling")]
use parking_lot::Mutex;
#[cfg(feature = "profiling")]
use std::collections::HashMap;
#[cfg(feature = "profiling")]
use std::time::Duration;

#[cfg(feature = "profiling")]
lazy_static::lazy_static! {
    /// Cumulative wall time per `profile!`-tagged section, keyed by label.
    /// Opt-in instrumentation for coarse engine-phase timing; not sampled,
    /// not exported anywhere, just accumulated for a caller to inspect.
    pub static ref PROFILE_TIMINGS: Mutex<HashMap<&'static str, Duration>> = Mutex::new(HashMap::new());
}

#[cfg(feature = "profiling")]
/// Times `$body` and accumulates the elapsed duration under `$label` in
/// [`PROFILE_TIMINGS`].
macro_rules! profile {
    ($label:expr, $body:expr) => {{
        let start = std::time::Instant::now();
        let result = $body;
        *crate::PROFILE_TIMINGS.lock().entry($label).or_insert(std::time::Duration::ZERO) += start.elapsed();
        result
    }};
}

#[cfg(not(feature = "profiling"))]
/// No-op when the `profiling` feature is disabled.
macro_rules! profile {
    ($label:expr, $body:expr) => {
        $body
    };
}

pub(crate) use profile;

pub mod diffusion;
pub mod error;
pub mod fem;
pub mod grid;
pub mod numeric;
pub mod packing;
pub mod phase;
pub mod probes;
pub mod quadrature;
pub mod stats;

pub use error::{DiffusionError, FemError, GridError, PackingError, ProbeError, VcctlError};
pub use grid::{wrap, Grid, PartIdGrid, PhaseGrid};
pub use numeric::{Index, Real, ThreadSafe};
pub use phase::{PhaseFlags, PhaseId, PhaseInfo};

// TODO: feature flag for multi-threaded diffusion walker moves.
// TODO: strongly-typed voxel/particle indices instead of raw usize/u32.

pub(crate) type HashState = fxhash::FxBuildHasher;
pub(crate) type MapType<K, V> = std::collections::HashMap<K, V, HashState>;
pub(crate) fn new_map<K, V>() -> MapType<K, V> {
    MapType::with_hasher(HashState::default())
}

#[cfg(feature = "parallel")]
pub(crate) type ParallelMapType<K, V> = dashmap::DashMap<K, V, HashState>;
