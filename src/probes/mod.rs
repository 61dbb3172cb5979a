//! Pore-size distribution and desiccation probes: both follow the shared
//! "rank voxels by a structural criterion, then mutate" pattern.

pub mod dryout;
pub mod poredist;

pub use dryout::{dry_out, DryoutReport};
pub use poredist::{poredist, PoreDistRow};
