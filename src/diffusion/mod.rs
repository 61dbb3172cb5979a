//! Sulfate-attack diffusion/reaction engine: many-walker random walk with
//! reaction kinetics, product precipitation, strain accounting.

pub mod engine;
pub mod layer;
pub mod reaction;
pub mod walker;

pub use engine::{DiffusionConfig, DiffusionEngine};
