//! Linear-elastic FEM solver and multi-scale moduli estimation.

pub mod concelas;
pub mod moduli;
pub mod solver;
pub mod stiffness;

pub use concelas::{estimate_concrete_moduli, AggregateClass, ConcreteEstimate, StrengthCorrelation};
pub use moduli::{average_moduli, EffectiveModuli, ItzLayerModuli, PhaseContribution};
pub use solver::{ElasticitySolver, MacroStrain, SolveOutcome};
pub use stiffness::PhaseModuli;
