//! Small strategy objects consumed by the solvers: when to stop, how to keep the
//! parameter vector valid, and how to weight residuals.

pub mod convergence;
pub mod normalize;
pub mod robust;

pub use convergence::{Termination, TerminationCriteria};
pub use normalize::{NoNormalize, Normalize, UnitNormalize};
pub use robust::{CauchyWeight, HuberWeight, NoWeights, TukeyWeight, WeightFunction};
