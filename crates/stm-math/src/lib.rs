//! Numerical primitives for the state-transition sampler.

pub mod density;
pub mod logistic;
pub mod regression;
pub mod running;

pub use density::*;
pub use logistic::*;
pub use regression::*;
pub use running::*;
