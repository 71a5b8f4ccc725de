//! Core of the state-transition model sampler.
//!
//! The pieces, bottom up: [`model`] defines the state alphabets and the
//! transition-probability tables for the two model variants; [`transition`]
//! is one observed plot transition; [`parameters`] is the sampler's view of
//! the parameter vector; [`likelihood`] aggregates transition probabilities
//! and priors; [`engine`] is the adaptive componentwise Metropolis-Hastings
//! driver. [`input`] and [`output`] are the file surfaces on either side.

pub mod engine;
pub mod input;
pub mod likelihood;
pub mod logging;
pub mod model;
pub mod output;
pub mod parameters;
pub mod transition;

pub use engine::{EngineSettings, Metropolis};
pub use likelihood::Likelihood;
pub use model::{ModelVariant, StateTag, TransitionModel};
pub use output::{OutputKey, OutputMethod, OutputOptions, OutputQueue, OutputRecord, OutputWorker};
pub use parameters::{ParameterSettings, Parameters};
pub use transition::Transition;
