//! Shared vocabulary types and the unified error for the sampler workspace.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
