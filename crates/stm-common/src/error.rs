//! Unified error type for the sampler workspace.
//!
//! Construction-time problems (bad input schema, invalid transitions,
//! mismatched resume data, nonsense configuration) are fatal and surface
//! through this enum. Runtime numerical pathologies are absorbed locally by
//! the engine and likelihood and never appear here.

use thiserror::Error;

/// Result type alias for sampler operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A required column is missing or a field failed to parse.
    #[error("input schema error: {0}")]
    InputSchema(String),

    /// A transition references an unknown state or an impossible state pair.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Unknown parameter name or invalid parameter value.
    #[error("parameter error: {0}")]
    Parameter(String),

    /// The resume file was produced by an incompatible engine version.
    #[error("resume version mismatch: expected {expected}, found {found}")]
    ResumeVersionMismatch { expected: String, found: String },

    /// The resume file is structurally broken or missing required keys.
    #[error("corrupt resume data: {0}")]
    ResumeCorrupt(String),

    /// Settings that can never produce a valid run (e.g. thin < 1).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_are_stable() {
        let e = Error::InputSchema("missing column `name`".into());
        assert_eq!(e.to_string(), "input schema error: missing column `name`");

        let e = Error::ResumeVersionMismatch {
            expected: "Metropolis1.5".into(),
            found: "Metropolis1.4".into(),
        };
        assert_eq!(
            e.to_string(),
            "resume version mismatch: expected Metropolis1.5, found Metropolis1.4"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
