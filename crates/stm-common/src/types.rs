//! Vocabulary types shared across the workspace.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter name as it appears in the parameter file.
pub type ParName = String;

/// Parameter value on whatever scale the model defines.
pub type ParValue = f64;

/// Name-keyed parameter map. Ordered so serialization is deterministic;
/// the authoritative output ordering is always the parameter list, not this
/// map's key order.
pub type ParMap = BTreeMap<ParName, ParValue>;

/// How loud the engine is on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputLevel {
    /// Print nothing.
    Quiet = 0,
    /// Status messages only.
    Normal = 1,
    /// Acceptance tables during adaptation.
    Talkative = 2,
    /// Log-likelihood for each batch.
    Verbose = 3,
    /// Full parameter values while sampling.
    ExtraVerbose = 4,
}

impl OutputLevel {
    pub fn from_int(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Quiet),
            1 => Some(Self::Normal),
            2 => Some(Self::Talkative),
            3 => Some(Self::Verbose),
            4 => Some(Self::ExtraVerbose),
            _ => None,
        }
    }

    pub fn as_int(self) -> i64 {
        self as i64
    }
}

/// Where the expected state prevalences come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PrevalenceModel {
    /// Use the observed per-plot prevalences from the transition file.
    #[default]
    Empirical,
    /// Reserved for self-consistent model prevalence; behaves as Empirical.
    Stm,
    /// Collapse every expected prevalence to 1.0.
    Global,
}

impl PrevalenceModel {
    pub fn from_int(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Empirical),
            1 => Some(Self::Stm),
            2 => Some(Self::Global),
            _ => None,
        }
    }

    pub fn as_int(self) -> i64 {
        match self {
            Self::Empirical => 0,
            Self::Stm => 1,
            Self::Global => 2,
        }
    }
}

/// Prior family for a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorFamily {
    Normal,
    Cauchy,
}

impl PriorFamily {
    pub fn from_int(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Normal),
            1 => Some(Self::Cauchy),
            _ => None,
        }
    }

    pub fn as_int(self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::Cauchy => 1,
        }
    }

    /// Parse the `priorDist` column of the parameter file.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Normal" => Some(Self::Normal),
            "Cauchy" => Some(Self::Cauchy),
            _ => None,
        }
    }
}

/// Prior distribution for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorDist {
    pub mean: f64,
    pub sd: f64,
    pub family: PriorFamily,
}

impl PriorDist {
    pub fn new(mean: f64, sd: f64, family: PriorFamily) -> Self {
        Self { mean, sd, family }
    }
}
