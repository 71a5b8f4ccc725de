//! Model variants: state alphabets, logit-scale rate polynomials, and the
//! transition-probability table.
//!
//! The original formulation stored per-pair probability closures in a nested
//! map keyed by state; here the table is a match over `(initial, final)` so
//! dispatch stays branch-predictable and invalid pairs are rejected once, at
//! transition construction.

pub mod four_state;
pub mod two_state;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use stm_common::{Error, ParMap, ParName, Result};

/// One symbol from the model's state alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateTag(char);

impl StateTag {
    pub const fn new(c: char) -> Self {
        Self(c)
    }

    pub const fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Expected prevalence of each state in a plot.
pub type StateMap = BTreeMap<StateTag, f64>;

/// Which model the run fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    /// Absent/present occupancy model; the cubic flag adds the env^3 terms
    /// to the rate polynomials.
    TwoState { cubic: bool },
    /// Temperate / boreal / mixed / regenerating landscape model.
    FourState,
}

/// Logit-scale rates evaluated at one observation's environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rates {
    Two(two_state::Rates),
    Four(four_state::Rates),
}

impl Rates {
    /// Apply a scalar transform to every rate (logit -> probability,
    /// interval rescaling).
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            Rates::Two(r) => Rates::Two(two_state::Rates {
                gamma: f(r.gamma),
                epsilon: f(r.epsilon),
            }),
            Rates::Four(r) => Rates::Four(four_state::Rates {
                alpha_b: f(r.alpha_b),
                alpha_t: f(r.alpha_t),
                beta_b: f(r.beta_b),
                beta_t: f(r.beta_t),
                theta: f(r.theta),
                theta_t: f(r.theta_t),
                epsilon: f(r.epsilon),
            }),
        }
    }
}

/// A selected model variant: alphabet, rate polynomials, probability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionModel {
    variant: ModelVariant,
}

impl TransitionModel {
    pub fn new(variant: ModelVariant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// The ordered state alphabet of this variant.
    pub fn alphabet(&self) -> &'static [StateTag] {
        match self.variant {
            ModelVariant::TwoState { .. } => &two_state::ALPHABET,
            ModelVariant::FourState => &four_state::ALPHABET,
        }
    }

    /// Validate a state character against the alphabet.
    pub fn state(&self, c: char) -> Result<StateTag> {
        let tag = StateTag::new(c);
        if self.alphabet().contains(&tag) {
            Ok(tag)
        } else {
            Err(Error::InvalidTransition(format!("unknown state `{c}`")))
        }
    }

    /// Whether the probability table defines the `(from, to)` pair.
    pub fn valid_pair(&self, from: StateTag, to: StateTag) -> bool {
        if !self.alphabet().contains(&from) || !self.alphabet().contains(&to) {
            return false;
        }
        match self.variant {
            ModelVariant::TwoState { .. } => true,
            ModelVariant::FourState => four_state::valid_pair(from, to),
        }
    }

    /// Every parameter name the rate polynomials read.
    pub fn required_parameters(&self) -> Vec<ParName> {
        match self.variant {
            ModelVariant::TwoState { cubic } => two_state::required_parameters(cubic),
            ModelVariant::FourState => four_state::required_parameters(),
        }
    }

    /// Evaluate the logit-scale rate polynomials at one environment.
    pub fn logit_rates(&self, p: &ParMap, env1: f64, env2: f64) -> Rates {
        match self.variant {
            ModelVariant::TwoState { cubic } => {
                Rates::Two(two_state::logit_rates(p, env1, env2, cubic))
            }
            ModelVariant::FourState => Rates::Four(four_state::logit_rates(p, env1, env2)),
        }
    }

    /// Probability of `from -> to` given interval-rescaled rates and the
    /// plot's expected prevalences. NaN for pairs the table does not define.
    pub fn transition_prob(
        &self,
        from: StateTag,
        to: StateTag,
        rates: &Rates,
        expected: &StateMap,
    ) -> f64 {
        match rates {
            Rates::Two(r) => two_state::transition_prob(from, to, r, expected),
            Rates::Four(r) => four_state::transition_prob(from, to, r, expected),
        }
    }
}

/// Parameter lookup for polynomial evaluation. Completeness is checked when
/// the likelihood is built, so a miss here means an internal inconsistency;
/// NaN lets it surface through the likelihood self-check rather than a panic.
fn par(p: &ParMap, name: &str) -> f64 {
    p.get(name).copied().unwrap_or(f64::NAN)
}

/// Prevalence lookup; transitions are constructed with a complete map.
fn prevalence(e: &StateMap, s: StateTag) -> f64 {
    e.get(&s).copied().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabets() {
        let two = TransitionModel::new(ModelVariant::TwoState { cubic: false });
        assert_eq!(
            two.alphabet().iter().map(|s| s.as_char()).collect::<String>(),
            "01"
        );
        let four = TransitionModel::new(ModelVariant::FourState);
        assert_eq!(
            four.alphabet().iter().map(|s| s.as_char()).collect::<String>(),
            "TBMR"
        );
    }

    #[test]
    fn state_validation() {
        let four = TransitionModel::new(ModelVariant::FourState);
        assert!(four.state('T').is_ok());
        assert!(four.state('0').is_err());

        let two = TransitionModel::new(ModelVariant::TwoState { cubic: false });
        assert!(two.state('1').is_ok());
        assert!(two.state('B').is_err());
    }

    #[test]
    fn direct_boreal_temperate_swaps_are_invalid() {
        let four = TransitionModel::new(ModelVariant::FourState);
        let t = StateTag::new('T');
        let b = StateTag::new('B');
        assert!(!four.valid_pair(t, b));
        assert!(!four.valid_pair(b, t));
        assert!(four.valid_pair(t, t));
        assert!(four.valid_pair(b, StateTag::new('M')));
    }

    #[test]
    fn two_state_pairs_are_all_valid() {
        let two = TransitionModel::new(ModelVariant::TwoState { cubic: true });
        for &a in two.alphabet() {
            for &b in two.alphabet() {
                assert!(two.valid_pair(a, b));
            }
        }
    }

    #[test]
    fn required_parameters_match_variant() {
        let two = TransitionModel::new(ModelVariant::TwoState { cubic: false });
        assert_eq!(two.required_parameters().len(), 10);
        let two_cubic = TransitionModel::new(ModelVariant::TwoState { cubic: true });
        assert_eq!(two_cubic.required_parameters().len(), 14);
        let four = TransitionModel::new(ModelVariant::FourState);
        assert_eq!(four.required_parameters().len(), 49);
    }

    #[test]
    fn missing_parameter_becomes_nan() {
        let two = TransitionModel::new(ModelVariant::TwoState { cubic: false });
        let rates = two.logit_rates(&ParMap::new(), 0.0, 0.0);
        match rates {
            Rates::Two(r) => {
                assert!(r.gamma.is_nan());
                assert!(r.epsilon.is_nan());
            }
            Rates::Four(_) => unreachable!(),
        }
    }
}
