//! One observed plot transition.

use crate::model::{Rates, StateMap, StateTag, TransitionModel};
use stm_common::{Error, ParMap, PrevalenceModel, Result};
use stm_math::{interval_rescale, inv_logit};

/// A single observation: a plot seen in `initial` state, then `interval`
/// years later in `final` state, with its environment and the expected
/// prevalence of every state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    initial: StateTag,
    final_state: StateTag,
    env1: f64,
    env2: f64,
    expected: StateMap,
    interval: u32,
}

impl Transition {
    /// Validate and build one observation.
    ///
    /// Fails if either state is outside the model alphabet, the pair has no
    /// probability defined, the interval is zero, or the prevalence map does
    /// not cover the alphabet. Under [`PrevalenceModel::Global`] every
    /// expected entry collapses to 1.0 here, at construction.
    pub fn new(
        model: &TransitionModel,
        initial: char,
        final_state: char,
        env1: f64,
        env2: f64,
        expected: StateMap,
        interval: u32,
        prevalence_model: PrevalenceModel,
    ) -> Result<Self> {
        let initial = model.state(initial)?;
        let final_state = model.state(final_state)?;
        if !model.valid_pair(initial, final_state) {
            return Err(Error::InvalidTransition(format!(
                "no transition defined for {initial} -> {final_state}"
            )));
        }
        if interval < 1 {
            return Err(Error::InvalidTransition(format!(
                "interval must be at least 1, got {interval}"
            )));
        }
        let mut expected = expected;
        for &state in model.alphabet() {
            if !expected.contains_key(&state) {
                return Err(Error::InvalidTransition(format!(
                    "missing expected prevalence for state {state}"
                )));
            }
        }
        if prevalence_model == PrevalenceModel::Global {
            for value in expected.values_mut() {
                *value = 1.0;
            }
        }
        Ok(Self { initial, final_state, env1, env2, expected, interval })
    }

    pub fn initial(&self) -> StateTag {
        self.initial
    }

    pub fn final_state(&self) -> StateTag {
        self.final_state
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Probability of the observed final state given the parameters.
    ///
    /// The logit-scale rates are evaluated at this plot's environment,
    /// mapped through the inverse logit, rescaled from the fitted
    /// `target_interval` to this observation's interval, and fed to the
    /// model's probability table.
    pub fn prob(&self, model: &TransitionModel, params: &ParMap, target_interval: u32) -> f64 {
        let rates = self.interval_rates(model, params, target_interval);
        model.transition_prob(self.initial, self.final_state, &rates, &self.expected)
    }

    fn interval_rates(&self, model: &TransitionModel, params: &ParMap, target: u32) -> Rates {
        model
            .logit_rates(params, self.env1, self.env2)
            .map(|logit| interval_rescale(inv_logit(logit), self.interval, target))
    }
}
