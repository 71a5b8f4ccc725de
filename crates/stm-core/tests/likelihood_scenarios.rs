//! End-to-end likelihood checks against hand-computed values.

use approx::assert_relative_eq;
use std::collections::BTreeMap;
use stm_common::{ParMap, ParName, PrevalenceModel, PriorDist, PriorFamily};
use stm_core::model::{ModelVariant, StateTag, TransitionModel};
use stm_core::{Likelihood, Transition};

fn two_state() -> TransitionModel {
    TransitionModel::new(ModelVariant::TwoState { cubic: false })
}

fn expected(present: f64) -> BTreeMap<StateTag, f64> {
    BTreeMap::from([
        (StateTag::new('0'), 1.0 - present),
        (StateTag::new('1'), present),
    ])
}

fn params(entries: &[(&str, f64)]) -> ParMap {
    let mut p: ParMap = two_state()
        .required_parameters()
        .into_iter()
        .map(|n| (n, 0.0))
        .collect();
    for (name, value) in entries {
        p.insert(name.to_string(), *value);
    }
    p
}

fn wide_priors() -> BTreeMap<ParName, PriorDist> {
    two_state()
        .required_parameters()
        .into_iter()
        .map(|n| (n, PriorDist::new(0.0, 10.0, PriorFamily::Normal)))
        .collect()
}

#[test]
fn single_transition_log_likelihood_is_ln_quarter() {
    let model = two_state();
    let transition = Transition::new(
        &model,
        '0',
        '1',
        0.0,
        0.0,
        expected(0.5),
        1,
        PrevalenceModel::Empirical,
    )
    .unwrap();
    let mut likelihood = Likelihood::new(
        model,
        vec![transition],
        "trans.csv",
        wide_priors(),
        2,
        1,
        PrevalenceModel::Empirical,
    )
    .unwrap();

    // All-zero gamma coefficients give gamma = inv_logit(0) = 0.5, and the
    // plot has prevalence 0.5, so P(0 -> 1) = 0.25.
    let ll = likelihood.log_likelihood(&params(&[("e0", -5.0)]));
    assert_relative_eq!(ll, -1.386_294_361_119_890_6, epsilon = 1e-9);
}

#[test]
fn transition_probabilities_at_simple_rates() {
    let model = two_state();
    // logit(0.1) as the extinction intercept, logit stays 0 for gamma
    let p = params(&[("e0", (0.1f64 / 0.9f64).ln())]);
    let e = expected(0.4);
    let check = |initial: char, final_state: char, want: f64| {
        let t = Transition::new(
            &model,
            initial,
            final_state,
            0.0,
            0.0,
            e.clone(),
            1,
            PrevalenceModel::Empirical,
        )
        .unwrap();
        assert_relative_eq!(t.prob(&model, &p, 1), want, epsilon = 1e-12);
    };
    check('0', '1', 0.2);
    check('0', '0', 0.8);
    check('1', '0', 0.1);
    check('1', '1', 0.9);
}

#[test]
fn standard_normal_prior_log_densities() {
    let mut priors = BTreeMap::new();
    priors.insert("p".to_string(), PriorDist::new(0.0, 1.0, PriorFamily::Normal));
    let likelihood = Likelihood::new(
        two_state(),
        vec![],
        "trans.csv",
        priors,
        1,
        1,
        PrevalenceModel::Empirical,
    )
    .unwrap();
    assert_relative_eq!(likelihood.log_prior("p", 0.0).unwrap(), -0.918_938_5, epsilon = 1e-6);
    assert_relative_eq!(likelihood.log_prior("p", 1.0).unwrap(), -1.418_938_5, epsilon = 1e-6);
}

#[test]
fn cauchy_prior_matches_closed_form() {
    let mut priors = BTreeMap::new();
    priors.insert("p".to_string(), PriorDist::new(1.0, 2.0, PriorFamily::Cauchy));
    let likelihood = Likelihood::new(
        two_state(),
        vec![],
        "trans.csv",
        priors,
        1,
        1,
        PrevalenceModel::Empirical,
    )
    .unwrap();
    // pdf(x) = 1 / (pi * s * (1 + ((x - m)/s)^2)); at x = m it is 1/(pi*s)
    let at_mode = likelihood.log_prior("p", 1.0).unwrap();
    assert_relative_eq!(at_mode, -(std::f64::consts::PI * 2.0).ln(), epsilon = 1e-12);
}

#[test]
fn four_state_rows_sum_to_one_through_the_full_pipeline() {
    let model = TransitionModel::new(ModelVariant::FourState);
    let mut p = ParMap::new();
    for name in model.required_parameters() {
        p.insert(name.clone(), 0.0);
    }
    // Pull the rate intercepts into sensible ranges.
    p.insert("ab0".into(), -1.0);
    p.insert("at0".into(), -1.2);
    p.insert("bb0".into(), -2.0);
    p.insert("bt0".into(), -1.8);
    p.insert("th0".into(), -0.5);
    p.insert("tt0".into(), 0.2);
    p.insert("e0".into(), -3.0);

    let expected = BTreeMap::from([
        (StateTag::new('T'), 0.3),
        (StateTag::new('B'), 0.2),
        (StateTag::new('M'), 0.4),
        (StateTag::new('R'), 0.1),
    ]);

    for initial in ['T', 'B', 'M', 'R'] {
        let mut row = 0.0;
        for final_state in ['T', 'B', 'M', 'R'] {
            if !model.valid_pair(StateTag::new(initial), StateTag::new(final_state)) {
                continue;
            }
            let t = Transition::new(
                &model,
                initial,
                final_state,
                0.5,
                -0.5,
                expected.clone(),
                5,
                PrevalenceModel::Empirical,
            )
            .unwrap();
            row += t.prob(&model, &p, 1);
        }
        assert_relative_eq!(row, 1.0, epsilon = 1e-12);
    }
}
