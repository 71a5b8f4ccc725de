//! Four-state landscape model: temperate (T), boreal (B), mixed (M), and
//! regenerating (R) forest states.
//!
//! Direct B<->T transitions are not part of the model; a stand must pass
//! through the mixed state.

use super::{par, prevalence, StateMap, StateTag};
use stm_common::{ParMap, ParName};

pub const T: StateTag = StateTag::new('T');
pub const B: StateTag = StateTag::new('B');
pub const M: StateTag = StateTag::new('M');
pub const R: StateTag = StateTag::new('R');

pub const ALPHABET: [StateTag; 4] = [T, B, M, R];

const PREFIXES: [&str; 7] = ["ab", "at", "bb", "bt", "th", "tt", "e"];

/// Logit-scale rates at one environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub alpha_b: f64,
    pub alpha_t: f64,
    pub beta_b: f64,
    pub beta_t: f64,
    pub theta: f64,
    pub theta_t: f64,
    pub epsilon: f64,
}

pub fn valid_pair(from: StateTag, to: StateTag) -> bool {
    !matches!((from, to), (T, B) | (B, T))
}

pub fn required_parameters() -> Vec<ParName> {
    let mut names = Vec::with_capacity(PREFIXES.len() * 7);
    for prefix in PREFIXES {
        for i in 0..7 {
            names.push(format!("{prefix}{i}"));
        }
    }
    names
}

pub fn logit_rates(p: &ParMap, env1: f64, env2: f64) -> Rates {
    Rates {
        alpha_b: poly(p, "ab", env1, env2),
        alpha_t: poly(p, "at", env1, env2),
        beta_b: poly(p, "bb", env1, env2),
        beta_t: poly(p, "bt", env1, env2),
        theta: poly(p, "th", env1, env2),
        theta_t: poly(p, "tt", env1, env2),
        epsilon: poly(p, "e", env1, env2),
    }
}

fn poly(p: &ParMap, prefix: &str, e1: f64, e2: f64) -> f64 {
    let c = |i: usize| par(p, &format!("{prefix}{i}"));
    c(0) + c(1) * e1
        + c(2) * e2
        + c(3) * e1.powi(2)
        + c(4) * e2.powi(2)
        + c(5) * e1.powi(3)
        + c(6) * e2.powi(3)
}

pub fn transition_prob(from: StateTag, to: StateTag, r: &Rates, expected: &StateMap) -> f64 {
    let et = prevalence(expected, T);
    let eb = prevalence(expected, B);
    let em = prevalence(expected, M);
    let eps = r.epsilon;

    let t_to_m = r.beta_b * (eb + em) * (1.0 - eps);
    let b_to_m = r.beta_t * (et + em) * (1.0 - eps);
    let m_to_t = r.theta * r.theta_t * (1.0 - eps);
    let m_to_b = r.theta * (1.0 - r.theta_t) * (1.0 - eps);
    let r_to_t = r.alpha_t * (em + et) * (1.0 - r.alpha_b * (eb + em));
    let r_to_b = r.alpha_b * (em + eb) * (1.0 - r.alpha_t * (et + em));
    let r_to_m = r.alpha_b * (em + eb) * (r.alpha_t * (em + et));

    match (from, to) {
        (T, R) | (B, R) | (M, R) => eps,
        (T, M) => t_to_m,
        (T, T) => 1.0 - eps - t_to_m,
        (B, M) => b_to_m,
        (B, B) => 1.0 - eps - b_to_m,
        (M, T) => m_to_t,
        (M, B) => m_to_b,
        (M, M) => 1.0 - m_to_t - m_to_b - eps,
        (R, T) => r_to_t,
        (R, B) => r_to_b,
        (R, M) => r_to_m,
        (R, R) => 1.0 - r_to_t - r_to_b - r_to_m,
        _ => f64::NAN,
    }
}
