//! Two-state occupancy model: colonization (gamma) and extinction (epsilon).

use super::{par, prevalence, StateMap, StateTag};
use stm_common::{ParMap, ParName};

pub const ABSENT: StateTag = StateTag::new('0');
pub const PRESENT: StateTag = StateTag::new('1');

pub const ALPHABET: [StateTag; 2] = [ABSENT, PRESENT];

/// Logit-scale colonization and extinction rates at one environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub gamma: f64,
    pub epsilon: f64,
}

pub fn required_parameters(cubic: bool) -> Vec<ParName> {
    let order = if cubic { 7 } else { 5 };
    let mut names = Vec::with_capacity(2 * order);
    for prefix in ["g", "e"] {
        for i in 0..order {
            names.push(format!("{prefix}{i}"));
        }
    }
    names
}

pub fn logit_rates(p: &ParMap, env1: f64, env2: f64, cubic: bool) -> Rates {
    Rates {
        gamma: poly(p, "g", env1, env2, cubic),
        epsilon: poly(p, "e", env1, env2, cubic),
    }
}

fn poly(p: &ParMap, prefix: &str, e1: f64, e2: f64, cubic: bool) -> f64 {
    let c = |i: usize| par(p, &format!("{prefix}{i}"));
    let mut v = c(0) + c(1) * e1 + c(2) * e2 + c(3) * e1.powi(2) + c(4) * e2.powi(2);
    if cubic {
        v += c(5) * e1.powi(3) + c(6) * e2.powi(3);
    }
    v
}

pub fn transition_prob(from: StateTag, to: StateTag, r: &Rates, expected: &StateMap) -> f64 {
    let e1 = prevalence(expected, PRESENT);
    match (from, to) {
        (ABSENT, PRESENT) => r.gamma * e1,
        (ABSENT, ABSENT) => 1.0 - r.gamma * e1,
        (PRESENT, ABSENT) => r.epsilon,
        (PRESENT, PRESENT) => 1.0 - r.epsilon,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn expected(present: f64) -> StateMap {
        StateMap::from([(ABSENT, 1.0 - present), (PRESENT, present)])
    }

    #[test]
    fn known_probabilities() {
        let r = Rates { gamma: 0.5, epsilon: 0.1 };
        let e = expected(0.4);
        assert_relative_eq!(transition_prob(ABSENT, PRESENT, &r, &e), 0.2, epsilon = 1e-12);
        assert_relative_eq!(transition_prob(ABSENT, ABSENT, &r, &e), 0.8, epsilon = 1e-12);
        assert_relative_eq!(transition_prob(PRESENT, ABSENT, &r, &e), 0.1, epsilon = 1e-12);
        assert_relative_eq!(transition_prob(PRESENT, PRESENT, &r, &e), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn rows_sum_to_one() {
        for gamma in [0.0, 0.3, 0.99] {
            for eps in [0.0, 0.05, 1.0] {
                for prev in [0.0, 0.4, 1.0] {
                    let r = Rates { gamma, epsilon: eps };
                    let e = expected(prev);
                    for from in ALPHABET {
                        let row: f64 = ALPHABET
                            .iter()
                            .map(|&to| transition_prob(from, to, &r, &e))
                            .sum();
                        assert_relative_eq!(row, 1.0, epsilon = 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn quadratic_polynomial() {
        let p = ParMap::from([
            ("g0".into(), 0.5),
            ("g1".into(), 1.0),
            ("g2".into(), -1.0),
            ("g3".into(), 0.25),
            ("g4".into(), 2.0),
            ("e0".into(), 0.0),
            ("e1".into(), 0.0),
            ("e2".into(), 0.0),
            ("e3".into(), 0.0),
            ("e4".into(), 0.0),
        ]);
        let r = logit_rates(&p, 2.0, 3.0, false);
        // 0.5 + 2 - 3 + 0.25*4 + 2*9
        assert_relative_eq!(r.gamma, 18.5, epsilon = 1e-12);
        assert_relative_eq!(r.epsilon, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn cubic_terms_only_when_enabled() {
        let mut p = ParMap::new();
        for name in required_parameters(true) {
            p.insert(name, 0.0);
        }
        p.insert("g0".into(), 1.0);
        p.insert("g5".into(), 1.0);
        let quadratic = logit_rates(&p, 2.0, 0.0, false);
        let cubic = logit_rates(&p, 2.0, 0.0, true);
        assert_relative_eq!(quadratic.gamma, 1.0, epsilon = 1e-12);
        assert_relative_eq!(cubic.gamma, 9.0, epsilon = 1e-12);
    }
}
