//! Logit-scale rate handling: inverse logit and transition-interval rescaling.

/// Inverse logit, computed on two branches so neither exponent can overflow.
///
/// For large positive inputs `exp(-x)` underflows harmlessly to 0; for large
/// negative inputs `exp(x)` does the same. Returns NaN for NaN input.
pub fn inv_logit(logit_val: f64) -> f64 {
    if logit_val > 0.0 {
        1.0 / (1.0 + (-logit_val).exp())
    } else {
        let e = logit_val.exp();
        e / (1.0 + e)
    }
}

/// Rescale a per-interval transition probability to a different interval.
///
/// `p` is the probability of the event over `target_interval` years; the
/// result is the probability over `interval` years, assuming independence
/// across sub-intervals: `1 - (1 - p)^(interval / target_interval)`.
pub fn interval_rescale(p: f64, interval: u32, target_interval: u32) -> f64 {
    let exponent = f64::from(interval) / f64::from(target_interval);
    1.0 - (1.0 - p).powf(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inv_logit_midpoint() {
        assert_relative_eq!(inv_logit(0.0), 0.5, max_relative = 1e-12);
    }

    #[test]
    fn inv_logit_symmetry() {
        for x in [0.1, 1.0, 3.7, 20.0] {
            assert_relative_eq!(inv_logit(x) + inv_logit(-x), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn inv_logit_extremes_do_not_overflow() {
        assert_eq!(inv_logit(1e4), 1.0);
        assert_eq!(inv_logit(-1e4), 0.0);
        assert!(inv_logit(f64::NAN).is_nan());
    }

    #[test]
    fn inv_logit_known_value() {
        // logit(0.1) = ln(1/9)
        assert_relative_eq!(inv_logit((0.1f64 / 0.9).ln()), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn rescale_identity_at_equal_intervals() {
        assert_relative_eq!(interval_rescale(0.3, 5, 5), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn rescale_compounds_over_longer_observation() {
        // Two independent 1-year trials at p = 0.5.
        assert_relative_eq!(interval_rescale(0.5, 2, 1), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn rescale_monotone_in_observation_interval() {
        let p = 0.1;
        let mut last = 0.0;
        for interval in 1..=40 {
            let r = interval_rescale(p, interval, 1);
            assert!(r >= last);
            last = r;
        }
    }

    #[test]
    fn rescale_preserves_bounds() {
        assert_eq!(interval_rescale(0.0, 10, 1), 0.0);
        assert_relative_eq!(interval_rescale(1.0, 10, 1), 1.0, epsilon = 1e-12);
    }
}
