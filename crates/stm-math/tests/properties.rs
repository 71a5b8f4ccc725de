//! Property-based tests for stm-math numerical functions.

use proptest::prelude::*;
use stm_math::{
    interval_rescale, inv_logit, log_cauchy_pdf, log_normal_pdf, weighted_mean, LinearFit,
    WeightedMean,
};

const TOL: f64 = 1e-10;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return false;
    }
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// inv_logit maps all of R into (0, 1) and is monotone.
    #[test]
    fn inv_logit_range_and_monotone(a in -700.0..700.0f64, b in -700.0..700.0f64) {
        let pa = inv_logit(a);
        let pb = inv_logit(b);
        prop_assert!((0.0..=1.0).contains(&pa));
        prop_assert!((0.0..=1.0).contains(&pb));
        if a < b {
            prop_assert!(pa <= pb);
        }
    }

    /// inv_logit(x) + inv_logit(-x) = 1.
    #[test]
    fn inv_logit_complement(x in -100.0..100.0f64) {
        prop_assert!(approx_eq(inv_logit(x) + inv_logit(-x), 1.0, TOL));
    }

    /// Rescaling keeps probabilities in [0, 1].
    #[test]
    fn rescale_stays_in_unit_interval(p in 0.0..1.0f64, interval in 1u32..200, target in 1u32..50) {
        let r = interval_rescale(p, interval, target);
        prop_assert!((0.0..=1.0).contains(&r), "rescale({p},{interval},{target})={r}");
    }

    /// A longer observation interval never makes the event less likely.
    #[test]
    fn rescale_monotone_in_interval(p in 0.001..0.999f64, interval in 1u32..100, target in 1u32..20) {
        let shorter = interval_rescale(p, interval, target);
        let longer = interval_rescale(p, interval + 1, target);
        prop_assert!(longer >= shorter - TOL);
    }

    /// Normal log-density is maximal at the mean.
    #[test]
    fn normal_peak_at_mean(mean in -50.0..50.0f64, sd in 0.1..20.0f64, x in -100.0..100.0f64) {
        prop_assert!(log_normal_pdf(x, mean, sd) <= log_normal_pdf(mean, mean, sd) + TOL);
    }

    /// Both families are symmetric about their location.
    #[test]
    fn densities_symmetric(loc in -10.0..10.0f64, scale in 0.1..10.0f64, d in 0.0..50.0f64) {
        prop_assert!(approx_eq(
            log_normal_pdf(loc + d, loc, scale),
            log_normal_pdf(loc - d, loc, scale),
            TOL
        ));
        prop_assert!(approx_eq(
            log_cauchy_pdf(loc + d, loc, scale),
            log_cauchy_pdf(loc - d, loc, scale),
            TOL
        ));
    }

    /// Merging weighted means is associative.
    #[test]
    fn weighted_mean_associative(
        x1 in -100.0..100.0f64, n1 in 1u64..1000,
        x2 in -100.0..100.0f64, n2 in 1u64..1000,
        x3 in -100.0..100.0f64, n3 in 1u64..1000,
    ) {
        let a = WeightedMean::new(x1, n1);
        let b = WeightedMean::new(x2, n2);
        let c = WeightedMean::new(x3, n3);
        let left = a.merge(b).merge(c);
        let right = a.merge(b.merge(c));
        prop_assert!(approx_eq(left.mean, right.mean, 1e-9));
        prop_assert_eq!(left.count, right.count);
    }

    /// The fold agrees with the closed-form weighted mean.
    #[test]
    fn weighted_mean_closed_form(values in prop::collection::vec((-50.0..50.0f64, 1u64..100), 1..20)) {
        let folded = weighted_mean(&values);
        let total: f64 = values.iter().map(|(_, n)| *n as f64).sum();
        let mean: f64 = values.iter().map(|(x, n)| x * *n as f64).sum::<f64>() / total;
        prop_assert!(approx_eq(folded.mean, mean, 1e-9));
    }

    /// OLS residuals against the fitted line sum to ~zero.
    #[test]
    fn ols_residuals_center(slope in -10.0..10.0f64, intercept in -10.0..10.0f64,
                            noise in prop::collection::vec(-0.5..0.5f64, 5..30)) {
        let xs: Vec<f64> = (0..noise.len()).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().zip(&noise).map(|(x, e)| slope * x + intercept + e).collect();
        if let Some(fit) = LinearFit::fit(&xs, &ys) {
            let resid: f64 = xs.iter().zip(&ys).map(|(x, y)| y - (fit.slope * x + fit.intercept)).sum();
            prop_assert!(resid.abs() < 1e-6 * ys.len() as f64);
        }
    }
}

/// The prior densities integrate to 1 (coarse trapezoid over a wide window;
/// the Cauchy needs a very wide window for its tails).
#[test]
fn densities_integrate_to_one() {
    let integrate = |f: &dyn Fn(f64) -> f64, lo: f64, hi: f64, n: usize| -> f64 {
        let h = (hi - lo) / n as f64;
        let mut total = 0.5 * (f(lo) + f(hi));
        for i in 1..n {
            total += f(lo + i as f64 * h);
        }
        total * h
    };

    let normal = integrate(&|x| log_normal_pdf(x, 0.0, 1.0).exp(), -12.0, 12.0, 100_000);
    assert!((normal - 1.0).abs() < 1e-6, "normal integral {normal}");

    let cauchy = integrate(&|x| log_cauchy_pdf(x, 0.0, 1.0).exp(), -4000.0, 4000.0, 4_000_000);
    assert!((cauchy - 1.0).abs() < 1e-3, "cauchy integral {cauchy}");
}
