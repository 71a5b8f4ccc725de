//! Log-densities for the prior families.

use std::f64::consts::PI;

const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_8; // 0.5 * ln(2*pi)

/// Log-density of a Normal(mean, sd) at `x`.
///
/// Returns NaN for non-positive or non-finite `sd`.
pub fn log_normal_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    if !(sd > 0.0) || !sd.is_finite() {
        return f64::NAN;
    }
    let z = (x - mean) / sd;
    -LOG_SQRT_2PI - sd.ln() - 0.5 * z * z
}

/// Log-density of a Cauchy(location, scale) at `x`.
///
/// Returns NaN for non-positive or non-finite `scale`.
pub fn log_cauchy_pdf(x: f64, location: f64, scale: f64) -> f64 {
    if !(scale > 0.0) || !scale.is_finite() {
        return f64::NAN;
    }
    let z = (x - location) / scale;
    -PI.ln() - scale.ln() - (z * z).ln_1p()
}
